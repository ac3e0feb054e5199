use std::time::Duration;

/// Failures surfaced to the caller of an awaiter protocol
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalError {
    #[error("Event journal wait_any timeout after {0:?}")]
    Timeout(Duration),

    #[error("Event journal wait cancelled")]
    Cancelled,
}
