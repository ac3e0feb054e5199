//! Event journal, live event source and the awaiters scripts use to consume them.
//!
//! The packet layer publishes domain events through an [`EventSource`], which
//! appends them to the [`EventJournal`] and fans them out to every live
//! listener. Scripts consume events through an [`EventJournalAwaiter`] using
//! one of three protocols: `wait_any`, `incoming` or `all`.
mod awaiter;
mod cancellation;
mod error;
mod journal;
mod source;

pub use awaiter::{DefaultTimeout, EventJournalAwaiter, POLL_INTERVAL};
pub use cancellation::{Cancellation, CancellationFlag, Never};
pub use error::JournalError;
pub use journal::{AwaitingStarted, EventJournal};
pub use source::{EventSource, ListenerId};

pub use tollgate_events::{Event, EventId, EventKind, EventPayload, OrderedEvent};
