use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation check polled once per tick by every blocking protocol.
///
/// The mechanism behind it is up to the caller: a [`CancellationFlag`] shared
/// with the command registry, [`Never`], or any `Fn() -> bool`.
pub trait Cancellation: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

/// Cooperative cancellation flag, cheap to clone and share between threads
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it on its next poll.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl Cancellation for CancellationFlag {
    fn is_cancelled(&self) -> bool {
        CancellationFlag::is_cancelled(self)
    }
}

/// Cancellation that never triggers
#[derive(Debug, Clone, Copy, Default)]
pub struct Never;

impl Cancellation for Never {
    fn is_cancelled(&self) -> bool {
        false
    }
}

impl<F> Cancellation for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool {
        (self)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());

        flag.cancel();
        assert!(observer.is_cancelled());

        observer.reset();
        assert!(!flag.is_cancelled());
    }

    #[test]
    fn test_closure_cancellation() {
        let limit = AtomicBool::new(true);
        let check = || limit.load(Ordering::SeqCst);
        assert!(Cancellation::is_cancelled(&check));
        assert!(!Never.is_cancelled());
    }
}
