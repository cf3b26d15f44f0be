//! Cancellation token shared by the batch producer, the workers and the
//! coordinator of one scoring run.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Why a scoring run was cancelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelReason {
    /// A batch failed under the fail-fast policy.
    BatchFailed {
        /// Index of the failing batch.
        batch_index: usize,
    },
    /// The batch source returned an error.
    SourceFailed,
    /// The result sink rejected scores.
    SinkFailed {
        /// First row of the rejected chunk.
        offset: usize,
    },
    /// Cancellation requested by the caller.
    Requested(String),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BatchFailed { batch_index } => write!(f, "batch {batch_index} failed"),
            Self::SourceFailed => write!(f, "batch source failed"),
            Self::SinkFailed { offset } => write!(f, "result sink failed at row {offset}"),
            Self::Requested(reason) => write!(f, "{reason}"),
        }
    }
}

/// A token for cooperative cancellation.
///
/// Idempotent: only the first reason is kept. Checking the token is a
/// single atomic load, cheap enough for the producer to do before every
/// batch read.
#[derive(Default)]
pub struct CancellationToken {
    cancelled: AtomicBool,
    reason: RwLock<Option<CancelReason>>,
}

impl CancellationToken {
    /// Creates a new cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    ///
    /// Returns true if this call cancelled the token.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        // The reason lock is held across the flag flip so a reader that sees
        // the flag also sees the reason.
        let mut slot = self.reason.write();
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return false;
        }
        *slot = Some(reason);
        true
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.read().clone()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_token_default_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(token.cancel(CancelReason::BatchFailed { batch_index: 2 }));
        assert!(!token.cancel(CancelReason::SinkFailed { offset: 0 }));

        assert!(token.is_cancelled());
        assert_eq!(token.reason(), Some(CancelReason::BatchFailed { batch_index: 2 }));
    }

    #[test]
    fn test_cancel_visible_across_threads() {
        let token = Arc::new(CancellationToken::new());
        let seen = Arc::clone(&token);
        let waiter = std::thread::spawn(move || {
            while !seen.is_cancelled() {
                std::thread::yield_now();
            }
            seen.reason()
        });

        token.cancel(CancelReason::SinkFailed { offset: 40 });
        assert_eq!(waiter.join().unwrap(), Some(CancelReason::SinkFailed { offset: 40 }));
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            CancelReason::BatchFailed { batch_index: 4 }.to_string(),
            "batch 4 failed"
        );
        assert_eq!(
            CancelReason::SinkFailed { offset: 10 }.to_string(),
            "result sink failed at row 10"
        );
    }
}
