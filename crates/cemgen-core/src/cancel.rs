//! Cancellation signalling across the session, batch workers, and watcher.
//!
//! A token is checked before each phase (preprocess, per-job, postprocess).
//! Cancelling never corrupts committed state: workers drain at the next
//! job boundary and the previous manifest remains visible.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::AnalyzerError;

/// Cloneable cancellation token shared between the watcher and workers.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. All clones observe the signal.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` if the token has been cancelled.
    pub fn check(&self) -> Result<(), AnalyzerError> {
        if self.is_cancelled() {
            Err(AnalyzerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_is_live() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancel_visible_through_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(AnalyzerError::Cancelled)));
    }
}
