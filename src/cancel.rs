//! Cooperative cancellation for long-running diffs.
//!
//! Every pipeline phase checks the token between steps and abandons
//! cleanly with [`DiffError::Cancelled`] when it has fired. Tokens are
//! cheap to clone and safe to trip from another thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{DiffError, DiffResult};

/// A shared flag that aborts a diff in progress.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, untripped token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the token. All phases observing it fail with
    /// [`DiffError::Cancelled`] at their next step.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the token has been tripped.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Fail fast if the token has been tripped.
    #[inline]
    pub fn check(&self) -> DiffResult<()> {
        if self.is_cancelled() {
            Err(DiffError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_cancelled_token_fails() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(DiffError::Cancelled)));
    }
}
