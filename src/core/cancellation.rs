// src/core/cancellation.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Raised by [`CancellationToken::check`] once the token (or any ancestor) was cancelled.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation was cancelled.")]
pub struct Cancelled;

/// A cooperative cancellation signal shared between threads.
///
/// Tokens form a chain: a token created with [`CancellationToken::child`] reports
/// cancellation when either itself or any of its ancestors is cancelled, while
/// cancelling the child never reaches the parent. The executor uses this to scope a
/// signal to one invocation while still honoring the caller's outer signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<CancellationToken>>,
}

impl CancellationToken {
    /// Creates a fresh, uncancelled root token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token linked to `self`: it observes `self`'s cancellation but can be
    /// cancelled on its own without affecting `self`.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// Sets the signal. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }

    /// Returns `Err(Cancelled)` once the signal is set, for use with `?` at suspension points.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn test_clones_share_the_signal() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }

    #[test]
    fn test_parent_cancellation_reaches_child() {
        let outer = CancellationToken::new();
        let inner = outer.child();
        let grandchild = inner.child();
        outer.cancel();
        assert!(inner.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn test_child_cancellation_does_not_reach_parent() {
        let outer = CancellationToken::new();
        let inner = outer.child();
        inner.cancel();
        assert!(inner.is_cancelled());
        assert!(!outer.is_cancelled());
    }
}
