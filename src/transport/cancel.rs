// ============================================================================
// delta-sets - Cancel Token
// Shared revocation for groups of subscriptions
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A shared token that revokes every subscription registered against it.
///
/// Cancellation is one-way and idempotent: once fired, later registrations
/// are revoked immediately.
///
/// # Example
///
/// ```
/// use delta_sets::transport::CancelToken;
///
/// let token = CancelToken::new();
/// assert!(!token.is_cancelled());
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Rc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    cancelled: Cell<bool>,
    callbacks: RefCell<Vec<Box<dyn FnOnce()>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    /// Fire the token. Every registered callback runs exactly once.
    pub fn cancel(&self) {
        if self.inner.cancelled.replace(true) {
            return;
        }
        let callbacks = self.inner.callbacks.take();
        for callback in callbacks {
            callback();
        }
    }

    /// Register a callback to run on cancellation. Runs immediately if the
    /// token has already fired.
    pub fn on_cancel(&self, callback: Box<dyn FnOnce()>) {
        if self.inner.cancelled.get() {
            callback();
        } else {
            self.inner.callbacks.borrow_mut().push(callback);
        }
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.inner.cancelled.get())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_callbacks_once() {
        let token = CancelToken::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        token.on_cancel(Box::new(move || c.set(c.get() + 1)));

        token.cancel();
        token.cancel();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn late_registration_runs_immediately() {
        let token = CancelToken::new();
        token.cancel();

        let ran = Rc::new(Cell::new(false));
        let r = ran.clone();
        token.on_cancel(Box::new(move || r.set(true)));
        assert!(ran.get());
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel();
        assert!(token.is_cancelled());
    }
}
