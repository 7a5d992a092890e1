// ============================================================================
// delta-sets - Signal Transport
// Typed broadcast with cancellable subscriptions
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::cancel::CancelToken;

// =============================================================================
// HANDLERS
// =============================================================================

/// Something that can receive signal events.
///
/// Handlers may be function-like (any `Fn(&T)` closure, via the blanket impl)
/// or object-like (a type with a handling method).
pub trait SignalHandler<T> {
    fn handle(&self, event: &T);
}

impl<T, F: Fn(&T)> SignalHandler<T> for F {
    fn handle(&self, event: &T) {
        self(event)
    }
}

// =============================================================================
// EMITTER STORAGE
// =============================================================================

struct Entry<T> {
    id: u64,
    handler: Rc<dyn SignalHandler<T>>,
    revoked: Rc<Cell<bool>>,
}

struct EmitterInner<T> {
    entries: RefCell<Vec<Entry<T>>>,
    next_id: Cell<u64>,
}

impl<T> EmitterInner<T> {
    fn new() -> Self {
        Self {
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
        }
    }

    fn remove(&self, id: u64) {
        self.entries.borrow_mut().retain(|entry| {
            if entry.id == id {
                entry.revoked.set(true);
                false
            } else {
                true
            }
        });
    }
}

// =============================================================================
// SIGNAL - The observe-only view
// =============================================================================

/// A typed broadcast channel, observe-only.
///
/// Listeners are delivered synchronously, in subscription order, on the call
/// stack of the emission. A subscription cancelled after dispatch but before
/// delivery is skipped without invoking the handler.
pub struct Signal<T> {
    inner: Rc<EmitterInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Signal<T> {
    /// Subscribe a function-like or object-like handler.
    ///
    /// The returned [`Subscription`] is the abort handle; dropping it cancels
    /// the subscription.
    pub fn subscribe<H: SignalHandler<T> + 'static>(&self, handler: H) -> Subscription {
        self.subscribe_rc(Rc::new(handler))
    }

    /// Subscribe a pre-shared handler. Keep the `Rc` to later remove it by
    /// identity via [`Signal::unsubscribe`].
    pub fn subscribe_rc(&self, handler: Rc<dyn SignalHandler<T>>) -> Subscription {
        let (id, revoked) = self.attach(handler);
        let weak = Rc::downgrade(&self.inner);
        Subscription::new(revoked, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        })
    }

    /// Subscribe with a shared [`CancelToken`]; firing the token revokes the
    /// subscription without calling the handler.
    pub fn subscribe_with_token<H: SignalHandler<T> + 'static>(
        &self,
        handler: H,
        token: &CancelToken,
    ) -> Subscription {
        let (id, revoked) = self.attach(Rc::new(handler));

        let token_revoked = revoked.clone();
        let token_weak = Rc::downgrade(&self.inner);
        token.on_cancel(Box::new(move || {
            token_revoked.set(true);
            if let Some(inner) = token_weak.upgrade() {
                inner.remove(id);
            }
        }));

        let weak = Rc::downgrade(&self.inner);
        Subscription::new(revoked, move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove(id);
            }
        })
    }

    fn attach(&self, handler: Rc<dyn SignalHandler<T>>) -> (u64, Rc<Cell<bool>>) {
        let id = self.inner.next_id.get();
        self.inner.next_id.set(id + 1);

        let revoked = Rc::new(Cell::new(false));
        self.inner.entries.borrow_mut().push(Entry {
            id,
            handler,
            revoked: revoked.clone(),
        });
        (id, revoked)
    }

    /// Remove a handler by identity. The handler is not called again, even
    /// for an emission already in flight.
    pub fn unsubscribe(&self, handler: &Rc<dyn SignalHandler<T>>) {
        self.inner.entries.borrow_mut().retain(|entry| {
            if Rc::ptr_eq(&entry.handler, handler) {
                entry.revoked.set(true);
                false
            } else {
                true
            }
        });
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.inner.entries.borrow().len()
    }
}

// =============================================================================
// SIGNAL CONTROLLER - Emission kept apart from observation
// =============================================================================

/// The emitting side of a signal. The external view handed to observers is
/// [`Signal`], which exposes only subscription; `activate` stays inside the
/// crate.
pub struct SignalController<T> {
    signal: Signal<T>,
}

impl<T: 'static> SignalController<T> {
    pub fn new() -> Self {
        Self {
            signal: Signal {
                inner: Rc::new(EmitterInner::new()),
            },
        }
    }

    /// The observe-only view.
    pub fn signal(&self) -> Signal<T> {
        self.signal.clone()
    }

    /// Deliver an event to every live subscription.
    ///
    /// The listener list is snapshotted first, so handlers may subscribe or
    /// unsubscribe during delivery without disturbing this emission.
    pub(crate) fn activate(&self, event: &T) {
        let snapshot: Vec<(Rc<dyn SignalHandler<T>>, Rc<Cell<bool>>)> = self
            .signal
            .inner
            .entries
            .borrow()
            .iter()
            .map(|entry| (entry.handler.clone(), entry.revoked.clone()))
            .collect();

        for (handler, revoked) in snapshot {
            if revoked.get() {
                continue;
            }
            handler.handle(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.signal.listener_count()
    }
}

impl<T: 'static> Default for SignalController<T> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// SUBSCRIPTION - Per-subscription abort handle
// =============================================================================

/// Abort handle for one subscription. Cancels on drop.
pub struct Subscription {
    revoked: Rc<Cell<bool>>,
    detach: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    fn new(revoked: Rc<Cell<bool>>, detach: impl FnOnce() + 'static) -> Self {
        Self {
            revoked,
            detach: Some(Box::new(detach)),
        }
    }

    /// Revoke the subscription now.
    pub fn cancel(mut self) {
        self.revoke();
    }

    pub fn is_cancelled(&self) -> bool {
        self.revoked.get()
    }

    fn revoke(&mut self) {
        self.revoked.set(true);
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.revoke();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_and_activate() {
        let controller: SignalController<i32> = SignalController::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let s = seen.clone();
        let _sub = controller.signal().subscribe(move |event: &i32| {
            s.borrow_mut().push(*event);
        });

        controller.activate(&1);
        controller.activate(&2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn object_like_handler() {
        struct Recorder {
            seen: RefCell<Vec<i32>>,
        }
        impl SignalHandler<i32> for Recorder {
            fn handle(&self, event: &i32) {
                self.seen.borrow_mut().push(*event);
            }
        }

        let controller: SignalController<i32> = SignalController::new();
        let recorder = Rc::new(Recorder {
            seen: RefCell::new(Vec::new()),
        });
        let _sub = controller.signal().subscribe_rc(recorder.clone());

        controller.activate(&7);
        assert_eq!(*recorder.seen.borrow(), vec![7]);
    }

    #[test]
    fn drop_cancels() {
        let controller: SignalController<i32> = SignalController::new();
        let count = Rc::new(Cell::new(0));

        {
            let c = count.clone();
            let _sub = controller
                .signal()
                .subscribe(move |_: &i32| c.set(c.get() + 1));
            controller.activate(&1);
        }

        controller.activate(&2);
        assert_eq!(count.get(), 1);
        assert_eq!(controller.listener_count(), 0);
    }

    #[test]
    fn unsubscribe_removes_by_identity() {
        let controller: SignalController<i32> = SignalController::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let handler: Rc<dyn SignalHandler<i32>> = Rc::new(move |_: &i32| c.set(c.get() + 1));
        let sub = controller.signal().subscribe_rc(handler.clone());

        controller.activate(&1);
        controller.signal().unsubscribe(&handler);
        controller.activate(&2);

        assert_eq!(count.get(), 1);
        assert_eq!(controller.listener_count(), 0);
        drop(sub);
    }

    #[test]
    fn token_revokes_without_delivery() {
        let controller: SignalController<i32> = SignalController::new();
        let token = CancelToken::new();
        let count = Rc::new(Cell::new(0));

        let c = count.clone();
        let _sub = controller
            .signal()
            .subscribe_with_token(move |_: &i32| c.set(c.get() + 1), &token);

        token.cancel();
        controller.activate(&1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn cancellation_mid_dispatch_skips_delivery() {
        // The first handler cancels the second during delivery of the same
        // emission; the second must not run.
        let controller: SignalController<i32> = SignalController::new();
        let token = CancelToken::new();
        let count = Rc::new(Cell::new(0));

        let t = token.clone();
        let _canceller = controller.signal().subscribe(move |_: &i32| t.cancel());

        let c = count.clone();
        let _victim = controller
            .signal()
            .subscribe_with_token(move |_: &i32| c.set(c.get() + 1), &token);

        controller.activate(&1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn handlers_may_subscribe_during_delivery() {
        let controller: SignalController<i32> = SignalController::new();
        let signal = controller.signal();
        let late_subs = Rc::new(RefCell::new(Vec::new()));

        let s = signal.clone();
        let stash = late_subs.clone();
        let _sub = signal.subscribe(move |_: &i32| {
            stash.borrow_mut().push(s.subscribe(|_: &i32| {}));
        });

        controller.activate(&1);
        assert_eq!(controller.listener_count(), 2);
    }
}
