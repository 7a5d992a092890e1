// ============================================================================
// delta-sets - Collection Delta Buffer
// Per-dependency staging area for uncommitted add/remove deltas
// ============================================================================
//
// The committed state seen by context snapshots is
// `(source − pendingAdded) ∪ pendingRemoved`: the source as it looked at the
// last commit point. The formula depends on the two pending sets staying
// disjoint, which the fold maintains unconditionally.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

use crate::containers::ReactiveSet;
use crate::core::changes::SetDelta;
use crate::core::error::{ReactiveError, Result};
use crate::transport::{Signal, SignalController, Subscription};

/// Accumulates the uncommitted delta seen from one collection source.
pub struct SetDeltaBuffer<T: Eq + Hash> {
    inner: Rc<SetBufferInner<T>>,
}

impl<T: Eq + Hash> Clone for SetDeltaBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct SetBufferInner<T: Eq + Hash> {
    source: ReactiveSet<T>,
    pending_added: RefCell<HashSet<T>>,
    pending_removed: RefCell<HashSet<T>>,
    has_committed_once: Cell<bool>,
    enabled: Cell<bool>,
    notify: SignalController<()>,
    sub: RefCell<Option<Subscription>>,
}

impl<T: Eq + Hash + Clone + 'static> SetDeltaBuffer<T> {
    /// A detached buffer; `enable` attaches it to the source.
    pub fn new(source: ReactiveSet<T>) -> Self {
        Self {
            inner: Rc::new(SetBufferInner {
                source,
                pending_added: RefCell::new(HashSet::new()),
                pending_removed: RefCell::new(HashSet::new()),
                has_committed_once: Cell::new(false),
                enabled: Cell::new(false),
                notify: SignalController::new(),
                sub: RefCell::new(None),
            }),
        }
    }

    pub fn source(&self) -> &ReactiveSet<T> {
        &self.inner.source
    }

    /// Bare change notifications: something is buffered, no payload.
    pub fn on_change(&self) -> Signal<()> {
        self.inner.notify.signal()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// Subscribe to the source, then stage its entire current contents as the
    /// initial increment.
    pub fn enable(&self) {
        if self.inner.enabled.replace(true) {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let sub = self
            .inner
            .source
            .on_change()
            .subscribe(move |delta: &SetDelta<T>| {
                if let Some(inner) = weak.upgrade() {
                    fold(&inner, delta);
                    inner.notify.activate(&());
                }
            });
        *self.inner.sub.borrow_mut() = Some(sub);

        let snapshot = self.inner.source.values();
        let has_initial = !snapshot.is_empty();
        *self.inner.pending_added.borrow_mut() = snapshot;
        self.inner.pending_removed.borrow_mut().clear();
        self.inner.has_committed_once.set(false);
        if has_initial {
            self.inner.notify.activate(&());
        }
    }

    /// Abort the subscription and clear.
    pub fn disable(&self) {
        if !self.inner.enabled.replace(false) {
            return;
        }
        *self.inner.sub.borrow_mut() = None;
        self.inner.pending_added.borrow_mut().clear();
        self.inner.pending_removed.borrow_mut().clear();
        self.inner.has_committed_once.set(false);
    }

    /// A copy of the buffered delta, or `None` when both sides are empty.
    pub fn buffered_changes(&self) -> Result<Option<SetDelta<T>>> {
        self.guard()?;
        let added = self.inner.pending_added.borrow();
        let removed = self.inner.pending_removed.borrow();
        if added.is_empty() && removed.is_empty() {
            return Ok(None);
        }
        Ok(Some(SetDelta::from_parts(added.clone(), removed.clone())))
    }

    /// Clear the buffers and mark the commit point. The source itself is
    /// untouched; the committed-state view advances to the source's present.
    pub fn commit_changes(&self) -> Result<()> {
        self.guard()?;
        self.inner.pending_added.borrow_mut().clear();
        self.inner.pending_removed.borrow_mut().clear();
        self.inner.has_committed_once.set(true);
        Ok(())
    }

    /// The source as it looked immediately after the last commit, or `None`
    /// if never committed.
    pub fn committed_state(&self) -> Result<Option<HashSet<T>>> {
        self.guard()?;
        if !self.inner.has_committed_once.get() {
            return Ok(None);
        }
        let mut state = self.inner.source.values();
        for value in self.inner.pending_added.borrow().iter() {
            state.remove(value);
        }
        for value in self.inner.pending_removed.borrow().iter() {
            state.insert(value.clone());
        }
        Ok(Some(state))
    }

    fn guard(&self) -> Result<()> {
        if self.inner.enabled.get() {
            Ok(())
        } else {
            Err(ReactiveError::BufferDisabled)
        }
    }
}

/// `pendingAdded ← (pendingAdded ∪ incr) − decr`;
/// `pendingRemoved ← (pendingRemoved ∪ decr) − incr`.
fn fold<T: Eq + Hash + Clone>(inner: &SetBufferInner<T>, delta: &SetDelta<T>) {
    let mut added = inner.pending_added.borrow_mut();
    let mut removed = inner.pending_removed.borrow_mut();
    for value in delta.increment.iter().flatten() {
        removed.remove(value);
        added.insert(value.clone());
    }
    for value in delta.decrement.iter().flatten() {
        added.remove(value);
        removed.insert(value.clone());
    }
}

// =============================================================================
// TESTS
// =============================================================================
