// ============================================================================
// delta-sets - Cell Delta Buffer
// Per-dependency staging area for one uncommitted value change
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::containers::ReactiveCell;
use crate::core::changes::{CellDelta, ValueBox};
use crate::core::error::{ReactiveError, Result};
use crate::transport::{Signal, SignalController, Subscription};

/// Accumulates the uncommitted value change seen from one cell source.
///
/// A pending value that deep-equals the committed one is cleared, so the
/// buffer never reports a change that would not move the committed state.
pub struct CellDeltaBuffer<T> {
    inner: Rc<CellBufferInner<T>>,
}

impl<T> Clone for CellDeltaBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct CellBufferInner<T> {
    source: ReactiveCell<T>,
    pending: RefCell<Option<ValueBox<T>>>,
    committed: RefCell<Option<ValueBox<T>>>,
    enabled: Cell<bool>,
    notify: SignalController<()>,
    sub: RefCell<Option<Subscription>>,
}

impl<T: PartialEq + Clone + 'static> CellDeltaBuffer<T> {
    /// A detached buffer; `enable` attaches it to the source.
    pub fn new(source: ReactiveCell<T>) -> Self {
        Self {
            inner: Rc::new(CellBufferInner {
                source,
                pending: RefCell::new(None),
                committed: RefCell::new(None),
                enabled: Cell::new(false),
                notify: SignalController::new(),
                sub: RefCell::new(None),
            }),
        }
    }

    pub fn source(&self) -> &ReactiveCell<T> {
        &self.inner.source
    }

    /// Bare change notifications: something is buffered, no payload.
    pub fn on_change(&self) -> Signal<()> {
        self.inner.notify.signal()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.get()
    }

    /// Subscribe to the source, then stage its current value as the initial
    /// pending change.
    pub fn enable(&self) {
        if self.inner.enabled.replace(true) {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let sub = self
            .inner
            .source
            .on_change()
            .subscribe(move |delta: &CellDelta<T>| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                let Some(next) = &delta.increment else {
                    return;
                };
                let unchanged = inner
                    .committed
                    .borrow()
                    .as_ref()
                    .is_some_and(|committed| committed.value == next.value);
                *inner.pending.borrow_mut() = if unchanged {
                    None
                } else {
                    Some(ValueBox::new(next.value.clone()))
                };
                inner.notify.activate(&());
            });
        *self.inner.sub.borrow_mut() = Some(sub);

        *self.inner.pending.borrow_mut() = Some(ValueBox::new(self.inner.source.value()));
        *self.inner.committed.borrow_mut() = None;
        self.inner.notify.activate(&());
    }

    /// Abort the subscription and clear.
    pub fn disable(&self) {
        if !self.inner.enabled.replace(false) {
            return;
        }
        *self.inner.sub.borrow_mut() = None;
        *self.inner.pending.borrow_mut() = None;
        *self.inner.committed.borrow_mut() = None;
    }

    /// The buffered change `{ increment: pending, decrement: committed }`,
    /// or `None` when nothing is pending.
    pub fn buffered_change(&self) -> Result<Option<CellDelta<T>>> {
        self.guard()?;
        let pending = self.inner.pending.borrow();
        let Some(pending) = pending.as_ref() else {
            return Ok(None);
        };
        Ok(Some(CellDelta {
            increment: Some(pending.clone()),
            decrement: self.inner.committed.borrow().clone(),
        }))
    }

    /// Move the pending value into the committed slot. Committing with no
    /// pending change is a protocol violation; call sites guard on
    /// [`buffered_change`](Self::buffered_change) first.
    pub fn commit_state(&self) -> Result<()> {
        self.guard()?;
        let pending = self.inner.pending.borrow_mut().take();
        match pending {
            Some(value) => {
                *self.inner.committed.borrow_mut() = Some(value);
                Ok(())
            }
            None => Err(ReactiveError::CommitWithoutPending),
        }
    }

    /// The committed value, or `None` if never committed.
    pub fn committed_value(&self) -> Result<Option<T>> {
        self.guard()?;
        Ok(self
            .inner
            .committed
            .borrow()
            .as_ref()
            .map(|boxed| boxed.value.clone()))
    }

    fn guard(&self) -> Result<()> {
        if self.inner.enabled.get() {
            Ok(())
        } else {
            Err(ReactiveError::BufferDisabled)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell;

    #[test]
    fn disabled_buffer_rejects_extraction_and_commit() {
        let buffer = CellDeltaBuffer::new(cell(1));
        assert_eq!(buffer.buffered_change(), Err(ReactiveError::BufferDisabled));
        assert_eq!(buffer.commit_state(), Err(ReactiveError::BufferDisabled));
        assert_eq!(buffer.committed_value(), Err(ReactiveError::BufferDisabled));
    }

    #[test]
    fn enable_stages_current_value() {
        let buffer = CellDeltaBuffer::new(cell("even"));
        buffer.enable();

        let delta = buffer.buffered_change().unwrap().unwrap();
        assert_eq!(delta.increment, Some(ValueBox::new("even")));
        assert_eq!(delta.decrement, None);
    }

    #[test]
    fn commit_moves_pending_to_committed() {
        let buffer = CellDeltaBuffer::new(cell(1));
        buffer.enable();

        buffer.commit_state().unwrap();
        assert_eq!(buffer.buffered_change().unwrap(), None);
        assert_eq!(buffer.committed_value().unwrap(), Some(1));
    }

    #[test]
    fn commit_without_pending_is_a_protocol_violation() {
        let buffer = CellDeltaBuffer::new(cell(1));
        buffer.enable();
        buffer.commit_state().unwrap();
        assert_eq!(buffer.commit_state(), Err(ReactiveError::CommitWithoutPending));
    }

    #[test]
    fn source_change_back_to_committed_clears_pending() {
        let source = cell(1);
        let buffer = CellDeltaBuffer::new(source.clone());
        buffer.enable();
        buffer.commit_state().unwrap();

        source.set(2).unwrap();
        assert!(buffer.buffered_change().unwrap().is_some());

        source.set(1).unwrap();
        assert_eq!(buffer.buffered_change().unwrap(), None);
    }

    #[test]
    fn buffered_change_carries_committed_as_decrement() {
        let source = cell(1);
        let buffer = CellDeltaBuffer::new(source.clone());
        buffer.enable();
        buffer.commit_state().unwrap();

        source.set(2).unwrap();
        let delta = buffer.buffered_change().unwrap().unwrap();
        assert_eq!(delta.increment, Some(ValueBox::new(2)));
        assert_eq!(delta.decrement, Some(ValueBox::new(1)));
    }

    #[test]
    fn coalesces_to_the_latest_value() {
        let source = cell(1);
        let buffer = CellDeltaBuffer::new(source.clone());
        buffer.enable();
        buffer.commit_state().unwrap();

        source.set(2).unwrap();
        source.set(3).unwrap();
        let delta = buffer.buffered_change().unwrap().unwrap();
        assert_eq!(delta.increment, Some(ValueBox::new(3)));

        buffer.commit_state().unwrap();
        assert_eq!(buffer.committed_value().unwrap(), Some(3));
    }

    #[test]
    fn disable_clears_as_freshly_created() {
        let source = cell(1);
        let buffer = CellDeltaBuffer::new(source.clone());
        buffer.enable();
        buffer.commit_state().unwrap();
        buffer.disable();

        source.set(5).unwrap();
        buffer.enable();
        let delta = buffer.buffered_change().unwrap().unwrap();
        assert_eq!(delta.increment, Some(ValueBox::new(5)));
        assert_eq!(delta.decrement, None);
    }
}
