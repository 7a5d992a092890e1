// ============================================================================
// delta-sets - Reactive Cell
// Single-value container with a transaction buffer and equality gate
// ============================================================================

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::core::changes::{CellChange, CellDelta, CellOverwrite};
use crate::core::equality::{deep_equals, EqualsFn};
use crate::core::error::{ReactiveError, Result};
use crate::transport::{Signal, SignalController};

// =============================================================================
// REACTIVE CELL
// =============================================================================

/// A reactive container for a single value.
///
/// The observable value changes only through [`set`](ReactiveCell::set),
/// [`overwrite`](ReactiveCell::overwrite), or
/// [`apply_changes`](ReactiveCell::apply_changes). A write whose next value
/// structurally equals the current one is a no-op and emits nothing. While a
/// transaction is open, writes land in a separate buffer and the public value
/// is unchanged.
///
/// # Example
///
/// ```
/// use delta_sets::cell;
///
/// let mode = cell("even");
/// assert_eq!(mode.value(), "even");
///
/// mode.set("odd").unwrap();
/// assert_eq!(mode.value(), "odd");
/// ```
pub struct ReactiveCell<T> {
    inner: Rc<CellInner<T>>,
}

impl<T> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct CellInner<T> {
    value: RefCell<T>,
    staged: RefCell<Option<T>>,
    tx_open: Cell<bool>,
    reactive: Cell<bool>,
    equals: EqualsFn<T>,
    label: Option<String>,
    changes: SignalController<CellDelta<T>>,
}

/// Constructor configuration for a cell.
pub struct CellOptions<T> {
    pub value: T,
    pub label: Option<String>,
}

impl<T: Clone + 'static> ReactiveCell<T> {
    /// Create a cell with the default structural-equality gate.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_options(CellOptions { value, label: None })
    }

    pub fn with_options(options: CellOptions<T>) -> Self
    where
        T: PartialEq,
    {
        Self::build(options.value, deep_equals, options.label)
    }

    /// Create a cell with a custom equality gate.
    pub fn new_with_equals(value: T, equals: EqualsFn<T>) -> Self {
        Self::build(value, equals, None)
    }

    fn build(value: T, equals: EqualsFn<T>, label: Option<String>) -> Self {
        Self {
            inner: Rc::new(CellInner {
                value: RefCell::new(value),
                staged: RefCell::new(None),
                tx_open: Cell::new(false),
                reactive: Cell::new(true),
                equals,
                label,
                changes: SignalController::new(),
            }),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Deltas committed by this cell, one emission per committed change.
    pub fn on_change(&self) -> Signal<CellDelta<T>> {
        self.inner.changes.signal()
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// The current committed value. Staged transaction writes are invisible
    /// here until the transaction closes.
    pub fn value(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Access the current value without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Assign a new value.
    ///
    /// Returns `Ok(true)` when the write committed and emitted a delta;
    /// `Ok(false)` when the equality gate suppressed it or a transaction is
    /// staging it.
    pub fn set(&self, next: T) -> Result<bool> {
        self.guard()?;
        if self.inner.tx_open.get() {
            *self.inner.staged.borrow_mut() = Some(next);
            return Ok(false);
        }
        Ok(self.commit(next))
    }

    /// Replace the value from an overwrite payload.
    pub fn overwrite(&self, overwrite: CellOverwrite<T>) -> Result<bool> {
        self.set(overwrite.overwrite.value)
    }

    /// Route a change payload: overwrites replace; deltas take the
    /// increment's value. A delta without an increment has nothing to set
    /// and is a no-op.
    pub fn apply_changes(&self, change: CellChange<T>) -> Result<bool> {
        match change {
            CellChange::Overwrite(overwrite) => self.overwrite(overwrite),
            CellChange::Delta(delta) => match delta.increment {
                Some(next) => self.set(next.value),
                None => {
                    self.guard()?;
                    Ok(false)
                }
            },
        }
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Open a transaction. Re-entrant opens are no-ops.
    pub fn open_transaction(&self) -> Result<()> {
        self.guard()?;
        if !self.inner.tx_open.get() {
            self.inner.tx_open.set(true);
            *self.inner.staged.borrow_mut() = None;
        }
        Ok(())
    }

    /// Close the transaction, committing the staged value through the
    /// equality gate. At most one delta is emitted.
    pub fn close_transaction(&self) -> Result<bool> {
        if !self.inner.tx_open.get() {
            return Ok(false);
        }
        self.inner.tx_open.set(false);
        match self.inner.staged.borrow_mut().take() {
            Some(next) => Ok(self.commit(next)),
            None => Ok(false),
        }
    }

    /// Discard the staged value without emitting.
    pub fn cancel_transaction(&self) {
        self.inner.tx_open.set(false);
        *self.inner.staged.borrow_mut() = None;
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.tx_open.get()
    }

    // =========================================================================
    // REACTIVITY
    // =========================================================================

    pub fn is_reactive(&self) -> bool {
        self.inner.reactive.get()
    }

    /// Turn mutations off. Cancels any open transaction.
    pub fn disable_reactivity(&self) {
        if self.inner.reactive.replace(false) {
            self.cancel_transaction();
            tracing::debug!(label = self.inner.label.as_deref(), "cell reactivity disabled");
        }
    }

    /// Turn mutations back on.
    pub fn enable_reactivity(&self) {
        if !self.inner.reactive.replace(true) {
            tracing::debug!(label = self.inner.label.as_deref(), "cell reactivity enabled");
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn guard(&self) -> Result<()> {
        if self.inner.reactive.get() {
            Ok(())
        } else {
            Err(ReactiveError::ReactivityDisabled)
        }
    }

    fn commit(&self, next: T) -> bool {
        let unchanged = {
            let current = self.inner.value.borrow();
            (self.inner.equals)(&current, &next)
        };
        if unchanged {
            return false;
        }

        let previous = {
            let mut current = self.inner.value.borrow_mut();
            std::mem::replace(&mut *current, next.clone())
        };
        self.inner
            .changes
            .activate(&CellDelta::transition(previous, next));
        true
    }
}

impl<T: Clone + std::fmt::Debug> std::fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &*self.inner.value.borrow())
            .field("label", &self.inner.label)
            .finish()
    }
}

// =============================================================================
// FACTORY
// =============================================================================

/// Create a reactive cell.
///
/// # Example
///
/// ```
/// use delta_sets::cell;
///
/// let count = cell(0);
/// count.set(5).unwrap();
/// assert_eq!(count.value(), 5);
/// ```
pub fn cell<T: PartialEq + Clone + 'static>(value: T) -> ReactiveCell<T> {
    ReactiveCell::new(value)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::changes::ValueBox;

    fn recorded(cell: &ReactiveCell<i32>) -> (Rc<RefCell<Vec<CellDelta<i32>>>>, crate::transport::Subscription) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = seen.clone();
        let sub = cell
            .on_change()
            .subscribe(move |delta: &CellDelta<i32>| s.borrow_mut().push(delta.clone()));
        (seen, sub)
    }

    #[test]
    fn set_commits_and_emits() {
        let c = cell(1);
        let (seen, _sub) = recorded(&c);

        assert!(c.set(2).unwrap());
        assert_eq!(c.value(), 2);
        assert_eq!(
            *seen.borrow(),
            vec![CellDelta {
                increment: Some(ValueBox::new(2)),
                decrement: Some(ValueBox::new(1)),
            }]
        );
    }

    #[test]
    fn equal_write_is_suppressed() {
        let c = cell(vec![1, 2]);
        let seen = Rc::new(Cell::new(0));
        let s = seen.clone();
        let _sub = c
            .on_change()
            .subscribe(move |_: &CellDelta<Vec<i32>>| s.set(s.get() + 1));

        assert!(!c.set(vec![1, 2]).unwrap());
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn transaction_stages_invisibly_and_commits_once() {
        let c = cell(0);
        let (seen, _sub) = recorded(&c);

        c.open_transaction().unwrap();
        c.set(1).unwrap();
        assert_eq!(c.value(), 0);
        c.set(2).unwrap();
        assert_eq!(c.value(), 0);
        assert!(c.close_transaction().unwrap());

        assert_eq!(c.value(), 2);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(
            seen.borrow()[0],
            CellDelta {
                increment: Some(ValueBox::new(2)),
                decrement: Some(ValueBox::new(0)),
            }
        );
    }

    #[test]
    fn transaction_back_to_current_is_a_noop() {
        let c = cell(5);
        let (seen, _sub) = recorded(&c);

        c.open_transaction().unwrap();
        c.set(9).unwrap();
        c.set(5).unwrap();
        assert!(!c.close_transaction().unwrap());
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn reentrant_open_keeps_staged_value() {
        let c = cell(0);
        c.open_transaction().unwrap();
        c.set(7).unwrap();
        c.open_transaction().unwrap();
        assert!(c.close_transaction().unwrap());
        assert_eq!(c.value(), 7);
    }

    #[test]
    fn cancel_discards_staged_value() {
        let c = cell(0);
        c.open_transaction().unwrap();
        c.set(7).unwrap();
        c.cancel_transaction();
        assert!(!c.close_transaction().unwrap());
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn apply_changes_routes() {
        let c = cell(0);

        c.apply_changes(CellChange::Overwrite(CellOverwrite::new(3)))
            .unwrap();
        assert_eq!(c.value(), 3);

        c.apply_changes(CellChange::Delta(CellDelta::transition(3, 4)))
            .unwrap();
        assert_eq!(c.value(), 4);

        // Delta without an increment has nothing to set.
        let noop = CellChange::Delta(CellDelta {
            increment: None,
            decrement: Some(ValueBox::new(4)),
        });
        assert!(!c.apply_changes(noop).unwrap());
        assert_eq!(c.value(), 4);
    }

    #[test]
    fn disabled_cell_rejects_mutation() {
        let c = cell(0);
        c.disable_reactivity();

        assert_eq!(c.set(1), Err(ReactiveError::ReactivityDisabled));
        assert_eq!(c.open_transaction(), Err(ReactiveError::ReactivityDisabled));
        assert_eq!(c.value(), 0);

        c.enable_reactivity();
        assert!(c.set(1).unwrap());
    }

    #[test]
    fn disabling_cancels_open_transaction() {
        let c = cell(0);
        c.open_transaction().unwrap();
        c.set(9).unwrap();
        c.disable_reactivity();
        c.enable_reactivity();

        assert!(!c.in_transaction());
        assert!(!c.close_transaction().unwrap());
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn custom_equality_gate() {
        let c = ReactiveCell::new_with_equals(1, crate::core::equality::never_equals);
        let (seen, _sub) = recorded(&c);
        c.set(1).unwrap();
        assert_eq!(seen.borrow().len(), 1);
    }
}
