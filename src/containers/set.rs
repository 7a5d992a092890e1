// ============================================================================
// delta-sets - Reactive Collection
// Set container with granular, batch, overwrite, and transactional mutations
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::combine::lifecycle::CombinationNode;
use crate::core::changes::{SetChange, SetDelta};
use crate::core::error::{ReactiveError, Result};
use crate::transport::{Signal, SignalController};

// =============================================================================
// REACTIVE SET
// =============================================================================

/// A reactive container for a set of unique values.
///
/// Mutations emit at most one [`SetDelta`] each; transactional and batch
/// forms coalesce any number of staged mutations into a single delta at
/// close. Collections produced by combinators are readonly from the outside
/// and reject every mutating entry point.
///
/// # Example
///
/// ```
/// use delta_sets::{set, set_of};
///
/// let tags = set(set_of!["a", "b"]);
/// tags.add("c").unwrap();
/// assert!(tags.contains(&"c"));
/// assert_eq!(tags.len(), 3);
/// ```
pub struct ReactiveSet<T: Eq + Hash> {
    inner: Rc<SetInner<T>>,
}

impl<T: Eq + Hash> Clone for ReactiveSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct SetInner<T: Eq + Hash> {
    data: RefCell<HashSet<T>>,
    pending_added: RefCell<HashSet<T>>,
    pending_removed: RefCell<HashSet<T>>,
    tx_open: Cell<bool>,
    reactive: Cell<bool>,
    readonly: Cell<bool>,
    label: Option<String>,
    changes: SignalController<SetDelta<T>>,
    switches: SignalController<bool>,
    combination: RefCell<Option<Weak<dyn CombinationNode>>>,
}

/// Constructor configuration for a collection.
pub struct SetOptions<T: Eq + Hash> {
    pub values: HashSet<T>,
    pub label: Option<String>,
}

impl<T: Eq + Hash + Clone + 'static> ReactiveSet<T> {
    pub fn new() -> Self {
        Self::with_options(SetOptions {
            values: HashSet::new(),
            label: None,
        })
    }

    pub fn with_values(values: impl IntoIterator<Item = T>) -> Self {
        Self::with_options(SetOptions {
            values: values.into_iter().collect(),
            label: None,
        })
    }

    pub fn with_options(options: SetOptions<T>) -> Self {
        Self {
            inner: Rc::new(SetInner {
                data: RefCell::new(options.values),
                pending_added: RefCell::new(HashSet::new()),
                pending_removed: RefCell::new(HashSet::new()),
                tx_open: Cell::new(false),
                reactive: Cell::new(true),
                readonly: Cell::new(false),
                label: options.label,
                changes: SignalController::new(),
                switches: SignalController::new(),
                combination: RefCell::new(None),
            }),
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// Deltas committed by this collection.
    pub fn on_change(&self) -> Signal<SetDelta<T>> {
        self.inner.changes.signal()
    }

    /// Reactivity transitions, one emission per effective toggle.
    pub fn on_switch(&self) -> Signal<bool> {
        self.inner.switches.signal()
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn contains(&self, value: &T) -> bool {
        self.inner.data.borrow().contains(value)
    }

    pub fn len(&self) -> usize {
        self.inner.data.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.data.borrow().is_empty()
    }

    /// An owned snapshot of the committed contents.
    pub fn values(&self) -> HashSet<T> {
        self.inner.data.borrow().clone()
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        for value in self.inner.data.borrow().iter() {
            f(value);
        }
    }

    // =========================================================================
    // GRANULAR MUTATIONS
    // =========================================================================

    /// Add one element. Emits immediately unless a transaction is open.
    ///
    /// Returns whether the element was absent from the (staged) view.
    pub fn add(&self, value: T) -> Result<bool> {
        self.guard_mutable()?;
        if self.inner.tx_open.get() {
            let was_present = self.projected_contains(&value);
            self.inner.pending_removed.borrow_mut().remove(&value);
            self.inner.pending_added.borrow_mut().insert(value);
            return Ok(!was_present);
        }

        let inserted = self.inner.data.borrow_mut().insert(value.clone());
        if inserted {
            self.inner
                .changes
                .activate(&SetDelta::added(HashSet::from([value])));
        }
        Ok(inserted)
    }

    /// Remove one element. Emits immediately unless a transaction is open.
    pub fn delete(&self, value: &T) -> Result<bool> {
        self.guard_mutable()?;
        if self.inner.tx_open.get() {
            let was_present = self.projected_contains(value);
            self.inner.pending_added.borrow_mut().remove(value);
            self.inner.pending_removed.borrow_mut().insert(value.clone());
            return Ok(was_present);
        }

        let removed = self.inner.data.borrow_mut().remove(value);
        if removed {
            self.inner
                .changes
                .activate(&SetDelta::removed(HashSet::from([value.clone()])));
        }
        Ok(removed)
    }

    /// Remove every element.
    pub fn clear(&self) -> Result<()> {
        self.guard_mutable()?;
        if self.inner.tx_open.get() {
            let current = self.inner.data.borrow().clone();
            *self.inner.pending_removed.borrow_mut() = current;
            self.inner.pending_added.borrow_mut().clear();
            return Ok(());
        }

        let removed = std::mem::take(&mut *self.inner.data.borrow_mut());
        if !removed.is_empty() {
            self.inner.changes.activate(&SetDelta::removed(removed));
        }
        Ok(())
    }

    // =========================================================================
    // BULK MUTATIONS - at most one delta each
    // =========================================================================

    pub fn batch_add(&self, values: impl IntoIterator<Item = T>) -> Result<()> {
        self.guard_mutable()?;
        let opened = self.begin_if_needed();
        {
            let mut added = self.inner.pending_added.borrow_mut();
            let mut removed = self.inner.pending_removed.borrow_mut();
            for value in values {
                removed.remove(&value);
                added.insert(value);
            }
        }
        if opened {
            self.commit_transaction();
        }
        Ok(())
    }

    pub fn batch_delete(&self, values: impl IntoIterator<Item = T>) -> Result<()> {
        self.guard_mutable()?;
        let opened = self.begin_if_needed();
        {
            let mut added = self.inner.pending_added.borrow_mut();
            let mut removed = self.inner.pending_removed.borrow_mut();
            for value in values {
                added.remove(&value);
                removed.insert(value);
            }
        }
        if opened {
            self.commit_transaction();
        }
        Ok(())
    }

    /// Replace the contents wholesale. Equivalent to the delta
    /// `(new − old, old − new)`; emits at most once.
    pub fn overwrite(&self, values: impl IntoIterator<Item = T>) -> Result<()> {
        self.guard_mutable()?;
        let next: HashSet<T> = values.into_iter().collect();

        if self.inner.tx_open.get() {
            let staged_removed: HashSet<T> = self
                .inner
                .data
                .borrow()
                .difference(&next)
                .cloned()
                .collect();
            *self.inner.pending_added.borrow_mut() = next;
            *self.inner.pending_removed.borrow_mut() = staged_removed;
            return Ok(());
        }

        self.overwrite_committed(next);
        Ok(())
    }

    /// Route a change payload: incremental inputs run inside a transaction so
    /// a single delta is emitted; overwrites replace wholesale.
    pub fn apply_changes(&self, change: SetChange<T>) -> Result<()> {
        self.guard_mutable()?;
        match change {
            SetChange::Overwrite(overwrite) => self.overwrite(overwrite.overwrite),
            SetChange::Delta(delta) => {
                let opened = self.begin_if_needed();
                {
                    let incr = delta.increment.unwrap_or_default();
                    let decr = delta.decrement.unwrap_or_default();
                    let mut added = self.inner.pending_added.borrow_mut();
                    let mut removed = self.inner.pending_removed.borrow_mut();
                    for value in incr {
                        removed.remove(&value);
                        added.insert(value);
                    }
                    for value in decr {
                        added.remove(&value);
                        removed.insert(value);
                    }
                }
                if opened {
                    self.commit_transaction();
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Open a transaction. Re-entrant opens are no-ops; returns whether this
    /// call actually opened one.
    pub fn open_transaction(&self) -> Result<bool> {
        self.guard_mutable()?;
        Ok(self.begin_if_needed())
    }

    /// Compute the net effect of the staged mutations against the committed
    /// state, apply it in place, and emit one delta iff it is non-empty.
    pub fn close_transaction(&self) -> Result<()> {
        if self.inner.tx_open.get() {
            self.commit_transaction();
        }
        Ok(())
    }

    /// Discard both staging buffers without emitting.
    pub fn cancel_transaction(&self) {
        self.inner.tx_open.set(false);
        self.inner.pending_added.borrow_mut().clear();
        self.inner.pending_removed.borrow_mut().clear();
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

    /// Turn reactivity off: cancels any open transaction, clears storage
    /// silently, and emits the switch signal once.
    pub fn disable_reactivity(&self) -> Result<()> {
        if self.inner.readonly.get() {
            return Err(ReactiveError::ReadonlyAccess);
        }
        if self.inner.reactive.replace(false) {
            self.cancel_transaction();
            self.inner.data.borrow_mut().clear();
            tracing::debug!(label = self.inner.label.as_deref(), "set reactivity disabled");
            self.inner.switches.activate(&false);
        }
        Ok(())
    }

    /// Turn reactivity back on and emit the switch signal once.
    pub fn enable_reactivity(&self) -> Result<()> {
        if self.inner.readonly.get() {
            return Err(ReactiveError::ReadonlyAccess);
        }
        if !self.inner.reactive.replace(true) {
            tracing::debug!(label = self.inner.label.as_deref(), "set reactivity enabled");
            self.inner.switches.activate(&true);
        }
        Ok(())
    }

    pub fn is_readonly(&self) -> bool {
        self.inner.readonly.get()
    }

    // =========================================================================
    // INTERNALS - privileged paths for combinations
    // =========================================================================

    /// Same-allocation check, used for duplicate-source detection.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn mark_readonly(&self) {
        self.inner.readonly.set(true);
    }

    pub(crate) fn set_combination(&self, node: Weak<dyn CombinationNode>) {
        *self.inner.combination.borrow_mut() = Some(node);
    }

    /// The combination that owns this collection as its result, if any.
    pub(crate) fn combination(&self) -> Option<Rc<dyn CombinationNode>> {
        self.inner
            .combination
            .borrow()
            .as_ref()
            .and_then(Weak::upgrade)
    }

    /// Apply a delta against the committed state, bypassing the readonly
    /// guard. The emitted delta is the net effect only.
    pub(crate) fn apply_delta_internal(&self, delta: &SetDelta<T>) {
        let incr: HashSet<T> = {
            let data = self.inner.data.borrow();
            delta
                .increment
                .iter()
                .flatten()
                .filter(|v| !data.contains(*v))
                .cloned()
                .collect()
        };
        let decr: HashSet<T> = {
            let data = self.inner.data.borrow();
            delta
                .decrement
                .iter()
                .flatten()
                .filter(|v| data.contains(*v))
                .cloned()
                .collect()
        };

        if incr.is_empty() && decr.is_empty() {
            return;
        }

        {
            let mut data = self.inner.data.borrow_mut();
            for value in &decr {
                data.remove(value);
            }
            for value in incr.iter().cloned() {
                data.insert(value);
            }
        }
        self.inner
            .changes
            .activate(&SetDelta::from_parts(incr, decr));
    }

    pub(crate) fn overwrite_internal(&self, next: HashSet<T>) {
        self.overwrite_committed(next);
    }

    pub(crate) fn apply_resolved(&self, change: SetChange<T>) {
        match change {
            SetChange::Delta(delta) => self.apply_delta_internal(&delta),
            SetChange::Overwrite(overwrite) => self.overwrite_internal(overwrite.overwrite),
        }
    }

    /// Drop every element, emitting the decrement for observers.
    pub(crate) fn clear_internal(&self) {
        let removed = std::mem::take(&mut *self.inner.data.borrow_mut());
        if !removed.is_empty() {
            self.inner.changes.activate(&SetDelta::removed(removed));
        }
    }

    pub(crate) fn cancel_transaction_internal(&self) {
        self.cancel_transaction();
    }

    // =========================================================================
    // PRIVATE
    // =========================================================================

    fn guard_mutable(&self) -> Result<()> {
        if self.inner.readonly.get() {
            Err(ReactiveError::ReadonlyAccess)
        } else if !self.inner.reactive.get() {
            Err(ReactiveError::ReactivityDisabled)
        } else {
            Ok(())
        }
    }

    fn begin_if_needed(&self) -> bool {
        if self.inner.tx_open.get() {
            false
        } else {
            self.inner.tx_open.set(true);
            true
        }
    }

    /// Membership as seen through the open transaction's staging buffers.
    fn projected_contains(&self, value: &T) -> bool {
        if self.inner.pending_added.borrow().contains(value) {
            return true;
        }
        self.inner.data.borrow().contains(value)
            && !self.inner.pending_removed.borrow().contains(value)
    }

    fn commit_transaction(&self) {
        self.inner.tx_open.set(false);
        let staged_added = std::mem::take(&mut *self.inner.pending_added.borrow_mut());
        let staged_removed = std::mem::take(&mut *self.inner.pending_removed.borrow_mut());

        let (incr, decr) = {
            let data = self.inner.data.borrow();
            let incr: HashSet<T> = staged_added
                .into_iter()
                .filter(|v| !data.contains(v))
                .collect();
            let decr: HashSet<T> = staged_removed
                .into_iter()
                .filter(|v| data.contains(v))
                .collect();
            (incr, decr)
        };

        if incr.is_empty() && decr.is_empty() {
            return;
        }

        {
            let mut data = self.inner.data.borrow_mut();
            for value in &decr {
                data.remove(value);
            }
            for value in incr.iter().cloned() {
                data.insert(value);
            }
        }
        self.inner
            .changes
            .activate(&SetDelta::from_parts(incr, decr));
    }

    fn overwrite_committed(&self, next: HashSet<T>) {
        let (incr, decr) = {
            let data = self.inner.data.borrow();
            let incr: HashSet<T> = next.difference(&data).cloned().collect();
            let decr: HashSet<T> = data.difference(&next).cloned().collect();
            (incr, decr)
        };

        if incr.is_empty() && decr.is_empty() {
            return;
        }

        *self.inner.data.borrow_mut() = next;
        self.inner
            .changes
            .activate(&SetDelta::from_parts(incr, decr));
    }
}

impl<T: Eq + Hash + Clone + 'static> Default for ReactiveSet<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Eq + Hash + Clone + std::fmt::Debug + 'static> std::fmt::Debug for ReactiveSet<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveSet")
            .field("data", &*self.inner.data.borrow())
            .field("readonly", &self.inner.readonly.get())
            .field("label", &self.inner.label)
            .finish()
    }
}

// =============================================================================
// FACTORY
// =============================================================================

/// Create a reactive collection from initial values.
///
/// # Example
///
/// ```
/// use delta_sets::{set, set_of};
///
/// let numbers = set(set_of![1, 2, 3]);
/// assert_eq!(numbers.len(), 3);
/// ```
pub fn set<T: Eq + Hash + Clone + 'static>(
    values: impl IntoIterator<Item = T>,
) -> ReactiveSet<T> {
    ReactiveSet::with_values(values)
}

// =============================================================================
// TESTS
// =============================================================================
