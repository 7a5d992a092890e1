// ============================================================================
// delta-sets - Change Payloads
// Tagged delta types for cells, collections, and dictionaries
// ============================================================================

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

// =============================================================================
// COLLECTION DELTAS
// =============================================================================

/// An `(increment, decrement)` pair describing the difference between two
/// collection states.
///
/// Empty sides are `None`, never `Some(∅)`. An element must not appear on
/// both sides of the same delta; the constructors maintain that invariant.
///
/// # Example
///
/// ```
/// use delta_sets::{set_of, SetDelta};
///
/// let delta = SetDelta::from_parts(set_of![1, 2], set_of![3]);
/// assert!(!delta.is_empty());
/// assert!(delta.increment.as_ref().unwrap().contains(&1));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SetDelta<T: Eq + Hash> {
    /// Elements entering the collection.
    pub increment: Option<HashSet<T>>,
    /// Elements leaving the collection.
    pub decrement: Option<HashSet<T>>,
}

impl<T: Eq + Hash> SetDelta<T> {
    /// Build a delta from both sides, normalizing empty sets to `None`.
    pub fn from_parts(increment: HashSet<T>, decrement: HashSet<T>) -> Self {
        debug_assert!(
            increment.is_disjoint(&decrement),
            "an element must not appear on both sides of a delta"
        );
        Self {
            increment: normalize(increment),
            decrement: normalize(decrement),
        }
    }

    /// A delta that only adds elements.
    pub fn added(values: HashSet<T>) -> Self {
        Self {
            increment: normalize(values),
            decrement: None,
        }
    }

    /// A delta that only removes elements.
    pub fn removed(values: HashSet<T>) -> Self {
        Self {
            increment: None,
            decrement: normalize(values),
        }
    }

    /// True when neither side carries elements.
    pub fn is_empty(&self) -> bool {
        self.increment.is_none() && self.decrement.is_none()
    }

    /// The increment side, viewed as a (possibly empty) set.
    pub fn increment_or_empty(&self) -> HashSet<T>
    where
        T: Clone,
    {
        self.increment.clone().unwrap_or_default()
    }

    /// The decrement side, viewed as a (possibly empty) set.
    pub fn decrement_or_empty(&self) -> HashSet<T>
    where
        T: Clone,
    {
        self.decrement.clone().unwrap_or_default()
    }
}

/// A full replacement of a collection's contents.
///
/// Equivalent to the delta `(new − old, old − new)` when applied to a known
/// prior state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetOverwrite<T: Eq + Hash> {
    pub overwrite: HashSet<T>,
}

impl<T: Eq + Hash> SetOverwrite<T> {
    pub fn new(values: HashSet<T>) -> Self {
        Self { overwrite: values }
    }
}

/// Union input type for a collection's `apply_changes`: either shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetChange<T: Eq + Hash> {
    Delta(SetDelta<T>),
    Overwrite(SetOverwrite<T>),
}

impl<T: Eq + Hash> SetChange<T> {
    /// An incremental change built from both sides.
    pub fn delta(increment: HashSet<T>, decrement: HashSet<T>) -> Self {
        Self::Delta(SetDelta::from_parts(increment, decrement))
    }

    /// A full replacement.
    pub fn overwrite(values: HashSet<T>) -> Self {
        Self::Overwrite(SetOverwrite::new(values))
    }

    /// True for a delta with no elements on either side. An overwrite is
    /// never empty: replacing with ∅ still clears the target.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Delta(d) => d.is_empty(),
            Self::Overwrite(_) => false,
        }
    }
}

impl<T: Eq + Hash> From<SetDelta<T>> for SetChange<T> {
    fn from(delta: SetDelta<T>) -> Self {
        Self::Delta(delta)
    }
}

impl<T: Eq + Hash> From<SetOverwrite<T>> for SetChange<T> {
    fn from(overwrite: SetOverwrite<T>) -> Self {
        Self::Overwrite(overwrite)
    }
}

fn normalize<T: Eq + Hash>(values: HashSet<T>) -> Option<HashSet<T>> {
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

// =============================================================================
// CELL DELTAS
// =============================================================================

/// The `{ value }` container wrapping one observable cell state.
///
/// Emitted payloads hold fresh copies so listeners see immutable snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueBox<T> {
    pub value: T,
}

impl<T> ValueBox<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

/// An `(increment, decrement)` pair for a cell: `decrement` holds the
/// previous container, `increment` the next. Both absent means no change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CellDelta<T> {
    pub increment: Option<ValueBox<T>>,
    pub decrement: Option<ValueBox<T>>,
}

impl<T> CellDelta<T> {
    pub fn transition(previous: T, next: T) -> Self {
        Self {
            increment: Some(ValueBox::new(next)),
            decrement: Some(ValueBox::new(previous)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.increment.is_none() && self.decrement.is_none()
    }
}

/// A full replacement of a cell's value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellOverwrite<T> {
    pub overwrite: ValueBox<T>,
}

impl<T> CellOverwrite<T> {
    pub fn new(value: T) -> Self {
        Self {
            overwrite: ValueBox::new(value),
        }
    }
}

/// Union input type for a cell's `apply_changes`: either shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellChange<T> {
    Delta(CellDelta<T>),
    Overwrite(CellOverwrite<T>),
}

impl<T> From<CellDelta<T>> for CellChange<T> {
    fn from(delta: CellDelta<T>) -> Self {
        Self::Delta(delta)
    }
}

impl<T> From<CellOverwrite<T>> for CellChange<T> {
    fn from(overwrite: CellOverwrite<T>) -> Self {
        Self::Overwrite(overwrite)
    }
}

// =============================================================================
// DICTIONARY DELTAS
// =============================================================================

/// An `(increment, decrement)` pair for keyed entries.
///
/// Same normalization rules as [`SetDelta`]: empty sides are `None`, and a
/// key must not appear on both sides of the same delta.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MapDelta<K: Eq + Hash, V> {
    pub increment: Option<HashMap<K, V>>,
    pub decrement: Option<HashMap<K, V>>,
}

impl<K: Eq + Hash, V> MapDelta<K, V> {
    pub fn from_parts(increment: HashMap<K, V>, decrement: HashMap<K, V>) -> Self {
        debug_assert!(
            increment.keys().all(|k| !decrement.contains_key(k)),
            "a key must not appear on both sides of a delta"
        );
        Self {
            increment: normalize_map(increment),
            decrement: normalize_map(decrement),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.increment.is_none() && self.decrement.is_none()
    }
}

fn normalize_map<K: Eq + Hash, V>(entries: HashMap<K, V>) -> Option<HashMap<K, V>> {
    if entries.is_empty() {
        None
    } else {
        Some(entries)
    }
}

// =============================================================================
// TESTS
// =============================================================================
