// ============================================================================
// delta-sets - Difference
// Derived collection: a distinguished superset minus every excluded set
// ============================================================================

use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

use crate::combine::variadic::{DifferenceOptions, VariadicInner, VariadicMode};
use crate::containers::ReactiveSet;
use crate::core::error::Result;
use crate::transport::Signal;

/// A readonly derived collection: `contents = superset \ ⋃ excluded`.
///
/// Occurrence counts run over the excluded sources only; a superset value is
/// in the result exactly when its count is zero.
///
/// # Example
///
/// ```
/// use delta_sets::{difference, set, set_of};
///
/// let u = set(set_of![1, 2, 3, 4, 5]);
/// let x = set(set_of![2, 4]);
/// let d = difference(u.clone(), vec![x.clone()]).unwrap();
/// assert_eq!(d.contents(), set_of![1, 3, 5]);
///
/// x.add(5).unwrap();
/// assert_eq!(d.contents(), set_of![1, 3]);
/// ```
pub struct DifferenceSet<T: Eq + Hash + Clone + 'static> {
    inner: Rc<VariadicInner<T>>,
}

impl<T: Eq + Hash + Clone + 'static> Clone for DifferenceSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Eq + Hash + Clone + 'static> DifferenceSet<T> {
    pub fn new(superset: ReactiveSet<T>, excluded: Vec<ReactiveSet<T>>) -> Result<Self> {
        Self::with_options(DifferenceOptions::new(superset, excluded))
    }

    pub fn with_options(options: DifferenceOptions<T>) -> Result<Self> {
        VariadicInner::build(
            VariadicMode::Difference,
            options.excluded,
            Some(options.superset),
            options.label,
            options.enabled,
        )
        .map(|inner| Self { inner })
    }

    /// The readonly result collection; usable as a source elsewhere.
    pub fn result(&self) -> ReactiveSet<T> {
        self.inner.result_handle()
    }

    pub fn contents(&self) -> HashSet<T> {
        self.inner.contents()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.inner.result_handle().contains(value)
    }

    pub fn enable(&self) {
        self.inner.enable();
    }

    pub fn disable(&self) {
        self.inner.disable();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lifecycle_active()
    }

    pub fn on_switch(&self) -> Signal<bool> {
        self.inner.switch_handle()
    }

    /// Register another excluded set.
    pub fn add_excluded(&self, source: ReactiveSet<T>) -> Result<()> {
        self.inner.add_source(source)
    }

    /// Drop an excluded set. Returns whether it was registered.
    pub fn remove_excluded(&self, source: &ReactiveSet<T>) -> bool {
        self.inner.remove_source(source)
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label()
    }
}

/// Create a difference of the superset against the excluded sets.
pub fn difference<T: Eq + Hash + Clone + 'static>(
    superset: ReactiveSet<T>,
    excluded: Vec<ReactiveSet<T>>,
) -> Result<DifferenceSet<T>> {
    DifferenceSet::new(superset, excluded)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{set, set_of};

    #[test]
    fn recovery_under_mutation() {
        let u = set(set_of![1, 2, 3, 4, 5]);
        let x = set(set_of![2, 4]);
        let d = difference(u.clone(), vec![x.clone()]).unwrap();

        assert_eq!(d.contents(), set_of![1, 3, 5]);

        x.add(5).unwrap();
        assert_eq!(d.contents(), set_of![1, 3]);

        x.delete(&2).unwrap();
        assert_eq!(d.contents(), set_of![1, 2, 3]);

        u.delete(&1).unwrap();
        assert_eq!(d.contents(), set_of![2, 3]);
    }

    #[test]
    fn superset_additions_respect_exclusions() {
        let u = set(set_of![1]);
        let x = set(set_of![2]);
        let d = difference(u.clone(), vec![x.clone()]).unwrap();

        u.add(2).unwrap();
        assert_eq!(d.contents(), set_of![1]);

        u.add(3).unwrap();
        assert_eq!(d.contents(), set_of![1, 3]);
    }

    #[test]
    fn overlapping_exclusions_restore_only_when_all_release() {
        let u = set(set_of![1, 2]);
        let x = set(set_of![2]);
        let y = set(set_of![2]);
        let d = difference(u.clone(), vec![x.clone(), y.clone()]).unwrap();
        assert_eq!(d.contents(), set_of![1]);

        x.delete(&2).unwrap();
        assert_eq!(d.contents(), set_of![1]);

        y.delete(&2).unwrap();
        assert_eq!(d.contents(), set_of![1, 2]);
    }

    #[test]
    fn removed_exclusion_values_must_still_be_in_superset() {
        let u = set(set_of![1]);
        let x = set(set_of![2, 9]);
        let d = difference(u.clone(), vec![x.clone()]).unwrap();

        // 9 leaves the exclusion but was never in the superset
        x.delete(&9).unwrap();
        assert_eq!(d.contents(), set_of![1]);
    }

    #[test]
    fn superset_listed_as_excluded_warns_but_proceeds() {
        let u = set(set_of![1, 2]);
        let d = difference(u.clone(), vec![u.clone()]).unwrap();
        // every superset value is excluded by itself
        assert!(d.contents().is_empty());
    }

    #[test]
    fn dynamic_exclusions() {
        let u = set(set_of![1, 2, 3]);
        let x = set(set_of![2]);
        let d = difference(u.clone(), vec![]).unwrap();
        assert_eq!(d.contents(), set_of![1, 2, 3]);

        d.add_excluded(x.clone()).unwrap();
        assert_eq!(d.contents(), set_of![1, 3]);

        assert!(d.remove_excluded(&x));
        assert_eq!(d.contents(), set_of![1, 2, 3]);
    }

    #[test]
    fn toggling_matches_never_toggled() {
        let u = set(set_of![1, 2, 3]);
        let x = set(set_of![3]);
        let d = difference(u.clone(), vec![x.clone()]).unwrap();

        d.disable();
        assert!(d.contents().is_empty());
        u.add(4).unwrap();
        x.add(1).unwrap();
        d.enable();

        let fresh = difference(u, vec![x]).unwrap();
        assert_eq!(d.contents(), fresh.contents());
        assert_eq!(d.contents(), set_of![2, 4]);
    }
}
