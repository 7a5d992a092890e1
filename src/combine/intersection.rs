// ============================================================================
// delta-sets - Intersection
// Derived collection holding the values present in every included source
// ============================================================================

use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

use crate::combine::variadic::{VariadicInner, VariadicMode, VariadicOptions};
use crate::containers::ReactiveSet;
use crate::core::error::Result;
use crate::transport::Signal;

/// A readonly derived collection: `contents = ⋂ sources.contents`.
///
/// A value is in the result exactly when its occurrence count equals the
/// number of included sources.
///
/// # Example
///
/// ```
/// use delta_sets::{intersection, set, set_of};
///
/// let a = set(set_of![1, 2, 3]);
/// let b = set(set_of![2, 3, 4]);
/// let i = intersection(vec![a.clone(), b.clone()]).unwrap();
/// assert_eq!(i.contents(), set_of![2, 3]);
///
/// a.delete(&2).unwrap();
/// assert_eq!(i.contents(), set_of![3]);
/// ```
pub struct IntersectionSet<T: Eq + Hash + Clone + 'static> {
    inner: Rc<VariadicInner<T>>,
}

impl<T: Eq + Hash + Clone + 'static> Clone for IntersectionSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Eq + Hash + Clone + 'static> IntersectionSet<T> {
    pub fn new(subsets: Vec<ReactiveSet<T>>) -> Result<Self> {
        Self::with_options(VariadicOptions::new(subsets))
    }

    pub fn with_options(options: VariadicOptions<T>) -> Result<Self> {
        VariadicInner::build(
            VariadicMode::Intersection,
            options.subsets,
            None,
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

    pub fn add_source(&self, source: ReactiveSet<T>) -> Result<()> {
        self.inner.add_source(source)
    }

    pub fn remove_source(&self, source: &ReactiveSet<T>) -> bool {
        self.inner.remove_source(source)
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.label()
    }
}

/// Create an intersection over the given sources.
pub fn intersection<T: Eq + Hash + Clone + 'static>(
    subsets: Vec<ReactiveSet<T>>,
) -> Result<IntersectionSet<T>> {
    IntersectionSet::new(subsets)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::changes::SetDelta;
    use crate::{set, set_of};
    use std::cell::RefCell;

    #[test]
    fn convergence_under_source_mutation() {
        let a = set(set_of![1, 2, 3]);
        let b = set(set_of![2, 3, 4]);
        let i = intersection(vec![a.clone(), b.clone()]).unwrap();

        let deltas = Rc::new(RefCell::new(Vec::new()));
        let log = deltas.clone();
        let _sub = i
            .result()
            .on_change()
            .subscribe(move |delta: &SetDelta<i32>| log.borrow_mut().push(delta.clone()));

        assert_eq!(i.contents(), set_of![2, 3]);

        a.delete(&2).unwrap();
        assert_eq!(i.contents(), set_of![3]);

        b.delete(&3).unwrap();
        assert!(i.contents().is_empty());

        // one delta per source mutation
        assert_eq!(
            *deltas.borrow(),
            vec![
                SetDelta::removed(set_of![2]),
                SetDelta::removed(set_of![3]),
            ]
        );
    }

    #[test]
    fn add_reaching_full_count_enters_result() {
        let a = set(set_of![1]);
        let b = set(set_of![2]);
        let i = intersection(vec![a.clone(), b.clone()]).unwrap();
        assert!(i.contents().is_empty());

        a.add(2).unwrap();
        assert_eq!(i.contents(), set_of![2]);

        b.add(1).unwrap();
        assert_eq!(i.contents(), set_of![1, 2]);
    }

    #[test]
    fn mounting_a_narrower_source_trims_the_result() {
        let a = set(set_of![1, 2, 3]);
        let b = set(set_of![1, 2]);
        let i = intersection(vec![a.clone()]).unwrap();
        assert_eq!(i.contents(), set_of![1, 2, 3]);

        i.add_source(b).unwrap();
        assert_eq!(i.contents(), set_of![1, 2]);
    }

    #[test]
    fn unmounting_a_source_restores_eligible_values() {
        let a = set(set_of![1, 2]);
        let b = set(set_of![2]);
        let i = intersection(vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(i.contents(), set_of![2]);

        assert!(i.remove_source(&b));
        assert_eq!(i.contents(), set_of![1, 2]);

        assert!(i.remove_source(&a));
        assert!(i.contents().is_empty());
    }

    #[test]
    fn toggling_matches_never_toggled() {
        let a = set(set_of![1, 2, 3]);
        let b = set(set_of![2, 3]);
        let i = intersection(vec![a.clone(), b.clone()]).unwrap();

        i.disable();
        a.delete(&2).unwrap();
        i.enable();

        let fresh = intersection(vec![a, b]).unwrap();
        assert_eq!(i.contents(), fresh.contents());
    }

    #[test]
    fn intersection_of_n_sources() {
        let a = set(set_of![1, 2, 3, 4]);
        let b = set(set_of![2, 3, 4]);
        let c = set(set_of![3, 4, 5]);
        let i = intersection(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(i.contents(), set_of![3, 4]);

        c.delete(&4).unwrap();
        assert_eq!(i.contents(), set_of![3]);

        a.add(5).unwrap();
        b.add(5).unwrap();
        assert_eq!(i.contents(), set_of![3, 5]);
    }
}
