// ============================================================================
// delta-sets - Union
// Derived collection holding every value present in at least one source
// ============================================================================

use std::collections::HashSet;
use std::hash::Hash;
use std::rc::Rc;

use crate::combine::variadic::{VariadicInner, VariadicMode, VariadicOptions};
use crate::containers::ReactiveSet;
use crate::core::error::Result;
use crate::transport::Signal;

/// A readonly derived collection: `contents = ⋃ sources.contents`.
///
/// A value enters the result when its occurrence count rises from zero and
/// leaves when it falls back to zero.
///
/// # Example
///
/// ```
/// use delta_sets::{set, set_of, union};
///
/// let a = set(set_of![1, 2]);
/// let b = set(set_of![2, 3]);
/// let u = union(vec![a.clone(), b.clone()]).unwrap();
/// assert_eq!(u.contents(), set_of![1, 2, 3]);
///
/// a.delete(&2).unwrap();
/// assert_eq!(u.contents(), set_of![1, 2, 3]);
/// b.delete(&2).unwrap();
/// assert_eq!(u.contents(), set_of![1, 3]);
/// ```
pub struct UnionSet<T: Eq + Hash + Clone + 'static> {
    inner: Rc<VariadicInner<T>>,
}

impl<T: Eq + Hash + Clone + 'static> Clone for UnionSet<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Eq + Hash + Clone + 'static> UnionSet<T> {
    pub fn new(subsets: Vec<ReactiveSet<T>>) -> Result<Self> {
        Self::with_options(VariadicOptions::new(subsets))
    }

    pub fn with_options(options: VariadicOptions<T>) -> Result<Self> {
        VariadicInner::build(
            VariadicMode::Union,
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

/// Create a union over the given sources.
pub fn union<T: Eq + Hash + Clone + 'static>(
    subsets: Vec<ReactiveSet<T>>,
) -> Result<UnionSet<T>> {
    UnionSet::new(subsets)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ReactiveError;
    use crate::{set, set_of};

    #[test]
    fn contents_track_every_source() {
        let a = set(set_of![1, 2]);
        let b = set(set_of![2, 3]);
        let u = union(vec![a.clone(), b.clone()]).unwrap();

        assert_eq!(u.contents(), set_of![1, 2, 3]);

        a.add(4).unwrap();
        assert_eq!(u.contents(), set_of![1, 2, 3, 4]);

        // still present in b
        a.delete(&2).unwrap();
        assert_eq!(u.contents(), set_of![1, 2, 3, 4]);

        b.delete(&2).unwrap();
        assert_eq!(u.contents(), set_of![1, 3, 4]);
    }

    #[test]
    fn result_is_readonly() {
        let a = set(set_of![1]);
        let u = union(vec![a]).unwrap();
        assert_eq!(u.result().add(9), Err(ReactiveError::ReadonlyAccess));
    }

    #[test]
    fn duplicate_source_is_rejected() {
        let a = set(set_of![1]);
        assert!(matches!(
            union(vec![a.clone(), a.clone()]),
            Err(ReactiveError::DuplicateSource)
        ));

        let u = union(vec![a.clone()]).unwrap();
        assert_eq!(u.add_source(a), Err(ReactiveError::DuplicateSource));
    }

    #[test]
    fn shared_values_survive_single_source_removal() {
        let a = set(set_of![1, 2]);
        let b = set(set_of![2]);
        let u = union(vec![a.clone(), b.clone()]).unwrap();

        assert!(u.remove_source(&b));
        assert_eq!(u.contents(), set_of![1, 2]);
        assert!(!u.remove_source(&b));

        u.add_source(set(set_of![5])).unwrap();
        assert_eq!(u.contents(), set_of![1, 2, 5]);
    }

    #[test]
    fn disable_clears_and_enable_rebuilds() {
        let a = set(set_of![1]);
        let b = set(set_of![2]);
        let u = union(vec![a.clone(), b.clone()]).unwrap();

        u.disable();
        assert!(!u.is_enabled());
        assert!(u.contents().is_empty());

        // mutations while disabled are picked up by the rebuild
        a.add(3).unwrap();
        u.enable();
        assert_eq!(u.contents(), set_of![1, 2, 3]);
    }

    #[test]
    fn leaf_reactivity_toggle_excludes_and_restores() {
        let a = set(set_of![1, 2]);
        let b = set(set_of![2, 3]);
        let u = union(vec![a.clone(), b.clone()]).unwrap();

        // disabling a leaf clears its storage, so its lone values drop out
        a.disable_reactivity().unwrap();
        assert_eq!(u.contents(), set_of![2, 3]);

        a.enable_reactivity().unwrap();
        a.add(7).unwrap();
        assert_eq!(u.contents(), set_of![2, 3, 7]);
    }

    #[test]
    fn created_disabled_stays_empty_until_enabled() {
        let a = set(set_of![1]);
        let mut options = VariadicOptions::new(vec![a.clone()]);
        options.enabled = false;
        let u = UnionSet::with_options(options).unwrap();

        assert!(!u.is_enabled());
        assert!(u.contents().is_empty());

        u.enable();
        assert_eq!(u.contents(), set_of![1]);
    }

    #[test]
    fn one_delta_per_source_mutation() {
        let a = set(set_of![1]);
        let u = union(vec![a.clone()]).unwrap();

        let count = Rc::new(std::cell::Cell::new(0));
        let c = count.clone();
        let _sub = u
            .result()
            .on_change()
            .subscribe(move |_: &crate::SetDelta<i32>| c.set(c.get() + 1));

        a.add(2).unwrap();
        a.delete(&1).unwrap();
        a.batch_add([3, 4]).unwrap();
        assert_eq!(count.get(), 3);
    }
}
