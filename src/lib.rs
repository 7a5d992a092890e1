// ============================================================================
// delta-sets - Incremental Reactive Set Computation
// ============================================================================
//
// A DAG of reactive nodes whose values are either a single element (a cell)
// or an unordered collection of unique elements. Leaves are mutated
// directly; derived nodes recompute incrementally from the deltas of their
// dependencies. At steady state every derived node equals the pure function
// of its sources, and only added/removed elements ever flow through the
// graph.
//
// Layers, leaves first:
// - core:       change payloads, structural equality, errors
// - transport:  typed broadcast with cancellable subscriptions
// - containers: reactive cell and collection leaves
// - combine:    lifecycle cascade + union/intersection/difference
// - project:    delta buffers, the async projection engine, concrete
//               projections
// ============================================================================

pub mod combine;
pub mod containers;
pub mod core;
mod macros;
pub mod project;
pub mod transport;

// Re-export the working surface at the crate root
pub use combine::{
    difference, intersection, union, CombinationNode, DifferenceOptions, DifferenceSet,
    IntersectionSet, UnionSet, VariadicOptions,
};
pub use containers::{cell, set, CellOptions, ReactiveCell, ReactiveSet, SetOptions};
pub use core::changes::{
    CellChange, CellDelta, CellOverwrite, MapDelta, SetChange, SetDelta, SetOverwrite, ValueBox,
};
pub use core::equality::{always_equals, by_field, deep_equals, never_equals, EqualsFn};
pub use core::error::{ReactiveError, Result};
pub use project::{
    complement_via_cell, complement_via_collection, mapped_set, subset_via_cell,
    subset_via_collection, BoxError, CellDeltaBuffer, CellProjection, CommittedState,
    DeltaMapper, DependencyDelta, DependencySource, EngineOptions, KeyProjection,
    MappedSetOptions, ProjectViaCellOptions, ProjectViaSetOptions, ProjectionEngine, Resolver,
    ResolverContext, ResolverFuture, SetDeltaBuffer,
};
pub use transport::{CancelToken, Signal, SignalController, SignalHandler, Subscription};

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn leaves_emit_deltas() {
        let numbers = set(set_of![1, 2]);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        let _sub = numbers
            .on_change()
            .subscribe(move |delta: &SetDelta<i32>| log.borrow_mut().push(delta.clone()));

        numbers.add(3).unwrap();
        assert_eq!(*seen.borrow(), vec![SetDelta::added(set_of![3])]);

        let mode = cell("a");
        mode.set("b").unwrap();
        assert_eq!(mode.value(), "b");
    }

    #[test]
    fn combinators_compose_through_result_handles() {
        let a = set(set_of![1, 2, 3]);
        let b = set(set_of![2, 3, 4]);
        let c = set(set_of![3, 4, 5]);

        let i = intersection(vec![a.clone(), b.clone()]).unwrap();
        let u = union(vec![i.result(), c.clone()]).unwrap();

        assert_eq!(u.contents(), set_of![2, 3, 4, 5]);

        a.delete(&2).unwrap();
        assert_eq!(u.contents(), set_of![3, 4, 5]);
    }

    #[test]
    fn difference_over_a_derived_superset() {
        let a = set(set_of![1, 2, 3]);
        let b = set(set_of![2, 3, 4]);
        let x = set(set_of![3]);

        let u = union(vec![a.clone(), b.clone()]).unwrap();
        let d = difference(u.result(), vec![x.clone()]).unwrap();

        assert_eq!(d.contents(), set_of![1, 2, 4]);

        // cascade: disabling the union gates the difference
        u.disable();
        assert!(!d.is_enabled());
        assert!(d.contents().is_empty());

        u.enable();
        assert!(d.is_enabled());
        assert_eq!(d.contents(), set_of![1, 2, 4]);
    }

    #[test]
    fn errors_are_typed() {
        let a = set(set_of![1]);
        let u = union(vec![a.clone()]).unwrap();
        assert_eq!(u.result().add(2), Err(ReactiveError::ReadonlyAccess));

        a.disable_reactivity().unwrap();
        assert_eq!(a.add(2), Err(ReactiveError::ReactivityDisabled));
    }
}
