// ============================================================================
// delta-sets - Combination Lifecycle
// Enabled/disabled state machine with parent-gated cascade
// ============================================================================

use std::cell::Cell;
use std::rc::Weak;

use crate::transport::{Signal, SignalController};

// =============================================================================
// COMBINATION SEAM
// =============================================================================

/// The face a derived node shows to its children.
///
/// A child combination is effectively enabled only while every parent
/// reachable through its dependencies reports `is_enabled()`. Children keep
/// weak handles and subscribe to `switch_signal()` for the lifetime of the
/// child node, across its own disabled periods.
pub trait CombinationNode {
    /// Effective state: the local flag conjoined with all parents' state.
    fn is_enabled(&self) -> bool;

    /// Emits the new effective state on every transition.
    fn switch_signal(&self) -> Signal<bool>;
}

/// True when every still-living parent is enabled. A parent whose node has
/// been dropped counts as enabled: its frozen result remains a readable
/// source.
pub(crate) fn parents_enabled<'a>(
    parents: impl Iterator<Item = &'a Weak<dyn CombinationNode>>,
) -> bool {
    parents.filter_map(Weak::upgrade).all(|p| p.is_enabled())
}

// =============================================================================
// LIFECYCLE CORE
// =============================================================================

/// Shared lifecycle state embedded in every combination.
///
/// `refresh` is the single transition point. Activation runs the rebuild hook
/// before emitting `switch(true)` so children remount against rebuilt
/// contents; deactivation emits `switch(false)` first so children detach
/// before the teardown hook clears the result.
pub(crate) struct LifecycleCore {
    local_enabled: Cell<bool>,
    active: Cell<bool>,
    switches: SignalController<bool>,
    label: Option<String>,
}

impl LifecycleCore {
    pub fn new(label: Option<String>) -> Self {
        Self {
            local_enabled: Cell::new(true),
            active: Cell::new(false),
            switches: SignalController::new(),
            label,
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn set_local(&self, enabled: bool) {
        self.local_enabled.set(enabled);
    }

    pub fn switch_signal(&self) -> Signal<bool> {
        self.switches.signal()
    }

    /// Recompute the effective state and run the matching hook on a
    /// transition. Redundant refreshes are no-ops.
    pub fn refresh(&self, parents_ok: bool, activate: impl FnOnce(), deactivate: impl FnOnce()) {
        let want = self.local_enabled.get() && parents_ok;
        if want == self.active.get() {
            return;
        }

        if want {
            self.active.set(true);
            activate();
            tracing::debug!(label = self.label.as_deref(), "combination enabled");
            self.switches.activate(&true);
        } else {
            self.active.set(false);
            tracing::debug!(label = self.label.as_deref(), "combination disabled");
            self.switches.activate(&false);
            deactivate();
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn refresh_runs_hooks_in_transition_order() {
        let core = LifecycleCore::new(None);
        let trace = Rc::new(RefCell::new(Vec::new()));

        let t = trace.clone();
        let _sub = core
            .switch_signal()
            .subscribe(move |on: &bool| t.borrow_mut().push(format!("switch:{on}")));

        assert!(!core.is_active());

        let t = trace.clone();
        core.refresh(
            true,
            || t.borrow_mut().push("activate".into()),
            || unreachable!("no deactivation expected"),
        );
        assert!(core.is_active());

        let t = trace.clone();
        core.refresh(
            false,
            || unreachable!("no activation expected"),
            || t.borrow_mut().push("deactivate".into()),
        );

        assert_eq!(
            *trace.borrow(),
            vec!["activate", "switch:true", "switch:false", "deactivate"]
        );
    }

    #[test]
    fn redundant_refresh_is_a_noop() {
        let core = LifecycleCore::new(None);
        core.refresh(true, || {}, || unreachable!());
        core.refresh(true, || unreachable!("already active"), || unreachable!());
        assert!(core.is_active());
    }

    #[test]
    fn local_flag_gates_activation() {
        let core = LifecycleCore::new(None);
        core.set_local(false);
        core.refresh(true, || unreachable!("locally disabled"), || {});
        assert!(!core.is_active());
    }

    #[test]
    fn dead_parent_counts_as_enabled() {
        struct Dummy;
        impl CombinationNode for Dummy {
            fn is_enabled(&self) -> bool {
                false
            }
            fn switch_signal(&self) -> Signal<bool> {
                unreachable!()
            }
        }

        let dead: Weak<dyn CombinationNode> = Weak::<Dummy>::new();
        let parents = vec![dead];
        assert!(parents_enabled(parents.iter()));
    }
}
