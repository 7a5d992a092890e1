// ============================================================================
// delta-sets - Variadic Combinator
// Shared occurrence-count engine behind union, intersection, and difference
// ============================================================================
//
// The combinator keeps three structures: the registered sources, the subset
// of sources currently *included* in the calculation (reactive sources only),
// and an occurrence-count map recording how many included sources contain
// each value. The per-mode predicate derives the result set from that map.
//
// Each source record keeps a shadow of the source's last observed contents.
// A leaf clears its storage before emitting its reactivity switch, so
// unmount-time decrements must come from the shadow, not the source.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::rc::{Rc, Weak};

use crate::combine::lifecycle::{parents_enabled, CombinationNode, LifecycleCore};
use crate::containers::{ReactiveSet, SetOptions};
use crate::core::changes::SetDelta;
use crate::core::error::{ReactiveError, Result};
use crate::transport::{Signal, Subscription};

// =============================================================================
// OPTIONS
// =============================================================================

/// Constructor configuration shared by union and intersection.
pub struct VariadicOptions<T: Eq + Hash> {
    pub subsets: Vec<ReactiveSet<T>>,
    pub label: Option<String>,
    pub enabled: bool,
}

impl<T: Eq + Hash> VariadicOptions<T> {
    pub fn new(subsets: Vec<ReactiveSet<T>>) -> Self {
        Self {
            subsets,
            label: None,
            enabled: true,
        }
    }
}

/// Constructor configuration for difference: a distinguished superset plus
/// the excluded sets.
pub struct DifferenceOptions<T: Eq + Hash> {
    pub superset: ReactiveSet<T>,
    pub excluded: Vec<ReactiveSet<T>>,
    pub label: Option<String>,
    pub enabled: bool,
}

impl<T: Eq + Hash> DifferenceOptions<T> {
    pub fn new(superset: ReactiveSet<T>, excluded: Vec<ReactiveSet<T>>) -> Self {
        Self {
            superset,
            excluded,
            label: None,
            enabled: true,
        }
    }
}

// =============================================================================
// ENGINE
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum VariadicMode {
    Union,
    Intersection,
    Difference,
}

pub(crate) struct SourceRecord<T: Eq + Hash> {
    set: ReactiveSet<T>,
    included: Cell<bool>,
    shadow: RefCell<HashSet<T>>,
    change_sub: RefCell<Option<Subscription>>,
    switch_sub: RefCell<Option<Subscription>>,
    parent: RefCell<Option<Weak<dyn CombinationNode>>>,
    parent_watch: RefCell<Option<Subscription>>,
}

impl<T: Eq + Hash> SourceRecord<T> {
    fn new(set: ReactiveSet<T>) -> Rc<Self>
    where
        T: Clone + 'static,
    {
        Rc::new(Self {
            set,
            included: Cell::new(false),
            shadow: RefCell::new(HashSet::new()),
            change_sub: RefCell::new(None),
            switch_sub: RefCell::new(None),
            parent: RefCell::new(None),
            parent_watch: RefCell::new(None),
        })
    }
}

pub(crate) struct VariadicInner<T: Eq + Hash> {
    mode: VariadicMode,
    subsets: RefCell<Vec<Rc<SourceRecord<T>>>>,
    superset: Option<Rc<SourceRecord<T>>>,
    occurrences: RefCell<HashMap<T, u32>>,
    result: ReactiveSet<T>,
    lifecycle: LifecycleCore,
    /// Self-reference handed to subscription handlers.
    self_weak: RefCell<Weak<VariadicInner<T>>>,
}

impl<T: Eq + Hash + Clone + 'static> VariadicInner<T> {
    pub(crate) fn build(
        mode: VariadicMode,
        subsets: Vec<ReactiveSet<T>>,
        superset: Option<ReactiveSet<T>>,
        label: Option<String>,
        enabled: bool,
    ) -> Result<Rc<Self>> {
        for (i, a) in subsets.iter().enumerate() {
            if subsets.iter().skip(i + 1).any(|b| a.ptr_eq(b)) {
                return Err(ReactiveError::DuplicateSource);
            }
        }
        if let Some(sup) = &superset {
            if subsets.iter().any(|s| s.ptr_eq(sup)) {
                tracing::warn!(
                    label = label.as_deref(),
                    "superset is listed among its own excluded sets"
                );
            }
        }

        let result = ReactiveSet::with_options(SetOptions {
            values: HashSet::new(),
            label: label.clone(),
        });
        result.mark_readonly();

        let inner = Rc::new(Self {
            mode,
            subsets: RefCell::new(subsets.into_iter().map(SourceRecord::new).collect()),
            superset: superset.map(SourceRecord::new),
            occurrences: RefCell::new(HashMap::new()),
            result,
            lifecycle: LifecycleCore::new(label),
            self_weak: RefCell::new(Weak::new()),
        });
        *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
        inner
            .result
            .set_combination(Rc::downgrade(&inner) as Weak<dyn CombinationNode>);

        for record in inner.all_records() {
            inner.wire_parent(&record);
        }
        inner.lifecycle.set_local(enabled);
        inner.refresh();
        Ok(inner)
    }

    // =========================================================================
    // PUBLIC SURFACE (behind the per-mode wrappers)
    // =========================================================================

    pub(crate) fn result_handle(&self) -> ReactiveSet<T> {
        self.result.clone()
    }

    pub(crate) fn contents(&self) -> HashSet<T> {
        self.result.values()
    }

    pub(crate) fn label(&self) -> Option<&str> {
        self.lifecycle.label()
    }

    pub(crate) fn lifecycle_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub(crate) fn switch_handle(&self) -> Signal<bool> {
        self.lifecycle.switch_signal()
    }

    pub(crate) fn enable(&self) {
        self.lifecycle.set_local(true);
        self.refresh();
    }

    pub(crate) fn disable(&self) {
        self.lifecycle.set_local(false);
        self.refresh();
    }

    /// Register another subset source. Fails when the source is already
    /// registered; registering the superset as excluded warns but proceeds.
    pub(crate) fn add_source(&self, source: ReactiveSet<T>) -> Result<()> {
        if self.subsets.borrow().iter().any(|r| r.set.ptr_eq(&source)) {
            return Err(ReactiveError::DuplicateSource);
        }
        if let Some(sup) = &self.superset {
            if sup.set.ptr_eq(&source) {
                tracing::warn!(
                    label = self.lifecycle.label(),
                    "superset is listed among its own excluded sets"
                );
            }
        }

        let record = SourceRecord::new(source);
        self.wire_parent(&record);
        self.subsets.borrow_mut().push(record.clone());

        // A new parent may gate this combination off before anything mounts.
        self.refresh();
        if self.lifecycle.is_active() {
            self.mount_live(&record);
        }
        Ok(())
    }

    /// Drop a registered subset source. Returns whether it was registered.
    pub(crate) fn remove_source(&self, source: &ReactiveSet<T>) -> bool {
        let position = self
            .subsets
            .borrow()
            .iter()
            .position(|r| r.set.ptr_eq(source));
        let Some(position) = position else {
            return false;
        };

        let record = self.subsets.borrow_mut().remove(position);
        if self.lifecycle.is_active() {
            self.exclude_live(&record);
        }
        *record.switch_sub.borrow_mut() = None;
        *record.parent_watch.borrow_mut() = None;

        // Removing a disabled parent may re-enable this combination.
        self.refresh();
        true
    }

    // =========================================================================
    // CASCADE
    // =========================================================================

    pub(crate) fn refresh(&self) {
        self.lifecycle.refresh(
            self.parents_ok(),
            || self.on_activated(),
            || self.on_deactivated(),
        );
    }

    fn parents_ok(&self) -> bool {
        let parents: Vec<Weak<dyn CombinationNode>> = self
            .all_records()
            .iter()
            .filter_map(|record| record.parent.borrow().clone())
            .collect();
        parents_enabled(parents.iter())
    }

    fn wire_parent(&self, record: &Rc<SourceRecord<T>>) {
        let Some(node) = record.set.combination() else {
            return;
        };
        *record.parent.borrow_mut() = Some(Rc::downgrade(&node));

        let weak = self.self_weak.borrow().clone();
        let watch = node.switch_signal().subscribe(move |_: &bool| {
            if let Some(inner) = weak.upgrade() {
                inner.refresh();
            }
        });
        *record.parent_watch.borrow_mut() = Some(watch);
    }

    // =========================================================================
    // ACTIVATION
    // =========================================================================

    fn on_activated(&self) {
        for record in self.all_records() {
            self.watch_switch(&record);
            if record.set.is_reactive() {
                self.attach(&record);
            }
        }
        self.rebuild_result();
    }

    fn on_deactivated(&self) {
        self.result.cancel_transaction_internal();
        self.result.clear_internal();
        for record in self.all_records() {
            *record.change_sub.borrow_mut() = None;
            *record.switch_sub.borrow_mut() = None;
            record.included.set(false);
            record.shadow.borrow_mut().clear();
        }
        self.occurrences.borrow_mut().clear();
    }

    fn watch_switch(&self, record: &Rc<SourceRecord<T>>) {
        let weak_self = self.self_weak.borrow().clone();
        let weak_record = Rc::downgrade(record);
        let sub = record.set.on_switch().subscribe(move |on: &bool| {
            if let (Some(inner), Some(record)) = (weak_self.upgrade(), weak_record.upgrade()) {
                if *on {
                    inner.include_live(&record);
                } else {
                    inner.exclude_live(&record);
                }
            }
        });
        *record.switch_sub.borrow_mut() = Some(sub);
    }

    /// Include a source without emissions; activation rebuilds wholesale.
    fn attach(&self, record: &Rc<SourceRecord<T>>) {
        record.included.set(true);
        let snapshot = record.set.values();
        if !self.is_superset(record) {
            let mut occ = self.occurrences.borrow_mut();
            for value in &snapshot {
                occ_increment(&mut occ, value);
            }
        }
        *record.shadow.borrow_mut() = snapshot;
        self.watch_changes(record);
    }

    fn watch_changes(&self, record: &Rc<SourceRecord<T>>) {
        let weak_self = self.self_weak.borrow().clone();
        let weak_record = Rc::downgrade(record);
        let sub = record.set.on_change().subscribe(move |delta: &SetDelta<T>| {
            if let (Some(inner), Some(record)) = (weak_self.upgrade(), weak_record.upgrade()) {
                inner.on_source_delta(&record, delta);
            }
        });
        *record.change_sub.borrow_mut() = Some(sub);
    }

    fn rebuild_result(&self) {
        let contents: HashSet<T> = match self.mode {
            VariadicMode::Union => self.occurrences.borrow().keys().cloned().collect(),
            VariadicMode::Intersection => {
                let included = self.included_subset_count();
                if included == 0 {
                    HashSet::new()
                } else {
                    self.occurrences
                        .borrow()
                        .iter()
                        .filter(|(_, count)| **count == included)
                        .map(|(value, _)| value.clone())
                        .collect()
                }
            }
            VariadicMode::Difference => match &self.superset {
                Some(sup) if sup.included.get() => {
                    let occ = self.occurrences.borrow();
                    sup.shadow
                        .borrow()
                        .iter()
                        .filter(|v| !occ.contains_key(*v))
                        .cloned()
                        .collect()
                }
                _ => HashSet::new(),
            },
        };
        self.result.overwrite_internal(contents);
    }

    // =========================================================================
    // LIVE MOUNT / UNMOUNT
    // =========================================================================

    fn mount_live(&self, record: &Rc<SourceRecord<T>>) {
        self.watch_switch(record);
        if record.set.is_reactive() {
            self.include_live(record);
        }
    }

    fn include_live(&self, record: &Rc<SourceRecord<T>>) {
        if record.included.get() || !self.lifecycle.is_active() {
            return;
        }

        let snapshot = record.set.values();
        match self.mode {
            VariadicMode::Union => {
                let mut entering = HashSet::new();
                {
                    let mut occ = self.occurrences.borrow_mut();
                    for value in &snapshot {
                        if occ_increment(&mut occ, value) == 1 {
                            entering.insert(value.clone());
                        }
                    }
                }
                self.finish_include(record, snapshot);
                self.result.apply_delta_internal(&SetDelta::added(entering));
            }
            VariadicMode::Intersection => {
                let previously_included = self.included_subset_count();
                {
                    let mut occ = self.occurrences.borrow_mut();
                    for value in &snapshot {
                        occ_increment(&mut occ, value);
                    }
                }
                if previously_included == 0 {
                    self.finish_include(record, snapshot.clone());
                    self.result.overwrite_internal(snapshot);
                } else {
                    let stale: HashSet<T> = self
                        .result
                        .values()
                        .into_iter()
                        .filter(|v| !snapshot.contains(v))
                        .collect();
                    self.finish_include(record, snapshot);
                    self.result.apply_delta_internal(&SetDelta::removed(stale));
                }
            }
            VariadicMode::Difference => {
                if self.is_superset(record) {
                    let contents: HashSet<T> = {
                        let occ = self.occurrences.borrow();
                        snapshot
                            .iter()
                            .filter(|v| !occ.contains_key(*v))
                            .cloned()
                            .collect()
                    };
                    self.finish_include(record, snapshot);
                    self.result.overwrite_internal(contents);
                } else {
                    let mut leaving = HashSet::new();
                    {
                        let mut occ = self.occurrences.borrow_mut();
                        for value in &snapshot {
                            if occ_increment(&mut occ, value) == 1 {
                                leaving.insert(value.clone());
                            }
                        }
                    }
                    self.finish_include(record, snapshot);
                    self.result
                        .apply_delta_internal(&SetDelta::removed(leaving));
                }
            }
        }
    }

    fn finish_include(&self, record: &Rc<SourceRecord<T>>, shadow: HashSet<T>) {
        record.included.set(true);
        *record.shadow.borrow_mut() = shadow;
        self.watch_changes(record);
    }

    fn exclude_live(&self, record: &Rc<SourceRecord<T>>) {
        if !record.included.get() {
            return;
        }
        record.included.set(false);
        *record.change_sub.borrow_mut() = None;
        let shadow = std::mem::take(&mut *record.shadow.borrow_mut());

        match self.mode {
            VariadicMode::Union => {
                let mut leaving = HashSet::new();
                {
                    let mut occ = self.occurrences.borrow_mut();
                    for value in &shadow {
                        if occ_decrement(&mut occ, value) == 0 {
                            leaving.insert(value.clone());
                        }
                    }
                }
                self.result
                    .apply_delta_internal(&SetDelta::removed(leaving));
            }
            VariadicMode::Intersection => {
                {
                    let mut occ = self.occurrences.borrow_mut();
                    for value in &shadow {
                        occ_decrement(&mut occ, value);
                    }
                }
                let included = self.included_subset_count();
                if included == 0 {
                    self.result.overwrite_internal(HashSet::new());
                } else {
                    let entering: HashSet<T> = {
                        let occ = self.occurrences.borrow();
                        occ.iter()
                            .filter(|(value, count)| {
                                **count == included && !self.result.contains(*value)
                            })
                            .map(|(value, _)| value.clone())
                            .collect()
                    };
                    self.result.apply_delta_internal(&SetDelta::added(entering));
                }
            }
            VariadicMode::Difference => {
                if self.is_superset(record) {
                    self.result.overwrite_internal(HashSet::new());
                } else {
                    let mut restored = HashSet::new();
                    {
                        let superset_shadow = self
                            .superset
                            .as_ref()
                            .map(|sup| sup.shadow.borrow().clone())
                            .unwrap_or_default();
                        let mut occ = self.occurrences.borrow_mut();
                        for value in &shadow {
                            if occ_decrement(&mut occ, value) == 0
                                && superset_shadow.contains(value)
                            {
                                restored.insert(value.clone());
                            }
                        }
                    }
                    self.result
                        .apply_delta_internal(&SetDelta::added(restored));
                }
            }
        }
    }

    // =========================================================================
    // SOURCE DELTAS
    // =========================================================================

    fn on_source_delta(&self, record: &Rc<SourceRecord<T>>, delta: &SetDelta<T>) {
        let incr = delta.increment_or_empty();
        let decr = delta.decrement_or_empty();

        let mut entering = HashSet::new();
        let mut leaving = HashSet::new();

        match self.mode {
            VariadicMode::Union => {
                let mut shadow = record.shadow.borrow_mut();
                let mut occ = self.occurrences.borrow_mut();
                for value in incr {
                    shadow.insert(value.clone());
                    if occ_increment(&mut occ, &value) == 1 {
                        entering.insert(value);
                    }
                }
                for value in decr {
                    shadow.remove(&value);
                    if occ_decrement(&mut occ, &value) == 0 {
                        leaving.insert(value);
                    }
                }
            }
            VariadicMode::Intersection => {
                let included = self.included_subset_count();
                let mut shadow = record.shadow.borrow_mut();
                let mut occ = self.occurrences.borrow_mut();
                for value in incr {
                    shadow.insert(value.clone());
                    if occ_increment(&mut occ, &value) == included {
                        entering.insert(value);
                    }
                }
                for value in decr {
                    shadow.remove(&value);
                    occ_decrement(&mut occ, &value);
                    if self.result.contains(&value) {
                        leaving.insert(value);
                    }
                }
            }
            VariadicMode::Difference if self.is_superset(record) => {
                let occ = self.occurrences.borrow();
                let mut shadow = record.shadow.borrow_mut();
                for value in incr {
                    shadow.insert(value.clone());
                    if !occ.contains_key(&value) {
                        entering.insert(value);
                    }
                }
                for value in decr {
                    shadow.remove(&value);
                    leaving.insert(value);
                }
            }
            VariadicMode::Difference => {
                let in_superset = self
                    .superset
                    .as_ref()
                    .map(|sup| sup.shadow.borrow().clone())
                    .unwrap_or_default();
                let mut shadow = record.shadow.borrow_mut();
                let mut occ = self.occurrences.borrow_mut();
                for value in incr {
                    shadow.insert(value.clone());
                    if occ_increment(&mut occ, &value) == 1 {
                        leaving.insert(value);
                    }
                }
                for value in decr {
                    shadow.remove(&value);
                    if occ_decrement(&mut occ, &value) == 0 && in_superset.contains(&value) {
                        entering.insert(value);
                    }
                }
            }
        }

        self.result
            .apply_delta_internal(&SetDelta::from_parts(entering, leaving));
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn all_records(&self) -> Vec<Rc<SourceRecord<T>>> {
        let mut records: Vec<Rc<SourceRecord<T>>> = self.subsets.borrow().clone();
        if let Some(sup) = &self.superset {
            records.push(sup.clone());
        }
        records
    }

    fn is_superset(&self, record: &Rc<SourceRecord<T>>) -> bool {
        self.superset
            .as_ref()
            .is_some_and(|sup| Rc::ptr_eq(sup, record))
    }

    fn included_subset_count(&self) -> u32 {
        self.subsets
            .borrow()
            .iter()
            .filter(|r| r.included.get())
            .count() as u32
    }
}

impl<T: Eq + Hash + Clone + 'static> CombinationNode for VariadicInner<T> {
    fn is_enabled(&self) -> bool {
        self.lifecycle.is_active()
    }

    fn switch_signal(&self) -> Signal<bool> {
        self.lifecycle.switch_signal()
    }
}

// =============================================================================
// OCCURRENCE MAP
// =============================================================================

fn occ_increment<T: Eq + Hash + Clone>(occ: &mut HashMap<T, u32>, value: &T) -> u32 {
    let count = occ.entry(value.clone()).or_insert(0);
    *count += 1;
    *count
}

/// Decrement, dropping the entry at zero. Underflow is a contract violation.
fn occ_decrement<T: Eq + Hash + Clone>(occ: &mut HashMap<T, u32>, value: &T) -> u32 {
    match occ.get_mut(value) {
        Some(count) if *count > 0 => {
            *count -= 1;
            let remaining = *count;
            if remaining == 0 {
                occ.remove(value);
            }
            remaining
        }
        _ => panic!("occurrence count underflow: value decremented below zero"),
    }
}

// =============================================================================
// TESTS
// =============================================================================
