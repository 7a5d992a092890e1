// ============================================================================
// delta-sets - Concrete Projections
// Thin configurations over the projection engine
// ============================================================================

use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::rc::Rc;

use futures::executor::LocalSpawner;

use crate::containers::{ReactiveCell, ReactiveSet};
use crate::core::changes::{SetChange, SetDelta};
use crate::core::error::Result;
use crate::project::engine::{
    DependencyDelta, DependencySource, EngineOptions, ProjectionEngine, Resolver,
};

// =============================================================================
// PROJECTION FUNCTION SHAPES
// =============================================================================

/// Project candidate elements through a relation value: which candidates
/// belong to the projection under this relation?
pub type CellProjection<V, S> = Rc<dyn Fn(&V, &HashSet<S>) -> HashSet<S>>;

/// Project candidate elements through relation keys.
pub type KeyProjection<K, S> = Rc<dyn Fn(&HashSet<K>, &HashSet<S>) -> HashSet<S>>;

/// Transform a source delta directly into the output's change, no context.
pub type DeltaMapper<S, R> = Rc<dyn Fn(&SetDelta<S>) -> SetChange<R>>;

// =============================================================================
// OPTIONS
// =============================================================================

/// Configuration for the subset/complement projections whose relation is a
/// cell.
pub struct ProjectViaCellOptions<S: Eq + Hash, V> {
    pub superset: ReactiveSet<S>,
    pub relation: ReactiveCell<V>,
    pub project: CellProjection<V, S>,
    pub spawner: LocalSpawner,
    pub label: Option<String>,
    pub enabled: bool,
}

/// Configuration for the subset/complement projections whose relation is a
/// collection of keys.
pub struct ProjectViaSetOptions<S: Eq + Hash, K: Eq + Hash> {
    pub superset: ReactiveSet<S>,
    pub relation: ReactiveSet<K>,
    pub project: KeyProjection<K, S>,
    pub spawner: LocalSpawner,
    pub label: Option<String>,
    pub enabled: bool,
}

/// Configuration for a mapped set.
pub struct MappedSetOptions<S: Eq + Hash, R: Eq + Hash> {
    pub source: ReactiveSet<S>,
    pub map: DeltaMapper<S, R>,
    pub spawner: LocalSpawner,
    pub label: Option<String>,
    pub enabled: bool,
}

const SUPERSET: &str = "superset";
const RELATION: &str = "relation";
const SOURCE: &str = "source";

// =============================================================================
// SUBSET / COMPLEMENT VIA CELL
// =============================================================================

/// Result = the projection of the superset under the relation cell.
///
/// Superset deltas re-project only the added elements through the relation's
/// committed value, keyed against the removed elements; a relation change
/// overwrites the result with a full re-projection of the committed superset.
pub fn subset_via_cell<S, V>(
    options: ProjectViaCellOptions<S, V>,
) -> Result<ProjectionEngine<S, S, V, S>>
where
    S: Eq + Hash + Clone + 'static,
    V: PartialEq + Clone + 'static,
{
    let mut resolvers: HashMap<String, Resolver<S, S, V, S>> = HashMap::new();

    let project = options.project.clone();
    resolvers.insert(
        SUPERSET.into(),
        Rc::new(move |context, delta| {
            let DependencyDelta::Set(delta) = delta else {
                return Box::pin(async { Ok(SetChange::delta(HashSet::new(), HashSet::new())) });
            };
            let added = delta.increment_or_empty();
            let removed = delta.decrement_or_empty();
            let projected = match context.cell_state(RELATION) {
                Some(relation) => project(relation, &added),
                None => HashSet::new(),
            };
            Box::pin(async move { Ok(SetChange::delta(projected, removed)) })
        }),
    );

    let project = options.project;
    resolvers.insert(
        RELATION.into(),
        Rc::new(move |context, _delta| {
            let candidates = context.set_state(SUPERSET).cloned().unwrap_or_default();
            let projection = match context.cell_state(RELATION) {
                Some(relation) => project(relation, &candidates),
                None => HashSet::new(),
            };
            Box::pin(async move { Ok(SetChange::overwrite(projection)) })
        }),
    );

    ProjectionEngine::with_options(EngineOptions {
        dependencies: vec![
            (SUPERSET.into(), DependencySource::Set(options.superset)),
            (RELATION.into(), DependencySource::Cell(options.relation)),
        ],
        resolvers,
        spawner: options.spawner,
        label: options.label,
        enabled: options.enabled,
    })
}

/// Result = superset − projection, relation held in a cell.
pub fn complement_via_cell<S, V>(
    options: ProjectViaCellOptions<S, V>,
) -> Result<ProjectionEngine<S, S, V, S>>
where
    S: Eq + Hash + Clone + 'static,
    V: PartialEq + Clone + 'static,
{
    let mut resolvers: HashMap<String, Resolver<S, S, V, S>> = HashMap::new();

    let project = options.project.clone();
    resolvers.insert(
        SUPERSET.into(),
        Rc::new(move |context, delta| {
            let DependencyDelta::Set(delta) = delta else {
                return Box::pin(async { Ok(SetChange::delta(HashSet::new(), HashSet::new())) });
            };
            let added = delta.increment_or_empty();
            let removed = delta.decrement_or_empty();
            let entering = match context.cell_state(RELATION) {
                Some(relation) => {
                    let projected = project(relation, &added);
                    added.difference(&projected).cloned().collect()
                }
                None => added,
            };
            Box::pin(async move { Ok(SetChange::delta(entering, removed)) })
        }),
    );

    let project = options.project;
    resolvers.insert(
        RELATION.into(),
        Rc::new(move |context, _delta| {
            let candidates = context.set_state(SUPERSET).cloned().unwrap_or_default();
            let complement = match context.cell_state(RELATION) {
                Some(relation) => {
                    let projection = project(relation, &candidates);
                    candidates.difference(&projection).cloned().collect()
                }
                None => candidates,
            };
            Box::pin(async move { Ok(SetChange::overwrite(complement)) })
        }),
    );

    ProjectionEngine::with_options(EngineOptions {
        dependencies: vec![
            (SUPERSET.into(), DependencySource::Set(options.superset)),
            (RELATION.into(), DependencySource::Cell(options.relation)),
        ],
        resolvers,
        spawner: options.spawner,
        label: options.label,
        enabled: options.enabled,
    })
}

// =============================================================================
// SUBSET / COMPLEMENT VIA COLLECTION
// =============================================================================

/// Result = the projection of the superset under the relation keys.
///
/// Relation deltas re-project the added/removed keys against the whole
/// committed superset; superset deltas re-project only the added elements
/// against the whole committed relation.
pub fn subset_via_collection<S, K>(
    options: ProjectViaSetOptions<S, K>,
) -> Result<ProjectionEngine<S, K, (), S>>
where
    S: Eq + Hash + Clone + 'static,
    K: Eq + Hash + Clone + 'static,
{
    let mut resolvers: HashMap<String, Resolver<S, K, (), S>> = HashMap::new();

    let project = options.project.clone();
    resolvers.insert(
        SUPERSET.into(),
        Rc::new(move |context, delta| {
            let DependencyDelta::Set(delta) = delta else {
                return Box::pin(async { Ok(SetChange::delta(HashSet::new(), HashSet::new())) });
            };
            let added = delta.increment_or_empty();
            let removed = delta.decrement_or_empty();
            let keys = context.keys_state(RELATION).cloned().unwrap_or_default();
            let projected = project(&keys, &added);
            Box::pin(async move { Ok(SetChange::delta(projected, removed)) })
        }),
    );

    let project = options.project;
    resolvers.insert(
        RELATION.into(),
        Rc::new(move |context, delta| {
            let DependencyDelta::Keys(delta) = delta else {
                return Box::pin(async { Ok(SetChange::delta(HashSet::new(), HashSet::new())) });
            };
            let candidates = context.set_state(SUPERSET).cloned().unwrap_or_default();
            let entering = project(&delta.increment_or_empty(), &candidates);
            let leaving: HashSet<S> = project(&delta.decrement_or_empty(), &candidates)
                .difference(&entering)
                .cloned()
                .collect();
            Box::pin(async move { Ok(SetChange::delta(entering, leaving)) })
        }),
    );

    ProjectionEngine::with_options(EngineOptions {
        dependencies: vec![
            (SUPERSET.into(), DependencySource::Set(options.superset)),
            (RELATION.into(), DependencySource::Keys(options.relation)),
        ],
        resolvers,
        spawner: options.spawner,
        label: options.label,
        enabled: options.enabled,
    })
}

/// Result = superset − projection, relation held in a collection of keys.
///
/// The first relation delta after enable treats the resolved projection as a
/// full initial complement (overwrite); afterwards relation increments are
/// removals from the complement and decrements are additions. The one-shot
/// flag resets on disable.
pub fn complement_via_collection<S, K>(
    options: ProjectViaSetOptions<S, K>,
) -> Result<ProjectionEngine<S, K, (), S>>
where
    S: Eq + Hash + Clone + 'static,
    K: Eq + Hash + Clone + 'static,
{
    let needs_init = Rc::new(Cell::new(true));
    let mut resolvers: HashMap<String, Resolver<S, K, (), S>> = HashMap::new();

    let project = options.project.clone();
    resolvers.insert(
        SUPERSET.into(),
        Rc::new(move |context, delta| {
            let DependencyDelta::Set(delta) = delta else {
                return Box::pin(async { Ok(SetChange::delta(HashSet::new(), HashSet::new())) });
            };
            let added = delta.increment_or_empty();
            let removed = delta.decrement_or_empty();
            let keys = context.keys_state(RELATION).cloned().unwrap_or_default();
            let projected = project(&keys, &added);
            let entering: HashSet<S> = added.difference(&projected).cloned().collect();
            Box::pin(async move { Ok(SetChange::delta(entering, removed)) })
        }),
    );

    let project = options.project;
    let init_flag = needs_init.clone();
    resolvers.insert(
        RELATION.into(),
        Rc::new(move |context, delta| {
            let DependencyDelta::Keys(delta) = delta else {
                return Box::pin(async { Ok(SetChange::delta(HashSet::new(), HashSet::new())) });
            };
            let candidates = context.set_state(SUPERSET).cloned().unwrap_or_default();

            if init_flag.replace(false) {
                let keys = context.keys_state(RELATION).cloned().unwrap_or_default();
                let projection = project(&keys, &candidates);
                let complement: HashSet<S> =
                    candidates.difference(&projection).cloned().collect();
                return Box::pin(async move { Ok(SetChange::overwrite(complement)) });
            }

            let leaving = project(&delta.increment_or_empty(), &candidates);
            let entering: HashSet<S> = project(&delta.decrement_or_empty(), &candidates)
                .difference(&leaving)
                .cloned()
                .collect();
            Box::pin(async move { Ok(SetChange::delta(entering, leaving)) })
        }),
    );

    let engine = ProjectionEngine::with_options(EngineOptions {
        dependencies: vec![
            (SUPERSET.into(), DependencySource::Set(options.superset)),
            (RELATION.into(), DependencySource::Keys(options.relation)),
        ],
        resolvers,
        spawner: options.spawner,
        label: options.label,
        enabled: options.enabled,
    })?;

    let flag = needs_init;
    let reset = engine.on_switch().subscribe(move |on: &bool| {
        if !on {
            flag.set(true);
        }
    });
    engine.keep_alive(reset);
    Ok(engine)
}

// =============================================================================
// MAPPED SET
// =============================================================================

/// A single collection dependency whose deltas are transformed directly into
/// the output's change, without a context.
pub fn mapped_set<S, R>(options: MappedSetOptions<S, R>) -> Result<ProjectionEngine<S, S, (), R>>
where
    S: Eq + Hash + Clone + 'static,
    R: Eq + Hash + Clone + 'static,
{
    let map = options.map;
    let mut resolvers: HashMap<String, Resolver<S, S, (), R>> = HashMap::new();
    resolvers.insert(
        SOURCE.into(),
        Rc::new(move |_context, delta| {
            let DependencyDelta::Set(delta) = delta else {
                return Box::pin(async { Ok(SetChange::delta(HashSet::new(), HashSet::new())) });
            };
            let change = map(&delta);
            Box::pin(async move { Ok(change) })
        }),
    );

    ProjectionEngine::with_options(EngineOptions {
        dependencies: vec![(SOURCE.into(), DependencySource::Set(options.source))],
        resolvers,
        spawner: options.spawner,
        label: options.label,
        enabled: options.enabled,
    })
}

// =============================================================================
// TESTS
// =============================================================================
