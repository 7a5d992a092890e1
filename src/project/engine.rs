// ============================================================================
// delta-sets - Projection Engine
// Multi-dependency derived collection with an async synchronization loop
// ============================================================================
//
// Dependencies are named, ordered, tagged records: element collections, key
// collections ("relations"), or cells. Each pairs a per-dependency delta
// buffer with a user resolver. One cooperative worker drains the buffers in
// declaration order; the only suspension point in the whole crate is the
// resolver await inside that worker.
//
// The buffer is committed *before* the resolver runs, so the context
// snapshot taken for the resolver already reflects the delta it is about to
// compute against. After every applied delta the scan restarts from the
// top: the await may have let other dependencies' buffers advance.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::rc::{Rc, Weak};

use futures::executor::LocalSpawner;
use futures::future::{abortable, AbortHandle, LocalBoxFuture};
use futures::task::LocalSpawnExt;

use crate::combine::lifecycle::{parents_enabled, CombinationNode, LifecycleCore};
use crate::containers::{ReactiveCell, ReactiveSet, SetOptions};
use crate::core::changes::{CellDelta, SetChange, SetDelta};
use crate::core::error::{ReactiveError, Result};
use crate::project::cell_buffer::CellDeltaBuffer;
use crate::project::set_buffer::SetDeltaBuffer;
use crate::transport::{Signal, Subscription};

// =============================================================================
// DEPENDENCY TAGGING
// =============================================================================

/// A named dependency's source: an element collection, a key collection
/// (relation), or a cell.
pub enum DependencySource<S: Eq + Hash, K: Eq + Hash, V> {
    Set(ReactiveSet<S>),
    Keys(ReactiveSet<K>),
    Cell(ReactiveCell<V>),
}

/// The buffered delta handed to a resolver, tagged like its source.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyDelta<S: Eq + Hash, K: Eq + Hash, V> {
    Set(SetDelta<S>),
    Keys(SetDelta<K>),
    Cell(CellDelta<V>),
}

/// One dependency's last committed state inside a context snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum CommittedState<S: Eq + Hash, K: Eq + Hash, V> {
    Set(Option<HashSet<S>>),
    Keys(Option<HashSet<K>>),
    Cell(Option<V>),
}

/// A snapshot of the last committed state of every dependency, keyed by
/// name. Cell dependencies appear as a value or `None`; collection
/// dependencies as a set or `None` (never committed).
pub struct ResolverContext<S: Eq + Hash, K: Eq + Hash, V> {
    states: HashMap<String, CommittedState<S, K, V>>,
}

impl<S: Eq + Hash, K: Eq + Hash, V> ResolverContext<S, K, V> {
    pub fn set_state(&self, name: &str) -> Option<&HashSet<S>> {
        match self.states.get(name) {
            Some(CommittedState::Set(state)) => state.as_ref(),
            _ => None,
        }
    }

    pub fn keys_state(&self, name: &str) -> Option<&HashSet<K>> {
        match self.states.get(name) {
            Some(CommittedState::Keys(state)) => state.as_ref(),
            _ => None,
        }
    }

    pub fn cell_state(&self, name: &str) -> Option<&V> {
        match self.states.get(name) {
            Some(CommittedState::Cell(state)) => state.as_ref(),
            _ => None,
        }
    }
}

/// Errors a resolver may surface; wrapped into
/// [`ReactiveError::ResolverFailure`] by the worker.
pub type BoxError = Box<dyn std::error::Error>;

/// The future a resolver returns. Local: resolvers never cross threads.
pub type ResolverFuture<R> = LocalBoxFuture<'static, std::result::Result<SetChange<R>, BoxError>>;

/// A user resolver: committed-state context plus the consumed delta, yielding
/// the input delta for the result collection. Resolvers must not mutate the
/// result themselves; application is performed by the engine.
pub type Resolver<S, K, V, R> =
    Rc<dyn Fn(ResolverContext<S, K, V>, DependencyDelta<S, K, V>) -> ResolverFuture<R>>;

// =============================================================================
// OPTIONS
// =============================================================================

/// Constructor configuration for the generalized engine.
pub struct EngineOptions<S: Eq + Hash, K: Eq + Hash, V, R: Eq + Hash> {
    /// Named sources, in scan order.
    pub dependencies: Vec<(String, DependencySource<S, K, V>)>,
    /// One resolver per dependency name.
    pub resolvers: HashMap<String, Resolver<S, K, V, R>>,
    /// The local executor the sync worker runs on; the same cooperative
    /// thread that performs user mutations must drive it.
    pub spawner: LocalSpawner,
    pub label: Option<String>,
    pub enabled: bool,
}

// =============================================================================
// ENGINE
// =============================================================================

enum DependencyBuffer<S: Eq + Hash, K: Eq + Hash, V> {
    Set(SetDeltaBuffer<S>),
    Keys(SetDeltaBuffer<K>),
    Cell(CellDeltaBuffer<V>),
}

struct DependencyRecord<S: Eq + Hash, K: Eq + Hash, V, R: Eq + Hash> {
    name: String,
    buffer: DependencyBuffer<S, K, V>,
    resolver: Resolver<S, K, V, R>,
    notify_sub: RefCell<Option<Subscription>>,
    parent: RefCell<Option<Weak<dyn CombinationNode>>>,
    parent_watch: RefCell<Option<Subscription>>,
}

/// A readonly derived collection computed by resolver dispatch over named
/// dependencies.
pub struct ProjectionEngine<S: Eq + Hash, K: Eq + Hash, V, R: Eq + Hash> {
    inner: Rc<EngineInner<S, K, V, R>>,
}

impl<S: Eq + Hash, K: Eq + Hash, V, R: Eq + Hash> Clone for ProjectionEngine<S, K, V, R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct EngineInner<S: Eq + Hash, K: Eq + Hash, V, R: Eq + Hash> {
    deps: Vec<DependencyRecord<S, K, V, R>>,
    result: ReactiveSet<R>,
    lifecycle: LifecycleCore,
    running: Cell<bool>,
    abort: RefCell<Option<AbortHandle>>,
    spawner: LocalSpawner,
    retained: RefCell<Vec<Subscription>>,
    /// Self-reference handed to subscription handlers and the worker.
    self_weak: RefCell<Weak<EngineInner<S, K, V, R>>>,
}

impl<S, K, V, R> ProjectionEngine<S, K, V, R>
where
    S: Eq + Hash + Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    V: PartialEq + Clone + 'static,
    R: Eq + Hash + Clone + 'static,
{
    pub fn with_options(options: EngineOptions<S, K, V, R>) -> Result<Self> {
        let mut resolvers = options.resolvers;
        let mut deps = Vec::new();
        for (name, source) in options.dependencies {
            let resolver = resolvers
                .remove(&name)
                .ok_or_else(|| ReactiveError::InvalidDependencyKind(name.clone()))?;
            let buffer = match source {
                DependencySource::Set(set) => DependencyBuffer::Set(SetDeltaBuffer::new(set)),
                DependencySource::Keys(keys) => DependencyBuffer::Keys(SetDeltaBuffer::new(keys)),
                DependencySource::Cell(cell) => {
                    DependencyBuffer::Cell(CellDeltaBuffer::new(cell))
                }
            };
            deps.push(DependencyRecord {
                name,
                buffer,
                resolver,
                notify_sub: RefCell::new(None),
                parent: RefCell::new(None),
                parent_watch: RefCell::new(None),
            });
        }
        if let Some(orphan) = resolvers.into_keys().next() {
            return Err(ReactiveError::InvalidDependencyKind(orphan));
        }

        let result = ReactiveSet::with_options(SetOptions {
            values: HashSet::new(),
            label: options.label.clone(),
        });
        result.mark_readonly();

        let inner = Rc::new(EngineInner {
            deps,
            result,
            lifecycle: LifecycleCore::new(options.label),
            running: Cell::new(false),
            abort: RefCell::new(None),
            spawner: options.spawner,
            retained: RefCell::new(Vec::new()),
            self_weak: RefCell::new(Weak::new()),
        });
        *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);
        inner
            .result
            .set_combination(Rc::downgrade(&inner) as Weak<dyn CombinationNode>);
        for index in 0..inner.deps.len() {
            inner.wire_parent(index);
        }
        inner.lifecycle.set_local(options.enabled);
        inner.refresh();
        Ok(Self { inner })
    }

    /// The readonly result collection; usable as a source elsewhere.
    pub fn result(&self) -> ReactiveSet<R> {
        self.inner.result.clone()
    }

    pub fn contents(&self) -> HashSet<R> {
        self.inner.result.values()
    }

    pub fn enable(&self) {
        self.inner.lifecycle.set_local(true);
        self.inner.refresh();
    }

    pub fn disable(&self) {
        self.inner.lifecycle.set_local(false);
        self.inner.refresh();
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lifecycle.is_active()
    }

    pub fn on_switch(&self) -> Signal<bool> {
        self.inner.lifecycle.switch_signal()
    }

    pub fn label(&self) -> Option<&str> {
        self.inner.lifecycle.label()
    }

    /// Keep a subscription alive for the engine's lifetime. The concrete
    /// projection factories park their own switch watches here.
    pub(crate) fn keep_alive(&self, subscription: Subscription) {
        self.inner.retained.borrow_mut().push(subscription);
    }
}

impl<S, K, V, R> EngineInner<S, K, V, R>
where
    S: Eq + Hash + Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    V: PartialEq + Clone + 'static,
    R: Eq + Hash + Clone + 'static,
{
    // =========================================================================
    // CASCADE
    // =========================================================================

    fn refresh(&self) {
        self.lifecycle.refresh(
            self.parents_ok(),
            || self.on_activated(),
            || self.on_deactivated(),
        );
    }

    fn parents_ok(&self) -> bool {
        let parents: Vec<Weak<dyn CombinationNode>> = self
            .deps
            .iter()
            .filter_map(|record| record.parent.borrow().clone())
            .collect();
        parents_enabled(parents.iter())
    }

    fn wire_parent(&self, index: usize) {
        let record = &self.deps[index];
        let node = match &record.buffer {
            DependencyBuffer::Set(buffer) => buffer.source().combination(),
            DependencyBuffer::Keys(buffer) => buffer.source().combination(),
            DependencyBuffer::Cell(_) => None,
        };
        let Some(node) = node else {
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
        for record in &self.deps {
            let weak = self.self_weak.borrow().clone();
            let sub = notify_signal(&record.buffer).subscribe(move |_: &()| {
                if let Some(inner) = weak.upgrade() {
                    inner.schedule_sync();
                }
            });
            *record.notify_sub.borrow_mut() = Some(sub);

            match &record.buffer {
                DependencyBuffer::Set(buffer) => buffer.enable(),
                DependencyBuffer::Keys(buffer) => buffer.enable(),
                DependencyBuffer::Cell(buffer) => buffer.enable(),
            }
        }
        self.schedule_sync();
    }

    fn on_deactivated(&self) {
        if let Some(handle) = self.abort.borrow_mut().take() {
            handle.abort();
        }
        self.running.set(false);
        for record in &self.deps {
            *record.notify_sub.borrow_mut() = None;
            match &record.buffer {
                DependencyBuffer::Set(buffer) => buffer.disable(),
                DependencyBuffer::Keys(buffer) => buffer.disable(),
                DependencyBuffer::Cell(buffer) => buffer.disable(),
            }
        }
        self.result.cancel_transaction_internal();
        self.result.clear_internal();
    }

    // =========================================================================
    // SYNCHRONIZATION LOOP
    // =========================================================================

    fn schedule_sync(&self) {
        if !self.lifecycle.is_active() || self.running.get() {
            return;
        }
        self.running.set(true);

        let weak = self.self_weak.borrow().clone();
        let (task, handle) = abortable(Self::sync_loop(weak));
        *self.abort.borrow_mut() = Some(handle);

        let spawned = self.spawner.spawn_local(async move {
            let _ = task.await;
        });
        if spawned.is_err() {
            self.running.set(false);
            self.abort.borrow_mut().take();
            tracing::error!(
                label = self.lifecycle.label(),
                "executor is gone; projection cannot synchronize"
            );
        }
    }

    async fn sync_loop(weak: Weak<Self>) {
        loop {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let Some((index, delta)) = inner.next_buffered() else {
                inner.running.set(false);
                inner.abort.borrow_mut().take();
                return;
            };

            // Commit first: the context must include the delta being consumed.
            if inner.commit_dependency(index).is_err() {
                inner.running.set(false);
                return;
            }
            let context = inner.context_snapshot();
            let (resolver, name) = {
                let record = &inner.deps[index];
                (record.resolver.clone(), record.name.clone())
            };
            let future = resolver(context, delta);
            drop(inner);

            let outcome = future.await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            match outcome {
                Ok(change) => inner.result.apply_resolved(change),
                Err(error) => {
                    tracing::error!(
                        label = inner.lifecycle.label(),
                        dependency = %name,
                        error = %ReactiveError::ResolverFailure(error.to_string()),
                        "resolver failed; disabling projection"
                    );
                    inner.running.set(false);
                    inner.abort.borrow_mut().take();
                    inner.lifecycle.set_local(false);
                    inner.refresh();
                    return;
                }
            }
            // Restart the scan from the top: the await may have let other
            // buffers advance.
        }
    }

    fn next_buffered(&self) -> Option<(usize, DependencyDelta<S, K, V>)> {
        for (index, record) in self.deps.iter().enumerate() {
            let delta = match &record.buffer {
                DependencyBuffer::Set(buffer) => buffer
                    .buffered_changes()
                    .ok()
                    .flatten()
                    .map(DependencyDelta::Set),
                DependencyBuffer::Keys(buffer) => buffer
                    .buffered_changes()
                    .ok()
                    .flatten()
                    .map(DependencyDelta::Keys),
                DependencyBuffer::Cell(buffer) => buffer
                    .buffered_change()
                    .ok()
                    .flatten()
                    .map(DependencyDelta::Cell),
            };
            if let Some(delta) = delta {
                return Some((index, delta));
            }
        }
        None
    }

    fn commit_dependency(&self, index: usize) -> Result<()> {
        match &self.deps[index].buffer {
            DependencyBuffer::Set(buffer) => buffer.commit_changes(),
            DependencyBuffer::Keys(buffer) => buffer.commit_changes(),
            DependencyBuffer::Cell(buffer) => buffer.commit_state(),
        }
    }

    fn context_snapshot(&self) -> ResolverContext<S, K, V> {
        let mut states = HashMap::new();
        for record in &self.deps {
            let state = match &record.buffer {
                DependencyBuffer::Set(buffer) => {
                    CommittedState::Set(buffer.committed_state().unwrap_or(None))
                }
                DependencyBuffer::Keys(buffer) => {
                    CommittedState::Keys(buffer.committed_state().unwrap_or(None))
                }
                DependencyBuffer::Cell(buffer) => {
                    CommittedState::Cell(buffer.committed_value().unwrap_or(None))
                }
            };
            states.insert(record.name.clone(), state);
        }
        ResolverContext { states }
    }
}

impl<S, K, V, R> CombinationNode for EngineInner<S, K, V, R>
where
    S: Eq + Hash + Clone + 'static,
    K: Eq + Hash + Clone + 'static,
    V: PartialEq + Clone + 'static,
    R: Eq + Hash + Clone + 'static,
{
    fn is_enabled(&self) -> bool {
        self.lifecycle.is_active()
    }

    fn switch_signal(&self) -> Signal<bool> {
        self.lifecycle.switch_signal()
    }
}

fn notify_signal<S: Eq + Hash + Clone + 'static, K: Eq + Hash + Clone + 'static, V: PartialEq + Clone + 'static>(
    buffer: &DependencyBuffer<S, K, V>,
) -> Signal<()> {
    match buffer {
        DependencyBuffer::Set(buffer) => buffer.on_change(),
        DependencyBuffer::Keys(buffer) => buffer.on_change(),
        DependencyBuffer::Cell(buffer) => buffer.on_change(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cell, set, set_of};
    use futures::executor::LocalPool;
    use std::cell::RefCell;

    type TestEngine = ProjectionEngine<i32, i32, i32, i32>;

    fn passthrough() -> Resolver<i32, i32, i32, i32> {
        Rc::new(|_context, delta| {
            Box::pin(async move {
                match delta {
                    DependencyDelta::Set(delta) => Ok(SetChange::Delta(delta)),
                    _ => Ok(SetChange::delta(HashSet::new(), HashSet::new())),
                }
            })
        })
    }

    fn engine_options(
        pool: &LocalPool,
        dependencies: Vec<(String, DependencySource<i32, i32, i32>)>,
        resolvers: HashMap<String, Resolver<i32, i32, i32, i32>>,
    ) -> EngineOptions<i32, i32, i32, i32> {
        EngineOptions {
            dependencies,
            resolvers,
            spawner: pool.spawner(),
            label: None,
            enabled: true,
        }
    }

    #[test]
    fn dependency_without_resolver_is_rejected() {
        let pool = LocalPool::new();
        let options = engine_options(
            &pool,
            vec![("source".into(), DependencySource::Set(set(set_of![1])))],
            HashMap::new(),
        );
        assert!(matches!(
            TestEngine::with_options(options),
            Err(ReactiveError::InvalidDependencyKind(name)) if name == "source"
        ));
    }

    #[test]
    fn resolver_without_dependency_is_rejected() {
        let pool = LocalPool::new();
        let mut resolvers = HashMap::new();
        resolvers.insert("ghost".into(), passthrough());
        let options = engine_options(&pool, Vec::new(), resolvers);
        assert!(matches!(
            TestEngine::with_options(options),
            Err(ReactiveError::InvalidDependencyKind(name)) if name == "ghost"
        ));
    }

    #[test]
    fn initial_contents_flow_through_the_resolver() {
        let mut pool = LocalPool::new();
        let source = set(set_of![1, 2]);
        let mut resolvers = HashMap::new();
        resolvers.insert("source".into(), passthrough());
        let engine = TestEngine::with_options(engine_options(
            &pool,
            vec![("source".into(), DependencySource::Set(source.clone()))],
            resolvers,
        ))
        .unwrap();

        pool.run_until_stalled();
        assert_eq!(engine.contents(), set_of![1, 2]);

        source.add(3).unwrap();
        source.delete(&1).unwrap();
        pool.run_until_stalled();
        assert_eq!(engine.contents(), set_of![2, 3]);
    }

    #[test]
    fn context_reflects_the_committed_delta() {
        let mut pool = LocalPool::new();
        let source = set(set_of![1]);
        let contexts: Rc<RefCell<Vec<Option<HashSet<i32>>>>> = Rc::new(RefCell::new(Vec::new()));

        let log = contexts.clone();
        let mut resolvers: HashMap<String, Resolver<i32, i32, i32, i32>> = HashMap::new();
        resolvers.insert(
            "source".into(),
            Rc::new(move |context, delta| {
                log.borrow_mut()
                    .push(context.set_state("source").cloned());
                Box::pin(async move {
                    match delta {
                        DependencyDelta::Set(delta) => Ok(SetChange::Delta(delta)),
                        _ => Ok(SetChange::delta(HashSet::new(), HashSet::new())),
                    }
                })
            }),
        );
        let engine = TestEngine::with_options(engine_options(
            &pool,
            vec![("source".into(), DependencySource::Set(source.clone()))],
            resolvers,
        ))
        .unwrap();

        pool.run_until_stalled();
        source.add(2).unwrap();
        pool.run_until_stalled();

        // committed before resolving: each snapshot includes the delta
        assert_eq!(
            *contexts.borrow(),
            vec![Some(set_of![1]), Some(set_of![1, 2])]
        );
        assert_eq!(engine.contents(), set_of![1, 2]);
    }

    #[test]
    fn deltas_between_runs_coalesce_into_one_resolver_call() {
        let mut pool = LocalPool::new();
        let source = set(set_of![]);
        let calls = Rc::new(Cell::new(0));

        let count = calls.clone();
        let mut resolvers: HashMap<String, Resolver<i32, i32, i32, i32>> = HashMap::new();
        resolvers.insert(
            "source".into(),
            Rc::new(move |_context, delta| {
                count.set(count.get() + 1);
                Box::pin(async move {
                    match delta {
                        DependencyDelta::Set(delta) => Ok(SetChange::Delta(delta)),
                        _ => Ok(SetChange::delta(HashSet::new(), HashSet::new())),
                    }
                })
            }),
        );
        let engine = TestEngine::with_options(engine_options(
            &pool,
            vec![("source".into(), DependencySource::Set(source.clone()))],
            resolvers,
        ))
        .unwrap();

        source.add(1).unwrap();
        source.add(2).unwrap();
        source.delete(&1).unwrap();
        pool.run_until_stalled();

        assert_eq!(calls.get(), 1);
        assert_eq!(engine.contents(), set_of![2]);
    }

    #[test]
    fn failing_resolver_quarantines_the_engine() {
        let mut pool = LocalPool::new();
        let source = set(set_of![1]);
        let calls = Rc::new(Cell::new(0));

        let count = calls.clone();
        let mut resolvers: HashMap<String, Resolver<i32, i32, i32, i32>> = HashMap::new();
        resolvers.insert(
            "source".into(),
            Rc::new(move |_context, _delta| {
                count.set(count.get() + 1);
                Box::pin(async move { Err::<SetChange<i32>, BoxError>("boom".into()) })
            }),
        );
        let engine = TestEngine::with_options(engine_options(
            &pool,
            vec![("source".into(), DependencySource::Set(source.clone()))],
            resolvers,
        ))
        .unwrap();

        let switches = Rc::new(RefCell::new(Vec::new()));
        let log = switches.clone();
        let _switch_sub = engine
            .on_switch()
            .subscribe(move |on: &bool| log.borrow_mut().push(*on));

        pool.run_until_stalled();
        assert!(!engine.is_enabled());
        assert_eq!(*switches.borrow(), vec![false]);
        assert_eq!(calls.get(), 1);

        // further mutations produce no resolver calls while quarantined
        source.add(2).unwrap();
        pool.run_until_stalled();
        assert_eq!(calls.get(), 1);
        assert!(engine.contents().is_empty());
    }

    #[test]
    fn cell_dependency_drives_resolution() {
        let mut pool = LocalPool::new();
        let mode = cell(10);
        let mut resolvers: HashMap<String, Resolver<i32, i32, i32, i32>> = HashMap::new();
        resolvers.insert(
            "mode".into(),
            Rc::new(|_context, delta| {
                Box::pin(async move {
                    match delta {
                        DependencyDelta::Cell(delta) => {
                            let value = delta.increment.map(|b| b.value).unwrap_or_default();
                            Ok(SetChange::overwrite(set_of![value]))
                        }
                        _ => Ok(SetChange::delta(HashSet::new(), HashSet::new())),
                    }
                })
            }),
        );
        let engine = TestEngine::with_options(engine_options(
            &pool,
            vec![("mode".into(), DependencySource::Cell(mode.clone()))],
            resolvers,
        ))
        .unwrap();

        pool.run_until_stalled();
        assert_eq!(engine.contents(), set_of![10]);

        mode.set(20).unwrap();
        pool.run_until_stalled();
        assert_eq!(engine.contents(), set_of![20]);
    }
}
