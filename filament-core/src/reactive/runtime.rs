//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos, and
//! effects. It owns the dependency graph and schedules updates when signals
//! change.
//!
//! # How It Works
//!
//! 1. When a signal, memo or effect is created, it registers a node with the
//!    runtime, owned by whatever computation or root is currently active.
//!
//! 2. When a computation reads a source, the runtime records the edge.
//!
//! 3. When a source's value changes, the runtime:
//!    a. Marks direct observers dirty and everything downstream of a dirty
//!       memo "maybe dirty"
//!    b. Queues every node that left the clean state, exactly once
//!    c. Flushes when the outermost batch ends: pure computations first, in
//!       topological order, then effects
//!
//! 4. Before a computation re-runs, everything it created during its
//!    previous run is disposed and its cleanups run in reverse order.
//!
//! # Threading
//!
//! The graph is thread-local. Every thread that uses reactive primitives has
//! its own runtime; handles are not `Send`.
//!
//! # Failure
//!
//! A panic inside a computation leaves that computation dirty and queued,
//! restores the runtime's bookkeeping and unwinds out of the write (or flush)
//! that triggered it. The next flush retries it.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use indexmap::IndexSet;
use tracing::{debug, error, trace};

use super::context::ReactiveContext;
use crate::config::RuntimeConfig;
use crate::graph::{DirtyState, Node, NodeId, NodeKind, UpdateScheduler};

/// A node body the runtime can re-run.
pub(crate) trait Computation {
    /// Run the body once. Returns `true` if the node's output changed.
    fn run(&self) -> bool;
}

type Task = Box<dyn FnOnce()>;

thread_local! {
    static RUNTIME: RuntimeState = RuntimeState::new();
}

/// Run `f` against the current thread's runtime state.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&RuntimeState) -> R) -> R {
    RUNTIME.with(f)
}

/// Per-thread runtime state.
pub(crate) struct RuntimeState {
    graph: RefCell<UpdateScheduler>,
    computations: RefCell<HashMap<NodeId, Rc<dyn Computation>>>,
    cleanups: RefCell<HashMap<NodeId, Vec<Task>>>,
    pending_pure: RefCell<IndexSet<NodeId>>,
    pending_effects: RefCell<IndexSet<NodeId>>,
    after_flush: RefCell<Vec<Task>>,
    /// Nodes whose body or source resolution is on the stack right now.
    running: RefCell<HashSet<NodeId>>,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
    config: Cell<RuntimeConfig>,
}

impl RuntimeState {
    fn new() -> Self {
        Self {
            graph: RefCell::new(UpdateScheduler::new()),
            computations: RefCell::new(HashMap::new()),
            cleanups: RefCell::new(HashMap::new()),
            pending_pure: RefCell::new(IndexSet::new()),
            pending_effects: RefCell::new(IndexSet::new()),
            after_flush: RefCell::new(Vec::new()),
            running: RefCell::new(HashSet::new()),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            config: Cell::new(RuntimeConfig::default()),
        }
    }

    pub(crate) fn config(&self) -> RuntimeConfig {
        self.config.get()
    }

    pub(crate) fn set_config(&self, config: RuntimeConfig) {
        self.config.set(config);
    }

    /// Create a node owned by the current owner.
    pub(crate) fn create_node(&self, kind: NodeKind) -> NodeId {
        self.create_node_owned(kind, ReactiveContext::current_owner())
    }

    /// Create a node with an explicit owner.
    pub(crate) fn create_node_owned(&self, kind: NodeKind, owner: Option<NodeId>) -> NodeId {
        if owner.is_none() && kind.is_computation() {
            debug!(?kind, "computation created without an owner; it is never disposed");
        }
        self.graph.borrow_mut().add_node(Node::new(kind), owner)
    }

    pub(crate) fn register_computation(&self, id: NodeId, computation: Rc<dyn Computation>) {
        self.computations.borrow_mut().insert(id, computation);
    }

    pub(crate) fn contains(&self, id: NodeId) -> bool {
        self.graph.borrow().contains(id)
    }

    /// Whether a node is gone or on its way out.
    pub(crate) fn is_disposed(&self, id: NodeId) -> bool {
        self.graph
            .borrow()
            .get_node(id)
            .map_or(true, Node::is_disposing)
    }

    pub(crate) fn observer_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .get_node(id)
            .map_or(0, |node| node.observers().len())
    }

    pub(crate) fn source_count(&self, id: NodeId) -> usize {
        self.graph
            .borrow()
            .get_node(id)
            .map_or(0, |node| node.sources().len())
    }

    pub(crate) fn state_of(&self, id: NodeId) -> Option<DirtyState> {
        self.graph.borrow().get_node(id).map(Node::dirty_state)
    }

    pub(crate) fn node_count(&self) -> usize {
        self.graph.borrow().node_count()
    }

    /// Register a read of `source` with the running computation.
    pub(crate) fn track_read(&self, source: NodeId) {
        if let Some(observer) = ReactiveContext::track(source) {
            self.graph.borrow_mut().add_edge(source, observer);
        }
    }

    /// Propagate a change of `source` and flush if no batch is open.
    pub(crate) fn notify_changed(&self, source: NodeId) {
        self.batch(|| {
            let scheduled = self.graph.borrow_mut().mark_changed(source);
            trace!(
                source = source.raw(),
                scheduled = scheduled.len(),
                "source changed"
            );
            self.enqueue(&scheduled);
        });
    }

    fn enqueue(&self, ids: &[NodeId]) {
        let graph = self.graph.borrow();
        for id in ids {
            match graph.get_node(*id).map(Node::kind) {
                Some(kind) if kind.is_pure() => {
                    self.pending_pure.borrow_mut().insert(*id);
                }
                Some(NodeKind::Effect) => {
                    self.pending_effects.borrow_mut().insert(*id);
                }
                _ => {}
            }
        }
    }

    /// Queue a fresh computation for its first run.
    pub(crate) fn schedule(&self, id: NodeId) {
        self.batch(|| self.enqueue(&[id]));
    }

    /// Run `f` once the current flush has settled, or right away when
    /// nothing is batching or flushing.
    pub(crate) fn after_flush(&self, task: Task) {
        self.after_flush.borrow_mut().push(task);
        if !self.is_batching() && !self.flushing.get() {
            self.flush();
        }
    }

    pub(crate) fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.batch_depth.set(self.batch_depth.get() + 1);
        let guard = BatchGuard { runtime: self };
        let result = f();
        drop(guard);
        result
    }

    pub(crate) fn is_batching(&self) -> bool {
        self.batch_depth.get() > 0
    }

    pub(crate) fn is_flushing(&self) -> bool {
        self.flushing.get()
    }

    /// Drain the queues until the graph is settled.
    pub(crate) fn flush(&self) {
        if self.flushing.get() {
            return;
        }
        self.flushing.set(true);
        let _guard = FlushGuard { runtime: self };
        let limit = self.config.get().max_flush_iterations;
        let mut waves = 0usize;

        loop {
            self.drain_pure(&mut waves, limit);

            let effects: Vec<NodeId> = self.pending_effects.borrow().iter().copied().collect();
            if !effects.is_empty() {
                self.count_wave(&mut waves, limit);
                trace!(effects = effects.len(), "running effects");
                for id in effects {
                    if !self.pending_effects.borrow_mut().swap_remove(&id) {
                        continue;
                    }
                    // Memos queued by earlier effects settle first
                    self.drain_pure(&mut waves, limit);
                    self.update_if_needed(id);
                }
                continue;
            }

            let tasks = std::mem::take(&mut *self.after_flush.borrow_mut());
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                task();
            }
        }
    }

    fn drain_pure(&self, waves: &mut usize, limit: usize) {
        loop {
            let pending: Vec<NodeId> = self.pending_pure.borrow().iter().copied().collect();
            if pending.is_empty() {
                return;
            }
            self.count_wave(waves, limit);

            let order = self.graph.borrow().topological_order(&pending);
            trace!(pure = order.len(), "running pure computations");
            for id in order {
                if !self.pending_pure.borrow_mut().swap_remove(&id) {
                    continue;
                }
                self.update_if_needed(id);
            }

            // Disposed nodes never show up in the order
            let graph = self.graph.borrow();
            self.pending_pure
                .borrow_mut()
                .retain(|id| graph.contains(*id));
        }
    }

    fn count_wave(&self, waves: &mut usize, limit: usize) {
        *waves += 1;
        if *waves <= limit {
            return;
        }

        let stuck: Vec<NodeId> = {
            let mut pure = self.pending_pure.borrow_mut();
            let mut effects = self.pending_effects.borrow_mut();
            pure.drain(..).chain(effects.drain(..)).collect()
        };
        {
            let mut graph = self.graph.borrow_mut();
            for id in &stuck {
                if let Some(node) = graph.get_node_mut(*id) {
                    node.mark_clean();
                }
            }
        }
        error!(
            limit,
            stuck = stuck.len(),
            "reactive flush exceeded its iteration limit"
        );
        panic!(
            "reactive flush exceeded {limit} iterations; \
             a computation keeps invalidating its own sources"
        );
    }

    /// Bring a computation up to date: owners first, then memo sources of a
    /// maybe-dirty node, then the node itself if it is dirty.
    pub(crate) fn update_if_needed(&self, id: NodeId) {
        if self.running.borrow().contains(&id) {
            return;
        }

        let owners = self.graph.borrow().stale_owners(id);
        for owner in owners {
            self.update_if_needed(owner);
        }

        if self.state_of(id) == Some(DirtyState::MaybeDirty) {
            let memos: Vec<NodeId> = {
                let graph = self.graph.borrow();
                match graph.get_node(id) {
                    Some(node) => node
                        .sources()
                        .iter()
                        .filter(|source| {
                            graph
                                .get_node(**source)
                                .is_some_and(|s| s.kind() == NodeKind::Memo)
                        })
                        .copied()
                        .collect(),
                    None => return,
                }
            };

            {
                let _resolving = RunningGuard::enter(self, id);
                for memo in memos {
                    self.update_if_needed(memo);
                    if self.state_of(id) != Some(DirtyState::MaybeDirty) {
                        break;
                    }
                }
            }

            if self.state_of(id) == Some(DirtyState::MaybeDirty) {
                if let Some(node) = self.graph.borrow_mut().get_node_mut(id) {
                    node.mark_clean();
                }
                return;
            }
        }

        if self.state_of(id) == Some(DirtyState::Dirty) {
            self.run_computation(id);
        }
    }

    /// Mark a computation dirty without propagating to its observers.
    pub(crate) fn invalidate(&self, id: NodeId) {
        if let Some(node) = self.graph.borrow_mut().get_node_mut(id) {
            node.mark_dirty();
        }
    }

        /// Re-run a computation unconditionally.
    pub(crate) fn run_computation(&self, id: NodeId) {
        let Some(computation) = self.computations.borrow().get(&id).cloned() else {
            return;
        };

        self.dispose_owned(id);
        self.run_cleanups(id);

        let kind = {
            let mut graph = self.graph.borrow_mut();
            let Some(node) = graph.get_node_mut(id) else {
                return;
            };
            // Clean before the body runs: a write to one of its own sources
            // during the run has to queue it again.
            node.mark_clean();
            node.kind()
        };

        let _running = RunningGuard::enter(self, id);
        let requeue = RequeueOnUnwind {
            runtime: self,
            id,
            armed: true,
        };
        let context = ReactiveContext::enter(Some(id), Some(id));
        let changed = computation.run();
        let read = context.finish();
        requeue.disarm();

        self.graph.borrow_mut().retain_sources(id, read);

        if changed && kind == NodeKind::Memo {
            let scheduled = self.graph.borrow_mut().mark_changed(id);
            self.enqueue(&scheduled);
        }
    }

    /// Run `f` as the body of `id` without the re-run bookkeeping: no
    /// disposal, no cleanups, just fresh dependency tracking.
    pub(crate) fn track_as<R>(&self, id: NodeId, f: impl FnOnce() -> R) -> R {
        if let Some(node) = self.graph.borrow_mut().get_node_mut(id) {
            node.mark_clean();
        }
        let context = ReactiveContext::enter(Some(id), Some(id));
        let result = f();
        let read = context.finish();
        self.graph.borrow_mut().retain_sources(id, read);
        result
    }

    /// Dispose a node, everything it owns, and run its cleanups.
    ///
    /// Disposing a node that is gone or already being disposed is a no-op.
    pub(crate) fn dispose(&self, id: NodeId) {
        {
            let mut graph = self.graph.borrow_mut();
            match graph.get_node_mut(id) {
                Some(node) if !node.is_disposing() => node.begin_disposal(),
                _ => return,
            }
        }
        trace!(node = id.raw(), "disposing");

        self.dispose_owned(id);
        self.run_cleanups(id);

        let node = self.graph.borrow_mut().remove_node(id);
        let computation = self.computations.borrow_mut().remove(&id);
        self.pending_pure.borrow_mut().swap_remove(&id);
        self.pending_effects.borrow_mut().swap_remove(&id);

        // Dropping closures may drop handles; no borrow is held here
        drop(computation);
        drop(node);
    }

    fn dispose_owned(&self, id: NodeId) {
        let owned = match self.graph.borrow_mut().get_node_mut(id) {
            Some(node) => node.take_owned(),
            None => return,
        };
        for child in owned.into_iter().rev() {
            self.dispose(child);
        }
    }

    fn run_cleanups(&self, id: NodeId) {
        let cleanups = self.cleanups.borrow_mut().remove(&id);
        if let Some(cleanups) = cleanups {
            for cleanup in cleanups.into_iter().rev() {
                cleanup();
            }
        }
    }

    /// Register a cleanup with the current owner.
    pub(crate) fn on_cleanup(&self, cleanup: Task) -> bool {
        match ReactiveContext::current_owner() {
            Some(owner) if self.contains(owner) => {
                self.add_cleanup(owner, cleanup);
                true
            }
            _ => {
                debug!("cleanup registered outside of an owner never runs");
                false
            }
        }
    }

    pub(crate) fn add_cleanup(&self, owner: NodeId, cleanup: Task) {
        self.cleanups
            .borrow_mut()
            .entry(owner)
            .or_default()
            .push(cleanup);
    }
}

struct BatchGuard<'a> {
    runtime: &'a RuntimeState,
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        let depth = self.runtime.batch_depth.get().saturating_sub(1);
        self.runtime.batch_depth.set(depth);

        // When the outermost batch completes, flush pending work
        if depth == 0 && !self.runtime.flushing.get() && !std::thread::panicking() {
            self.runtime.flush();
        }
    }
}

struct FlushGuard<'a> {
    runtime: &'a RuntimeState,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.runtime.flushing.set(false);
    }
}

struct RunningGuard<'a> {
    runtime: &'a RuntimeState,
    id: NodeId,
}

impl<'a> RunningGuard<'a> {
    fn enter(runtime: &'a RuntimeState, id: NodeId) -> Self {
        runtime.running.borrow_mut().insert(id);
        Self { runtime, id }
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.runtime.running.try_borrow_mut() {
            running.remove(&self.id);
        }
    }
}

/// Leaves a computation dirty and queued when its body unwinds.
struct RequeueOnUnwind<'a> {
    runtime: &'a RuntimeState,
    id: NodeId,
    armed: bool,
}

impl RequeueOnUnwind<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for RequeueOnUnwind<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let kind = match self.runtime.graph.try_borrow_mut() {
            Ok(mut graph) => match graph.get_node_mut(self.id) {
                Some(node) => {
                    node.mark_dirty();
                    node.kind()
                }
                None => return,
            },
            Err(_) => return,
        };
        let queue = if kind.is_pure() {
            &self.runtime.pending_pure
        } else {
            &self.runtime.pending_effects
        };
        if let Ok(mut queue) = queue.try_borrow_mut() {
            queue.insert(self.id);
        }
    }
}

/// Static entry points to the current thread's reactive runtime.
#[derive(Debug, Clone, Copy)]
pub struct Runtime;

impl Runtime {
    /// Check if a computation is currently collecting dependencies.
    pub fn is_tracking() -> bool {
        ReactiveContext::is_tracking()
    }

    /// Check if a batch is open.
    pub fn is_batching() -> bool {
        with_runtime(RuntimeState::is_batching)
    }

    /// Number of live nodes in this thread's graph.
    pub fn node_count() -> usize {
        with_runtime(RuntimeState::node_count)
    }

    /// Run any queued work now, unless a flush is already running.
    pub fn flush() {
        with_runtime(|rt| {
            if !rt.is_batching() {
                rt.flush();
            }
        });
    }
}

/// Batch multiple writes into a single flush.
///
/// Effects observe only the final values of everything written inside the
/// batch, and run at most once when the outermost batch ends.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    with_runtime(|rt| rt.batch(f))
}

/// Run `f` without registering any dependency for the running computation.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}

/// Register `cleanup` with the current owner.
///
/// It runs before the owner re-runs, or when the owner is disposed.
/// Returns `false` (and drops `cleanup`) when there is no owner.
pub fn on_cleanup(cleanup: impl FnOnce() + 'static) -> bool {
    with_runtime(|rt| rt.on_cleanup(Box::new(cleanup)))
}

/// Check if a batch is currently open.
pub fn is_batching() -> bool {
    Runtime::is_batching()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Counter {
        runs: Rc<Cell<usize>>,
    }

    impl Computation for Counter {
        fn run(&self) -> bool {
            self.runs.set(self.runs.get() + 1);
            false
        }
    }

    fn counter_effect(rt: &RuntimeState) -> (NodeId, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let id = rt.create_node_owned(NodeKind::Effect, None);
        rt.register_computation(id, Rc::new(Counter { runs: runs.clone() }));
        (id, runs)
    }

    #[test]
    fn runtime_notifies_observers() {
        with_runtime(|rt| {
            let source = rt.create_node_owned(NodeKind::Source, None);
            let (effect, runs) = counter_effect(rt);
            rt.run_computation(effect);
            assert_eq!(runs.get(), 1);

            // Link by hand the way a tracked read would
            rt.track_as(effect, || rt.track_read(source));
            assert_eq!(rt.observer_count(source), 1);

            rt.notify_changed(source);
            assert_eq!(runs.get(), 2);

            rt.dispose(effect);
            rt.notify_changed(source);
            assert_eq!(runs.get(), 2);
            assert_eq!(rt.observer_count(source), 0);
        });
    }

    #[test]
    fn batch_defers_flush_until_outermost_exit() {
        with_runtime(|rt| {
            let source = rt.create_node_owned(NodeKind::Source, None);
            let (effect, runs) = counter_effect(rt);
            rt.track_as(effect, || rt.track_read(source));

            rt.batch(|| {
                rt.notify_changed(source);
                rt.batch(|| rt.notify_changed(source));
                assert_eq!(runs.get(), 0);
            });
            assert_eq!(runs.get(), 1);
        });
    }

    #[test]
    fn disposal_runs_cleanups_in_reverse_once() {
        let order = Rc::new(RefCell::new(Vec::new()));
        with_runtime(|rt| {
            let root = rt.create_node_owned(NodeKind::Root, None);
            for i in 0..3 {
                let order = order.clone();
                rt.add_cleanup(root, Box::new(move || order.borrow_mut().push(i)));
            }
            rt.dispose(root);
            rt.dispose(root);
            assert!(!rt.contains(root));
        });
        assert_eq!(*order.borrow(), vec![2, 1, 0]);
    }
}
