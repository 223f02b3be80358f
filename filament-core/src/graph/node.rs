//! Graph Nodes
//!
//! This module defines the node types that live in the dependency graph.
//! Nodes are plain bookkeeping: the closures and values behind a node are
//! held by the reactive runtime, keyed by the same [`NodeId`].

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexSet;
use smallvec::SmallVec;

/// Unique identifier for a node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A source node (signal). Sources have observers but never sources.
    Source,

    /// A memo: a pure computation that caches its output and is itself a
    /// source for other computations.
    Memo,

    /// A pure computation without a cached output. Scheduled alongside memos,
    /// before any effect.
    Computed,

    /// An effect: a side-effecting computation that runs after every pure
    /// computation of the flush has settled.
    Effect,

    /// An ownership boundary. Roots never run and are never observed.
    Root,
}

impl NodeKind {
    /// Whether nodes of this kind run user code when they become dirty.
    pub fn is_computation(self) -> bool {
        matches!(self, NodeKind::Memo | NodeKind::Computed | NodeKind::Effect)
    }

    /// Whether nodes of this kind run in the pure phase of a flush.
    pub fn is_pure(self) -> bool {
        matches!(self, NodeKind::Memo | NodeKind::Computed)
    }
}

/// Dirty state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The node's value is up-to-date.
    Clean,

    /// An upstream memo is dirty. The node only has to re-run if that memo
    /// produces a different value once it is brought up to date.
    MaybeDirty,

    /// A direct source changed. The node must re-run.
    Dirty,
}

/// A node in the dependency graph.
#[derive(Debug)]
pub struct Node {
    /// Unique identifier for this node.
    id: NodeId,

    /// What kind of node this is.
    kind: NodeKind,

    /// Current dirty state.
    dirty: DirtyState,

    /// Sources this node read during its most recent run, in read order.
    sources: IndexSet<NodeId>,

    /// Computations that read this node, in subscription order.
    observers: IndexSet<NodeId>,

    /// The node that owns this one, if any.
    owner: Option<NodeId>,

    /// Nodes created while this node was the active owner, in creation order.
    owned: SmallVec<[NodeId; 4]>,

    /// Set once disposal of this node has started.
    disposing: bool,
}

impl Node {
    /// Create a new node with the given kind.
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    /// Create a node for an ID that was allocated up front.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            dirty: if kind.is_computation() {
                // Start dirty to ensure the first run
                DirtyState::Dirty
            } else {
                DirtyState::Clean
            },
            sources: IndexSet::new(),
            observers: IndexSet::new(),
            owner: None,
            owned: SmallVec::new(),
            disposing: false,
        }
    }

    /// Create a new source (signal) node.
    pub fn source() -> Self {
        Self::new(NodeKind::Source)
    }

    /// Create a new memo node.
    pub fn memo() -> Self {
        Self::new(NodeKind::Memo)
    }

    /// Create a new effect node.
    pub fn effect() -> Self {
        Self::new(NodeKind::Effect)
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the current dirty state.
    pub fn dirty_state(&self) -> DirtyState {
        self.dirty
    }

    /// Check if the node needs any processing.
    pub fn is_clean(&self) -> bool {
        self.dirty == DirtyState::Clean
    }

    /// Mark the node as clean.
    pub fn mark_clean(&mut self) {
        self.dirty = DirtyState::Clean;
    }

    /// Mark the node as maybe dirty (an upstream memo might have changed).
    pub fn mark_maybe_dirty(&mut self) {
        if self.dirty == DirtyState::Clean {
            self.dirty = DirtyState::MaybeDirty;
        }
    }

    /// Mark the node as definitely dirty (needs recomputation).
    pub fn mark_dirty(&mut self) {
        self.dirty = DirtyState::Dirty;
    }

    /// Add a source (a node that this node reads from).
    pub fn add_source(&mut self, node_id: NodeId) -> bool {
        self.sources.insert(node_id)
    }

    /// Remove a source.
    pub fn remove_source(&mut self, node_id: NodeId) {
        self.sources.shift_remove(&node_id);
    }

    /// Get all sources in read order.
    pub fn sources(&self) -> &IndexSet<NodeId> {
        &self.sources
    }

    /// Replace the source set wholesale.
    pub(crate) fn set_sources(&mut self, sources: IndexSet<NodeId>) {
        self.sources = sources;
    }

    /// Add an observer (a node that reads from this node).
    pub fn add_observer(&mut self, node_id: NodeId) -> bool {
        self.observers.insert(node_id)
    }

    /// Remove an observer.
    pub fn remove_observer(&mut self, node_id: NodeId) {
        self.observers.shift_remove(&node_id);
    }

    /// Get all observers in subscription order.
    pub fn observers(&self) -> &IndexSet<NodeId> {
        &self.observers
    }

    /// Get the owning node.
    pub fn owner(&self) -> Option<NodeId> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, owner: Option<NodeId>) {
        self.owner = owner;
    }

    /// Nodes owned by this node, in creation order.
    pub fn owned(&self) -> &[NodeId] {
        &self.owned
    }

    pub(crate) fn push_owned(&mut self, node_id: NodeId) {
        self.owned.push(node_id);
    }

    pub(crate) fn remove_owned(&mut self, node_id: NodeId) {
        self.owned.retain(|id| *id != node_id);
    }

    pub(crate) fn take_owned(&mut self) -> SmallVec<[NodeId; 4]> {
        std::mem::take(&mut self.owned)
    }

    /// Whether disposal of this node has begun.
    pub fn is_disposing(&self) -> bool {
        self.disposing
    }

    pub(crate) fn begin_disposal(&mut self) {
        self.disposing = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn source_node_starts_clean() {
        let node = Node::source();
        assert_eq!(node.kind(), NodeKind::Source);
        assert!(node.is_clean());
    }

    #[test]
    fn computations_start_dirty() {
        assert_eq!(Node::memo().dirty_state(), DirtyState::Dirty);
        assert_eq!(Node::effect().dirty_state(), DirtyState::Dirty);
        assert!(Node::new(NodeKind::Root).is_clean());
    }

    #[test]
    fn sources_keep_read_order_and_dedupe() {
        let mut node = Node::memo();
        let a = NodeId::new();
        let b = NodeId::new();

        assert!(node.add_source(b));
        assert!(node.add_source(a));
        assert!(!node.add_source(b));

        let order: Vec<_> = node.sources().iter().copied().collect();
        assert_eq!(order, vec![b, a]);

        node.remove_source(b);
        assert_eq!(node.sources().len(), 1);
    }

    #[test]
    fn dirty_state_transitions() {
        let mut node = Node::memo();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        node.mark_clean();
        assert_eq!(node.dirty_state(), DirtyState::Clean);

        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::MaybeDirty);

        node.mark_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);

        // maybe-dirty never downgrades a dirty node
        node.mark_maybe_dirty();
        assert_eq!(node.dirty_state(), DirtyState::Dirty);
    }
}
