//! Update Scheduler
//!
//! The scheduler owns the dependency graph and decides which nodes need to
//! run, and in which order, after a source changes.
//!
//! # Algorithm
//!
//! 1. When a source changes, its direct observers are marked `Dirty`.
//! 2. Observers of a dirty memo are marked `MaybeDirty`, recursively.
//! 3. Every node that left the `Clean` state is reported to the caller so it
//!    can be queued exactly once.
//! 4. Queued pure nodes are sorted topologically (sources before observers)
//!    before they are run.
//! 5. A `MaybeDirty` node is resolved by first bringing its memo sources up to
//!    date; it only re-runs if one of them produced a new value.
//!
//! This "push-pull" approach minimizes unnecessary recomputation.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexSet;

use super::node::{DirtyState, Node, NodeId, NodeKind};

/// The update scheduler manages the dependency graph and coordinates updates.
#[derive(Debug)]
pub struct UpdateScheduler {
    /// All nodes in the graph, indexed by ID.
    nodes: HashMap<NodeId, Node>,
}

impl UpdateScheduler {
    /// Create a new empty scheduler.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Add a node to the graph, owned by `owner` if given.
    pub fn add_node(&mut self, mut node: Node, owner: Option<NodeId>) -> NodeId {
        let id = node.id();
        let owner = owner.filter(|owner| self.nodes.contains_key(owner));
        node.set_owner(owner);
        if let Some(owner) = owner.and_then(|owner| self.nodes.get_mut(&owner)) {
            owner.push_owned(id);
        }
        self.nodes.insert(id, node);
        id
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node and detaches it from its
    /// owner. Owned nodes are left in place; the caller disposes them first.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let node = self.nodes.remove(&node_id)?;

        for source_id in node.sources() {
            if let Some(source) = self.nodes.get_mut(source_id) {
                source.remove_observer(node_id);
            }
        }

        for observer_id in node.observers() {
            if let Some(observer) = self.nodes.get_mut(observer_id) {
                observer.remove_source(node_id);
            }
        }

        if let Some(owner) = node.owner().and_then(|owner| self.nodes.get_mut(&owner)) {
            owner.remove_owned(node_id);
        }

        Some(node)
    }

    /// Check whether a node is still part of the graph.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.nodes.contains_key(&node_id)
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable reference to a node.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Add a dependency edge: `observer` reads `source`.
    ///
    /// Returns `false` if either node is gone or the edge already existed.
    pub fn add_edge(&mut self, source: NodeId, observer: NodeId) -> bool {
        if source == observer || !self.contains(source) || !self.contains(observer) {
            return false;
        }
        let mut added = false;
        if let Some(source_node) = self.nodes.get_mut(&source) {
            added |= source_node.add_observer(observer);
        }
        if let Some(observer_node) = self.nodes.get_mut(&observer) {
            added |= observer_node.add_source(source);
        }
        added
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, source: NodeId, observer: NodeId) {
        if let Some(source_node) = self.nodes.get_mut(&source) {
            source_node.remove_observer(observer);
        }
        if let Some(observer_node) = self.nodes.get_mut(&observer) {
            observer_node.remove_source(source);
        }
    }

    /// Replace the sources of `observer` with the ones read during its latest
    /// run, unlinking every edge that was not read again.
    pub fn retain_sources(&mut self, observer: NodeId, read: IndexSet<NodeId>) {
        let stale: Vec<NodeId> = match self.nodes.get(&observer) {
            Some(node) => node
                .sources()
                .iter()
                .filter(|source| !read.contains(*source))
                .copied()
                .collect(),
            None => return,
        };

        for source in stale {
            if let Some(source_node) = self.nodes.get_mut(&source) {
                source_node.remove_observer(observer);
            }
        }

        let live: IndexSet<NodeId> = read
            .into_iter()
            .filter(|source| self.nodes.contains_key(source))
            .collect();
        for source in &live {
            if let Some(source_node) = self.nodes.get_mut(source) {
                source_node.add_observer(observer);
            }
        }
        if let Some(node) = self.nodes.get_mut(&observer) {
            node.set_sources(live);
        }
    }

    /// Mark the observers of a changed node and propagate dirty flags.
    ///
    /// Direct observers become `Dirty`; everything downstream of a dirty memo
    /// becomes `MaybeDirty`. Returns the nodes that left the `Clean` state,
    /// in marking order; each of them has to be queued once.
    pub fn mark_changed(&mut self, changed: NodeId) -> Vec<NodeId> {
        let mut scheduled = Vec::new();

        let observers: Vec<NodeId> = match self.nodes.get(&changed) {
            Some(node) => node.observers().iter().copied().collect(),
            None => return scheduled,
        };

        let mut maybe_queue = VecDeque::new();
        for observer_id in observers {
            if let Some(node) = self.nodes.get_mut(&observer_id) {
                if node.is_disposing() {
                    continue;
                }
                let was_clean = node.is_clean();
                let was_dirty = node.dirty_state() == DirtyState::Dirty;
                node.mark_dirty();
                if was_clean {
                    scheduled.push(observer_id);
                }
                if !was_dirty && node.kind() == NodeKind::Memo {
                    maybe_queue.push_back(observer_id);
                }
            }
        }

        // BFS to propagate maybe-dirty status
        let mut visited = HashSet::new();
        while let Some(memo_id) = maybe_queue.pop_front() {
            if !visited.insert(memo_id) {
                continue;
            }
            let observers: Vec<NodeId> = match self.nodes.get(&memo_id) {
                Some(node) => node.observers().iter().copied().collect(),
                None => continue,
            };
            for observer_id in observers {
                if let Some(node) = self.nodes.get_mut(&observer_id) {
                    if !node.is_clean() || node.is_disposing() {
                        continue;
                    }
                    node.mark_maybe_dirty();
                    scheduled.push(observer_id);
                    if node.kind() == NodeKind::Memo {
                        maybe_queue.push_back(observer_id);
                    }
                }
            }
        }

        scheduled
    }

    /// Order the given nodes so that sources come before their observers.
    ///
    /// Ties keep the input order. Nodes caught in a cycle are appended in
    /// input order rather than dropped.
    pub fn topological_order(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        let node_set: HashSet<_> = nodes.iter().copied().collect();
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(nodes.len());
        let mut queue = VecDeque::new();

        // Calculate in-degrees (only counting edges within the node set)
        for &node_id in nodes {
            if let Some(node) = self.nodes.get(&node_id) {
                let degree = node
                    .sources()
                    .iter()
                    .filter(|s| node_set.contains(s))
                    .count();
                in_degree.insert(node_id, degree);
                if degree == 0 {
                    queue.push_back(node_id);
                }
            }
        }

        // Kahn's algorithm
        let mut emitted = HashSet::new();
        while let Some(node_id) = queue.pop_front() {
            if !emitted.insert(node_id) {
                continue;
            }
            result.push(node_id);

            if let Some(node) = self.nodes.get(&node_id) {
                for &observer_id in node.observers() {
                    if let Some(degree) = in_degree.get_mut(&observer_id) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(observer_id);
                        }
                    }
                }
            }
        }

        for &node_id in nodes {
            if in_degree.contains_key(&node_id) && !emitted.contains(&node_id) {
                emitted.insert(node_id);
                result.push(node_id);
            }
        }

        result
    }

    /// The owner chain of a node that is not clean, top-most first.
    ///
    /// A re-running owner disposes everything it owns, so these have to be
    /// brought up to date before the node itself is looked at.
    pub fn stale_owners(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&node_id).and_then(Node::owner);
        while let Some(owner_id) = current {
            let Some(owner) = self.nodes.get(&owner_id) else {
                break;
            };
            if owner.kind().is_computation() && !owner.is_clean() {
                chain.push(owner_id);
            }
            current = owner.owner();
        }
        chain.reverse();
        chain
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}
