//! Dependency Graph
//!
//! This module implements the computational dependency graph that tracks
//! relationships between reactive values and computations.
//!
//! # Overview
//!
//! The dependency graph is a directed graph where:
//!
//! - Nodes represent sources (signals), computations (memos, computeds,
//!   effects) or ownership roots
//! - Edges represent dependencies: if A reads B, there is an edge from B to A
//!
//! Independently of the dependency edges, every node may have an owner: the
//! computation or root that was active when it was created. Ownership drives
//! disposal and the parent-before-child execution order.
//!
//! When a signal changes, we traverse the graph to find all affected nodes
//! and mark them as dirty. The runtime then determines which dirty nodes
//! actually need to recompute.
//!
//! # Design Decisions
//!
//! 1. We use a centralized graph rather than distributed linked lists because:
//!    - It enables efficient topological ordering for batch updates
//!    - It allows for global optimization of update scheduling
//!
//! 2. The graph is indexed by node ID for O(1) lookups.
//!
//! 3. We maintain both forward (sources) and reverse (observers) edges
//!    to enable efficient traversal in both directions. Both sides are
//!    insertion-ordered sets, so iteration order is deterministic.

mod node;
mod scheduler;

pub use node::{DirtyState, Node, NodeId, NodeKind};
pub use scheduler::UpdateScheduler;
