//! Dependency graph over cell positions.
//!
//! Tracks which cells a formula reads (forward edges) and which formulas
//! read a given cell (backward edges) so the sheet can probe candidate
//! topologies for cycles and sweep stale caches.
//!
//! # Edge Direction
//!
//! ```text
//! A → B  means  "A references B"  (A's formula reads B)
//! ```
//!
//! The cycle probe walks forward edges; cache invalidation walks backward
//! edges. Nodes are keyed by `Position`, never by address, so cells can be
//! replaced in the grid without touching the topology.
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** `b ∈ forward(a)` iff `a ∈ backward(b)`.
//! 2. **No duplicate edges:** set semantics enforced by `FxHashSet`.
//! 3. A node exists iff it was added explicitly; removing its last edge
//!    does not remove it.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::position::Position;

#[derive(Debug, Clone, Default)]
struct Node {
    /// Positions this node references (outgoing edges).
    forward: FxHashSet<Position>,
    /// Positions that reference this node (incoming edges).
    backward: FxHashSet<Position>,
}

/// Directed graph of cell references.
#[derive(Debug, Clone, Default)]
pub struct DepGraph {
    nodes: FxHashMap<Position, Node>,
}

impl DepGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a node exists at `pos`. Idempotent.
    pub fn add_cell(&mut self, pos: Position) {
        self.nodes.entry(pos).or_default();
    }

    /// Returns true if a node exists at `pos`.
    pub fn contains(&self, pos: Position) -> bool {
        self.nodes.contains_key(&pos)
    }

    /// Insert the edge `from → to`. Both nodes must already exist.
    /// Idempotent for repeated identical edges.
    pub fn add_dependency(&mut self, from: Position, to: Position) {
        debug_assert!(self.contains(from), "add_dependency: no node at {}", from);
        debug_assert!(self.contains(to), "add_dependency: no node at {}", to);

        self.nodes.entry(from).or_default().forward.insert(to);
        self.nodes.entry(to).or_default().backward.insert(from);
    }

    /// Remove the edge `from → to`. Both nodes must already exist.
    pub fn remove_dependency(&mut self, from: Position, to: Position) {
        debug_assert!(self.contains(from), "remove_dependency: no node at {}", from);
        debug_assert!(self.contains(to), "remove_dependency: no node at {}", to);

        if let Some(node) = self.nodes.get_mut(&from) {
            node.forward.remove(&to);
        }
        if let Some(node) = self.nodes.get_mut(&to) {
            node.backward.remove(&from);
        }
    }

    /// Drop the node at `pos`, detaching every edge touching it.
    pub fn remove_cell(&mut self, pos: Position) {
        let Some(node) = self.nodes.remove(&pos) else {
            return;
        };
        for referent in node.forward {
            if let Some(n) = self.nodes.get_mut(&referent) {
                n.backward.remove(&pos);
            }
        }
        for referrer in node.backward {
            if let Some(n) = self.nodes.get_mut(&referrer) {
                n.forward.remove(&pos);
            }
        }
    }

    /// Snapshot of the positions `pos` references, sorted row-major.
    ///
    /// Empty when the node is absent. The sort keeps the sheet's rewiring
    /// and rollback order deterministic.
    pub fn forward_refs(&self, pos: Position) -> Vec<Position> {
        let mut refs: Vec<Position> = self
            .nodes
            .get(&pos)
            .into_iter()
            .flat_map(|n| n.forward.iter().copied())
            .collect();
        refs.sort_unstable();
        refs
    }

    /// Positions that reference `pos`, sorted row-major.
    pub fn backward_refs(&self, pos: Position) -> Vec<Position> {
        let mut refs: Vec<Position> = self
            .nodes
            .get(&pos)
            .into_iter()
            .flat_map(|n| n.backward.iter().copied())
            .collect();
        refs.sort_unstable();
        refs
    }

    /// Returns true iff no directed cycle passes through `start`.
    ///
    /// Iterative DFS along forward edges; a cycle exists iff `start` is
    /// re-reached. The per-call visited set keeps the probe linear in the
    /// reachable edges and safe against diamonds and self-loops. An absent
    /// node is trivially acyclic.
    pub fn is_acyclic_from(&self, start: Position) -> bool {
        let Some(node) = self.nodes.get(&start) else {
            return true;
        };

        let mut visited: FxHashSet<Position> = FxHashSet::default();
        let mut stack: Vec<Position> = node.forward.iter().copied().collect();

        while let Some(current) = stack.pop() {
            if current == start {
                return false;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(n) = self.nodes.get(&current) {
                stack.extend(n.forward.iter().copied());
            }
        }
        true
    }

    /// Walk backward edges from `start`, calling `visit` on every reachable
    /// node (including `start` itself) at most once each.
    ///
    /// No-op when the node is absent.
    pub fn invalidate_ancestors<F>(&self, start: Position, mut visit: F)
    where
        F: FnMut(Position),
    {
        if !self.contains(start) {
            return;
        }

        let mut seen: FxHashSet<Position> = FxHashSet::default();
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            if !seen.insert(current) {
                continue;
            }
            visit(current);
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.backward.iter().copied());
            }
        }
    }

    /// Number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All edges as `(from, to)` pairs, sorted. Test and diagnostic aid.
    pub fn edges(&self) -> Vec<(Position, Position)> {
        let mut edges: Vec<(Position, Position)> = self
            .nodes
            .iter()
            .flat_map(|(&from, node)| node.forward.iter().map(move |&to| (from, to)))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Check all invariants. Panics if any are violated.
    ///
    /// Only available in test builds.
    #[cfg(test)]
    pub fn assert_consistent(&self) {
        for (pos, node) in &self.nodes {
            for referent in &node.forward {
                assert!(
                    self.nodes
                        .get(referent)
                        .map_or(false, |n| n.backward.contains(pos)),
                    "missing backward edge: {} should list {} as a referrer",
                    referent,
                    pos
                );
            }
            for referrer in &node.backward {
                assert!(
                    self.nodes
                        .get(referrer)
                        .map_or(false, |n| n.forward.contains(pos)),
                    "missing forward edge: {} should list {} as a referent",
                    referrer,
                    pos
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(row: usize, col: usize) -> Position {
        Position::new(row, col)
    }

    /// Build a graph node with edges to the given referents, creating
    /// referent nodes as needed.
    fn wire(graph: &mut DepGraph, from: Position, referents: &[Position]) {
        graph.add_cell(from);
        for &to in referents {
            graph.add_cell(to);
            graph.add_dependency(from, to);
        }
    }

    #[test]
    fn test_empty_graph() {
        let graph = DepGraph::new();
        assert_eq!(graph.node_count(), 0);
        assert!(!graph.contains(pos(0, 0)));
        assert!(graph.is_acyclic_from(pos(0, 0)));
        assert!(graph.edges().is_empty());
        graph.assert_consistent();
    }

    #[test]
    fn test_add_cell_idempotent() {
        let mut graph = DepGraph::new();
        wire(&mut graph, pos(0, 1), &[pos(0, 0)]);
        graph.add_cell(pos(0, 1));
        graph.assert_consistent();

        // Re-adding must not wipe existing edges.
        assert_eq!(graph.forward_refs(pos(0, 1)), vec![pos(0, 0)]);
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_single_edge_symmetry() {
        // B1 references A1
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        wire(&mut graph, b1, &[a1]);
        graph.assert_consistent();

        assert_eq!(graph.forward_refs(b1), vec![a1]);
        assert_eq!(graph.backward_refs(a1), vec![b1]);
        assert!(graph.forward_refs(a1).is_empty());
        assert!(graph.backward_refs(b1).is_empty());
    }

    #[test]
    fn test_duplicate_edge_is_single() {
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        wire(&mut graph, b1, &[a1]);
        graph.add_dependency(b1, a1);
        graph.assert_consistent();

        assert_eq!(graph.edges(), vec![(b1, a1)]);
    }

    #[test]
    fn test_remove_dependency() {
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        wire(&mut graph, b1, &[a1]);

        graph.remove_dependency(b1, a1);
        graph.assert_consistent();

        assert!(graph.forward_refs(b1).is_empty());
        assert!(graph.backward_refs(a1).is_empty());
        // Nodes survive losing their last edge.
        assert!(graph.contains(a1));
        assert!(graph.contains(b1));
    }

    #[test]
    fn test_remove_cell_detaches_both_directions() {
        // B1 → A1, C1 → B1; removing B1 strips both edges.
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        let c1 = pos(0, 2);
        wire(&mut graph, b1, &[a1]);
        wire(&mut graph, c1, &[b1]);

        graph.remove_cell(b1);
        graph.assert_consistent();

        assert!(!graph.contains(b1));
        assert!(graph.backward_refs(a1).is_empty());
        assert!(graph.forward_refs(c1).is_empty());
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_remove_cell_with_self_loop() {
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        wire(&mut graph, a1, &[a1]);

        graph.remove_cell(a1);
        graph.assert_consistent();
        assert_eq!(graph.node_count(), 0);
    }

    #[test]
    fn test_acyclic_chain() {
        // C1 → B1 → A1
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        let c1 = pos(0, 2);
        wire(&mut graph, b1, &[a1]);
        wire(&mut graph, c1, &[b1]);

        assert!(graph.is_acyclic_from(a1));
        assert!(graph.is_acyclic_from(b1));
        assert!(graph.is_acyclic_from(c1));
    }

    #[test]
    fn test_self_loop_detected() {
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        wire(&mut graph, a1, &[a1]);

        assert!(!graph.is_acyclic_from(a1));
    }

    #[test]
    fn test_two_node_cycle_detected() {
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        wire(&mut graph, a1, &[b1]);
        wire(&mut graph, b1, &[a1]);

        assert!(!graph.is_acyclic_from(a1));
        assert!(!graph.is_acyclic_from(b1));
    }

    #[test]
    fn test_indirect_cycle_detected() {
        // A1 → B1 → C1 → A1
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        let c1 = pos(0, 2);
        wire(&mut graph, a1, &[b1]);
        wire(&mut graph, b1, &[c1]);
        wire(&mut graph, c1, &[a1]);

        assert!(!graph.is_acyclic_from(a1));
        assert!(!graph.is_acyclic_from(b1));
        assert!(!graph.is_acyclic_from(c1));
    }

    #[test]
    fn test_diamond_is_acyclic() {
        // D1 → {B1, C1} → A1
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        let c1 = pos(0, 2);
        let d1 = pos(0, 3);
        wire(&mut graph, b1, &[a1]);
        wire(&mut graph, c1, &[a1]);
        wire(&mut graph, d1, &[b1, c1]);
        graph.assert_consistent();

        for p in [a1, b1, c1, d1] {
            assert!(graph.is_acyclic_from(p));
        }
    }

    #[test]
    fn test_cycle_elsewhere_not_through_probed_node() {
        // B1 ↔ C1 cycle; A1 only referenced by B1. No cycle passes
        // through A1 itself.
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        let c1 = pos(0, 2);
        wire(&mut graph, b1, &[c1, a1]);
        wire(&mut graph, c1, &[b1]);

        assert!(graph.is_acyclic_from(a1));
        assert!(!graph.is_acyclic_from(b1));
    }

    #[test]
    fn test_invalidate_ancestors_walks_backward() {
        // C1 → B1 → A1; invalidating from A1 must visit all three,
        // invalidating from C1 only C1.
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        let c1 = pos(0, 2);
        wire(&mut graph, b1, &[a1]);
        wire(&mut graph, c1, &[b1]);

        let mut visited = Vec::new();
        graph.invalidate_ancestors(a1, |p| visited.push(p));
        visited.sort_unstable();
        assert_eq!(visited, vec![a1, b1, c1]);

        let mut visited = Vec::new();
        graph.invalidate_ancestors(c1, |p| visited.push(p));
        assert_eq!(visited, vec![c1]);
    }

    #[test]
    fn test_invalidate_ancestors_diamond_visits_once() {
        // D1 → {B1, C1} → A1: from A1, D1 is reachable two ways but
        // must be visited once.
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let b1 = pos(0, 1);
        let c1 = pos(0, 2);
        let d1 = pos(0, 3);
        wire(&mut graph, b1, &[a1]);
        wire(&mut graph, c1, &[a1]);
        wire(&mut graph, d1, &[b1, c1]);

        let mut visits: Vec<Position> = Vec::new();
        graph.invalidate_ancestors(a1, |p| visits.push(p));
        assert_eq!(visits.len(), 4);
        visits.sort_unstable();
        visits.dedup();
        assert_eq!(visits.len(), 4);
    }

    #[test]
    fn test_invalidate_ancestors_self_loop_terminates() {
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        wire(&mut graph, a1, &[a1]);

        let mut count = 0;
        graph.invalidate_ancestors(a1, |_| count += 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_invalidate_ancestors_absent_node_is_noop() {
        let graph = DepGraph::new();
        let mut count = 0;
        graph.invalidate_ancestors(pos(0, 0), |_| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_rewire_matches_fresh_graph() {
        // Replacing B1's referents {A1} with {A2} leaves the same edge set
        // as wiring {A2} directly.
        let mut graph = DepGraph::new();
        let a1 = pos(0, 0);
        let a2 = pos(1, 0);
        let b1 = pos(0, 1);
        wire(&mut graph, b1, &[a1]);

        for to in graph.forward_refs(b1) {
            graph.remove_dependency(b1, to);
        }
        wire(&mut graph, b1, &[a2]);
        graph.assert_consistent();

        let mut fresh = DepGraph::new();
        wire(&mut fresh, b1, &[a2]);

        assert_eq!(graph.edges(), fresh.edges());
    }
}
