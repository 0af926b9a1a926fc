//! Immutable distance index over a tree.
//!
//! # Overview
//! A `TreeSnapshot` stores, for every node, its parent, the length of the
//! branch above it, its depth (sum of branch lengths from the root) and its
//! level (number of edges from the root). With these, the path length between
//! two nodes is
//!
//! ```text
//! d(u, v) = depth(u) + depth(v) - 2 * depth(lca(u, v))
//! ```
//!
//! where the lowest common ancestor is found by lifting the deeper node to
//! the same level and then walking both up in lockstep.
//!
//! The snapshot is read-only, so it can be shared across rayon workers while
//! insertion positions are searched in parallel.
//!
//! # Points
//! Insertion positions do not have to coincide with nodes. A [`Point`] names
//! a position `above` units up the branch that leads into `node`:
//!
//! ```text
//!        parent
//!          |
//!          *   <- Point { node, above: 0.3 }
//!          |
//!         node      (branch length 0.5)
//! ```

use crate::error::Result;
use crate::tree::{NodeId, Tree};
use std::collections::HashMap;

/// Lengths closer than this are treated as equal when locating points.
pub const LENGTH_TOLERANCE: f64 = 1e-9;

/// A position on a tree: `above` units up the branch into `node`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub node: NodeId,
    pub above: f64,
}

impl Point {
    /// The point sitting exactly on `node`.
    pub fn at(node: NodeId) -> Self {
        Point { node, above: 0.0 }
    }
}

#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    parent: Vec<Option<NodeId>>,
    branch: Vec<f64>,
    depth: Vec<f64>,
    level: Vec<usize>,
    root: NodeId,
    leaves: HashMap<String, NodeId>,
}

impl TreeSnapshot {
    /// Index every node of `tree` in a single preorder pass.
    pub fn from_tree(tree: &Tree) -> Self {
        let n = tree.size();
        let mut snapshot = TreeSnapshot {
            parent: vec![None; n],
            branch: vec![0.0; n],
            depth: vec![0.0; n],
            level: vec![0; n],
            root: tree.root(),
            leaves: HashMap::with_capacity(tree.n_leaves()),
        };

        for id in tree.preorder() {
            let node = tree.get(id);
            if let Some(parent) = node.parent {
                let length = node.branch_length.unwrap_or(0.0);
                snapshot.parent[id] = Some(parent);
                snapshot.branch[id] = length;
                snapshot.depth[id] = snapshot.depth[parent] + length;
                snapshot.level[id] = snapshot.level[parent] + 1;
            }
            if let (true, Some(name)) = (node.is_leaf(), &node.name) {
                snapshot.leaves.insert(name.clone(), id);
            }
        }
        snapshot
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parent[id]
    }

    /// Branch length above `id` (0.0 for the root).
    pub fn branch_length(&self, id: NodeId) -> f64 {
        self.branch[id]
    }

    pub fn depth(&self, id: NodeId) -> f64 {
        self.depth[id]
    }

    /// Node id for a leaf label.
    ///
    /// # Errors
    /// `InvalidLeaf` if the label is not in the tree.
    pub fn leaf(&self, name: &str) -> Result<NodeId> {
        self.leaves
            .get(name)
            .copied()
            .ok_or_else(|| crate::error::CompletionError::InvalidLeaf(name.to_string()))
    }

    /// Lowest common ancestor by ancestor-chain walk.
    pub fn lca(&self, u: NodeId, v: NodeId) -> NodeId {
        let (mut u, mut v) = (u, v);
        while self.level[u] > self.level[v] {
            u = self.up(u);
        }
        while self.level[v] > self.level[u] {
            v = self.up(v);
        }
        while u != v {
            u = self.up(u);
            v = self.up(v);
        }
        u
    }

    fn up(&self, id: NodeId) -> NodeId {
        self.parent[id].unwrap_or(id)
    }

    /// Path length between two nodes.
    pub fn node_distance(&self, u: NodeId, v: NodeId) -> f64 {
        let w = self.lca(u, v);
        self.depth[u] + self.depth[v] - 2.0 * self.depth[w]
    }

    /// Path length between two leaves.
    pub fn distance(&self, a: &str, b: &str) -> Result<f64> {
        Ok(self.node_distance(self.leaf(a)?, self.leaf(b)?))
    }

    /// Length of the branch leading to a leaf.
    pub fn terminal_branch(&self, leaf: &str) -> Result<f64> {
        Ok(self.branch[self.leaf(leaf)?])
    }

    /// `distance(l1, l2) - terminal_branch(l2)`: how far from `l1` the branch
    /// carrying `l2` is reached.
    pub fn cutback(&self, l1: &str, l2: &str) -> Result<f64> {
        Ok(self.distance(l1, l2)? - self.terminal_branch(l2)?)
    }

    // ##########
    // # POINTS #
    // ##########

    pub fn point_depth(&self, p: Point) -> f64 {
        self.depth[p.node] - p.above
    }

    /// Canonical form of a point: a point at the top of a branch is moved to
    /// the parent node, and `above` is clamped into the branch.
    pub fn normalize(&self, p: Point) -> Point {
        let mut p = Point { node: p.node, above: p.above.max(0.0) };
        while let Some(parent) = self.parent[p.node] {
            if p.above < self.branch[p.node] - LENGTH_TOLERANCE {
                break;
            }
            p = Point::at(parent);
        }
        if self.parent[p.node].is_none() || p.above < LENGTH_TOLERANCE {
            p.above = 0.0;
        }
        p
    }

    /// Move `length` towards the root. Walking past the root clamps to it.
    pub fn walk_up(&self, p: Point, length: f64) -> Point {
        let mut p = self.normalize(p);
        let mut remaining = length.max(0.0);
        while let Some(parent) = self.parent[p.node] {
            let room = self.branch[p.node] - p.above;
            if remaining < room - LENGTH_TOLERANCE {
                return self.normalize(Point { node: p.node, above: p.above + remaining });
            }
            remaining -= room;
            p = Point::at(parent);
        }
        p
    }

    /// Depth of the highest position on the path between two points.
    fn meeting_depth(&self, p: Point, q: Point) -> f64 {
        let w = self.lca(p.node, q.node);
        self.point_depth(p).min(self.point_depth(q)).min(self.depth[w])
    }

    pub fn point_distance(&self, p: Point, q: Point) -> f64 {
        let (p, q) = (self.normalize(p), self.normalize(q));
        let meet = self.meeting_depth(p, q);
        self.point_depth(p) + self.point_depth(q) - 2.0 * meet
    }

    /// Branch-length midpoint of the path between two points.
    pub fn midpoint(&self, p: Point, q: Point) -> Point {
        let (p, q) = (self.normalize(p), self.normalize(q));
        let half = self.point_distance(p, q) / 2.0;
        let rise = self.point_depth(p) - self.meeting_depth(p, q);
        if half <= rise {
            self.walk_up(p, half)
        } else {
            self.walk_up(q, half)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompletionError;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// ```text
    ///            root
    ///        /    |    \
    ///     A:0.1 B:0.2  X:0.5
    ///                 /    \
    ///              C:0.3  D:0.4
    /// ```
    fn scenario() -> (Tree, TreeSnapshot) {
        let tree = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4):0.5);").unwrap();
        let snapshot = TreeSnapshot::from_tree(&tree);
        (tree, snapshot)
    }

    #[test]
    fn leaf_distances() {
        let (_, s) = scenario();
        assert!(close(s.distance("A", "B").unwrap(), 0.3));
        assert!(close(s.distance("A", "C").unwrap(), 0.9));
        assert!(close(s.distance("C", "D").unwrap(), 0.7));
        assert!(close(s.distance("D", "D").unwrap(), 0.0));
    }

    #[test]
    fn cutback_subtracts_terminal_branch_of_second_leaf() {
        let (_, s) = scenario();
        assert!(close(s.terminal_branch("D").unwrap(), 0.4));
        assert!(close(s.cutback("A", "D").unwrap(), 1.0 - 0.4));
        assert!(close(s.cutback("D", "A").unwrap(), 1.0 - 0.1));
    }

    #[test]
    fn unknown_leaf_is_invalid() {
        let (_, s) = scenario();
        assert!(matches!(s.distance("A", "Q"), Err(CompletionError::InvalidLeaf(l)) if l == "Q"));
    }

    #[test]
    fn lca_of_leaves() {
        let (tree, s) = scenario();
        let c = tree.leaf("C").unwrap();
        let d = tree.leaf("D").unwrap();
        let a = tree.leaf("A").unwrap();
        assert_eq!(s.lca(c, d), tree.parent(c).unwrap());
        assert_eq!(s.lca(a, d), tree.root());
        assert_eq!(s.lca(c, c), c);
    }

    #[test]
    fn walk_up_stops_inside_branch() {
        let (tree, s) = scenario();
        let c = tree.leaf("C").unwrap();
        let x = tree.parent(c).unwrap();
        let p = s.walk_up(Point::at(c), 0.5);
        assert_eq!(p.node, x);
        assert!(close(p.above, 0.2));
    }

    #[test]
    fn walk_up_clamps_at_root() {
        let (tree, s) = scenario();
        let c = tree.leaf("C").unwrap();
        assert_eq!(s.walk_up(Point::at(c), 0.8), Point::at(tree.root()));
        assert_eq!(s.walk_up(Point::at(c), 42.0), Point::at(tree.root()));
    }

    #[test]
    fn points_at_branch_tops_normalize_to_parent() {
        let (tree, s) = scenario();
        let a = tree.leaf("A").unwrap();
        let p = s.normalize(Point { node: a, above: 0.1 });
        assert_eq!(p, Point::at(tree.root()));
    }

    /// ```text
    ///              root
    ///          /          \
    ///       X:1            Y:1
    ///      /   \          /   \
    ///    C:1   D:1      E:1   F:1
    /// ```
    #[test]
    fn midpoint_between_points_on_different_sides() {
        let tree = Tree::from_newick("((C:1,D:1):1,(E:1,F:1):1);").unwrap();
        let s = TreeSnapshot::from_tree(&tree);
        let c = tree.leaf("C").unwrap();
        let e = tree.leaf("E").unwrap();
        let x = tree.parent(c).unwrap();
        let y = tree.parent(e).unwrap();

        let p = s.walk_up(Point::at(c), 1.5);
        let q = s.walk_up(Point::at(e), 0.5);
        assert_eq!(p.node, x);
        assert!(close(s.point_distance(p, q), 2.0));

        let mid = s.midpoint(p, q);
        assert_eq!(mid.node, y);
        assert!(close(mid.above, 0.5));
        assert!(close(s.point_distance(p, mid), 1.0));
        assert!(close(s.point_distance(mid, q), 1.0));
    }

    #[test]
    fn midpoint_along_an_ancestor_path() {
        let tree = Tree::from_newick("((C:1,D:1):1,(E:1,F:1):1);").unwrap();
        let s = TreeSnapshot::from_tree(&tree);
        let c = tree.leaf("C").unwrap();
        let root = Point::at(tree.root());

        let mid = s.midpoint(root, Point::at(c));
        assert_eq!(mid, Point::at(tree.parent(c).unwrap()));
        assert_eq!(s.midpoint(Point::at(c), root), mid);
        assert_eq!(s.midpoint(root, root), root);
    }
}
