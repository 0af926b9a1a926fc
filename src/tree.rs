//! Arena representation of a rooted phylogenetic tree.
//!
//! # Overview
//! Nodes live in a flat `Vec<Node>` and refer to each other by index, so a
//! completed tree is simply a clone of the input arena with extra nodes
//! appended at the end. Existing node ids never change during completion,
//! which lets an immutable [`TreeSnapshot`](crate::snapshot::TreeSnapshot)
//! taken before insertion keep describing the original branches.
//!
//! Newick text is treated as a boundary format: parsing is delegated to
//! `phylotree` and the result is copied into the arena, the same way the
//! distance snapshots read a `phylotree` tree.

use crate::error::{CompletionError, Result};
use phylotree::tree::Tree as PhyloTree;
use std::collections::{BTreeSet, HashMap, HashSet};

pub type NodeId = usize;

/// A node of the arena.
///
/// Leaves must carry a `name`; internal nodes may carry one too (usually a
/// support value from the input).
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Length of the branch to the parent. Missing lengths are read as 0.0.
    pub branch_length: Option<f64>,
}

impl Node {
    fn new(name: Option<String>, branch_length: Option<f64>) -> Self {
        Node { name, parent: None, children: Vec::new(), branch_length }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    leaf_index: HashMap<String, NodeId>,
}

impl Tree {
    /// Parse a single Newick string (one tree, terminated by `;`).
    ///
    /// BEAST-style `[&...]` annotations are removed before parsing.
    ///
    /// # Errors
    /// `InvalidNewick` if the text does not parse, is not a single clade, a
    /// leaf is unnamed, or a leaf label occurs twice.
    pub fn from_newick(newick: &str) -> Result<Self> {
        let cleaned = crate::io::strip_beast_annotations(newick.trim());
        if cleaned.is_empty() {
            return Err(CompletionError::InvalidNewick("empty input".to_string()));
        }
        check_shape(&cleaned)?;
        let phylo = PhyloTree::from_newick(&cleaned)
            .map_err(|e| CompletionError::InvalidNewick(e.to_string()))?;
        Self::from_phylo(&phylo)
    }

    /// Copy a `phylotree` tree into the arena, preserving child order.
    pub fn from_phylo(phylo: &PhyloTree) -> Result<Self> {
        let invalid = |e: phylotree::tree::TreeError| CompletionError::InvalidNewick(e.to_string());

        let phylo_root = phylo.get_root().map_err(invalid)?;
        let root_node = phylo.get(&phylo_root).map_err(invalid)?;
        let mut tree = Tree {
            nodes: vec![Node::new(label(&root_node.name), root_node.parent_edge)],
            root: 0,
            leaf_index: HashMap::new(),
        };

        let mut stack = vec![(phylo_root, tree.root)];
        while let Some((phylo_id, id)) = stack.pop() {
            let children = phylo.get(&phylo_id).map_err(invalid)?.children.clone();
            for child in children {
                let node = phylo.get(&child).map_err(invalid)?;
                let new_id = tree.push_child(id, Node::new(label(&node.name), node.parent_edge));
                stack.push((child, new_id));
            }
        }

        tree.rebuild_leaf_index()?;
        Ok(tree)
    }

    /// Write the tree as Newick text. Internal names are kept, lengths use
    /// the shortest round-trip float representation.
    pub fn to_newick(&self) -> String {
        enum Visit {
            Enter(NodeId),
            Separator,
            Exit(NodeId),
        }

        let mut out = String::new();
        let mut stack = vec![Visit::Enter(self.root)];
        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id) => {
                    let node = &self.nodes[id];
                    if node.is_leaf() {
                        self.write_label(id, &mut out);
                        continue;
                    }
                    out.push('(');
                    stack.push(Visit::Exit(id));
                    for (i, &child) in node.children.iter().enumerate().rev() {
                        stack.push(Visit::Enter(child));
                        if i > 0 {
                            stack.push(Visit::Separator);
                        }
                    }
                }
                Visit::Separator => out.push(','),
                Visit::Exit(id) => {
                    out.push(')');
                    self.write_label(id, &mut out);
                }
            }
        }
        out.push(';');
        out
    }

    fn write_label(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        if let Some(name) = &node.name {
            if name.chars().any(|c| "(),:;[] \t'\"".contains(c)) {
                out.push('"');
                out.push_str(name);
                out.push('"');
            } else {
                out.push_str(name);
            }
        }
        if let Some(length) = node.branch_length {
            out.push(':');
            out.push_str(&length.to_string());
        }
    }

    // ##########
    // # ACCESS #
    // ##########

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Node by id. Panics if `id` does not belong to this tree.
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Number of nodes (internal and leaves).
    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.leaf_index.len()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.nodes[id].is_leaf()
    }

    /// Branch length above `id`, `None` when absent in the input.
    pub fn branch_length(&self, id: NodeId) -> Option<f64> {
        self.nodes[id].branch_length
    }

    /// Node id of the leaf labelled `name`.
    pub fn leaf(&self, name: &str) -> Result<NodeId> {
        self.leaf_index
            .get(name)
            .copied()
            .ok_or_else(|| CompletionError::InvalidLeaf(name.to_string()))
    }

    pub fn has_leaf(&self, name: &str) -> bool {
        self.leaf_index.contains_key(name)
    }

    /// All leaf labels, sorted.
    pub fn leaf_labels(&self) -> BTreeSet<String> {
        self.leaf_index.keys().cloned().collect()
    }

    /// Node ids in preorder, children visited in their stored order.
    pub fn preorder(&self) -> Vec<NodeId> {
        self.preorder_from(self.root)
    }

    fn preorder_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Node ids with every child listed before its parent.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = self.preorder();
        order.reverse();
        order
    }

    /// Sorted labels of the leaves below `id` (including `id` itself if it is a leaf).
    pub fn subtree_leaves(&self, id: NodeId) -> Vec<String> {
        let mut labels: Vec<String> = self
            .preorder_from(id)
            .into_iter()
            .filter(|&n| self.is_leaf(n))
            .filter_map(|n| self.nodes[n].name.clone())
            .collect();
        labels.sort();
        labels
    }

    // ##############
    // # STRUCTURAL #
    // ##############

    fn push_child(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        let id = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        id
    }

    fn rebuild_leaf_index(&mut self) -> Result<()> {
        self.leaf_index.clear();
        for (id, node) in self.nodes.iter().enumerate() {
            if !node.is_leaf() {
                continue;
            }
            let name = node
                .name
                .clone()
                .ok_or_else(|| {
                    CompletionError::InvalidNewick(format!("leaf node {id} has no label"))
                })?;
            if self.leaf_index.insert(name.clone(), id).is_some() {
                return Err(CompletionError::InvalidNewick(format!(
                    "duplicate leaf label '{name}'"
                )));
            }
        }
        Ok(())
    }

    /// Relabel leaves through `translate`; labels without an entry are kept.
    pub fn rename_leaves(&mut self, translate: &HashMap<String, String>) -> Result<()> {
        for node in self.nodes.iter_mut().filter(|n| n.is_leaf()) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
        self.rebuild_leaf_index()
    }

    /// Independent copy of the clade rooted at `id`. The copy's root has no
    /// branch length; the caller decides how it is attached.
    pub fn extract_subtree(&self, id: NodeId) -> Tree {
        let source = &self.nodes[id];
        let mut fragment = Tree {
            nodes: vec![Node::new(source.name.clone(), None)],
            root: 0,
            leaf_index: HashMap::new(),
        };
        let mut stack = vec![(id, fragment.root)];
        while let Some((old, new)) = stack.pop() {
            for &child in &self.nodes[old].children {
                let node = &self.nodes[child];
                let copy =
                    fragment.push_child(new, Node::new(node.name.clone(), node.branch_length));
                stack.push((child, copy));
            }
        }
        for (new_id, node) in fragment.nodes.iter().enumerate() {
            if let (true, Some(name)) = (node.is_leaf(), &node.name) {
                fragment.leaf_index.insert(name.clone(), new_id);
            }
        }
        fragment
    }

    /// Multiply every branch length (the root's included, if any) by `factor`.
    pub fn scale_branches(&mut self, factor: f64) {
        for node in &mut self.nodes {
            if let Some(length) = node.branch_length.as_mut() {
                *length *= factor;
            }
        }
    }

    /// Insert a new internal node on the branch above `child`, `above` units
    /// from `child`. The two resulting segments sum to the original length.
    ///
    /// On the root this creates a new root with `child` hanging below it.
    /// Returns the id of the new node.
    pub fn split_edge(&mut self, child: NodeId, above: f64) -> NodeId {
        let id = self.nodes.len();
        match self.nodes[child].parent {
            Some(parent) => {
                let length = self.nodes[child].branch_length.unwrap_or(0.0);
                let lower = above.clamp(0.0, length.max(0.0));
                let mut node = Node::new(None, Some(length - lower));
                node.parent = Some(parent);
                node.children.push(child);
                self.nodes.push(node);

                if let Some(slot) = self.nodes[parent].children.iter_mut().find(|c| **c == child) {
                    *slot = id;
                }
                self.nodes[child].parent = Some(id);
                self.nodes[child].branch_length = Some(lower);
            }
            None => {
                let mut node = Node::new(None, self.nodes[child].branch_length);
                node.children.push(child);
                self.nodes.push(node);
                self.nodes[child].parent = Some(id);
                self.nodes[child].branch_length = Some(0.0);
                self.root = id;
            }
        }
        id
    }

    /// Attach a copy of `fragment` below `parent` with the given branch length.
    /// A leaf `parent` is first lifted onto a zero-length branch so that it
    /// stays a leaf.
    ///
    /// # Errors
    /// `InvalidNewick` if a fragment leaf label already exists in this tree.
    pub fn graft(&mut self, parent: NodeId, fragment: &Tree, branch_length: f64) -> Result<NodeId> {
        if let Some(clash) = fragment.leaf_index.keys().find(|l| self.leaf_index.contains_key(*l)) {
            return Err(CompletionError::InvalidNewick(format!("duplicate leaf label '{clash}'")));
        }

        let anchor = if self.is_leaf(parent) { self.split_edge(parent, 0.0) } else { parent };

        let offset = self.nodes.len();
        for (i, node) in fragment.nodes.iter().enumerate() {
            let mut copy = node.clone();
            copy.parent = node.parent.map(|p| p + offset);
            copy.children = node.children.iter().map(|c| c + offset).collect();
            if i == fragment.root {
                copy.parent = Some(anchor);
                copy.branch_length = Some(branch_length);
            }
            self.nodes.push(copy);
        }
        let grafted = fragment.root + offset;
        self.nodes[anchor].children.push(grafted);
        for (label, id) in &fragment.leaf_index {
            self.leaf_index.insert(label.clone(), id + offset);
        }
        Ok(grafted)
    }

    /// Copy of this tree restricted to the leaves in `keep`. Unary nodes left
    /// behind are suppressed and their branch lengths merged, so path lengths
    /// between kept leaves are unchanged.
    ///
    /// # Errors
    /// `InsufficientCommonLeaves` if no leaf of `keep` is present.
    pub fn pruned(&self, keep: &HashSet<String>) -> Result<Tree> {
        let mut kept = vec![0usize; self.nodes.len()];
        for id in self.postorder() {
            let node = &self.nodes[id];
            kept[id] = if node.is_leaf() {
                usize::from(node.name.as_ref().is_some_and(|n| keep.contains(n)))
            } else {
                node.children.iter().map(|&c| kept[c]).sum()
            };
        }
        if kept[self.root] == 0 {
            return Err(CompletionError::InsufficientCommonLeaves { found: 0 });
        }

        let kept_children = |id: NodeId| -> Vec<NodeId> {
            self.nodes[id].children.iter().copied().filter(|&c| kept[c] > 0).collect()
        };

        let mut top = self.root;
        let mut root_length = self.nodes[top].branch_length;
        loop {
            let below = kept_children(top);
            if below.len() != 1 {
                break;
            }
            top = below[0];
            root_length = None;
        }

        let mut pruned = Tree {
            nodes: vec![Node::new(self.nodes[top].name.clone(), root_length)],
            root: 0,
            leaf_index: HashMap::new(),
        };
        let mut stack = vec![(top, pruned.root)];
        while let Some((old, new)) = stack.pop() {
            for child in kept_children(old) {
                let mut bottom = child;
                let mut length = self.nodes[child].branch_length.unwrap_or(0.0);
                loop {
                    let below = kept_children(bottom);
                    if below.len() != 1 {
                        break;
                    }
                    bottom = below[0];
                    length += self.nodes[bottom].branch_length.unwrap_or(0.0);
                }
                let name = self.nodes[bottom].name.clone();
                let copy = pruned.push_child(new, Node::new(name, Some(length)));
                stack.push((bottom, copy));
            }
        }
        pruned.rebuild_leaf_index()?;
        Ok(pruned)
    }

    /// Join two trees under a synthetic root. Both original roots hang from
    /// it on zero-length branches, `first` before `second`.
    pub fn join(first: &Tree, second: &Tree) -> Result<Tree> {
        let mut joined = Tree {
            nodes: vec![Node::new(None, None)],
            root: 0,
            leaf_index: HashMap::new(),
        };
        joined.graft(joined.root, first, 0.0)?;
        joined.graft(joined.root, second, 0.0)?;
        Ok(joined)
    }
}

/// Node label as read by `phylotree`, without the quotes it keeps around
/// quoted names. Empty labels become `None`.
fn label(name: &Option<String>) -> Option<String> {
    let name = name.as_deref()?;
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|&q| name.strip_prefix(q)?.strip_suffix(q))
        .unwrap_or(name);
    (!unquoted.is_empty()).then(|| unquoted.to_string())
}

/// Reject text that is not exactly one clade: unbalanced parentheses, a
/// comma outside the outermost parentheses, or a second clade after the
/// first one closes. Quoted names and `[...]` comments are skipped.
fn check_shape(newick: &str) -> Result<()> {
    let invalid = |msg: &str| Err(CompletionError::InvalidNewick(msg.to_string()));
    let mut depth = 0usize;
    let mut closed = false;
    let mut quoted = false;
    let mut comment = false;

    for c in newick.chars() {
        match c {
            '"' if !comment => quoted = !quoted,
            _ if quoted => {}
            '[' => comment = true,
            ']' => comment = false,
            _ if comment => {}
            '(' if closed => return invalid("text continues after the root clade"),
            '(' => depth += 1,
            ')' if depth == 0 => return invalid("unbalanced ')'"),
            ')' => {
                depth -= 1;
                closed = depth == 0;
            }
            ',' if depth == 0 => return invalid("',' outside the root clade"),
            _ => {}
        }
    }
    if quoted {
        return invalid("unterminated quoted label");
    }
    if depth > 0 {
        return invalid("unbalanced '('");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = "(A:0.1,B:0.2,(C:0.3,D:0.4):0.5);";

    #[test]
    fn newick_round_trip() {
        let tree = Tree::from_newick(SCENARIO).unwrap();
        assert_eq!(tree.n_leaves(), 4);
        assert_eq!(tree.size(), 6);
        assert_eq!(tree.to_newick(), SCENARIO);
    }

    #[test]
    fn internal_support_values_are_kept() {
        let tree = Tree::from_newick("((A:1,B:1)95:0.5,C:2);").unwrap();
        assert_eq!(tree.n_leaves(), 3);
        let written = tree.to_newick();
        assert_eq!(Tree::from_newick(&written).unwrap().to_newick(), written);
    }

    #[test]
    fn beast_annotations_are_ignored() {
        let tree = Tree::from_newick("(A:[&rate=0.5]1,B:[&rate=0.1]2);").unwrap();
        assert_eq!(tree.to_newick(), "(A:1,B:2);");
    }

    #[test]
    fn text_outside_a_single_clade_is_rejected() {
        let malformed = [
            "A:1,B:1;",
            "(A:1,B:1),C:1;",
            "((A:1,B:1),C:1",
            "(A:1,B:1));",
            "(A:1,B:1)(C:1,D:1);",
        ];
        for newick in malformed {
            assert!(
                matches!(Tree::from_newick(newick), Err(CompletionError::InvalidNewick(_))),
                "{newick}"
            );
        }
        assert!(Tree::from_newick("(\"A,1\":1,B:1);").unwrap().has_leaf("A,1"));
    }

    #[test]
    fn quoted_labels_survive_a_round_trip() {
        let tree = Tree::from_newick("((Homo_sapiens:1,\"Pan paniscus\":1):1,Gorilla:2);").unwrap();
        assert!(tree.has_leaf("Pan paniscus"));

        let written = tree.to_newick();
        assert_eq!(written, "((Homo_sapiens:1,\"Pan paniscus\":1):1,Gorilla:2);");
        let reread = Tree::from_newick(&written).unwrap();
        assert_eq!(reread.leaf_labels(), tree.leaf_labels());
        assert!(reread.has_leaf("Pan paniscus"));
    }

    #[test]
    fn duplicate_leaves_are_rejected() {
        let err = Tree::from_newick("(A:1,A:2);").unwrap_err();
        assert!(matches!(err, CompletionError::InvalidNewick(_)));
    }

    #[test]
    fn unknown_leaf_lookup_fails() {
        let tree = Tree::from_newick(SCENARIO).unwrap();
        assert!(matches!(tree.leaf("Z"), Err(CompletionError::InvalidLeaf(_))));
        assert!(tree.leaf("C").is_ok());
    }

    #[test]
    fn postorder_lists_children_first() {
        let tree = Tree::from_newick(SCENARIO).unwrap();
        let order = tree.postorder();
        let position = |id: NodeId| order.iter().position(|&x| x == id).unwrap();
        for id in tree.preorder() {
            if let Some(parent) = tree.parent(id) {
                assert!(position(id) < position(parent));
            }
        }
        assert_eq!(*order.last().unwrap(), tree.root());
    }

    #[test]
    fn subtree_leaves_are_sorted() {
        let tree = Tree::from_newick("((D:1,C:1):1,(B:1,A:1):1);").unwrap();
        let parent_of_c = tree.parent(tree.leaf("C").unwrap()).unwrap();
        assert_eq!(tree.subtree_leaves(parent_of_c), vec!["C", "D"]);
        assert_eq!(tree.subtree_leaves(tree.root()).len(), 4);
    }

    #[test]
    fn split_edge_preserves_length() {
        let mut tree = Tree::from_newick(SCENARIO).unwrap();
        let d = tree.leaf("D").unwrap();
        let new = tree.split_edge(d, 0.1);
        assert_eq!(tree.parent(d), Some(new));
        assert!((tree.branch_length(d).unwrap() - 0.1).abs() < 1e-12);
        assert!((tree.branch_length(new).unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(tree.n_leaves(), 4);
    }

    #[test]
    fn graft_onto_leaf_keeps_the_leaf() {
        let mut tree = Tree::from_newick("(A:1,B:1);").unwrap();
        let donor = Tree::from_newick("(X:1,Y:1);").unwrap();
        let fragment = donor.extract_subtree(donor.leaf("X").unwrap());
        let a = tree.leaf("A").unwrap();
        tree.graft(a, &fragment, 0.5).unwrap();
        assert_eq!(tree.n_leaves(), 3);
        assert!(tree.is_leaf(tree.leaf("A").unwrap()));
        assert_eq!(tree.to_newick(), "((A:0,X:0.5):1,B:1);");
    }

    #[test]
    fn graft_rejects_existing_labels() {
        let mut tree = Tree::from_newick("(A:1,B:1);").unwrap();
        let donor = Tree::from_newick("(A:1,Y:1);").unwrap();
        let fragment = donor.extract_subtree(donor.leaf("A").unwrap());
        let root = tree.root();
        assert!(tree.graft(root, &fragment, 1.0).is_err());
    }

    #[test]
    fn extract_and_scale_subtree() {
        let tree = Tree::from_newick("((A:1,B:1):1,(C:1,(D:1,E:2):1):1);").unwrap();
        let de = tree.parent(tree.leaf("D").unwrap()).unwrap();
        let mut fragment = tree.extract_subtree(de);
        fragment.scale_branches(2.0);
        assert_eq!(fragment.to_newick(), "(D:2,E:4);");
        assert_eq!(fragment.leaf_labels().len(), 2);
    }

    #[test]
    fn pruning_merges_unary_branches() {
        let tree = Tree::from_newick("((A:1,B:1):1,(C:1,(D:1,E:1):1):1);").unwrap();
        let keep: HashSet<String> = ["A", "C"].iter().map(|s| s.to_string()).collect();
        let pruned = tree.pruned(&keep).unwrap();
        assert_eq!(pruned.to_newick(), "(A:2,C:2);");

        let keep: HashSet<String> = ["D", "E"].iter().map(|s| s.to_string()).collect();
        assert_eq!(tree.pruned(&keep).unwrap().to_newick(), "(D:1,E:1);");

        assert!(tree.pruned(&HashSet::new()).is_err());
    }

    #[test]
    fn leaves_are_renamed() {
        let mut tree = Tree::from_newick("((1:1,2:1):1,3:2);").unwrap();
        let translate: HashMap<String, String> =
            [("1", "Pan"), ("3", "Gorilla")]
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        tree.rename_leaves(&translate).unwrap();
        assert_eq!(tree.to_newick(), "((Pan:1,2:1):1,Gorilla:2);");
        assert!(tree.has_leaf("Pan") && tree.has_leaf("2"));
        assert!(!tree.has_leaf("1"));
    }

    #[test]
    fn join_under_synthetic_root() {
        let a = Tree::from_newick("(A:0.1,B:0.2);").unwrap();
        let b = Tree::from_newick("(C:0.3,D:0.4);").unwrap();
        let joined = Tree::join(&a, &b).unwrap();
        assert_eq!(joined.to_newick(), "((A:0.1,B:0.2):0,(C:0.3,D:0.4):0);");
        assert_eq!(joined.n_leaves(), 4);
    }
}
