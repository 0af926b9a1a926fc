//! Leaf classification: common leaves, distinct leaves, and the maximal
//! distinct-leaf subtrees that have to be moved to the other tree.
//!
//! # Example
//! ```text
//! T1 = ((A,B),(C,(D,E)))      T2 = (A,C)
//!
//! CL     = {A, C}
//! DL(T1) = {B, D, E}
//! SD(T1) = { B, (D,E) }        B's parent also holds A, so B stands alone;
//!                              (D,E) is maximal because its parent holds C.
//! ```

use crate::error::Result;
use crate::tree::{NodeId, Tree};
use std::collections::{BTreeSet, HashSet};

/// Split of the two leaf sets into shared and tree-specific labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafPartition {
    pub common: BTreeSet<String>,
    pub distinct_first: BTreeSet<String>,
    pub distinct_second: BTreeSet<String>,
}

impl LeafPartition {
    pub fn new(first: &Tree, second: &Tree) -> Self {
        let a = first.leaf_labels();
        let b = second.leaf_labels();
        LeafPartition {
            common: a.intersection(&b).cloned().collect(),
            distinct_first: a.difference(&b).cloned().collect(),
            distinct_second: b.difference(&a).cloned().collect(),
        }
    }

    /// True when both trees are defined on the same leaves.
    pub fn is_identical(&self) -> bool {
        self.distinct_first.is_empty() && self.distinct_second.is_empty()
    }
}

/// One element of SD(T): the root of a maximal distinct-leaf subtree, or a
/// distinct leaf standing on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SdElement {
    /// Root of the element in the tree it was found in.
    pub root: NodeId,
    /// Sorted leaf labels of the element.
    pub leaves: Vec<String>,
    /// Length of the branch attaching the element to the rest of the tree.
    pub root_branch: f64,
}

/// Find SD(`tree`) for the given distinct leaf set.
///
/// Each distinct leaf climbs towards the root for as long as every leaf
/// below the current ancestor is distinct; the highest such ancestor is the
/// element root and all its leaves are marked visited. Elements come out
/// ordered by their smallest leaf label.
///
/// # Errors
/// `InvalidLeaf` if a label of `distinct` is missing from `tree`.
pub fn distinct_elements(tree: &Tree, distinct: &BTreeSet<String>) -> Result<Vec<SdElement>> {
    let mut all_distinct = vec![false; tree.size()];
    for id in tree.postorder() {
        let node = tree.get(id);
        all_distinct[id] = if node.is_leaf() {
            node.name.as_ref().is_some_and(|n| distinct.contains(n))
        } else {
            node.children.iter().all(|&c| all_distinct[c])
        };
    }

    let mut visited: HashSet<String> = HashSet::new();
    let mut elements = Vec::new();
    for label in distinct {
        if visited.contains(label) {
            continue;
        }
        let mut top = tree.leaf(label)?;
        while let Some(parent) = tree.parent(top) {
            if !all_distinct[parent] {
                break;
            }
            top = parent;
        }

        let leaves = tree.subtree_leaves(top);
        visited.extend(leaves.iter().cloned());
        let root_branch = match tree.parent(top) {
            Some(_) => tree.branch_length(top).unwrap_or(0.0),
            None => 0.0,
        };
        elements.push(SdElement { root: top, leaves, root_branch });
    }
    Ok(elements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn partition_of_scenario_trees() {
        let t1 = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4):0.5);").unwrap();
        let t2 = Tree::from_newick("(E:0.1,F:0.2,(C:0.3,D:0.4):0.5);").unwrap();
        let p = LeafPartition::new(&t1, &t2);
        assert_eq!(p.common, labels(&["C", "D"]));
        assert_eq!(p.distinct_first, labels(&["A", "B"]));
        assert_eq!(p.distinct_second, labels(&["E", "F"]));
        assert!(!p.is_identical());
    }

    #[test]
    fn siblings_of_common_clades_are_singletons() {
        let t1 = Tree::from_newick("(A:0.1,B:0.2,(C:0.3,D:0.4):0.5);").unwrap();
        let sd = distinct_elements(&t1, &labels(&["A", "B"])).unwrap();
        assert_eq!(sd.len(), 2);
        assert_eq!(sd[0].leaves, vec!["A"]);
        assert!((sd[0].root_branch - 0.1).abs() < 1e-12);
        assert_eq!(sd[1].leaves, vec!["B"]);
        assert!((sd[1].root_branch - 0.2).abs() < 1e-12);
    }

    #[test]
    fn maximal_subtrees_are_found() {
        let tree = Tree::from_newick("((A:1,B:1):1,(C:1,(D:1,E:1):2):1);").unwrap();
        let sd = distinct_elements(&tree, &labels(&["B", "D", "E"])).unwrap();
        assert_eq!(sd.len(), 2);
        assert_eq!(sd[0].leaves, vec!["B"]);
        assert_eq!(sd[1].leaves, vec!["D", "E"]);
        assert!((sd[1].root_branch - 2.0).abs() < 1e-12);
        assert_eq!(sd[1].root, tree.parent(tree.leaf("D").unwrap()).unwrap());
    }

    #[test]
    fn nested_distinct_clades_collapse_into_one_element() {
        let tree = Tree::from_newick("((A:1,((B:1,C:1):1,D:1):1):1,E:1);").unwrap();
        let sd = distinct_elements(&tree, &labels(&["B", "C", "D"])).unwrap();
        assert_eq!(sd.len(), 1);
        assert_eq!(sd[0].leaves, vec!["B", "C", "D"]);
    }

    #[test]
    fn identical_leaf_sets_have_no_elements() {
        let t1 = Tree::from_newick("((A:1,B:1):1,C:1);").unwrap();
        let t2 = Tree::from_newick("(A:2,(B:1,C:1):1);").unwrap();
        let p = LeafPartition::new(&t1, &t2);
        assert!(p.is_identical());
        assert!(distinct_elements(&t1, &p.distinct_first).unwrap().is_empty());
    }
}
