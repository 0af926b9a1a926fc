//! Branch score distances between trees defined on the same leaves.
//!
//! Two variants are computed:
//!
//! 1. **BSD(+)**: between the two completed trees, over every leaf of
//!    `L(T1) ∪ L(T2)`.
//! 2. **BSD(−)**: between copies of the inputs pruned to their common leaves.
//!    No transfer takes place, so this is the cheaper baseline.
//!
//! Both use the same formula over unordered leaf pairs:
//!
//! ```text
//! BSD(Ta, Tb) = sqrt( Σ_{i<j} (d_Ta(li, lj) - d_Tb(li, lj))² )
//! ```

use crate::classify::LeafPartition;
use crate::error::{CompletionError, Result};
use crate::snapshot::TreeSnapshot;
use crate::tree::Tree;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};

/// Branch score distance of two snapshots restricted to `leaves`.
///
/// # Algorithm
/// Leaf ids are resolved once per tree; each row `i` then sums the squared
/// differences against every `j > i`. Rows are computed in parallel and added
/// in order, so the result does not depend on the thread count.
///
/// # Errors
/// `InvalidLeaf` if one of `leaves` is missing from either snapshot.
pub fn bsd_over(a: &TreeSnapshot, b: &TreeSnapshot, leaves: &BTreeSet<String>) -> Result<f64> {
    let ids_a = leaves.iter().map(|l| a.leaf(l)).collect::<Result<Vec<_>>>()?;
    let ids_b = leaves.iter().map(|l| b.leaf(l)).collect::<Result<Vec<_>>>()?;
    let n = ids_a.len();

    let rows: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|i| {
            (i + 1..n)
                .map(|j| {
                    let diff = a.node_distance(ids_a[i], ids_a[j])
                        - b.node_distance(ids_b[i], ids_b[j]);
                    diff * diff
                })
                .sum()
        })
        .collect();

    Ok(rows.iter().sum::<f64>().sqrt())
}

/// BSD(+) of two trees that carry the same leaf set.
///
/// # Errors
/// `LeafSetMismatch` if the leaf sets differ.
pub fn bsd_plus(a: &Tree, b: &Tree) -> Result<f64> {
    let partition = LeafPartition::new(a, b);
    if !partition.is_identical() {
        return Err(CompletionError::LeafSetMismatch {
            only_first: partition.distinct_first.len(),
            only_second: partition.distinct_second.len(),
        });
    }
    bsd_over(&TreeSnapshot::from_tree(a), &TreeSnapshot::from_tree(b), &partition.common)
}

/// BSD(−): prune both trees to their common leaves and compare the copies.
/// The pruned trees are returned along with the distance.
///
/// # Errors
/// `InsufficientCommonLeaves` when the trees share fewer than two leaves.
pub fn bsd_minus(t1: &Tree, t2: &Tree) -> Result<(f64, Tree, Tree)> {
    let common = LeafPartition::new(t1, t2).common;
    if common.len() < 2 {
        return Err(CompletionError::InsufficientCommonLeaves { found: common.len() });
    }
    let keep: HashSet<String> = common.iter().cloned().collect();
    let p1 = t1.pruned(&keep)?;
    let p2 = t2.pruned(&keep)?;
    let value = bsd_plus(&p1, &p2)?;
    Ok((value, p1, p2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn tree(newick: &str) -> Tree {
        Tree::from_newick(newick).unwrap()
    }

    #[test]
    fn identical_trees_are_at_zero() {
        let t = tree("((A:0.3,B:1.1):0.2,(C:0.7,D:0.4):0.9);");
        assert_eq!(bsd_plus(&t, &t).unwrap(), 0.0);
    }

    #[test]
    fn single_stretched_branch() {
        // Only paths through A change, each by 1.0: three pairs.
        let a = tree("((A:1,B:1):1,(C:1,D:1):1);");
        let b = tree("((A:2,B:1):1,(C:1,D:1):1);");
        assert!((bsd_plus(&a, &b).unwrap() - 3f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn matches_a_direct_pairwise_sum() {
        let a = tree("((A:0.3,B:1.1):0.2,((C:0.7,E:0.2):0.1,D:0.4):0.9);");
        let b = tree("((A:0.5,C:0.1):0.6,((B:0.2,E:0.8):0.4,D:1.3):0.3);");
        let sa = TreeSnapshot::from_tree(&a);
        let sb = TreeSnapshot::from_tree(&b);
        let expected: f64 = a
            .leaf_labels()
            .iter()
            .tuple_combinations()
            .map(|(x, y)| (sa.distance(x, y).unwrap() - sb.distance(x, y).unwrap()).powi(2))
            .sum::<f64>()
            .sqrt();
        assert!((bsd_plus(&a, &b).unwrap() - expected).abs() < 1e-12);
        assert!((bsd_plus(&b, &a).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn mismatched_leaf_sets_are_rejected() {
        let a = tree("(A:1,B:1,C:1);");
        let b = tree("(A:1,B:1,D:1);");
        assert!(matches!(
            bsd_plus(&a, &b),
            Err(CompletionError::LeafSetMismatch { only_first: 1, only_second: 1 })
        ));
    }

    #[test]
    fn bsd_minus_compares_pruned_copies() {
        let t1 = tree("(A:0.1,B:0.2,(C:0.3,D:0.4):0.5);");
        let t2 = tree("(E:0.1,F:0.2,(C:0.3,D:0.6):0.5);");
        let (value, p1, p2) = bsd_minus(&t1, &t2).unwrap();
        assert!((value - 0.2).abs() < 1e-12);
        assert_eq!(p1.to_newick(), "(C:0.3,D:0.4);");
        assert_eq!(p2.to_newick(), "(C:0.3,D:0.6);");
        assert_eq!(t1.n_leaves(), 4);
    }

    #[test]
    fn bsd_minus_needs_two_common_leaves() {
        let t1 = tree("(A:1,B:1);");
        let t2 = tree("(A:1,C:1);");
        assert!(matches!(
            bsd_minus(&t1, &t2),
            Err(CompletionError::InsufficientCommonLeaves { found: 1 })
        ));
    }
}
