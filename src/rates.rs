//! Branch adjustment rates between two trees.
//!
//! The global rate compares the total pairwise common-leaf distance of two
//! trees:
//!
//! ```text
//! r(Ta, Tb) = Σ_{i<j} d_Ta(li, lj) / Σ_{i<j} d_Tb(li, lj)
//! ```
//!
//! and the leaf-based rate restricts both sums to the paths leaving one
//! common leaf. A branch length measured in `Tb` is expressed in `Ta`'s
//! frame by multiplying it with `r(Ta, Tb)`.

use crate::error::{CompletionError, Result};
use crate::snapshot::TreeSnapshot;
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};

/// Denominators below this are considered zero.
const ZERO_SUM: f64 = 1e-15;

/// Σ over unordered common-leaf pairs of their path length.
pub fn pairwise_sum(snapshot: &TreeSnapshot, common: &BTreeSet<String>) -> Result<f64> {
    let ids: Vec<_> = common.iter().map(|l| snapshot.leaf(l)).collect::<Result<_>>()?;
    Ok(ids
        .iter()
        .tuple_combinations()
        .map(|(&u, &v)| snapshot.node_distance(u, v))
        .sum())
}

/// Global rate r(`numerator`, `denominator`).
///
/// # Errors
/// `InsufficientCommonLeaves` when fewer than two common leaves exist and
/// `DegenerateDistance` when the denominator sums to zero.
pub fn global_rate(
    numerator: &TreeSnapshot,
    denominator: &TreeSnapshot,
    common: &BTreeSet<String>,
) -> Result<f64> {
    if common.len() < 2 {
        return Err(CompletionError::InsufficientCommonLeaves { found: common.len() });
    }
    let top = pairwise_sum(numerator, common)?;
    let bottom = pairwise_sum(denominator, common)?;
    if bottom.abs() < ZERO_SUM {
        return Err(CompletionError::DegenerateDistance(
            "all common-leaf distances are zero".to_string(),
        ));
    }
    Ok(top / bottom)
}

/// Leaf-based rate r^(leaf)(`numerator`, `denominator`).
pub fn leaf_rate(
    numerator: &TreeSnapshot,
    denominator: &TreeSnapshot,
    leaf: &str,
    common: &BTreeSet<String>,
) -> Result<f64> {
    if common.len() < 2 {
        return Err(CompletionError::InsufficientCommonLeaves { found: common.len() });
    }
    let mut top = 0.0;
    let mut bottom = 0.0;
    for other in common.iter().filter(|l| l.as_str() != leaf) {
        top += numerator.distance(leaf, other)?;
        bottom += denominator.distance(leaf, other)?;
    }
    if bottom.abs() < ZERO_SUM {
        return Err(CompletionError::DegenerateDistance(format!(
            "all distances from common leaf '{leaf}' are zero"
        )));
    }
    Ok(top / bottom)
}

/// All rates needed to move material from a source tree into a target tree:
/// r(target, source) and r^(lc)(target, source) for every common leaf.
#[derive(Debug, Clone)]
pub struct RateTable {
    pub global: f64,
    pub per_leaf: HashMap<String, f64>,
}

impl RateTable {
    /// Compute the table once per direction. Leaf rates are independent and
    /// computed in parallel.
    pub fn build(
        target: &TreeSnapshot,
        source: &TreeSnapshot,
        common: &BTreeSet<String>,
    ) -> Result<Self> {
        let global = global_rate(target, source, common)?;
        let per_leaf = common
            .par_iter()
            .map(|leaf| Ok((leaf.clone(), leaf_rate(target, source, leaf, common)?)))
            .collect::<Result<HashMap<_, _>>>()?;
        Ok(RateTable { global, per_leaf })
    }

    pub fn leaf(&self, leaf: &str) -> Result<f64> {
        self.per_leaf
            .get(leaf)
            .copied()
            .ok_or_else(|| CompletionError::InvalidLeaf(leaf.to_string()))
    }
}
