//! Completing a pair of trees to their shared leaf set, and the batch driver
//! that compares many pairs.
//!
//! # Overview
//! For a pair `(T1, T2)`:
//! 1. Partition the leaves into `CL`, `DL(T1)` and `DL(T2)`.
//! 2. Without any common leaf, join the trees under a synthetic root.
//! 3. Otherwise find `SD(T1)` and `SD(T2)`, compute one [`RateTable`] per
//!    direction and insert every element of `SD(T1)` into a copy of `T2` and
//!    every element of `SD(T2)` into a copy of `T1`.
//!
//! Insertion points are searched in parallel against a snapshot of the
//! untouched target; the resulting edits are applied afterwards, one branch
//! at a time.

use crate::classify::{LeafPartition, SdElement, distinct_elements};
use crate::config::CompletionConfig;
use crate::distances::{bsd_minus, bsd_plus};
use crate::error::{CompletionError, Result};
use crate::placement::{Placement, apply_insertions, find_position};
use crate::rates::RateTable;
use crate::snapshot::TreeSnapshot;
use crate::transfer::transfer;
use crate::tree::Tree;
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Distinct elements were transferred in both directions.
    Inserted,
    /// Both trees already had the same leaves and are returned unchanged.
    Identical,
    /// No common leaf: each tree was joined with the other under a new root.
    Joined,
}

#[derive(Debug, Clone)]
pub struct Completion {
    /// `T1⊎`: the first tree completed with material from the second.
    pub first: Tree,
    /// `T2⊎`: the second tree completed with material from the first.
    pub second: Tree,
    pub mode: CompletionMode,
    pub common: BTreeSet<String>,
}

/// One insertion direction: elements of `source` go into a copy of `target`.
struct Direction<'a> {
    target: &'a Tree,
    source: &'a Tree,
    distinct: &'a BTreeSet<String>,
}

/// Complete `t1` and `t2` to `L(T1) ∪ L(T2)`. The inputs are not modified.
///
/// # Errors
/// - `InsufficientCommonLeaves` if the trees share exactly one leaf.
/// - `InvalidK` if the configured `k` is outside `[2, |CL|]`.
/// - `DegenerateDistance` if a rate denominator is zero.
pub fn complete(t1: &Tree, t2: &Tree, config: &CompletionConfig) -> Result<Completion> {
    let partition = LeafPartition::new(t1, t2);
    let common = partition.common.clone();

    if common.is_empty() {
        debug!("no common leaves, joining trees");
        return Ok(Completion {
            first: Tree::join(t1, t2)?,
            second: Tree::join(t2, t1)?,
            mode: CompletionMode::Joined,
            common,
        });
    }
    if common.len() < 2 {
        return Err(CompletionError::InsufficientCommonLeaves { found: common.len() });
    }
    let k = config.resolve_k(common.len())?;

    if partition.is_identical() {
        debug!(leaves = common.len(), "identical leaf sets, nothing to transfer");
        return Ok(Completion {
            first: t1.clone(),
            second: t2.clone(),
            mode: CompletionMode::Identical,
            common,
        });
    }

    debug!(
        common = common.len(),
        distinct_first = partition.distinct_first.len(),
        distinct_second = partition.distinct_second.len(),
        k,
        "completing pair"
    );
    let first = complete_into(
        Direction { target: t1, source: t2, distinct: &partition.distinct_second },
        &common,
        k,
        config,
    )?;
    let second = complete_into(
        Direction { target: t2, source: t1, distinct: &partition.distinct_first },
        &common,
        k,
        config,
    )?;

    Ok(Completion { first, second, mode: CompletionMode::Inserted, common })
}

fn complete_into(
    direction: Direction<'_>,
    common: &BTreeSet<String>,
    k: usize,
    config: &CompletionConfig,
) -> Result<Tree> {
    let Direction { target, source, distinct } = direction;
    let target_snap = TreeSnapshot::from_tree(target);
    let source_snap = TreeSnapshot::from_tree(source);
    let rates = RateTable::build(&target_snap, &source_snap, common)?;
    let elements = distinct_elements(source, distinct)?;
    debug!(elements = elements.len(), global_rate = rates.global, "transferring distinct elements");

    let placements = elements
        .par_iter()
        .map(|element: &SdElement| {
            let point = find_position(&target_snap, &source_snap, element, common, k, &rates)?;
            let fragment = transfer(source, element, rates.global, config.rescale);
            Ok(Placement { point, fragment })
        })
        .collect::<Result<Vec<_>>>()?;

    let mut completed = target.clone();
    apply_insertions(&mut completed, &target_snap, placements)?;
    Ok(completed)
}

/// BSD(−) together with the pruned trees it was computed on.
#[derive(Debug, Clone)]
pub struct BsdMinus {
    pub value: f64,
    pub first: Tree,
    pub second: Tree,
}

#[derive(Debug, Clone)]
pub struct PairReport {
    pub completion: Completion,
    pub bsd_plus: f64,
    pub bsd_minus: Option<BsdMinus>,
}

/// Complete a pair and measure it.
pub fn compare_pair(t1: &Tree, t2: &Tree, config: &CompletionConfig) -> Result<PairReport> {
    let completion = complete(t1, t2, config)?;
    let plus = bsd_plus(&completion.first, &completion.second)?;

    let minus = if !config.bsd_minus {
        None
    } else if completion.common.len() < 2 {
        warn!(common = completion.common.len(), "BSD(-) needs at least 2 common leaves, skipped");
        None
    } else {
        let (value, first, second) = bsd_minus(t1, t2)?;
        Some(BsdMinus { value, first, second })
    };

    Ok(PairReport { completion, bsd_plus: plus, bsd_minus: minus })
}

/// Which pairs of an input list are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pairing {
    /// The first tree against each of the others.
    #[default]
    FirstVsRest,
    /// Every unordered pair.
    AllPairs,
}

impl Pairing {
    /// Zero-based index pairs for `n` trees.
    pub fn pairs(self, n: usize) -> Vec<(usize, usize)> {
        match self {
            Pairing::FirstVsRest => (1..n).map(|j| (0, j)).collect(),
            Pairing::AllPairs => (0..n).tuple_combinations().collect(),
        }
    }
}

/// Result for one pair; `first` and `second` are 1-based input positions.
#[derive(Debug)]
pub struct PairOutcome {
    pub first: usize,
    pub second: usize,
    pub result: Result<PairReport>,
}

/// Compare the selected pairs of `trees` in parallel. A tree that failed to
/// parse only fails the pairs it takes part in.
pub fn run_batch(
    trees: &[Result<Tree>],
    config: &CompletionConfig,
    pairing: Pairing,
) -> Vec<PairOutcome> {
    pairing
        .pairs(trees.len())
        .into_par_iter()
        .map(|(i, j)| {
            let result = input(trees, i)
                .and_then(|t1| Ok((t1, input(trees, j)?)))
                .and_then(|(t1, t2)| compare_pair(t1, t2, config));
            match &result {
                Ok(report) => info!(
                    first = i + 1,
                    second = j + 1,
                    bsd_plus = report.bsd_plus,
                    "pair completed"
                ),
                Err(e) => warn!(first = i + 1, second = j + 1, error = %e, "pair failed"),
            }
            PairOutcome { first: i + 1, second: j + 1, result }
        })
        .collect()
}

fn input(trees: &[Result<Tree>], i: usize) -> Result<&Tree> {
    match &trees[i] {
        Ok(tree) => Ok(tree),
        Err(CompletionError::InvalidNewick(msg)) => {
            Err(CompletionError::InvalidNewick(format!("tree {}: {msg}", i + 1)))
        }
        Err(other) => Err(CompletionError::InvalidNewick(format!("tree {}: {other}", i + 1))),
    }
}
