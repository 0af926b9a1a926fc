//! Locating where a transferred element goes in the target tree.
//!
//! # Algorithm
//! For an element `a` of the source tree:
//! 1. Rank the common leaves by their distance to `a` in the source tree and
//!    keep the `k` nearest (ties broken by label).
//! 2. For each kept leaf `lk`, the marker offset is
//!    `cutback_source(lk, a) * r^(lk)(target, source)`.
//! 3. In the target tree, walk that offset up from `lk` and drop a temporary
//!    marker there (clamped at the root).
//! 4. Fold the markers, sorted by offset then label, into a single point by
//!    repeated branch-length midpoints. Without any marker the midpoint of the
//!    selected leaves themselves is used.
//!
//! Markers are only ever placed on the original target topology: all
//! positions are computed against a snapshot taken before the first
//! insertion, and applied afterwards with [`apply_insertions`].

use crate::classify::SdElement;
use crate::error::{CompletionError, Result};
use crate::rates::RateTable;
use crate::snapshot::{LENGTH_TOLERANCE, Point, TreeSnapshot};
use crate::transfer::Fragment;
use crate::tree::{NodeId, Tree};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A temporary marker left by one nearest common leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub leaf: String,
    pub offset: f64,
    pub point: Point,
}

/// A fragment together with the point of the original target tree where it
/// will be attached.
#[derive(Debug, Clone)]
pub struct Placement {
    pub point: Point,
    pub fragment: Fragment,
}

/// The `k` common leaves closest to `element` in the source tree, ascending
/// by distance then label, paired with that distance.
pub fn nearest_common_leaves(
    source: &TreeSnapshot,
    element: &SdElement,
    common: &BTreeSet<String>,
    k: usize,
) -> Result<Vec<(String, f64)>> {
    let mut ranked = common
        .iter()
        .map(|leaf| Ok((leaf.clone(), source.node_distance(element.root, source.leaf(leaf)?))))
        .collect::<Result<Vec<_>>>()?;
    ranked.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    Ok(ranked)
}

/// Drop one marker per selected leaf. Leaves whose offset is not a usable
/// length, or that sit at the root of the target, leave no marker.
pub fn temporary_markers(
    target: &TreeSnapshot,
    element: &SdElement,
    nearest: &[(String, f64)],
    rates: &RateTable,
) -> Result<Vec<Marker>> {
    let mut markers = Vec::with_capacity(nearest.len());
    for (leaf, distance) in nearest {
        let cutback = distance - element.root_branch;
        let offset = cutback * rates.leaf(leaf)?;
        let start = target.leaf(leaf)?;
        if !offset.is_finite() || offset < 0.0 || target.parent(start).is_none() {
            debug!(leaf = leaf.as_str(), offset, "no feasible marker position");
            continue;
        }
        let point = target.walk_up(Point::at(start), offset);
        markers.push(Marker { leaf: leaf.clone(), offset, point });
    }
    markers.sort_by(|a, b| a.offset.total_cmp(&b.offset).then_with(|| a.leaf.cmp(&b.leaf)));
    Ok(markers)
}

/// Fold points pairwise, in the given order, into their running midpoint.
fn fold_midpoints(target: &TreeSnapshot, points: impl IntoIterator<Item = Point>) -> Option<Point> {
    points.into_iter().reduce(|acc, next| target.midpoint(acc, next))
}

/// Reduce sorted markers to a single insertion point.
pub fn reduce_to_midpoint(target: &TreeSnapshot, markers: &[Marker]) -> Option<Point> {
    fold_midpoints(target, markers.iter().map(|m| m.point))
}

/// Midpoint of the selected common leaves themselves, used when no marker
/// could be placed.
pub fn leaf_midpoint(target: &TreeSnapshot, nearest: &[(String, f64)]) -> Result<Option<Point>> {
    let points = nearest
        .iter()
        .map(|(leaf, _)| Ok(Point::at(target.leaf(leaf)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(fold_midpoints(target, points))
}

/// Insertion point for `element` in the original target tree.
pub fn find_position(
    target: &TreeSnapshot,
    source: &TreeSnapshot,
    element: &SdElement,
    common: &BTreeSet<String>,
    k: usize,
    rates: &RateTable,
) -> Result<Point> {
    let nearest = nearest_common_leaves(source, element, common, k)?;
    let markers = temporary_markers(target, element, &nearest, rates)?;
    if let Some(point) = reduce_to_midpoint(target, &markers) {
        debug!(
            leaves = ?element.leaves,
            markers = markers.len(),
            node = point.node,
            above = point.above,
            "placed"
        );
        return Ok(point);
    }
    debug!(
        leaves = ?element.leaves,
        "no markers, falling back to the midpoint of the nearest leaves"
    );
    leaf_midpoint(target, &nearest)?
        .ok_or(CompletionError::InsufficientCommonLeaves { found: nearest.len() })
}

/// Insert every placement into `target`.
///
/// `original` must be the snapshot the points were computed on. Node ids of
/// the original tree stay valid because new nodes are only appended, so
/// placements are grouped by original branch and applied bottom-up along
/// each branch: every split happens strictly above the previous one and no
/// two insertions compete for the same segment.
pub fn apply_insertions(
    target: &mut Tree,
    original: &TreeSnapshot,
    placements: Vec<Placement>,
) -> Result<()> {
    let mut by_branch: BTreeMap<NodeId, Vec<Placement>> = BTreeMap::new();
    for placement in placements {
        let point = original.normalize(placement.point);
        by_branch.entry(point.node).or_default().push(Placement { point, ..placement });
    }

    for (node, mut group) in by_branch {
        group.sort_by(|a, b| a.point.above.total_cmp(&b.point.above));
        let mut bottom = node;
        let mut consumed = 0.0;
        for placement in group {
            let step = placement.point.above - consumed;
            if step > LENGTH_TOLERANCE {
                bottom = target.split_edge(bottom, step);
                consumed = placement.point.above;
            } else if target.is_leaf(bottom) {
                bottom = target.split_edge(bottom, 0.0);
            }
            target.graft(bottom, &placement.fragment.tree, placement.fragment.branch_length)?;
        }
    }
    Ok(())
}
