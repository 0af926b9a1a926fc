//! Python binding layer for tree completion.
//!
//! Provides Python functions that complete two Newick trees and measure the
//! branch score distance between them.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::completion::{compare_pair, complete};
use crate::config::CompletionConfig;
use crate::error::CompletionError;
use crate::tree::Tree;

fn to_py_err(e: CompletionError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_pair(newick1: &str, newick2: &str) -> PyResult<(Tree, Tree)> {
    let t1 = Tree::from_newick(newick1).map_err(to_py_err)?;
    let t2 = Tree::from_newick(newick2).map_err(to_py_err)?;
    Ok((t1, t2))
}

/// Complete two trees to their shared leaf set.
///
/// Args:
///     newick1: First tree in Newick format
///     newick2: Second tree in Newick format
///     k: Number of nearest common leaves per insertion (default: all common leaves)
///
/// Returns:
///     A tuple (completed1, completed2) of Newick strings
///
/// Raises:
///     ValueError: If a tree does not parse, k is out of range, or the trees
///     share exactly one leaf
#[pyfunction]
#[pyo3(signature = (newick1, newick2, k=None))]
fn complete_trees(newick1: &str, newick2: &str, k: Option<usize>) -> PyResult<(String, String)> {
    let (t1, t2) = parse_pair(newick1, newick2)?;
    let config = CompletionConfig { k, ..Default::default() };
    let completion = complete(&t1, &t2, &config).map_err(to_py_err)?;
    Ok((completion.first.to_newick(), completion.second.to_newick()))
}

/// Branch score distances of two trees.
///
/// Returns:
///     A tuple (bsd_plus, bsd_minus); bsd_minus is None when the trees share
///     fewer than two leaves
#[pyfunction]
#[pyo3(signature = (newick1, newick2, k=None))]
fn bsd(newick1: &str, newick2: &str, k: Option<usize>) -> PyResult<(f64, Option<f64>)> {
    let (t1, t2) = parse_pair(newick1, newick2)?;
    let config = CompletionConfig { k, bsd_minus: true, ..Default::default() };
    let report = compare_pair(&t1, &t2, &config).map_err(to_py_err)?;
    Ok((report.bsd_plus, report.bsd_minus.map(|m| m.value)))
}

/// Python module definition
#[pymodule]
fn tree_completion(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(complete_trees, m)?)?;
    m.add_function(wrap_pyfunction!(bsd, m)?)?;
    Ok(())
}
