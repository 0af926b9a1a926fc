//! Error taxonomy for tree completion.
//!
//! Every error is scoped to a single tree pair: the batch driver reports it
//! next to the pairs that succeeded and moves on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    /// Malformed Newick text, or a tree that cannot be used as a labelled tree.
    #[error("invalid newick: {0}")]
    InvalidNewick(String),

    /// A leaf label was queried that the tree does not contain.
    #[error("leaf '{0}' is not present in the tree")]
    InvalidLeaf(String),

    #[error("at least 2 common leaves are required, found {found}")]
    InsufficientCommonLeaves { found: usize },

    #[error("k must lie in [2, {common}] but was {k}")]
    InvalidK { k: usize, common: usize },

    /// A rate denominator summed to zero.
    #[error("degenerate distances: {0}")]
    DegenerateDistance(String),

    #[error("leaf sets differ: {only_first} leaves only in the first tree, {only_second} only in the second")]
    LeafSetMismatch { only_first: usize, only_second: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CompletionError>;
