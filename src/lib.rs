//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `tree`: arena tree model, Newick parsing (via `phylotree`) and writing, structural edits.
//! - `snapshot`: read-only depth/LCA index, points on branches and midpoints.
//! - `classify`: common/distinct leaves and maximal distinct-leaf subtrees.
//! - `rates`: global and leaf-based branch adjustment rates.
//! - `transfer`: copying and rescaling distinct subtrees.
//! - `placement`: k nearest common leaf insertion points and batched insertion.
//! - `completion`: pair completion, BSD reports and the batch driver.
//! - `distances`: branch score distances BSD(+) and BSD(−).
//! - `config`, `error`: run parameters and the error type.
//! - `io`: reading tree files and writing reports.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod classify;
pub mod completion;
pub mod config;
pub mod distances;
pub mod error;
pub mod io;
pub mod placement;
pub mod rates;
pub mod snapshot;
pub mod transfer;
pub mod tree;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use completion::{
    Completion, CompletionMode, PairOutcome, PairReport, Pairing, compare_pair, complete, run_batch,
};
pub use config::CompletionConfig;
pub use distances::{bsd_minus, bsd_plus};
pub use error::{CompletionError, Result};
pub use io::{read_newick_trees, write_report};
pub use snapshot::TreeSnapshot;
pub use transfer::RescalePolicy;
pub use tree::Tree;
