//! Run parameters shared by the library, the CLI and the Python bindings.

use crate::error::{CompletionError, Result};
use crate::transfer::RescalePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionConfig {
    /// Number of nearest common leaves used to place each element.
    /// `None` uses every common leaf.
    pub k: Option<usize>,
    pub rescale: RescalePolicy,
    /// Also compute BSD(−) on the pruned trees.
    pub bsd_minus: bool,
}

impl CompletionConfig {
    pub fn with_k(k: usize) -> Self {
        CompletionConfig { k: Some(k), ..Default::default() }
    }

    /// Effective `k` for a pair sharing `common` leaves.
    ///
    /// # Errors
    /// `InvalidK` unless `2 <= k <= common`.
    pub fn resolve_k(&self, common: usize) -> Result<usize> {
        let k = self.k.unwrap_or(common);
        if k < 2 || k > common {
            return Err(CompletionError::InvalidK { k, common });
        }
        Ok(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_k_is_every_common_leaf() {
        let config = CompletionConfig::default();
        assert_eq!(config.resolve_k(5).unwrap(), 5);
        assert_eq!(config.rescale, RescalePolicy::Uniform);
        assert!(!config.bsd_minus);
    }

    #[test]
    fn k_bounds() {
        assert_eq!(CompletionConfig::with_k(2).resolve_k(4).unwrap(), 2);
        assert_eq!(CompletionConfig::with_k(4).resolve_k(4).unwrap(), 4);
        assert!(matches!(
            CompletionConfig::with_k(1).resolve_k(4),
            Err(CompletionError::InvalidK { k: 1, common: 4 })
        ));
        assert!(matches!(
            CompletionConfig::with_k(5).resolve_k(4),
            Err(CompletionError::InvalidK { k: 5, common: 4 })
        ));
    }
}
