//! Copying distinct-leaf material out of its source tree, rescaled into the
//! frame of the tree that will receive it.

use crate::classify::SdElement;
use crate::tree::Tree;

/// Which branches of a transferred element are multiplied by the global rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RescalePolicy {
    /// Every branch of the element, so internal proportions are kept
    /// relative to the new attachment branch.
    #[default]
    Uniform,
    /// Only the attachment branch; the clade's interior keeps source lengths.
    RootOnly,
}

/// An element ready for insertion: an independent copy of the clade and the
/// length of the branch that will attach it.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub tree: Tree,
    pub branch_length: f64,
}

/// Copy `element` out of `source` and rescale it with `rate`.
pub fn transfer(source: &Tree, element: &SdElement, rate: f64, policy: RescalePolicy) -> Fragment {
    let mut tree = source.extract_subtree(element.root);
    if policy == RescalePolicy::Uniform {
        tree.scale_branches(rate);
    }
    Fragment { tree, branch_length: element.root_branch * rate }
}
