//! Proptest strategies for generating batch tree shapes.

use proptest::prelude::*;

use super::jobs::TreeSpec;

/// Strategy for node labels.
pub fn label_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{2,7}"
}

/// Strategy for bounded batch trees of healthy nodes.
///
/// Depth and fan-out are capped so a generated tree stays small enough to
/// drain inside a per-case Tokio runtime.
pub fn tree_spec_strategy() -> impl Strategy<Value = TreeSpec> {
    let leaf = label_strategy().prop_map(|name| TreeSpec::leaf(&name));
    leaf.prop_recursive(3, 24, 4, |inner| {
        (label_strategy(), prop::collection::vec(inner, 0..4)).prop_map(|(name, children)| {
            TreeSpec {
                name,
                children,
                fail: false,
            }
        })
    })
}

/// Strategy for bounded batch trees where any node may permanently fail.
pub fn faulty_tree_spec_strategy() -> impl Strategy<Value = TreeSpec> {
    let leaf = (label_strategy(), any::<bool>()).prop_map(|(name, fail)| TreeSpec {
        name,
        children: Vec::new(),
        fail,
    });
    leaf.prop_recursive(3, 24, 4, |inner| {
        (
            label_strategy(),
            prop::collection::vec(inner, 0..4),
            any::<bool>(),
        )
            .prop_map(|(name, children, fail)| TreeSpec {
                name,
                children,
                fail,
            })
    })
}

/// Strategy for sibling counts in flat fan-out trees.
pub fn sibling_count_strategy() -> impl Strategy<Value = usize> {
    1usize..24
}
