//! Locating the Jest install and test modules inside a sourcemap.
//!
//! Both searches walk the tree breadth-first, so results are deterministic:
//! level order, left to right within a level. Returned paths are only valid
//! for the tree they were computed from.

use crate::glob::TestMatcher;
use crate::sourcemap::{HierarchyNode, InstancePath, LabeledNode};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Name of the instance hosting the test framework (compared case-insensitively).
pub const FRAMEWORK_NAME: &str = "jest";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocateError {
    #[error("Unable to find a jest install within the sourcemap")]
    NotFound,
}

/// Find the shallowest instance named `jest` and return its path.
///
/// The root itself is never a candidate. When several instances qualify, the
/// first one in level order wins.
pub fn find_framework_root(tree: &HierarchyNode) -> Result<InstancePath, LocateError> {
    let found = tree
        .walk_level_order()
        .skip(1)
        .find(|labeled| labeled.node.name.to_lowercase() == FRAMEWORK_NAME)
        .map(|labeled| labeled.path)
        .ok_or(LocateError::NotFound)?;

    debug!(path = %found, "found jest install");
    Ok(found)
}

/// Every node (root included) whose bare name matches `matcher`.
///
/// Matching looks at the node's own name only, never its path.
pub fn find_matching_nodes<'a>(
    tree: &'a HierarchyNode,
    matcher: &TestMatcher,
) -> Vec<LabeledNode<'a>> {
    tree.walk_level_order()
        .filter(|labeled| matcher.is_match(&labeled.node.name))
        .collect()
}

/// A test module found in the sourcemap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredTest {
    /// Ancestor path joined with `/`.
    pub id: String,
    /// First backing file, or the id when the instance has no file.
    pub label: String,
    pub file_path: Option<String>,
}

/// Turn matching nodes into discovered tests.
pub fn discover_tests(tree: &HierarchyNode, matcher: &TestMatcher) -> Vec<DiscoveredTest> {
    find_matching_nodes(tree, matcher)
        .into_iter()
        .map(|labeled| {
            let id = labeled.path.to_string();
            let file_path = labeled.node.first_file_path().map(str::to_string);
            DiscoveredTest {
                label: file_path.clone().unwrap_or_else(|| id.clone()),
                id,
                file_path,
            }
        })
        .collect()
}
