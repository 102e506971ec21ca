//! Sourcemap hierarchy model.
//!
//! A sourcemap is a JSON snapshot of the place's instance tree as written by
//! the project sync tool. Each node carries a name, a class name, the files
//! that produced it and its children. The tree is rebuilt from scratch every
//! time the file changes, so nothing here hands out identities that outlive
//! one parse: traversals borrow the tree and compute ancestor paths on the fly.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Class name every sourcemap root must carry.
pub const ROOT_CLASS_NAME: &str = "DataModel";

/// Errors produced while loading a sourcemap.
#[derive(Debug, Error)]
pub enum SourcemapError {
    /// The sourcemap file could not be read.
    #[error("Unable to read sourcemap ({}): {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The sourcemap is not valid JSON or does not have the expected shape.
    #[error("Unable to parse sourcemap: {0}")]
    Parse(#[from] serde_json::Error),

    /// The root node is not the data model.
    #[error("Sourcemap does not start with the DataModel (root class is '{found}')")]
    WrongRoot { found: String },
}

/// One instance in the sourcemap.
///
/// Sibling names are not unique; lookups that need a specific node resolve it
/// by position within a single traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyNode {
    pub name: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Create a leaf node without file paths.
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            file_paths: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Builder: attach a file path.
    pub fn with_file(mut self, path: impl Into<String>) -> Self {
        self.file_paths.push(path.into());
        self
    }

    /// Builder: append a child node.
    pub fn with_child(mut self, child: HierarchyNode) -> Self {
        self.children.push(child);
        self
    }

    /// Parse a sourcemap document and check its root.
    pub fn parse(raw: &str) -> Result<Self, SourcemapError> {
        let root: HierarchyNode = serde_json::from_str(raw)?;
        if root.class_name != ROOT_CLASS_NAME {
            return Err(SourcemapError::WrongRoot {
                found: root.class_name,
            });
        }
        Ok(root)
    }

    /// Read and parse a sourcemap file.
    pub fn load(path: &Path) -> Result<Self, SourcemapError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SourcemapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// First file path recorded for this node, if any.
    pub fn first_file_path(&self) -> Option<&str> {
        self.file_paths.first().map(String::as_str)
    }

    /// Breadth-first walk over this node and all descendants.
    ///
    /// Nodes are yielded level by level, left to right within a level, each
    /// paired with its ancestor path (this node excluded, the visited node
    /// included).
    pub fn walk_level_order(&self) -> LevelOrder<'_> {
        let mut queue = VecDeque::new();
        queue.push_back(LabeledNode {
            node: self,
            path: InstancePath::root(),
        });
        LevelOrder { queue }
    }

    /// Total number of nodes in this subtree.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(HierarchyNode::count).sum::<usize>()
    }
}

/// Ordered chain of ancestor names leading to a node.
///
/// The root is never part of the path; a direct child of the root has a path
/// of length one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstancePath(Vec<String>);

impl InstancePath {
    /// The empty path (addresses the root itself).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Path of a child named `name` below this path.
    pub fn child(&self, name: &str) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend(self.0.iter().cloned());
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Name of the addressed node, `None` for the root.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for InstancePath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for InstancePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// A node borrowed from a tree together with its ancestor path.
#[derive(Debug, Clone)]
pub struct LabeledNode<'a> {
    pub node: &'a HierarchyNode,
    pub path: InstancePath,
}

impl LabeledNode<'_> {
    /// Depth below the traversal root (the root has depth zero).
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

/// Iterator returned by [`HierarchyNode::walk_level_order`].
pub struct LevelOrder<'a> {
    queue: VecDeque<LabeledNode<'a>>,
}

impl<'a> Iterator for LevelOrder<'a> {
    type Item = LabeledNode<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.queue.pop_front()?;
        for child in &current.node.children {
            self.queue.push_back(LabeledNode {
                node: child,
                path: current.path.child(&child.name),
            });
        }
        Some(current)
    }
}
