//! The visible test tree.
//!
//! Items live in an arena keyed by [`TestItemId`]. Ids are never reused, so a
//! holder of an id can tell whether "its" item still exists, and an item that
//! survives a reconciliation keeps the id it had before.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

/// Stable handle to an item in a [`TestTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TestItemId(u64);

/// Terminal state of a test case in the last run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TestOutcome {
    Passed { duration_ms: Option<f64> },
    Failed { duration_ms: Option<f64>, message: String },
    Skipped,
}

impl TestOutcome {
    fn symbol(&self) -> &'static str {
        match self {
            Self::Passed { .. } => "✓",
            Self::Failed { .. } => "✕",
            Self::Skipped => "○",
        }
    }

    fn duration_ms(&self) -> Option<f64> {
        match self {
            Self::Passed { duration_ms } | Self::Failed { duration_ms, .. } => *duration_ms,
            Self::Skipped => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestItem {
    pub id: TestItemId,
    /// Identifier unique among siblings (file path, suite title or full name).
    pub key: String,
    pub label: String,
    pub file_path: Option<String>,
    pub parent: Option<TestItemId>,
    pub children: Vec<TestItemId>,
    pub outcome: Option<TestOutcome>,
}

/// Serializable view of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestNodeSnapshot {
    pub id: TestItemId,
    pub key: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TestOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TestNodeSnapshot>,
}

#[derive(Debug, Default)]
pub struct TestTree {
    items: HashMap<TestItemId, TestItem>,
    roots: Vec<TestItemId>,
    next_id: u64,
}

impl TestTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: TestItemId) -> Option<&TestItem> {
        self.items.get(&id)
    }

    pub fn get_mut(&mut self, id: TestItemId) -> Option<&mut TestItem> {
        self.items.get_mut(&id)
    }

    pub fn roots(&self) -> &[TestItemId] {
        &self.roots
    }

    /// Children of `parent`, or the roots when `parent` is `None`.
    pub fn children(&self, parent: Option<TestItemId>) -> &[TestItemId] {
        match parent {
            None => &self.roots,
            Some(id) => self
                .items
                .get(&id)
                .map(|item| item.children.as_slice())
                .unwrap_or(&[]),
        }
    }

    pub fn find_child(&self, parent: Option<TestItemId>, key: &str) -> Option<TestItemId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.items.get(id).is_some_and(|item| item.key == key))
    }

    /// Resolve a chain of keys from the roots down.
    #[cfg(test)]
    pub fn find_path(&self, keys: &[&str]) -> Option<TestItemId> {
        let mut current = None;
        for key in keys {
            current = Some(self.find_child(current, key)?);
        }
        current
    }

    /// Return the child of `parent` keyed `key`, creating it with `label` if
    /// absent. Existing items keep their label.
    pub fn get_or_insert(&mut self, parent: Option<TestItemId>, key: &str, label: &str) -> TestItemId {
        if let Some(existing) = self.find_child(parent, key) {
            return existing;
        }

        let id = TestItemId(self.next_id);
        self.next_id += 1;
        self.items.insert(
            id,
            TestItem {
                id,
                key: key.to_string(),
                label: label.to_string(),
                file_path: None,
                parent,
                children: Vec::new(),
                outcome: None,
            },
        );
        match parent.and_then(|p| self.items.get_mut(&p)) {
            Some(parent_item) => parent_item.children.push(id),
            None => self.roots.push(id),
        }
        id
    }

    /// Remove an item and its whole subtree. Returns the number of items removed.
    pub fn remove(&mut self, id: TestItemId) -> usize {
        let Some(item) = self.items.get(&id) else {
            return 0;
        };
        match item.parent {
            Some(parent) => {
                if let Some(parent_item) = self.items.get_mut(&parent) {
                    parent_item.children.retain(|child| *child != id);
                }
            }
            None => self.roots.retain(|root| *root != id),
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(item) = self.items.remove(&next) {
                stack.extend(item.children);
                removed += 1;
            }
        }
        removed
    }

    pub fn snapshot(&self) -> Vec<TestNodeSnapshot> {
        self.roots()
            .iter()
            .filter_map(|id| self.snapshot_item(*id))
            .collect()
    }

    fn snapshot_item(&self, id: TestItemId) -> Option<TestNodeSnapshot> {
        let item = self.items.get(&id)?;
        Some(TestNodeSnapshot {
            id: item.id,
            key: item.key.clone(),
            label: item.label.clone(),
            file_path: item.file_path.clone(),
            outcome: item.outcome.clone(),
            children: item
                .children
                .iter()
                .filter_map(|child| self.snapshot_item(*child))
                .collect(),
        })
    }

    /// Indented text rendering for terminal output.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for root in self.roots() {
            self.render_item(*root, 0, &mut out);
        }
        out
    }

    fn render_item(&self, id: TestItemId, depth: usize, out: &mut String) {
        let Some(item) = self.items.get(&id) else {
            return;
        };
        let indent = "  ".repeat(depth);
        match &item.outcome {
            Some(outcome) => {
                let _ = write!(out, "{indent}{} {}", outcome.symbol(), item.label);
                if let Some(ms) = outcome.duration_ms() {
                    let _ = write!(out, " ({ms}ms)");
                }
                out.push('\n');
                if let TestOutcome::Failed { message, .. } = outcome {
                    for line in message.lines() {
                        let _ = writeln!(out, "{indent}    {line}");
                    }
                }
            }
            None => {
                let _ = writeln!(out, "{indent}{}", item.label);
            }
        }
        for child in &item.children {
            self.render_item(*child, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_insert_reuses_existing() {
        let mut tree = TestTree::new();
        let file = tree.get_or_insert(None, "a.spec", "a.spec");
        let again = tree.get_or_insert(None, "a.spec", "renamed");

        assert_eq!(file, again);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.get(file).unwrap().label, "a.spec");
    }

    #[test]
    fn test_same_key_under_different_parents() {
        let mut tree = TestTree::new();
        let a = tree.get_or_insert(None, "a", "a");
        let b = tree.get_or_insert(None, "b", "b");
        let under_a = tree.get_or_insert(Some(a), "case", "case");
        let under_b = tree.get_or_insert(Some(b), "case", "case");

        assert_ne!(under_a, under_b);
        assert_eq!(tree.find_path(&["b", "case"]), Some(under_b));
        assert_eq!(tree.get(under_a).unwrap().parent, Some(a));
    }

    #[test]
    fn test_remove_cascades() {
        let mut tree = TestTree::new();
        let file = tree.get_or_insert(None, "file", "file");
        let suite = tree.get_or_insert(Some(file), "suite", "suite");
        tree.get_or_insert(Some(suite), "case 1", "case 1");
        tree.get_or_insert(Some(suite), "case 2", "case 2");
        let other = tree.get_or_insert(None, "other", "other");

        assert_eq!(tree.remove(suite), 3);
        assert_eq!(tree.len(), 2);
        assert!(tree.children(Some(file)).is_empty());
        assert_eq!(tree.roots(), &[file, other]);

        assert_eq!(tree.remove(file), 1);
        assert_eq!(tree.remove(file), 0);
        assert_eq!(tree.roots(), &[other]);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut tree = TestTree::new();
        let first = tree.get_or_insert(None, "a", "a");
        tree.remove(first);
        let second = tree.get_or_insert(None, "a", "a");
        assert_ne!(first, second);
        assert!(tree.get(first).is_none());
    }

    #[test]
    fn test_snapshot_and_render() {
        let mut tree = TestTree::new();
        let file = tree.get_or_insert(None, "a.spec", "a.spec");
        let case = tree.get_or_insert(Some(file), "a.spec adds", "adds");
        tree.get_mut(case).unwrap().outcome = Some(TestOutcome::Passed {
            duration_ms: Some(5.0),
        });
        let failing = tree.get_or_insert(Some(file), "a.spec breaks", "breaks");
        tree.get_mut(failing).unwrap().outcome = Some(TestOutcome::Failed {
            duration_ms: None,
            message: "expected 1\nreceived 2".to_string(),
        });

        let snapshot = tree.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].children.len(), 2);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json[0]["children"][0]["outcome"]["state"], "passed");
        assert_eq!(json[0]["children"][0]["outcome"]["duration_ms"], 5.0);

        let text = tree.render();
        assert!(text.contains("a.spec\n"));
        assert!(text.contains("  ✓ adds (5ms)"));
        assert!(text.contains("  ✕ breaks"));
        assert!(text.contains("      received 2"));
    }
}
