//! Merging an aggregated result into the visible tree.
//!
//! Files sit at the top level keyed by `testFilePath` and cases sit directly
//! below their file keyed by their full name. A case's `describe` titles form
//! a chain of grouping items under the case, outermost first. Every item
//! touched by the report is kept (and keeps its id); everything else is
//! pruned, so after a pass the tree shows exactly what the latest run reported.

use crate::tree::{TestItemId, TestOutcome, TestTree};
use jlc_common::{AggregatedTestResult, TestCaseResult, TestStatus};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub files: usize,
    pub cases: usize,
    pub pruned: usize,
}

/// Map a case's status to the outcome shown in the tree.
pub fn outcome_for(case: &TestCaseResult) -> TestOutcome {
    match case.status {
        TestStatus::Passed => TestOutcome::Passed {
            duration_ms: case.duration,
        },
        TestStatus::Failed => TestOutcome::Failed {
            duration_ms: case.duration,
            message: case.failure_message(),
        },
        TestStatus::Skipped
        | TestStatus::Pending
        | TestStatus::Todo
        | TestStatus::Disabled
        | TestStatus::Unknown => TestOutcome::Skipped,
    }
}

pub fn reconcile(tree: &mut TestTree, result: &AggregatedTestResult) -> ReconcileReport {
    let mut used: HashSet<TestItemId> = HashSet::new();
    let mut report = ReconcileReport::default();

    for file in &result.test_results {
        let file_id = tree.get_or_insert(None, &file.test_file_path, &file.test_file_path);
        used.insert(file_id);
        report.files += 1;

        for case in &file.test_results {
            let case_id = tree.get_or_insert(Some(file_id), &case.full_name, case.display_title());
            used.insert(case_id);
            if let Some(item) = tree.get_mut(case_id) {
                item.outcome = Some(outcome_for(case));
            }
            report.cases += 1;

            let mut parent = case_id;
            for title in &case.ancestor_titles {
                parent = tree.get_or_insert(Some(parent), title, title);
                used.insert(parent);
            }
        }
    }

    report.pruned = prune(tree, None, &used);
    debug!(
        files = report.files,
        cases = report.cases,
        pruned = report.pruned,
        visible = tree.len(),
        "reconciled test tree"
    );
    report
}

fn prune(tree: &mut TestTree, parent: Option<TestItemId>, used: &HashSet<TestItemId>) -> usize {
    let mut removed = 0;
    for child in tree.children(parent).to_vec() {
        if used.contains(&child) {
            removed += prune(tree, Some(child), used);
        } else {
            removed += tree.remove(child);
        }
    }
    removed
}
