//! Aggregated test results reported by the agent.
//!
//! Mirrors the JSON shape of Jest's `AggregatedResult` as produced by the
//! in-place runner. Only `testResults` (and, per file, `testFilePath`) are
//! required; every counter defaults so partial reports still decode.

use serde::{Deserialize, Serialize};

/// Outcome of a single test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
    Pending,
    Todo,
    Disabled,
    /// Any status string this build does not know about.
    #[serde(other)]
    Unknown,
}

/// Timing of one test file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerfStats {
    pub start: f64,
    pub end: f64,
    pub runtime: f64,
    pub slow: bool,
}

/// Result of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseResult {
    /// Fully qualified name: ancestor titles and title joined by spaces.
    pub full_name: String,
    #[serde(default)]
    pub title: String,
    /// `describe` blocks enclosing the case, outermost first.
    #[serde(default)]
    pub ancestor_titles: Vec<String>,
    pub status: TestStatus,
    /// Duration in milliseconds; absent for skipped cases.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub failure_messages: Vec<String>,
    #[serde(default)]
    pub failure_details: Vec<serde_json::Value>,
    #[serde(default)]
    pub invocations: u32,
    #[serde(default)]
    pub num_passing_asserts: u32,
}

impl TestCaseResult {
    /// Label shown for the case: its title, or the full name when untitled.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.full_name
        } else {
            &self.title
        }
    }

    /// Failure messages joined one per line.
    pub fn failure_message(&self) -> String {
        self.failure_messages.join("\n")
    }
}

/// Results of one test file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTestResult {
    pub test_file_path: String,
    #[serde(default)]
    pub test_results: Vec<TestCaseResult>,
    #[serde(default)]
    pub num_failing_tests: u32,
    #[serde(default)]
    pub num_passing_tests: u32,
    #[serde(default)]
    pub num_pending_tests: u32,
    #[serde(default)]
    pub num_todo_tests: u32,
    #[serde(default)]
    pub skipped: bool,
    #[serde(default)]
    pub leaks: bool,
    #[serde(default)]
    pub perf_stats: PerfStats,
    /// Error that prevented the file from running at all.
    #[serde(default)]
    pub failure_message: Option<String>,
}

/// The complete report for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedTestResult {
    pub test_results: Vec<FileTestResult>,
    #[serde(default)]
    pub num_failed_test_suites: u32,
    #[serde(default)]
    pub num_failed_tests: u32,
    #[serde(default)]
    pub num_passed_test_suites: u32,
    #[serde(default)]
    pub num_passed_tests: u32,
    #[serde(default)]
    pub num_pending_test_suites: u32,
    #[serde(default)]
    pub num_pending_tests: u32,
    #[serde(default)]
    pub num_runtime_error_test_suites: u32,
    #[serde(default)]
    pub num_todo_tests: u32,
    #[serde(default)]
    pub num_total_test_suites: u32,
    #[serde(default)]
    pub num_total_tests: u32,
    /// Unix timestamp (ms) at which the run began.
    #[serde(default)]
    pub start_time: f64,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub was_interrupted: bool,
}

impl AggregatedTestResult {
    /// Iterate over every case in every file.
    pub fn cases(&self) -> impl Iterator<Item = &TestCaseResult> {
        self.test_results.iter().flat_map(|file| file.test_results.iter())
    }
}
