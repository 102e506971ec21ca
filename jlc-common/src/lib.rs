//! Shared types for Jest Lua Companion.
//!
//! Sourcemap model, Jest install and test discovery, run configuration,
//! result payloads and the agent polling protocol. Nothing in this crate
//! touches the network.

#![forbid(unsafe_code)]

pub mod config;
pub mod glob;
pub mod locator;
pub mod logging;
pub mod protocol;
pub mod results;
pub mod sourcemap;
pub mod workspace;

pub use config::{ConfigError, DEFAULT_TEST_MATCH, JestOptions, RunnerConfig};
pub use glob::{GlobError, GlobPattern, TestMatcher};
pub use locator::{
    DiscoveredTest, FRAMEWORK_NAME, LocateError, discover_tests, find_framework_root,
    find_matching_nodes,
};
pub use logging::{LogConfig, LoggingError, init_logging};
pub use protocol::{AgentCommand, AgentIdentity};
pub use results::{AggregatedTestResult, FileTestResult, TestCaseResult, TestStatus};
pub use sourcemap::{HierarchyNode, InstancePath, LabeledNode, SourcemapError};
pub use workspace::Workspace;
