//! Run configuration (`jest-runner.toml`).
//!
//! The file names the instance the agent runs Jest from, the roots it should
//! search, and an optional `[config]` table of Jest CLI options. The options
//! are forwarded to the agent untouched (camelCase JSON, unset keys omitted).

use crate::glob::{GlobError, TestMatcher};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default `testMatch` used when the config does not set one.
pub const DEFAULT_TEST_MATCH: [&str; 2] = ["**/__tests__/**/*", "**/?(*.)+(spec|test)"];

/// Errors produced while loading or validating the run configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read jest-runner.toml ({}): {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse jest-runner.toml: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid jest-runner.toml format: root '{root}' is listed more than once")]
    DuplicateRoot { root: String },

    #[error("Invalid jest-runner.toml format: {0}")]
    TestMatch(#[from] GlobError),
}

/// Validated contents of `jest-runner.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Instance the agent treats as the working directory (e.g. `game`).
    pub cwd_instance: String,
    /// Instances Jest searches for tests. A bare string is one root.
    #[serde(deserialize_with = "string_or_list")]
    pub roots: Vec<String>,
    /// Jest options passed through to the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<JestOptions>,
}

/// Jest CLI options accepted in the `[config]` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JestOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clear_mocks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expand: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_stack_trace: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_with_no_tests: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_mocks: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_config: Option<bool>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub test_match: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_name_pattern: Option<String>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub test_path_pattern: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub test_path_pattern_ignore: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Option::is_none"
    )]
    pub test_regex: Option<Vec<String>>,
    /// Per-test timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_snapshot: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl From<OneOrMany> for Vec<String> {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(single) => vec![single],
            OneOrMany::Many(many) => many,
        }
    }
}

/// Accept either a bare string or an array of strings.
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    OneOrMany::deserialize(deserializer).map(Into::into)
}

/// Optional variant of [`string_or_list`].
fn one_or_many<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<OneOrMany>::deserialize(deserializer)?.map(Into::into))
}

impl RunnerConfig {
    /// Parse and validate a TOML document.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: RunnerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for root in &self.roots {
            if !seen.insert(root.as_str()) {
                return Err(ConfigError::DuplicateRoot { root: root.clone() });
            }
        }
        self.test_matcher()?;
        Ok(())
    }

    /// Effective `testMatch` patterns.
    pub fn test_match(&self) -> Vec<&str> {
        match self.config.as_ref().and_then(|c| c.test_match.as_ref()) {
            Some(patterns) => patterns.iter().map(String::as_str).collect(),
            None => DEFAULT_TEST_MATCH.to_vec(),
        }
    }

    /// Compile the effective `testMatch` patterns.
    pub fn test_matcher(&self) -> Result<TestMatcher, GlobError> {
        TestMatcher::new(self.test_match())
    }
}
