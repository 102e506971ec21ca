//! Agent polling protocol definitions.
//!
//! The in-place agent cannot accept connections, so it polls the companion
//! over HTTP. Every request carries two identity headers; `GET /` returns the
//! pending commands and the `POST` routes report logs, results or failure.

use crate::config::RunnerConfig;
use crate::sourcemap::InstancePath;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};

/// Port the agent plugin polls by default.
pub const DEFAULT_PORT: u16 = 21356;

/// Largest request body accepted from the agent (10 MiB).
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

/// Header carrying the place id (checked against the allow-list).
pub const PLACE_ID_HEADER: &str = "place-id";

/// Header carrying the session guid (bound on first admission).
pub const PLACE_GUID_HEADER: &str = "place-guid";

/// Agent-facing route paths.
pub mod routes {
    pub const POLL: &str = "/";
    pub const LOG: &str = "/log";
    pub const RESULTS: &str = "/results";
    pub const FAIL: &str = "/fail";
}

/// Identity the agent declares on every request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentIdentity {
    /// Target identifier of the place the agent runs in.
    pub place_id: String,
    /// Session identifier of the running place instance.
    pub place_guid: String,
}

impl AgentIdentity {
    pub fn new(place_id: impl Into<String>, place_guid: impl Into<String>) -> Self {
        Self {
            place_id: place_id.into(),
            place_guid: place_guid.into(),
        }
    }
}

impl std::fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.place_id, self.place_guid)
    }
}

/// Instruction queued for the agent.
///
/// On the wire a command is a JSON array: the command name followed by its
/// arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentCommand {
    /// Run Jest from `framework_path` with `config`.
    RequestStartTests {
        framework_path: InstancePath,
        config: RunnerConfig,
    },
}

impl AgentCommand {
    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestStartTests { .. } => "request_start_tests",
        }
    }
}

impl Serialize for AgentCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::RequestStartTests {
                framework_path,
                config,
            } => {
                let mut tuple = serializer.serialize_tuple(3)?;
                tuple.serialize_element(self.name())?;
                tuple.serialize_element(framework_path)?;
                tuple.serialize_element(config)?;
                tuple.end()
            }
        }
    }
}
