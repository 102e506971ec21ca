//! Test run orchestration.
//!
//! One [`Orchestrator`] owns the visible tree and at most one in-flight run.
//! A run moves through `located → awaiting_agent → running` and ends in
//! exactly one of `completed`, `failed` or `cancelled`. Every terminal
//! transition closes the run's command channel, so late agent requests are
//! rejected rather than applied to a finished run.

use crate::channel::{ChannelError, CommandChannel};
use crate::events::{
    EventBus, RUN_CANCELLED, RUN_COMPLETED, RUN_FAILED, RUN_LOG, RUN_STARTED, TESTS_DISCOVERED,
};
use crate::reconcile::{ReconcileReport, reconcile};
use crate::tree::{TestNodeSnapshot, TestTree};
use chrono::{DateTime, Utc};
use jlc_common::{
    AgentCommand, AgentIdentity, AggregatedTestResult, ConfigError, DEFAULT_TEST_MATCH,
    InstancePath, LocateError, RunnerConfig, SourcemapError, TestMatcher, TestStatus, Workspace,
    discover_tests, find_framework_root,
};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors from starting a run. Display strings are shown to the user.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("A test run is already in progress")]
    AlreadyRunning,

    #[error("Sourcemap is missing or invalid: {0}")]
    Sourcemap(#[from] SourcemapError),

    #[error("{0}")]
    Locate(#[from] LocateError),

    #[error("Run configuration is missing or invalid: {0}")]
    Config(#[from] ConfigError),
}

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// Explicit request from the front-end.
    User,
    /// The run exceeded its timeout.
    Timeout,
    /// The daemon is shutting down.
    Shutdown,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Timeout => write!(f, "timeout"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    /// No run has been started yet.
    Idle,
    /// Framework root and config resolved; begin command not yet queued.
    Located,
    AwaitingAgent,
    Running,
    Completed,
    Failed { message: String },
    Cancelled { reason: CancelReason },
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed { .. } | Self::Cancelled { .. }
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Located => "located",
            Self::AwaitingAgent => "awaiting_agent",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}

/// Counts for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub files: usize,
    pub elapsed_ms: u64,
}

impl RunSummary {
    pub fn from_result(result: &AggregatedTestResult, elapsed: Duration) -> Self {
        let mut summary = Self {
            files: result.test_results.len(),
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        };
        for case in result.cases() {
            match case.status {
                TestStatus::Passed => summary.passed += 1,
                TestStatus::Failed => summary.failed += 1,
                _ => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Latest run state, published on every transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStatus {
    pub run_id: Option<Uuid>,
    #[serde(flatten)]
    pub phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
}

impl RunStatus {
    fn idle() -> Self {
        Self {
            run_id: None,
            phase: RunPhase::Idle,
            summary: None,
        }
    }
}

/// A started run, as returned to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunStarted {
    pub run_id: Uuid,
    pub framework_path: InstancePath,
}

/// Point-in-time view of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorSnapshot {
    #[serde(flatten)]
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_path: Option<InstancePath>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    pub output: Vec<String>,
    pub tree: Vec<TestNodeSnapshot>,
}

#[derive(Debug)]
struct ActiveRun {
    id: Uuid,
    phase: RunPhase,
    channel: CommandChannel,
    output: Vec<String>,
    framework_path: Option<InstancePath>,
    started_at: DateTime<Utc>,
    started: Instant,
    summary: Option<RunSummary>,
}

impl ActiveRun {
    fn status(&self) -> RunStatus {
        RunStatus {
            run_id: Some(self.id),
            phase: self.phase.clone(),
            summary: self.summary,
        }
    }

    /// First contact from the agent implies it started.
    fn mark_running(&mut self) -> bool {
        if self.phase == RunPhase::AwaitingAgent {
            self.phase = RunPhase::Running;
            return true;
        }
        false
    }

    fn finish(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.channel.close();
    }
}

#[derive(Debug, Default)]
struct OrchestratorState {
    run: Option<ActiveRun>,
    tree: TestTree,
}

impl OrchestratorState {
    /// The current run, if its channel admits `identity`.
    fn admitted_run(&mut self, identity: &AgentIdentity) -> Result<&mut ActiveRun, ChannelError> {
        let run = self.run.as_mut().ok_or(ChannelError::Closed)?;
        run.channel.check(identity)?;
        Ok(run)
    }
}

pub struct Orchestrator {
    workspace: Workspace,
    allowed_place_ids: Vec<String>,
    run_timeout: Option<Duration>,
    state: Mutex<OrchestratorState>,
    events: EventBus,
    status_tx: watch::Sender<RunStatus>,
}

impl Orchestrator {
    pub fn new(workspace: Workspace, allowed_place_ids: Vec<String>, events: EventBus) -> Self {
        let (status_tx, _) = watch::channel(RunStatus::idle());
        Self {
            workspace,
            allowed_place_ids,
            run_timeout: None,
            state: Mutex::new(OrchestratorState::default()),
            events,
            status_tx,
        }
    }

    /// Cancel runs that take longer than `timeout` (see [`launch_run`]).
    pub fn with_run_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.run_timeout = timeout;
        self
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_status(&self) -> watch::Receiver<RunStatus> {
        self.status_tx.subscribe()
    }

    /// Start a new run.
    ///
    /// Reads the sourcemap and the config from disk, locates the Jest install
    /// and queues the single begin command on a fresh channel. A lookup
    /// failure ends the run as `failed` before any agent can connect.
    pub async fn start_run(&self) -> Result<RunStarted, RunError> {
        let mut state = self.state.lock().await;
        if state
            .run
            .as_ref()
            .is_some_and(|run| !run.phase.is_terminal())
        {
            return Err(RunError::AlreadyRunning);
        }

        let id = Uuid::new_v4();
        let mut run = ActiveRun {
            id,
            phase: RunPhase::Idle,
            channel: CommandChannel::open(self.allowed_place_ids.clone()),
            output: Vec::new(),
            framework_path: None,
            started_at: Utc::now(),
            started: Instant::now(),
            summary: None,
        };

        let (framework_path, config) = match self.locate() {
            Ok(located) => located,
            Err(err) => {
                let message = err.to_string();
                warn!(run_id = %id, "run could not start: {}", message);
                run.finish(RunPhase::Failed {
                    message: message.clone(),
                });
                self.events
                    .emit(RUN_FAILED, &json!({ "run_id": id, "message": message }));
                self.status_tx.send_replace(run.status());
                state.run = Some(run);
                return Err(err);
            }
        };

        run.phase = RunPhase::Located;
        run.framework_path = Some(framework_path.clone());
        run.channel.enqueue(AgentCommand::RequestStartTests {
            framework_path: framework_path.clone(),
            config,
        });
        run.phase = RunPhase::AwaitingAgent;

        info!(run_id = %id, framework = %framework_path, "test run started");
        self.events.emit(
            RUN_STARTED,
            &json!({ "run_id": id, "framework_path": framework_path }),
        );
        self.status_tx.send_replace(run.status());
        state.run = Some(run);

        Ok(RunStarted {
            run_id: id,
            framework_path,
        })
    }

    fn locate(&self) -> Result<(InstancePath, RunnerConfig), RunError> {
        let sourcemap = self.workspace.load_sourcemap()?;
        let framework_path = find_framework_root(&sourcemap)?;
        let config = self.workspace.load_config()?;
        Ok((framework_path, config))
    }

    /// Drain pending commands for an admitted agent.
    pub async fn poll(&self, identity: &AgentIdentity) -> Result<Vec<AgentCommand>, ChannelError> {
        let mut state = self.state.lock().await;
        let run = state.admitted_run(identity)?;
        let commands = run.channel.poll();
        if !commands.is_empty() {
            debug!(run_id = %run.id, count = commands.len(), "delivered commands");
        }
        Ok(commands)
    }

    /// Append streamed output lines to the run, in arrival order.
    pub async fn append_log(
        &self,
        identity: &AgentIdentity,
        lines: Vec<String>,
    ) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        let run = state.admitted_run(identity)?;
        if run.mark_running() {
            self.status_tx.send_replace(run.status());
        }
        for line in lines {
            info!(target: "jlcd::agent", "{}", line);
            self.events
                .emit(RUN_LOG, &json!({ "run_id": run.id, "line": line }));
            run.output.push(line);
        }
        Ok(())
    }

    /// Reconcile the final report into the visible tree and end the run.
    pub async fn complete(
        &self,
        identity: &AgentIdentity,
        result: AggregatedTestResult,
    ) -> Result<RunSummary, ChannelError> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        let run = state.run.as_mut().ok_or(ChannelError::Closed)?;
        run.channel.check(identity)?;
        run.mark_running();

        let report: ReconcileReport = reconcile(&mut state.tree, &result);
        let summary = RunSummary::from_result(&result, run.started.elapsed());
        run.summary = Some(summary);
        run.finish(RunPhase::Completed);

        info!(
            run_id = %run.id,
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            "test run completed"
        );
        self.events.emit(
            RUN_COMPLETED,
            &json!({ "run_id": run.id, "summary": summary, "reconcile": report }),
        );
        self.status_tx.send_replace(run.status());
        Ok(summary)
    }

    /// End the run with an agent-reported failure.
    pub async fn fail(&self, identity: &AgentIdentity, diagnostic: Value) -> Result<(), ChannelError> {
        let mut state = self.state.lock().await;
        let run = state.admitted_run(identity)?;

        let detail = match diagnostic {
            Value::String(text) => text,
            other => other.to_string(),
        };
        let message = format!("Something went wrong within the plugin companion ({detail}).");
        warn!(run_id = %run.id, "{}", message);
        run.finish(RunPhase::Failed {
            message: message.clone(),
        });

        self.events
            .emit(RUN_FAILED, &json!({ "run_id": run.id, "message": message }));
        self.status_tx.send_replace(run.status());
        Ok(())
    }

    /// Cancel the in-flight run. Returns `false` when there is nothing to cancel.
    pub async fn cancel(&self, reason: CancelReason) -> bool {
        let mut state = self.state.lock().await;
        match state.run.as_mut() {
            Some(run) => self.cancel_locked(run, reason),
            None => false,
        }
    }

    /// Cancel run `run_id` only if it is still the current run.
    pub async fn cancel_run(&self, run_id: Uuid, reason: CancelReason) -> bool {
        let mut state = self.state.lock().await;
        match state.run.as_mut() {
            Some(run) if run.id == run_id => self.cancel_locked(run, reason),
            _ => false,
        }
    }

    fn cancel_locked(&self, run: &mut ActiveRun, reason: CancelReason) -> bool {
        if run.phase.is_terminal() {
            debug!(run_id = %run.id, phase = run.phase.name(), "ignoring late cancel");
            return false;
        }
        info!(run_id = %run.id, %reason, "test run cancelled");
        run.finish(RunPhase::Cancelled { reason });
        self.events
            .emit(RUN_CANCELLED, &json!({ "run_id": run.id, "reason": reason }));
        self.status_tx.send_replace(run.status());
        true
    }

    /// Re-read the sourcemap and add discovered tests to the visible tree.
    ///
    /// Discovery only adds or relabels items; pruning is left to
    /// reconciliation. Falls back to the default patterns when the config
    /// cannot be read.
    pub async fn refresh_discovery(&self) -> Result<usize, SourcemapError> {
        let sourcemap = self.workspace.load_sourcemap()?;
        let matcher = match self.workspace.load_config().map(|c| c.test_matcher()) {
            Ok(Ok(matcher)) => matcher,
            Ok(Err(err)) => {
                warn!("invalid testMatch, using defaults: {}", err);
                default_matcher()
            }
            Err(err) => {
                debug!("no usable config for discovery, using defaults: {}", err);
                default_matcher()
            }
        };

        let discovered = discover_tests(&sourcemap, &matcher);
        let mut state = self.state.lock().await;
        for test in &discovered {
            let id = state.tree.get_or_insert(None, &test.id, &test.label);
            if let Some(item) = state.tree.get_mut(id) {
                item.label = test.label.clone();
                item.file_path = test.file_path.clone();
            }
        }
        drop(state);

        info!(count = discovered.len(), "discovered tests");
        self.events
            .emit(TESTS_DISCOVERED, &json!({ "count": discovered.len(), "tests": discovered }));
        Ok(discovered.len())
    }

    pub async fn status(&self) -> RunStatus {
        self.status_tx.borrow().clone()
    }

    pub async fn snapshot(&self) -> OrchestratorSnapshot {
        let state = self.state.lock().await;
        let run = state.run.as_ref();
        OrchestratorSnapshot {
            status: run.map(ActiveRun::status).unwrap_or_else(RunStatus::idle),
            framework_path: run.and_then(|r| r.framework_path.clone()),
            started_at: run.map(|r| r.started_at),
            output: run.map(|r| r.output.clone()).unwrap_or_default(),
            tree: state.tree.snapshot(),
        }
    }

    /// Indented rendering of the visible tree, if it has any items.
    pub async fn render_tree(&self) -> Option<String> {
        let state = self.state.lock().await;
        (!state.tree.is_empty()).then(|| state.tree.render())
    }
}

fn default_matcher() -> TestMatcher {
    TestMatcher::new(DEFAULT_TEST_MATCH).unwrap_or_default()
}

/// Start a run and arm its timeout, if one is configured.
pub async fn launch_run(orchestrator: &Arc<Orchestrator>) -> Result<RunStarted, RunError> {
    let started = orchestrator.start_run().await?;
    if let Some(timeout) = orchestrator.run_timeout {
        let orchestrator = Arc::clone(orchestrator);
        let run_id = started.run_id;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if orchestrator.cancel_run(run_id, CancelReason::Timeout).await {
                warn!(%run_id, "test run timed out after {}", humantime::format_duration(timeout));
            }
        });
    }
    Ok(started)
}
