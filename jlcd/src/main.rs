//! Jest Lua Companion - local daemon
//!
//! Serves the polling protocol used by the in-place test agent, drives test
//! runs and keeps the visible test tree in sync with their results.

#![forbid(unsafe_code)]

mod channel;
mod events;
mod http_api;
mod reconcile;
mod run;
mod tree;
mod watcher;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use events::EventBus;
use http_api::HttpState;
use jlc_common::protocol::DEFAULT_PORT;
use jlc_common::{
    DEFAULT_TEST_MATCH, LogConfig, TestMatcher, Workspace, discover_tests, find_framework_root,
    init_logging,
};
use run::{CancelReason, Orchestrator, RunPhase, launch_run};

#[derive(Parser)]
#[command(name = "jlcd")]
#[command(author, version, about = "Jest Lua Companion - runs Jest tests through an in-place agent")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the test suite once and print the results
    Run(DaemonArgs),
    /// Serve agent and control routes until interrupted
    Serve(DaemonArgs),
    /// Print the Jest install and the tests found in the sourcemap
    Discover {
        /// Project directory holding sourcemap.json and jest-runner.toml
        #[arg(short, long, env = "JLC_WORKSPACE", default_value = ".")]
        workspace: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct DaemonArgs {
    /// Project directory holding sourcemap.json and jest-runner.toml
    #[arg(short, long, env = "JLC_WORKSPACE", default_value = ".")]
    workspace: PathBuf,

    /// Port the agent polls
    #[arg(short, long, env = "JLC_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Place ids allowed to connect (comma separated; empty allows any)
    #[arg(long = "allow-place-id", env = "JLC_ALLOWED_PLACE_IDS", value_delimiter = ',')]
    allowed_place_ids: Vec<String>,

    /// Cancel a run that has not finished after this long (e.g. "5m")
    #[arg(long, env = "JLC_RUN_TIMEOUT", value_parser = humantime::parse_duration)]
    run_timeout: Option<Duration>,
}

impl DaemonArgs {
    fn orchestrator(&self) -> Arc<Orchestrator> {
        let allowed = self
            .allowed_place_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Arc::new(
            Orchestrator::new(
                Workspace::new(self.workspace.clone()),
                allowed,
                EventBus::default(),
            )
            .with_run_timeout(self.run_timeout),
        )
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // One-shot commands print their own output; keep the log quiet unless asked.
    let default_level = match cli.command {
        Command::Serve(_) => "info",
        Command::Run(_) | Command::Discover { .. } => "warn",
    };
    init_logging(
        &LogConfig::from_env(default_level)
            .with_verbose(cli.verbose)
            .with_json(cli.json_logs),
    )?;

    match cli.command {
        Command::Run(args) => run_once(args).await,
        Command::Serve(args) => serve(args).await,
        Command::Discover { workspace, json } => discover(workspace, json),
    }
}

fn http_state(orchestrator: &Arc<Orchestrator>) -> HttpState {
    HttpState {
        orchestrator: Arc::clone(orchestrator),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
    }
}

fn shutdown_signal(mut rx: watch::Receiver<bool>) -> impl Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

/// Print agent output carried by a `run_log` event.
fn print_log_line(raw: &str) {
    let Ok(event) = serde_json::from_str::<serde_json::Value>(raw) else {
        return;
    };
    if event["event"] == events::RUN_LOG {
        if let Some(line) = event["data"]["line"].as_str() {
            println!("{line}");
        }
    }
}

async fn run_once(args: DaemonArgs) -> Result<ExitCode> {
    let orchestrator = args.orchestrator();
    let mut status = orchestrator.subscribe_status();
    let mut event_rx = orchestrator.events().subscribe();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = http_api::start_server(
        args.port,
        http_api::create_agent_router(http_state(&orchestrator)),
        shutdown_signal(shutdown_rx),
    )
    .await
    .with_context(|| format!("Failed to listen on port {}", args.port))?;

    if let Err(err) = launch_run(&orchestrator).await {
        eprintln!("{err}");
        let _ = shutdown_tx.send(true);
        return Ok(ExitCode::FAILURE);
    }
    println!("Waiting for the test agent on port {}...", args.port);

    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Ok(raw) => print_log_line(&raw),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("dropped {} log events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = status.wait_for(|s| s.phase.is_terminal()) => break,
            _ = tokio::signal::ctrl_c() => {
                orchestrator.cancel(CancelReason::Shutdown).await;
                break;
            }
        }
    }
    while let Ok(raw) = event_rx.try_recv() {
        print_log_line(&raw);
    }

    let _ = shutdown_tx.send(true);
    if let Ok(Err(err)) = server.await {
        warn!("HTTP server error: {}", err);
    }

    let final_status = orchestrator.status().await;
    if let Some(tree) = orchestrator.render_tree().await {
        print!("\n{tree}");
    }

    let code = match &final_status.phase {
        RunPhase::Completed => match final_status.summary {
            Some(summary) => {
                println!(
                    "\nTests: {} failed, {} skipped, {} passed, {} total ({}ms)",
                    summary.failed,
                    summary.skipped,
                    summary.passed,
                    summary.total(),
                    summary.elapsed_ms
                );
                if summary.failed > 0 {
                    ExitCode::FAILURE
                } else {
                    ExitCode::SUCCESS
                }
            }
            None => ExitCode::SUCCESS,
        },
        RunPhase::Failed { message } => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
        RunPhase::Cancelled { reason } => {
            eprintln!("Test run cancelled ({reason})");
            ExitCode::FAILURE
        }
        _ => ExitCode::FAILURE,
    };
    Ok(code)
}

async fn serve(args: DaemonArgs) -> Result<ExitCode> {
    let orchestrator = args.orchestrator();

    if let Err(err) = orchestrator.refresh_discovery().await {
        warn!("initial test discovery failed: {}", err);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = tokio::spawn(watcher::watch_sourcemap(
        Arc::clone(&orchestrator),
        shutdown_rx.clone(),
    ));
    let server = http_api::start_server(
        args.port,
        http_api::create_router(http_state(&orchestrator)),
        shutdown_signal(shutdown_rx),
    )
    .await
    .with_context(|| format!("Failed to listen on port {}", args.port))?;

    info!(workspace = %args.workspace.display(), "jlcd ready");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("shutting down");

    orchestrator.cancel(CancelReason::Shutdown).await;
    let _ = shutdown_tx.send(true);
    if let Ok(Err(err)) = server.await {
        warn!("HTTP server error: {}", err);
    }
    match watcher.await {
        Ok(Err(err)) => warn!("sourcemap watcher failed: {}", err),
        Err(err) => warn!("sourcemap watcher task failed: {}", err),
        Ok(Ok(())) => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn discover(root: PathBuf, as_json: bool) -> Result<ExitCode> {
    let workspace = Workspace::new(root);
    let sourcemap = workspace
        .load_sourcemap()
        .context("Sourcemap is missing or invalid")?;
    let framework = find_framework_root(&sourcemap).ok();

    let matcher = match workspace.load_config() {
        Ok(config) => config.test_matcher()?,
        Err(err) => {
            warn!("using default testMatch: {}", err);
            TestMatcher::new(DEFAULT_TEST_MATCH)?
        }
    };
    let tests = discover_tests(&sourcemap, &matcher);

    if as_json {
        let output = json!({ "framework_path": framework, "tests": tests });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match &framework {
            Some(path) => println!("jest: {path}"),
            None => println!("jest: not found"),
        }
        println!("{} test module(s)", tests.len());
        for test in &tests {
            if test.label == test.id {
                println!("  {}", test.id);
            } else {
                println!("  {}  ({})", test.id, test.label);
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
