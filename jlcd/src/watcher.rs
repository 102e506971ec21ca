//! Sourcemap watcher: reruns discovery when `sourcemap.json` changes.

use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use crate::run::Orchestrator;
use jlc_common::Workspace;

const DEBOUNCE: Duration = Duration::from_millis(250);

/// Whether `event` touches the workspace's sourcemap.
fn is_sourcemap_change(workspace: &Workspace, event: &Event) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event.paths.iter().any(|path| workspace.is_sourcemap(path))
}

/// Watch the workspace until `shutdown` flips to `true`.
///
/// Bursts of events are coalesced into one discovery pass. Discovery errors
/// are logged and the watcher keeps running.
pub async fn watch_sourcemap(
    orchestrator: Arc<Orchestrator>,
    mut shutdown: watch::Receiver<bool>,
) -> notify::Result<()> {
    let workspace = orchestrator.workspace().clone();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<()>();
    let filter_workspace = workspace.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_sourcemap_change(&filter_workspace, &event) => {
            let _ = event_tx.send(());
        }
        Ok(_) => {}
        Err(err) => warn!("sourcemap watch error: {}", err),
    })?;
    watcher.watch(workspace.root(), RecursiveMode::NonRecursive)?;
    debug!(root = %workspace.root().display(), "watching for sourcemap changes");

    let mut pending = false;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            Some(()) = event_rx.recv() => {
                pending = true;
            }
            _ = tokio::time::sleep(DEBOUNCE), if pending => {
                pending = false;
                if let Err(err) = orchestrator.refresh_discovery().await {
                    warn!("test discovery failed: {}", err);
                }
            }
        }
    }
    Ok(())
}
