//! Directory watcher: watches `inbox/` for new payload files via `notify`,
//! falling back to polling when the platform backend is unavailable, and
//! processes each one through [`crate::processor`].

use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use runforge_cascade::Cascade;
use runforge_types::RunforgeError;
use tokio_util::sync::CancellationToken;

use crate::processor::{process_file, recover_orphans, SentinelPaths};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Runs until `cancel` fires. Fails any orphaned `processing/` files left
/// by a prior crash on entry (see [`recover_orphans`]), then drains
/// `inbox/` once before starting to watch for new arrivals, so nothing
/// dropped while the daemon was down is missed.
pub async fn run(
    cascade: &Cascade,
    paths: &SentinelPaths,
    cancel: &CancellationToken,
) -> Result<(), RunforgeError> {
    paths.ensure_dirs().await?;

    let recovered = recover_orphans(paths).await?;
    if recovered > 0 {
        tracing::warn!(count = recovered, "failed orphaned sentinel payloads left by a prior crash");
    }

    drain_inbox(cascade, paths, cancel).await?;

    let (tx, rx) = channel::<notify::Result<Event>>();
    let watcher_result = RecommendedWatcher::new(
        move |res| {
            let _ = tx.send(res);
        },
        Config::default(),
    );

    match watcher_result {
        Ok(mut watcher) => {
            if watcher.watch(&paths.inbox, RecursiveMode::NonRecursive).is_ok() {
                return watch_events(cascade, paths, cancel, rx).await;
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "notify backend unavailable, falling back to polling");
        }
    }
    poll_loop(cascade, paths, cancel).await
}

async fn watch_events(
    cascade: &Cascade,
    paths: &SentinelPaths,
    cancel: &CancellationToken,
    rx: std::sync::mpsc::Receiver<notify::Result<Event>>,
) -> Result<(), RunforgeError> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        match rx.try_recv() {
            Ok(Ok(event)) => {
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    drain_inbox(cascade, paths, cancel).await?;
                }
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "sentinel watch error"),
            Err(std::sync::mpsc::TryRecvError::Empty) => {
                tokio::select! {
                    _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    _ = cancel.cancelled() => return Ok(()),
                }
            }
            Err(std::sync::mpsc::TryRecvError::Disconnected) => {
                return poll_loop(cascade, paths, cancel).await;
            }
        }
    }
}

async fn poll_loop(
    cascade: &Cascade,
    paths: &SentinelPaths,
    cancel: &CancellationToken,
) -> Result<(), RunforgeError> {
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }
        drain_inbox(cascade, paths, cancel).await?;
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = cancel.cancelled() => return Ok(()),
        }
    }
}

async fn drain_inbox(
    cascade: &Cascade,
    paths: &SentinelPaths,
    cancel: &CancellationToken,
) -> Result<(), RunforgeError> {
    let mut names: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(&paths.inbox).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            names.push(entry.path());
        }
    }
    names.sort();

    for path in names {
        if cancel.is_cancelled() {
            break;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let file_name = file_name.to_string();
        let dest = paths.processing.join(&file_name);
        if tokio::fs::rename(&path, &dest).await.is_err() {
            continue;
        }
        if let Err(e) = process_file(cascade, paths, &file_name, cancel).await {
            tracing::error!(file = %file_name, error = %e, "sentinel failed to process payload");
        }
    }
    Ok(())
}
