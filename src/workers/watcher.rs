//! Local filesystem watcher (§4.5 "Local watcher")
//!
//! Subscribes to modification events on the workflows directory for
//! `*.json` files. Debouncing — both deduplicating bursty editor writes and
//! waiting for a write to finish — is delegated to `notify-debouncer-full`'s
//! 1-second quiescence window rather than hand-rolled, so a single settled
//! event reaches the sync engine per edit.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use tracing::{debug, error, info, warn};

use crate::errors::SyncError;
use crate::sync::events::{emit_local, LocalChangeEvent, LocalEventSender};

const DEBOUNCE_WINDOW: Duration = Duration::from_secs(1);

/// Watch `dir` for `*.json` changes, forwarding a debounced
/// [`LocalChangeEvent`] per file to `sender` until `shutdown_signal` resolves.
///
/// The debouncer and its underlying OS watcher run on a dedicated thread
/// (the `notify` callback is synchronous); `sender`'s non-blocking
/// `try_send` lets that thread hand events to the async world without
/// needing a runtime handle of its own. On shutdown, a stop signal is sent
/// across a `std::sync::mpsc` channel so the thread can drop the debouncer
/// (unsubscribing the underlying `notify` watch) before this function
/// returns, rather than leaking the thread past logical shutdown.
pub async fn run(
    dir: PathBuf,
    sender: LocalEventSender,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), SyncError> {
    info!("Local filesystem watcher starting on {}", dir.display());

    let watch_sender = sender.clone();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();

    let handle = std::thread::spawn(move || {
        let result = watch_blocking(&dir, watch_sender, stop_rx);
        if let Err(e) = result {
            error!("filesystem watcher exited with error: {}", e);
        }
    });

    shutdown_signal.await;
    info!("Local filesystem watcher shutting down...");
    let _ = stop_tx.send(());
    match tokio::task::spawn_blocking(move || handle.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => warn!("filesystem watcher thread panicked"),
        Err(e) => warn!("failed to join filesystem watcher thread: {}", e),
    }
    Ok(())
}

fn watch_blocking(dir: &Path, sender: LocalEventSender, stop_rx: mpsc::Receiver<()>) -> Result<(), SyncError> {
    let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, None, move |result: DebounceEventResult| {
        match result {
            Ok(events) => {
                for event in events {
                    for path in &event.paths {
                        if path.extension().is_none_or(|ext| ext != "json") {
                            continue;
                        }
                        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                            continue;
                        };
                        debug!("debounced local change: {}", filename);
                        emit_local(
                            &sender,
                            LocalChangeEvent { path: path.clone(), filename: filename.to_string() },
                        );
                    }
                }
            }
            Err(errors) => {
                for e in errors {
                    warn!("filesystem watch error: {}", e);
                }
            }
        }
    })
    .map_err(|e| SyncError::Internal(format!("failed to create filesystem watcher: {e}")))?;

    debouncer
        .watch(dir, RecursiveMode::NonRecursive)
        .map_err(|e| SyncError::Internal(format!("failed to watch {}: {e}", dir.display())))?;

    // Block until `run` sends the stop signal (or drops its sender, which
    // errors `recv` the same way); the debouncer's internal worker thread
    // does the actual polling/event delivery via the callback above in the
    // meantime.
    let _ = stop_rx.recv();
    drop(debouncer);
    Ok(())
}
