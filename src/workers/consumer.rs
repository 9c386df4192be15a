//! Event consumer workers (§4.6)
//!
//! Two small loops drain the local-change and remote-change `mpsc`
//! channels and hand each event to the engine. Kept separate from the
//! producers (watcher, poller) so a slow local-to-remote propagation never
//! blocks the remote poller from detecting the next change, and vice
//! versa.

use std::future::Future;
use std::pin::Pin;

use tracing::error;

use crate::sync::engine::SyncEngine;
use crate::sync::events::{LocalEventReceiver, RemoteEventReceiver};

/// Drain local filesystem change events, propagating each to the remote
/// server via the engine.
pub async fn run_local(
    engine: &SyncEngine,
    mut receiver: LocalEventReceiver,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => return,
            event = receiver.recv() => {
                let Some(event) = event else { return };
                if let Err(e) = engine.handle_local_event(event).await {
                    error!("failed to handle local change: {}", e);
                }
            }
        }
    }
}

/// Drain remote change events, propagating each to the local directory via
/// the engine.
pub async fn run_remote(
    engine: &SyncEngine,
    mut receiver: RemoteEventReceiver,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => return,
            event = receiver.recv() => {
                let Some(event) = event else { return };
                if let Err(e) = engine.handle_remote_event(event).await {
                    error!("failed to handle remote change: {}", e);
                }
            }
        }
    }
}
