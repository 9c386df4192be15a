//! Remote poller worker (§4.5 "Remote poller")
//!
//! Periodically enumerates the remote server and emits a
//! [`RemoteChangeEvent`] for every monitored workflow whose `updatedAt`
//! moved since the last poll. Detection only — committing the new state is
//! `SyncEngine::handle_remote_event`'s job, run by the consumer worker.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::sync::engine::SyncEngine;
use crate::sync::events::RemoteEventSender;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between remote enumerations
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self { interval: Duration::from_secs(10) }
    }
}

/// Run the remote poller worker
pub async fn run<S, F>(
    options: &Options,
    engine: &SyncEngine,
    sender: &RemoteEventSender,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Remote poller worker starting (interval {:?})...", options.interval);

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Remote poller worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with poll
            }
        }

        debug!("Polling remote for updates...");
        if let Err(e) = engine.poll_once(sender).await {
            error!("Remote poll failed: {}", e);
        }
    }
}
