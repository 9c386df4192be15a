//! Change event types and the channels that carry them (§4.5, §5)
//!
//! Two independent producers — the filesystem watcher and the remote
//! poller — feed per-workflow change events into bounded `mpsc` channels.
//! Back-pressure is unnecessary (events are small and cheap); a full
//! channel drops the new event with a warning rather than blocking the
//! producer.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::warn;

/// A local file changed (after the filesystem watcher's debounce settles).
#[derive(Debug, Clone)]
pub struct LocalChangeEvent {
    pub path: PathBuf,
    pub filename: String,
}

/// A remote workflow's `updatedAt` (and fingerprint, once checked) changed.
#[derive(Debug, Clone)]
pub struct RemoteChangeEvent {
    pub wid: String,
}

const CHANNEL_CAPACITY: usize = 256;

pub type LocalEventSender = mpsc::Sender<LocalChangeEvent>;
pub type LocalEventReceiver = mpsc::Receiver<LocalChangeEvent>;
pub type RemoteEventSender = mpsc::Sender<RemoteChangeEvent>;
pub type RemoteEventReceiver = mpsc::Receiver<RemoteChangeEvent>;

pub fn local_channel() -> (LocalEventSender, LocalEventReceiver) {
    mpsc::channel(CHANNEL_CAPACITY)
}

pub fn remote_channel() -> (RemoteEventSender, RemoteEventReceiver) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// Non-blocking send: a full channel drops the event rather than stalling
/// the emitting task.
pub fn emit_local(sender: &LocalEventSender, event: LocalChangeEvent) {
    if let Err(e) = sender.try_send(event) {
        warn!("local change queue full, dropping event: {}", e);
    }
}

pub fn emit_remote(sender: &RemoteEventSender, event: RemoteChangeEvent) {
    if let Err(e) = sender.try_send(event) {
        warn!("remote change queue full, dropping event: {}", e);
    }
}
