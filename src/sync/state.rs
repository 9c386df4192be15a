//! Per-workflow sync state (§3)

use chrono::{DateTime, Utc};

use crate::fingerprint::Fingerprint;

/// Per-workflow record held by the engine, carrying fingerprints,
/// timestamps, and in-flight flags. At most one `SyncState` exists per
/// `wid` at any time (enforced by the engine's map).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub wid: String,
    pub name: String,
    pub local_hash: Option<Fingerprint>,
    pub remote_hash: Option<Fingerprint>,
    /// Wall-clock timestamp of the last local change. When sourced from
    /// filesystem mtime (see `LocalStore::modified_at`) this is **not**
    /// clock-synchronized with the server's `updatedAt` — a known source
    /// of misorderings near in time for `prefer-newest` resolution.
    pub local_updated: Option<DateTime<Utc>>,
    pub remote_updated: Option<DateTime<Utc>>,
    /// True while a propagation is in flight for this `wid`. Guards against
    /// starting a second propagation and against re-acting on the echo of
    /// our own write.
    pub syncing: bool,
    /// True while a conflict awaits resolution.
    pub conflict: bool,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncState {
    pub fn new(wid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            wid: wid.into(),
            name: name.into(),
            local_hash: None,
            remote_hash: None,
            local_updated: None,
            remote_updated: None,
            syncing: false,
            conflict: false,
            last_sync: None,
        }
    }
}

/// Invariant 4 / `hasConflict`: true iff both sides have a hash, both sides
/// have a timestamp, and the hashes differ. Maximally conservative — any
/// concurrent divergence is treated as a conflict.
pub fn has_conflict(state: &SyncState) -> bool {
    match (&state.local_hash, &state.remote_hash, state.local_updated, state.remote_updated) {
        (Some(local), Some(remote), Some(_), Some(_)) => local != remote,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SyncState {
        let mut s = SyncState::new("abc", "Demo");
        s.local_hash = Some("H".to_string());
        s.remote_hash = Some("H".to_string());
        s.local_updated = Some(Utc::now());
        s.remote_updated = Some(Utc::now());
        s
    }

    #[test]
    fn no_conflict_when_hashes_match() {
        assert!(!has_conflict(&base()));
    }

    #[test]
    fn conflict_when_hashes_diverge_with_both_timestamps() {
        let mut s = base();
        s.local_hash = Some("H_L".to_string());
        s.remote_hash = Some("H_R".to_string());
        assert!(has_conflict(&s));
    }

    #[test]
    fn no_conflict_when_a_timestamp_is_missing() {
        let mut s = base();
        s.local_hash = Some("H_L".to_string());
        s.remote_hash = Some("H_R".to_string());
        s.local_updated = None;
        assert!(!has_conflict(&s));
    }

    #[test]
    fn no_conflict_when_a_hash_is_missing() {
        let mut s = base();
        s.remote_hash = None;
        assert!(!has_conflict(&s));
    }
}
