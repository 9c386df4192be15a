//! Conflict Resolver (§4.7)
//!
//! Modeled as a trait with one method returning a [`Resolution`], so `ask`
//! (which blocks on terminal input) and the pure `prefer-*` strategies are
//! interchangeable without dynamic lookup on a mutable callback slot.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Duration as ChronoDuration;
use tracing::warn;

use crate::errors::SyncError;
use crate::sync::state::SyncState;

/// Configured strategy, as named by the `--conflict-resolution` CLI flag
/// and the `CONFLICT_RESOLUTION` environment variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Ask,
    PreferLocal,
    PreferRemote,
    PreferNewest,
}

impl Strategy {
    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s.to_ascii_lowercase().as_str() {
            "ask" => Ok(Strategy::Ask),
            "local" => Ok(Strategy::PreferLocal),
            "remote" => Ok(Strategy::PreferRemote),
            "latest" | "newest" => Ok(Strategy::PreferNewest),
            other => Err(SyncError::ConfigError(format!("unknown conflict resolution {other:?}"))),
        }
    }
}

/// What a resolver decided to do about a conflicted `SyncState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    PreferLocal,
    PreferRemote,
    /// Leave `conflict = true`; the next change on either side re-enters
    /// the resolver.
    Skip,
}

/// Policy layer that decides a winner for a conflicted workflow. Never
/// merges — conflict resolution always picks one side wholesale.
pub trait ConflictResolver: Send + Sync {
    fn resolve(&self, state: &SyncState) -> Resolution;
}

pub struct PreferLocalResolver;
impl ConflictResolver for PreferLocalResolver {
    fn resolve(&self, _state: &SyncState) -> Resolution {
        Resolution::PreferLocal
    }
}

pub struct PreferRemoteResolver;
impl ConflictResolver for PreferRemoteResolver {
    fn resolve(&self, _state: &SyncState) -> Resolution {
        Resolution::PreferRemote
    }
}

/// `localUpdated > remoteUpdated` prefers local; ties (and the missing-
/// timestamp case, which `has_conflict` already rules out) break to
/// prefer-remote.
pub struct PreferNewestResolver {
    warned_close_call: AtomicBool,
}

impl Default for PreferNewestResolver {
    fn default() -> Self {
        Self { warned_close_call: AtomicBool::new(false) }
    }
}

impl ConflictResolver for PreferNewestResolver {
    fn resolve(&self, state: &SyncState) -> Resolution {
        let (Some(local), Some(remote)) = (state.local_updated, state.remote_updated) else {
            return Resolution::PreferRemote;
        };

        let gap = (local - remote).abs();
        if gap < ChronoDuration::seconds(1) && !self.warned_close_call.swap(true, Ordering::Relaxed) {
            warn!(
                "prefer-newest decided {} with a sub-second gap ({}ms) between local mtime \
                 and remote updatedAt; these clocks are not synchronized",
                state.wid,
                gap.num_milliseconds()
            );
        }

        if local > remote {
            Resolution::PreferLocal
        } else {
            Resolution::PreferRemote
        }
    }
}

/// Synchronously consults an operator callback. The default CLI wiring
/// prompts on the terminal; tests substitute a scripted callback.
pub struct AskResolver<F: Fn(&SyncState) -> Resolution + Send + Sync> {
    callback: F,
}

impl<F: Fn(&SyncState) -> Resolution + Send + Sync> AskResolver<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: Fn(&SyncState) -> Resolution + Send + Sync> ConflictResolver for AskResolver<F> {
    fn resolve(&self, state: &SyncState) -> Resolution {
        (self.callback)(state)
    }
}

/// Default terminal prompt used when `--conflict-resolution ask` is active
/// outside of tests.
pub fn prompt_operator(state: &SyncState) -> Resolution {
    loop {
        print!(
            "Conflict on '{}' ({}) — keep [l]ocal, [r]emote, or [s]kip? ",
            state.name, state.wid
        );
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        if std::io::stdin().read_line(&mut line).is_err() {
            return Resolution::Skip;
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "l" | "local" => return Resolution::PreferLocal,
            "r" | "remote" => return Resolution::PreferRemote,
            "s" | "skip" | "" => return Resolution::Skip,
            _ => println!("please answer l, r, or s"),
        }
    }
}

/// Build the resolver named by a [`Strategy`].
pub fn resolver_for(strategy: Strategy) -> Box<dyn ConflictResolver> {
    match strategy {
        Strategy::Ask => Box::new(AskResolver::new(prompt_operator)),
        Strategy::PreferLocal => Box::new(PreferLocalResolver),
        Strategy::PreferRemote => Box::new(PreferRemoteResolver),
        Strategy::PreferNewest => Box::new(PreferNewestResolver::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn state_with(local: DateTimeOffset, remote: DateTimeOffset) -> SyncState {
        let mut s = SyncState::new("abc", "Demo");
        s.local_hash = Some("H_L".to_string());
        s.remote_hash = Some("H_R".to_string());
        s.local_updated = Some(Utc::now() + ChronoDuration::seconds(local.0));
        s.remote_updated = Some(Utc::now() + ChronoDuration::seconds(remote.0));
        s
    }

    struct DateTimeOffset(i64);

    #[test]
    fn prefer_local_always_prefers_local() {
        assert_eq!(PreferLocalResolver.resolve(&state_with(DateTimeOffset(-10), DateTimeOffset(0))), Resolution::PreferLocal);
    }

    #[test]
    fn prefer_remote_always_prefers_remote() {
        assert_eq!(PreferRemoteResolver.resolve(&state_with(DateTimeOffset(10), DateTimeOffset(0))), Resolution::PreferRemote);
    }

    #[test]
    fn prefer_newest_picks_newer_local() {
        let resolver = PreferNewestResolver::default();
        let state = state_with(DateTimeOffset(100), DateTimeOffset(0));
        assert_eq!(resolver.resolve(&state), Resolution::PreferLocal);
    }

    #[test]
    fn prefer_newest_breaks_ties_to_remote() {
        let resolver = PreferNewestResolver::default();
        let state = state_with(DateTimeOffset(0), DateTimeOffset(0));
        assert_eq!(resolver.resolve(&state), Resolution::PreferRemote);
    }

    #[test]
    fn strategy_parses_flag_values() {
        assert_eq!(Strategy::parse("local").unwrap(), Strategy::PreferLocal);
        assert_eq!(Strategy::parse("latest").unwrap(), Strategy::PreferNewest);
        assert!(Strategy::parse("bogus").is_err());
    }

    #[test]
    fn ask_resolver_delegates_to_callback() {
        let resolver = AskResolver::new(|_state: &SyncState| Resolution::Skip);
        assert_eq!(resolver.resolve(&state_with(DateTimeOffset(0), DateTimeOffset(0))), Resolution::Skip);
    }
}
