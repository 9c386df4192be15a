//! Environment-derived settings (§6)
//!
//! `N8N_URL` (default `http://localhost:5678`), `API_N8N`, and
//! `N8N_BASIC_AUTH_USER` / `N8N_BASIC_AUTH_PASSWORD` configure the remote
//! side; the API key takes precedence when both forms of auth are present.
//! `WORKFLOWS_DIR`, poll interval, and conflict-resolution strategy are
//! process-local and may be overridden by CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use crate::errors::SyncError;
use crate::http::client::AuthConfig;
use crate::sync::resolver::Strategy;

const DEFAULT_N8N_URL: &str = "http://localhost:5678";
const DEFAULT_WORKFLOWS_DIR: &str = "./workflows";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Settings resolved once at startup and threaded explicitly to whatever
/// needs them — there is no process-wide global.
#[derive(Debug, Clone)]
pub struct Settings {
    pub n8n_url: String,
    pub auth: AuthConfig,
    pub workflows_dir: PathBuf,
    pub poll_interval: Duration,
    pub conflict_resolution: Strategy,
}

impl Settings {
    /// Build settings from environment variables, falling back to defaults.
    /// `.env` (if present) should already have been loaded by the caller.
    pub fn from_env() -> Result<Self, SyncError> {
        let n8n_url = std::env::var("N8N_URL").unwrap_or_else(|_| DEFAULT_N8N_URL.to_string());
        let auth = auth_from_env()?;
        let workflows_dir = std::env::var("WORKFLOWS_DIR")
            .unwrap_or_else(|_| DEFAULT_WORKFLOWS_DIR.to_string())
            .into();
        let poll_interval = std::env::var("POLL_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
        let conflict_resolution = std::env::var("CONFLICT_RESOLUTION")
            .ok()
            .and_then(|v| Strategy::parse(&v).ok())
            .unwrap_or(Strategy::Ask);

        Ok(Self { n8n_url, auth, workflows_dir, poll_interval, conflict_resolution })
    }
}

fn auth_from_env() -> Result<AuthConfig, SyncError> {
    if let Ok(key) = std::env::var("API_N8N") {
        if !key.is_empty() {
            return Ok(AuthConfig::ApiKey(key));
        }
    }
    let user = std::env::var("N8N_BASIC_AUTH_USER").ok();
    let password = std::env::var("N8N_BASIC_AUTH_PASSWORD").ok();
    match (user, password) {
        (Some(user), Some(password)) => Ok(AuthConfig::Basic { user, password }),
        _ => Err(SyncError::ConfigError(
            "set API_N8N or both N8N_BASIC_AUTH_USER and N8N_BASIC_AUTH_PASSWORD".to_string(),
        )),
    }
}
