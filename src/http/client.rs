//! Low-level HTTP plumbing shared by the remote adapter (§4.3, §6).
//!
//! Exactly one of an API key or HTTP Basic credentials is configured.
//! Every request carries the default 10-second timeout; non-2xx responses
//! are turned into [`SyncError::Transport`] carrying the status and body.

use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::errors::SyncError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Authentication configured for the remote API. Exactly one variant is
/// ever constructed — see [`AuthConfig::from_env`] and `Settings::auth`.
#[derive(Debug, Clone)]
pub enum AuthConfig {
    ApiKey(String),
    Basic { user: String, password: String },
}

/// A thin `reqwest`-backed client for the remote workflow server.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    auth: AuthConfig,
}

impl HttpClient {
    pub fn new(base_url: &str, auth: AuthConfig) -> Result<Self, SyncError> {
        Url::parse(base_url)
            .map_err(|e| SyncError::ConfigError(format!("invalid N8N_URL {base_url:?}: {e}")))?;
        let client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            AuthConfig::ApiKey(key) => builder.header("X-N8N-API-KEY", key),
            AuthConfig::Basic { user, password } => builder.basic_auth(user, Some(password)),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `GET path` → `Some(T)`, `None` on 404, `Err` on any other non-2xx or
    /// transport failure.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, SyncError> {
        let url = self.url(path);
        debug!("GET {}", url);
        let response = self.authorize(self.client.get(&url)).send().await?;
        self.handle_optional(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, SyncError> {
        let url = self.url(path);
        debug!("POST {}", url);
        let response = self.authorize(self.client.post(&url)).json(body).send().await?;
        self.handle_required(response).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, SyncError> {
        let url = self.url(path);
        debug!("PUT {}", url);
        let response = self.authorize(self.client.put(&url)).json(body).send().await?;
        self.handle_optional(response).await
    }

    /// `DELETE path` → `true` if deleted (2xx/204), `false` on 404.
    pub async fn delete(&self, path: &str) -> Result<bool, SyncError> {
        let url = self.url(path);
        debug!("DELETE {}", url);
        let response = self.authorize(self.client.delete(&url)).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(transport_error(status, response).await),
        }
    }

    /// `POST path` with no body and no response payload expected.
    pub async fn post_empty(&self, path: &str) -> Result<(), SyncError> {
        let url = self.url(path);
        debug!("POST {} (no body)", url);
        let response = self.authorize(self.client.post(&url)).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(transport_error(response.status(), response).await)
        }
    }

    async fn handle_optional<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<Option<T>, SyncError> {
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.json().await?)),
            status => Err(transport_error(status, response).await),
        }
    }

    async fn handle_required<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, SyncError> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json().await?)
        } else {
            Err(transport_error(status, response).await)
        }
    }
}

async fn transport_error(status: StatusCode, response: reqwest::Response) -> SyncError {
    let body = response.text().await.unwrap_or_default();
    SyncError::Transport { status: status.to_string(), body }
}
