//! Remote Adapter (§4.3)
//!
//! A stateless client exposing the handful of operations the sync core
//! needs against an n8n-compatible REST API. Modeled as a trait so the
//! sync engine can be exercised against an in-memory fake in tests.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::SyncError;
use crate::http::client::HttpClient;
use crate::models::workflow::{Workflow, WorkflowSummary};

/// Remote collaborator for one workflow server.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    /// Ordered list of `{wid, name, active, createdAt, updatedAt, isArchived}`.
    async fn enumerate(&self) -> Result<Vec<WorkflowSummary>, SyncError>;

    /// Full workflow body, or `None` if the server returns 404.
    async fn fetch(&self, wid: &str) -> Result<Option<Workflow>, SyncError>;

    /// Create a workflow from a sanitized body; returns it with the
    /// server-assigned `wid`.
    async fn create(&self, body: &Workflow) -> Result<Workflow, SyncError>;

    /// Update a workflow from a sanitized body. `None` if the server
    /// reports the workflow does not exist.
    async fn update(&self, wid: &str, body: &Workflow) -> Result<Option<Workflow>, SyncError>;

    /// `true` if deleted, `false` if the workflow did not exist.
    async fn delete(&self, wid: &str) -> Result<bool, SyncError>;

    async fn activate(&self, wid: &str) -> Result<(), SyncError>;

    async fn deactivate(&self, wid: &str) -> Result<(), SyncError>;
}

/// `GET workflows` responses come back either as `{"data": [...]}` or as a
/// bare JSON array, depending on server version; this accepts either shape.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnumerateResponse {
    Wrapped { data: Vec<WorkflowSummary> },
    Bare(Vec<WorkflowSummary>),
}

impl From<EnumerateResponse> for Vec<WorkflowSummary> {
    fn from(response: EnumerateResponse) -> Self {
        match response {
            EnumerateResponse::Wrapped { data } => data,
            EnumerateResponse::Bare(list) => list,
        }
    }
}

/// n8n-compatible implementation of [`RemoteAdapter`].
pub struct N8nAdapter {
    client: HttpClient,
}

impl N8nAdapter {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteAdapter for N8nAdapter {
    async fn enumerate(&self) -> Result<Vec<WorkflowSummary>, SyncError> {
        let response: Option<EnumerateResponse> = self.client.get("workflows").await?;
        Ok(response.map(Into::into).unwrap_or_default())
    }

    async fn fetch(&self, wid: &str) -> Result<Option<Workflow>, SyncError> {
        let value: Option<Value> = self.client.get(&format!("workflows/{wid}")).await?;
        value.map(Workflow::from_value).transpose()
    }

    async fn create(&self, body: &Workflow) -> Result<Workflow, SyncError> {
        let value: Value = self.client.post("workflows", &body.to_value()).await?;
        Workflow::from_value(value)
    }

    async fn update(&self, wid: &str, body: &Workflow) -> Result<Option<Workflow>, SyncError> {
        let value: Option<Value> =
            self.client.put(&format!("workflows/{wid}"), &body.to_value()).await?;
        value.map(Workflow::from_value).transpose()
    }

    async fn delete(&self, wid: &str) -> Result<bool, SyncError> {
        self.client.delete(&format!("workflows/{wid}")).await
    }

    async fn activate(&self, wid: &str) -> Result<(), SyncError> {
        self.client.post_empty(&format!("workflows/{wid}/activate")).await
    }

    async fn deactivate(&self, wid: &str) -> Result<(), SyncError> {
        self.client.post_empty(&format!("workflows/{wid}/deactivate")).await
    }
}
