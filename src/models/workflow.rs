//! Workflow data model
//!
//! A workflow's body (nodes, connections, settings, static data, tags) is
//! opaque to this crate — it is whatever the remote server accepts and
//! returns. We keep it as a JSON object and only reach into the handful of
//! top-level keys the sync core actually needs.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::SyncError;

/// Top-level keys the server owns and that must never affect a fingerprint
/// or survive sanitization for upload.
pub const SERVER_OWNED_TOP_LEVEL: &[&str] = &["updatedAt", "createdAt", "versionId", "shared"];

/// A workflow, represented as its raw JSON object.
///
/// Keeping the body as `serde_json::Value` rather than a fully-typed struct
/// means new node types, settings keys, or server-added fields round-trip
/// untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow(pub Map<String, Value>);

impl Workflow {
    /// Wrap a JSON value as a workflow, requiring it to be a JSON object.
    pub fn from_value(value: Value) -> Result<Self, SyncError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(SyncError::ValidationError(other.to_string())),
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Clone out an owned `Value` view of this workflow.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn wid(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn name(&self) -> &str {
        self.0.get("name").and_then(Value::as_str).unwrap_or("Unnamed")
    }

    pub fn active(&self) -> bool {
        self.0.get("active").and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.0.get("updatedAt").and_then(Value::as_str)
    }

    pub fn created_at(&self) -> Option<&str> {
        self.0.get("createdAt").and_then(Value::as_str)
    }

    pub fn set_wid(&mut self, wid: impl Into<String>) {
        self.0.insert("id".to_string(), Value::String(wid.into()));
    }
}

/// A lightweight remote listing entry — never carries the full graph body.
/// Mirrors the `{wid, name, active, createdAt, updatedAt, isArchived}`
/// projection `enumerate()` returns per §4.3.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkflowSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: Option<String>,
    #[serde(rename = "isArchived", default)]
    pub is_archived: bool,
}
