//! Upload sanitization (§4.2)
//!
//! Strips server-owned and non-portable fields from a workflow before it is
//! sent to the remote as a `create`/`update` body. Pure: the input is never
//! mutated, and sanitizing an already-sanitized workflow is a no-op.

use serde_json::Value;

use crate::models::workflow::Workflow;

const TOP_LEVEL_STRIP: &[&str] = &[
    "id",
    "createdAt",
    "updatedAt",
    "shared",
    "versionId",
    "meta",
    "active",
    "tags",
    "pinData",
    "triggerCount",
    "isArchived",
];

const NODE_STRIP: &[&str] = &["id", "webhookId"];

/// Produce a new workflow safe to send as an upload body.
pub fn sanitize(workflow: &Workflow) -> Workflow {
    let mut body = workflow.0.clone();

    for key in TOP_LEVEL_STRIP {
        body.remove(*key);
    }

    if let Some(Value::Array(nodes)) = body.get_mut("nodes") {
        for node in nodes.iter_mut() {
            if let Value::Object(node) = node {
                for key in NODE_STRIP {
                    node.remove(*key);
                }
                if let Some(Value::Array(credentials)) = node.get_mut("credentials") {
                    for credential in credentials.iter_mut() {
                        if let Value::Object(credential) = credential {
                            credential.remove("id");
                        }
                    }
                } else if let Some(Value::Object(credentials)) = node.get_mut("credentials") {
                    for (_, credential) in credentials.iter_mut() {
                        if let Value::Object(credential) = credential {
                            credential.remove("id");
                        }
                    }
                }
            }
        }
    }

    Workflow(body)
}
