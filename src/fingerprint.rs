//! Content fingerprinting (§4.1)
//!
//! A fingerprint is a SHA-256 digest of a canonical serialization of a
//! workflow: object keys sorted, no insignificant whitespace, and the
//! server-owned top-level keys (`updatedAt`, `createdAt`, `versionId`,
//! `shared`) omitted. Two workflows differing only in those fields hash
//! identically — this is what lets a propagation round-trip through the
//! server without re-triggering itself.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::workflow::{Workflow, SERVER_OWNED_TOP_LEVEL};

/// A 64-character lowercase hex SHA-256 digest.
pub type Fingerprint = String;

/// Compute the fingerprint of a workflow.
pub fn fingerprint(workflow: &Workflow) -> Fingerprint {
    let mut canonical = workflow.0.clone();
    for key in SERVER_OWNED_TOP_LEVEL {
        canonical.remove(*key);
    }
    let value = Value::Object(canonical);
    let canonical_bytes = canonicalize(&value);

    let mut hasher = Sha256::new();
    hasher.update(canonical_bytes.as_bytes());
    let digest = hasher.finalize();
    hex_encode(&digest)
}

/// Render a JSON value as a string with sorted object keys and no
/// insignificant whitespace. `serde_json::Value`'s `Map` is a `BTreeMap` by
/// default (no `preserve_order` feature enabled in this crate), so a plain
/// `to_string` already sorts keys at every level; this function exists to
/// make that guarantee explicit and independent of upstream feature flags.
fn canonicalize(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let rendered: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}:{}", escape_key(k), canonicalize(v)))
                .collect();
            format!("{{{}}}", rendered.join(","))
        }
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(canonicalize).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

/// Render an object key as a quoted, escaped JSON string. Map keys are
/// plain Rust `String`s, so this is infallible by construction — no need to
/// round-trip through `serde_json::to_string` (which returns `Result` for
/// the general `Serialize` case but can only fail on writer/float errors
/// that don't apply here).
fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 2);
    out.push('"');
    for c in key.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
