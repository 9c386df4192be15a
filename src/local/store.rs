//! Local Store (§4.4)
//!
//! A single directory of one JSON file per workflow. Filenames are the
//! canonical `<sanitized_name>_<wid>.json` form from §3; a file whose name
//! has no trailing `_<alnum>.json` segment is orphaned (no remote
//! counterpart yet) and is surfaced with `wid = None`.

use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::errors::SyncError;
use crate::filesys::dir::Dir;
use crate::models::workflow::Workflow;

/// One workflow as found on disk.
#[derive(Debug, Clone)]
pub struct LocalRecord {
    pub path: PathBuf,
    pub filename: String,
    pub wid: Option<String>,
    pub name: String,
    pub active: bool,
    pub body: Workflow,
}

/// The workflows directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: Dir,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Dir::new(dir) }
    }

    pub fn dir(&self) -> &Dir {
        &self.dir
    }

    /// Create the workflows directory if it does not already exist.
    pub async fn ensure_dir(&self) -> Result<(), SyncError> {
        self.dir.create().await
    }

    /// List every `*.json` file in the directory. A per-file read error is
    /// logged and the file is skipped rather than aborting the whole list.
    pub async fn list(&self) -> Result<Vec<LocalRecord>, SyncError> {
        let mut records = Vec::new();
        for path in self.dir.list_json_files().await? {
            let filename = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };

            let file = self.dir.file(&filename);
            let body = match file.read_json::<serde_json::Value>().await {
                Ok(value) => match Workflow::from_value(value) {
                    Ok(wf) => wf,
                    Err(e) => {
                        warn!("skipping {}: {}", filename, e);
                        continue;
                    }
                },
                Err(e) => {
                    warn!("skipping {}: {}", filename, e);
                    continue;
                }
            };

            records.push(LocalRecord {
                path,
                wid: extract_wid(&filename),
                name: body.name().to_string(),
                active: body.active(),
                filename,
                body,
            });
        }
        Ok(records)
    }

    /// Read a single workflow file by filename.
    pub async fn read(&self, filename: &str) -> Result<Option<Workflow>, SyncError> {
        let file = self.dir.file(filename);
        if !file.exists().await {
            return Ok(None);
        }
        let value = file.read_json::<serde_json::Value>().await?;
        Ok(Some(Workflow::from_value(value)?))
    }

    /// Last-modified time of a workflow's file, if it exists.
    pub async fn modified_at(&self, filename: &str) -> Option<DateTime<Utc>> {
        let file = self.dir.file(filename);
        let modified: SystemTime = file.modified_at().await?;
        Some(DateTime::<Utc>::from(modified))
    }

    /// Write a workflow body to disk, pretty-printed. If `filename` is
    /// absent, the canonical filename for `(name, wid)` is used. Returns
    /// the path written; the write is complete (flushed) before returning.
    pub async fn write(
        &self,
        body: &Workflow,
        wid: &str,
        filename: Option<&str>,
    ) -> Result<PathBuf, SyncError> {
        let filename = match filename {
            Some(f) => f.to_string(),
            None => canonical_filename(body.name(), wid),
        };
        let file = self.dir.file(&filename);
        file.write_json(&body.to_value()).await?;
        Ok(file.path().to_path_buf())
    }

    pub fn canonical_filename(&self, name: &str, wid: &str) -> String {
        canonical_filename(name, wid)
    }

    pub fn extract_wid(&self, filename: &str) -> Option<String> {
        extract_wid(filename)
    }
}

/// Sanitize a workflow name into the filename-safe form used by
/// [`canonical_filename`]: non-word characters (excluding hyphen and
/// whitespace) are removed, whitespace runs are collapsed, and the
/// remaining spaces become underscores. ASCII-only so the result only ever
/// contains `[A-Za-z0-9_-]`, per the canonical-filename round-trip law.
fn sanitize_name(name: &str) -> String {
    let filtered: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join("_")
}

/// The unique filename `<sanitized_name>_<wid>.json` that identifies a
/// workflow's local file.
pub fn canonical_filename(name: &str, wid: &str) -> String {
    let sanitized = sanitize_name(name);
    if sanitized.is_empty() {
        format!("workflow_{wid}.json")
    } else {
        format!("{sanitized}_{wid}.json")
    }
}

/// Extract `wid` from a filename by matching a trailing `_<alnum>.json`
/// segment. Returns `None` for orphaned files with no such segment.
pub fn extract_wid(filename: &str) -> Option<String> {
    let stem = filename.strip_suffix(".json")?;
    let underscore = stem.rfind('_')?;
    let candidate = &stem[underscore + 1..];
    if !candidate.is_empty() && candidate.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(candidate.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_filename_is_pure_and_safe() {
        let a = canonical_filename("My Demo! Workflow", "abc123");
        let b = canonical_filename("My Demo! Workflow", "abc123");
        assert_eq!(a, b);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'));
        assert_eq!(a, "My_Demo_Workflow_abc123.json");
    }

    #[test]
    fn canonical_filename_keeps_hyphens() {
        assert_eq!(canonical_filename("My-Workflow", "abc"), "My-Workflow_abc.json");
    }

    #[test]
    fn canonical_filename_strips_non_ascii_characters() {
        // Only [A-Za-z0-9_-] plus the .json suffix may appear (§8 round-trip law).
        assert_eq!(canonical_filename("Café Flujo", "abc"), "Caf_Flujo_abc.json");
    }

    #[test]
    fn canonical_filename_collapses_whitespace() {
        assert_eq!(canonical_filename("A   B\tC", "x1"), "A_B_C_x1.json");
    }

    #[test]
    fn extract_wid_matches_trailing_segment() {
        assert_eq!(extract_wid("Demo_abc123.json"), Some("abc123".to_string()));
        assert_eq!(extract_wid("My_Long_Name_wid9.json"), Some("wid9".to_string()));
    }

    #[test]
    fn extract_wid_none_for_orphaned_file() {
        assert_eq!(extract_wid("draft.json"), None);
        assert_eq!(extract_wid("notes.txt"), None);
    }

    #[test]
    fn extract_wid_rejects_non_alnum_id() {
        assert_eq!(extract_wid("Demo_abc-123.json"), None);
    }
}
