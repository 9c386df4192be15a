//! Sync engine integration tests
//!
//! Exercises `SyncEngine` end to end against an in-memory fake remote
//! adapter and a real `tempfile` local directory, covering the scenarios
//! that a single unit test can't: conflict detection from a local edit,
//! prefer-newest resolution, echo suppression after a remote→local write,
//! and bulk-operation failure isolation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use n8n_sync::errors::SyncError;
use n8n_sync::http::workflows::RemoteAdapter;
use n8n_sync::local::store::LocalStore;
use n8n_sync::models::workflow::{Workflow, WorkflowSummary};
use n8n_sync::sync::engine::SyncEngine;
use n8n_sync::sync::events::LocalChangeEvent;
use n8n_sync::sync::resolver::{AskResolver, ConflictResolver, PreferNewestResolver, Resolution};
use serde_json::json;
use tempfile::tempdir;

/// A fake remote that tracks call counts and can be told to fail a given
/// `wid`, so tests can assert exactly which network calls a code path made.
struct FakeRemote {
    workflows: Mutex<HashMap<String, Workflow>>,
    fetch_calls: AtomicUsize,
    update_calls: AtomicUsize,
    fail_fetch_for: Mutex<Option<String>>,
}

impl FakeRemote {
    fn new() -> Self {
        Self {
            workflows: Mutex::new(HashMap::new()),
            fetch_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            fail_fetch_for: Mutex::new(None),
        }
    }

    fn seed(&self, wid: &str, name: &str, updated_at: &str) {
        let value = json!({
            "id": wid, "name": name, "active": false, "nodes": [],
            "updatedAt": updated_at, "createdAt": updated_at,
        });
        let body = Workflow::from_value(value).unwrap();
        self.workflows.lock().unwrap().insert(wid.to_string(), body);
    }

    fn set_updated_at(&self, wid: &str, updated_at: &str) {
        let mut map = self.workflows.lock().unwrap();
        if let Some(wf) = map.get_mut(wid) {
            wf.0.insert("updatedAt".into(), json!(updated_at));
        }
    }

    fn fail_fetch(&self, wid: &str) {
        *self.fail_fetch_for.lock().unwrap() = Some(wid.to_string());
    }
}

#[async_trait]
impl RemoteAdapter for FakeRemote {
    async fn enumerate(&self) -> Result<Vec<WorkflowSummary>, SyncError> {
        Ok(self
            .workflows
            .lock()
            .unwrap()
            .values()
            .map(|w| WorkflowSummary {
                id: w.wid().unwrap().to_string(),
                name: w.name().to_string(),
                active: w.active(),
                created_at: w.created_at().map(String::from),
                updated_at: w.updated_at().map(String::from),
                is_archived: false,
            })
            .collect())
    }

    async fn fetch(&self, wid: &str) -> Result<Option<Workflow>, SyncError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch_for.lock().unwrap().as_deref() == Some(wid) {
            return Err(SyncError::Transport { status: "500".into(), body: "boom".into() });
        }
        Ok(self.workflows.lock().unwrap().get(wid).cloned())
    }

    async fn create(&self, body: &Workflow) -> Result<Workflow, SyncError> {
        let wid = format!("new-{}", self.workflows.lock().unwrap().len());
        let mut created = body.clone();
        created.set_wid(wid.clone());
        created.0.insert("updatedAt".into(), json!("2024-01-01T00:00:00Z"));
        self.workflows.lock().unwrap().insert(wid, created.clone());
        Ok(created)
    }

    async fn update(&self, wid: &str, body: &Workflow) -> Result<Option<Workflow>, SyncError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut map = self.workflows.lock().unwrap();
        if !map.contains_key(wid) {
            return Ok(None);
        }
        let mut updated = body.clone();
        updated.set_wid(wid.to_string());
        updated.0.insert("updatedAt".into(), json!("2024-06-01T00:00:00Z"));
        map.insert(wid.to_string(), updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, wid: &str) -> Result<bool, SyncError> {
        Ok(self.workflows.lock().unwrap().remove(wid).is_some())
    }

    async fn activate(&self, _wid: &str) -> Result<(), SyncError> {
        Ok(())
    }

    async fn deactivate(&self, _wid: &str) -> Result<(), SyncError> {
        Ok(())
    }
}

async fn setup(resolver: Box<dyn ConflictResolver>) -> (SyncEngine, Arc<FakeRemote>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    remote.seed("abc", "Demo", "2024-01-01T00:00:00Z");
    let local = Arc::new(LocalStore::new(dir.path()));
    local.ensure_dir().await.unwrap();
    let engine = SyncEngine::new(remote.clone(), local, resolver);
    engine.add_workflow("abc", true).await.unwrap();
    (engine, remote, dir)
}

/// A local edit that diverges from a remote the engine has already synced
/// is detected as a conflict and, with a skip-on-ask resolver, stays
/// `conflict = true` rather than silently picking a winner.
#[tokio::test]
async fn local_edit_against_known_remote_is_flagged_as_conflict() {
    let (engine, _remote, dir) = setup(Box::new(AskResolver::new(|_state| Resolution::Skip))).await;

    // Establish both sides agreeing first (sets local_hash/local_updated).
    engine.propagate_remote_to_local("abc").await.unwrap();

    // Operator edits the file to diverge from the already-known remote hash.
    let filename = "Demo_abc.json";
    std::fs::write(
        dir.path().join(filename),
        serde_json::to_string_pretty(&json!({
            "id": "abc", "name": "Demo", "active": false, "nodes": [{"id": "n1"}],
            "updatedAt": "2024-01-01T00:00:00Z", "createdAt": "2024-01-01T00:00:00Z",
        }))
        .unwrap(),
    )
    .unwrap();

    engine
        .handle_local_event(LocalChangeEvent { path: dir.path().join(filename), filename: filename.to_string() })
        .await
        .unwrap();

    let snap = engine.snapshot().await;
    let state = snap.get("abc").unwrap();
    assert!(state.conflict, "diverging hashes with both timestamps set must be flagged a conflict");
    assert_ne!(state.local_hash, state.remote_hash);
    assert!(!state.syncing);
}

/// With `prefer-newest`, a local edit that is newer than the last known
/// remote timestamp wins the conflict and is propagated to the remote.
#[tokio::test]
async fn prefer_newest_resolves_conflict_in_favor_of_the_newer_side() {
    let (engine, remote, dir) = setup(Box::new(PreferNewestResolver::default())).await;
    engine.propagate_remote_to_local("abc").await.unwrap();

    let filename = "Demo_abc.json";
    std::fs::write(
        dir.path().join(filename),
        serde_json::to_string_pretty(&json!({
            "id": "abc", "name": "Demo", "active": false, "nodes": [{"id": "n1"}],
            "updatedAt": "2024-01-01T00:00:00Z", "createdAt": "2024-01-01T00:00:00Z",
        }))
        .unwrap(),
    )
    .unwrap();

    engine
        .handle_local_event(LocalChangeEvent { path: dir.path().join(filename), filename: filename.to_string() })
        .await
        .unwrap();

    let snap = engine.snapshot().await;
    let state = snap.get("abc").unwrap();
    assert!(!state.conflict, "prefer-newest must resolve the conflict, not leave it pending");
    assert_eq!(state.local_hash, state.remote_hash);

    // The resolution pushed local -> remote, so the node edit landed upstream.
    let pushed = remote.fetch("abc").await.unwrap().unwrap();
    assert_eq!(pushed.0.get("nodes").unwrap().as_array().unwrap().len(), 1);
}

/// After a remote→local propagation writes the file, the watcher's own
/// debounced event for that write must be recognized as an echo and
/// dropped — no re-upload, no extra remote calls.
#[tokio::test]
async fn echo_of_a_remote_to_local_write_is_dropped() {
    let (engine, remote, dir) = setup(Box::new(AskResolver::new(|_state| Resolution::Skip))).await;
    engine.propagate_remote_to_local("abc").await.unwrap();

    let update_calls_before = remote.update_calls.load(Ordering::SeqCst);
    let filename = "Demo_abc.json";

    // Simulate the watcher firing for the write the engine itself just made;
    // the file on disk is unchanged from what was written.
    engine
        .handle_local_event(LocalChangeEvent { path: dir.path().join(filename), filename: filename.to_string() })
        .await
        .unwrap();

    assert_eq!(remote.update_calls.load(Ordering::SeqCst), update_calls_before, "echo must not trigger an upload");
    let snap = engine.snapshot().await;
    let state = snap.get("abc").unwrap();
    assert!(!state.conflict);
    assert!(!state.syncing);
}

/// Bulk download isolates per-workflow failures: one bad fetch does not
/// stop the others, and the failure is reported in `errors`.
#[tokio::test]
async fn download_all_continues_past_a_single_failure() {
    let dir = tempdir().unwrap();
    let remote = Arc::new(FakeRemote::new());
    remote.seed("abc", "Demo One", "2024-01-01T00:00:00Z");
    remote.seed("xyz", "Demo Two", "2024-01-01T00:00:00Z");
    let local = Arc::new(LocalStore::new(dir.path()));
    local.ensure_dir().await.unwrap();
    let engine = SyncEngine::new(remote.clone(), local, Box::new(n8n_sync::sync::resolver::PreferRemoteResolver));
    engine.add_workflow("abc", true).await.unwrap();
    engine.add_workflow("xyz", true).await.unwrap();

    remote.fail_fetch("xyz");
    let result = engine.download_all().await;

    assert_eq!(result.total, 2);
    assert_eq!(result.success_count, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].0, "xyz");
    assert!(dir.path().join("Demo_One_abc.json").exists());
}

/// Remote `updatedAt` changing but re-fetching the unchanged body should
/// not be treated specially here (covered at the poller level); this test
/// instead nails down the idempotence law from the testable-properties
/// section: writing a remote-origin workflow to disk and re-fingerprinting
/// both copies agrees.
#[tokio::test]
async fn remote_to_local_round_trip_preserves_fingerprint() {
    let (engine, remote, _dir) = setup(Box::new(n8n_sync::sync::resolver::PreferRemoteResolver)).await;
    remote.set_updated_at("abc", "2024-02-02T00:00:00Z");

    engine.propagate_remote_to_local("abc").await.unwrap();

    let snap = engine.snapshot().await;
    let state = snap.get("abc").unwrap();
    let remote_body = remote.fetch("abc").await.unwrap().unwrap();
    assert_eq!(state.local_hash.as_ref(), Some(&n8n_sync::fingerprint::fingerprint(&remote_body)));
}

/// The monitored-workflow registry sidecar (`.sync-registry.json`) lives in
/// the same directory as workflow files but must never show up as one —
/// `Path::extension` still reports `json` for a dotfile, so `LocalStore`
/// has to filter it out explicitly.
#[tokio::test]
async fn local_store_list_skips_the_registry_sidecar() {
    let dir = tempdir().unwrap();
    let local = LocalStore::new(dir.path());
    local.ensure_dir().await.unwrap();

    let registry = n8n_sync::local::registry::Registry::new(dir.path());
    registry.add("abc").await.unwrap();
    local
        .write(&Workflow::from_value(json!({"id": "abc", "name": "Demo", "nodes": []})).unwrap(), "abc", None)
        .await
        .unwrap();

    let records = local.list().await.unwrap();
    assert_eq!(records.len(), 1, "the registry sidecar must not be listed as a workflow record");
    assert_eq!(records[0].wid.as_deref(), Some("abc"));
}
