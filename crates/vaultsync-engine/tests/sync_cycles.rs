//! End-to-end sync cycles
//!
//! Each test wires one or more engines to a real `ManifestService` over an
//! in-process transport, backed by one shared in-memory object store. The
//! wire bodies, ETag discipline, and presigned URL hops are all exercised;
//! only the TCP socket is skipped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vaultsync_core::config::{ConflictStrategy, Settings};
use vaultsync_core::ports::{
    ApiError, ConflictChoice, ConflictPrompt, DeviceState, RemoteManifest, StateStore,
    SyncTransport, VaultAdapter, VaultFileInfo,
};
use vaultsync_core::token::make_device_token;
use vaultsync_core::{ContentHash, DeviceId, Etag, SyncManifest, VaultPath};

use vaultsync_engine::SyncEngine;

use vaultsync_server::auth::TokenVerifier;
use vaultsync_server::presign::UrlSigner;
use vaultsync_server::service::{
    DeleteFilesRequest, DownloadUrlRequest, ManifestService, UploadUrlRequest,
};
use vaultsync_server::{MemoryObjectStore, ServiceError};

const SECRET: &[u8] = b"cycle-test-secret";

// ============================================================================
// In-process adapters
// ============================================================================

/// Transport that calls the service handlers directly
struct LoopbackTransport {
    service: Arc<ManifestService>,
    authorization: String,
    fetches: AtomicU32,
    commit_attempts: AtomicU32,
}

impl LoopbackTransport {
    fn new(service: Arc<ManifestService>, device: &DeviceId) -> Self {
        Self {
            service,
            authorization: format!("Bearer {}", make_device_token(SECRET, device)),
            fetches: AtomicU32::new(0),
            commit_attempts: AtomicU32::new(0),
        }
    }

    fn auth(&self) -> Option<&str> {
        Some(self.authorization.as_str())
    }
}

fn map_service_error(err: ServiceError) -> ApiError {
    match err.status() {
        401 => ApiError::Auth(err.to_string()),
        412 => ApiError::PreconditionFailed,
        428 => ApiError::IfMatchRequired,
        400 | 404 => ApiError::Validation(err.to_string()),
        _ => ApiError::Transport(err.to_string()),
    }
}

fn query_of(url: &str) -> &str {
    url.split_once('?').map_or("", |(_, q)| q)
}

#[async_trait]
impl SyncTransport for LoopbackTransport {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let response = self
            .service
            .get_manifest(self.auth())
            .await
            .map_err(map_service_error)?;
        Ok(RemoteManifest {
            manifest: response.manifest,
            etag: response.etag,
        })
    }

    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&Etag>,
    ) -> Result<Etag, ApiError> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        let body = serde_json::to_vec(manifest).expect("manifest always encodes");
        let response = self
            .service
            .put_manifest(self.auth(), if_match.map(Etag::as_str), &body)
            .await
            .map_err(map_service_error)?;
        Ok(response.etag)
    }

    async fn upload_file(
        &self,
        path: &VaultPath,
        hash: &ContentHash,
        bytes: Vec<u8>,
    ) -> Result<(), ApiError> {
        let presigned = self
            .service
            .upload_url(
                self.auth(),
                UploadUrlRequest {
                    path: path.as_str().to_string(),
                    hash: hash.as_str().to_string(),
                },
            )
            .await
            .map_err(map_service_error)?;
        self.service
            .presigned_put(query_of(&presigned.url), bytes)
            .await
            .map_err(map_service_error)
    }

    async fn download_file(&self, path: &VaultPath) -> Result<Vec<u8>, ApiError> {
        let presigned = self
            .service
            .download_url(
                self.auth(),
                DownloadUrlRequest {
                    path: path.as_str().to_string(),
                },
            )
            .await
            .map_err(map_service_error)?;
        self.service
            .presigned_get(query_of(&presigned.url))
            .await
            .map_err(map_service_error)
    }

    async fn delete_files(&self, paths: &[VaultPath]) -> Result<(), ApiError> {
        self.service
            .delete_files(
                self.auth(),
                DeleteFilesRequest {
                    paths: paths.iter().map(|p| p.as_str().to_string()).collect(),
                },
            )
            .await
            .map_err(map_service_error)?;
        Ok(())
    }
}

/// Transport wrapper that holds the first commit until released, to force
/// two devices into the ETag race deterministically.
struct GatedCommitTransport {
    inner: LoopbackTransport,
    gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
}

#[async_trait]
impl SyncTransport for GatedCommitTransport {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, ApiError> {
        self.inner.fetch_manifest().await
    }

    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&Etag>,
    ) -> Result<Etag, ApiError> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.inner.commit_manifest(manifest, if_match).await
    }

    async fn upload_file(
        &self,
        path: &VaultPath,
        hash: &ContentHash,
        bytes: Vec<u8>,
    ) -> Result<(), ApiError> {
        self.inner.upload_file(path, hash, bytes).await
    }

    async fn download_file(&self, path: &VaultPath) -> Result<Vec<u8>, ApiError> {
        self.inner.download_file(path).await
    }

    async fn delete_files(&self, paths: &[VaultPath]) -> Result<(), ApiError> {
        self.inner.delete_files(paths).await
    }
}

/// In-memory vault
#[derive(Default)]
struct MemoryVault {
    files: Mutex<HashMap<VaultPath, Vec<u8>>>,
}

impl MemoryVault {
    fn put(&self, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(VaultPath::new(path).unwrap(), bytes.to_vec());
    }

    fn remove(&self, path: &str) {
        self.files
            .lock()
            .unwrap()
            .remove(&VaultPath::new(path).unwrap());
    }

    fn text(&self, path: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .get(&VaultPath::new(path).unwrap())
            .map(|b| String::from_utf8(b.clone()).unwrap())
    }
}

#[async_trait]
impl VaultAdapter for MemoryVault {
    async fn list_files(&self) -> anyhow::Result<Vec<VaultFileInfo>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(path, bytes)| VaultFileInfo {
                path: path.clone(),
                mtime: 1_700_000_000_000,
                size: bytes.len() as u64,
            })
            .collect())
    }

    async fn read_binary(&self, path: &VaultPath) -> anyhow::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such file: {path}"))
    }

    async fn read_text(&self, path: &VaultPath) -> anyhow::Result<String> {
        Ok(String::from_utf8(self.read_binary(path).await?)?)
    }

    async fn write_binary(&self, path: &VaultPath, bytes: &[u8]) -> anyhow::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.clone(), bytes.to_vec());
        Ok(())
    }

    async fn write_text(&self, path: &VaultPath, text: &str) -> anyhow::Result<()> {
        self.write_binary(path, text.as_bytes()).await
    }

    async fn exists(&self, path: &VaultPath) -> anyhow::Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn delete(&self, path: &VaultPath) -> anyhow::Result<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState(Mutex<Option<DeviceState>>);

#[async_trait]
impl StateStore for MemoryState {
    async fn load(&self) -> anyhow::Result<Option<DeviceState>> {
        Ok(self.0.lock().unwrap().clone())
    }
    async fn save(&self, state: &DeviceState) -> anyhow::Result<()> {
        *self.0.lock().unwrap() = Some(state.clone());
        Ok(())
    }
    async fn clear(&self) -> anyhow::Result<()> {
        *self.0.lock().unwrap() = None;
        Ok(())
    }
}

/// Prompt that always answers with a fixed choice (None = dismissed)
struct FixedPrompt(Option<ConflictChoice>);

#[async_trait]
impl ConflictPrompt for FixedPrompt {
    async fn ask_conflict(
        &self,
        _: &VaultPath,
        _: &str,
        _: &str,
    ) -> anyhow::Result<Option<ConflictChoice>> {
        Ok(self.0)
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Device {
    engine: Arc<SyncEngine>,
    vault: Arc<MemoryVault>,
    state: Arc<MemoryState>,
}

fn new_service() -> Arc<ManifestService> {
    Arc::new(ManifestService::new(
        Arc::new(MemoryObjectStore::new()),
        TokenVerifier::new(SECRET),
        UrlSigner::new(b"cycle-signing-key".to_vec(), ""),
    ))
}

fn settings_for(name: &str, strategy: ConflictStrategy) -> Settings {
    Settings {
        device_id: DeviceId::new(name).unwrap(),
        conflict_strategy: strategy,
        exclude_patterns: Vec::new(),
        ..Settings::default()
    }
}

fn make_device(service: &Arc<ManifestService>, name: &str, strategy: ConflictStrategy) -> Device {
    make_device_with_prompt(service, name, strategy, FixedPrompt(None))
}

fn make_device_with_prompt(
    service: &Arc<ManifestService>,
    name: &str,
    strategy: ConflictStrategy,
    prompt: FixedPrompt,
) -> Device {
    let settings = settings_for(name, strategy);
    let transport = Arc::new(LoopbackTransport::new(
        Arc::clone(service),
        &settings.device_id,
    ));
    let vault = Arc::new(MemoryVault::default());
    let state = Arc::new(MemoryState::default());
    let engine = Arc::new(SyncEngine::new(
        transport,
        vault.clone(),
        state.clone(),
        Arc::new(prompt),
        &settings,
    ));
    Device {
        engine,
        vault,
        state,
    }
}

async fn server_manifest(service: &Arc<ManifestService>) -> (SyncManifest, Option<Etag>) {
    let device = DeviceId::new("observer").unwrap();
    let auth = format!("Bearer {}", make_device_token(SECRET, &device));
    let response = service.get_manifest(Some(&auth)).await.unwrap();
    (response.manifest, response.etag)
}

fn path(p: &str) -> VaultPath {
    VaultPath::new(p).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn fresh_client_fresh_server() {
    let service = new_service();
    let a = make_device(&service, "device-a", ConflictStrategy::Ask);
    a.vault.put("a.md", b"hello vault");

    let report = a.engine.sync(false).await.unwrap();
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.downloaded, 0);
    assert_eq!(report.conflicts_resolved, 0);

    let (manifest, etag) = server_manifest(&service).await;
    assert!(etag.is_some());
    let entry = manifest.get(&path("a.md")).unwrap();
    assert_eq!(entry.hash, ContentHash::of_bytes(b"hello vault"));
    assert_eq!(entry.last_modified_by, DeviceId::new("device-a").unwrap());

    // The device's base mirrors what the server holds
    let state = a.state.load().await.unwrap().unwrap();
    assert_eq!(state.base_manifest, manifest);
    assert_eq!(state.last_etag, etag);
}

#[tokio::test]
async fn second_device_downloads_everything() {
    let service = new_service();
    let a = make_device(&service, "device-a", ConflictStrategy::Ask);
    a.vault.put("a.md", b"one");
    a.vault.put("sub/b.md", b"two");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    let report = b.engine.sync(false).await.unwrap();
    assert_eq!(report.downloaded, 2);
    assert_eq!(report.uploaded, 0);

    assert_eq!(b.vault.text("a.md").unwrap(), "one");
    assert_eq!(b.vault.text("sub/b.md").unwrap(), "two");
}

#[tokio::test]
async fn non_conflicting_edits_cross_cleanly() {
    let service = new_service();

    // Shared starting point
    let a = make_device(&service, "device-a", ConflictStrategy::Ask);
    a.vault.put("a.md", b"a v1");
    a.vault.put("b.md", b"b v1");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    b.engine.sync(false).await.unwrap();

    // The other device commits its edit to b.md first
    b.vault.put("b.md", b"b v3");
    b.engine.sync(false).await.unwrap();

    // This device edited a.md
    a.vault.put("a.md", b"a v2");
    let report = a.engine.sync(false).await.unwrap();

    assert_eq!(report.uploaded, 1);
    assert_eq!(report.downloaded, 1);
    assert_eq!(report.conflicts_resolved, 0);

    // Both edits survive on the server and locally
    let (manifest, _) = server_manifest(&service).await;
    assert_eq!(
        manifest.get(&path("a.md")).unwrap().hash,
        ContentHash::of_bytes(b"a v2")
    );
    assert_eq!(
        manifest.get(&path("b.md")).unwrap().hash,
        ContentHash::of_bytes(b"b v3")
    );
    assert_eq!(a.vault.text("b.md").unwrap(), "b v3");
}

#[tokio::test]
async fn overlapping_edits_merge_three_way() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::ThreeWayMerge);
    a.vault.put("a.md", b"line1\nline2\nline3");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::ThreeWayMerge);
    b.engine.sync(false).await.unwrap();

    // Remote edits the tail...
    b.vault.put("a.md", b"line1\nline2\nREMOTE");
    b.engine.sync(false).await.unwrap();

    // ...while we edit the head
    a.vault.put("a.md", b"LOCAL\nline2\nline3");
    let report = a.engine.sync(false).await.unwrap();

    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(report.conflicts_marked, 0, "merge should be clean");

    let merged = a.vault.text("a.md").unwrap();
    assert_eq!(merged, "LOCAL\nline2\nREMOTE");

    // The merged version was uploaded and committed
    let (manifest, _) = server_manifest(&service).await;
    assert_eq!(
        manifest.get(&path("a.md")).unwrap().hash,
        ContentHash::of_bytes(merged.as_bytes())
    );
}

#[tokio::test]
async fn divergent_same_region_gets_markers() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::ThreeWayMerge);
    a.vault.put("a.md", b"top\nmiddle\nbottom\n");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::ThreeWayMerge);
    b.engine.sync(false).await.unwrap();
    b.vault.put("a.md", b"top\nREMOTE\nbottom\n");
    b.engine.sync(false).await.unwrap();

    a.vault.put("a.md", b"top\nLOCAL\nbottom\n");
    let report = a.engine.sync(false).await.unwrap();

    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(report.conflicts_marked, 1);

    let merged = a.vault.text("a.md").unwrap();
    assert!(merged.contains("<<<<<<< LOCAL"));
    assert!(merged.contains("LOCAL"));
    assert!(merged.contains("REMOTE"));
    assert!(merged.contains(">>>>>>> REMOTE"));
}

#[tokio::test]
async fn racing_commit_retries_and_wins() {
    let service = new_service();

    // Both devices agree on a starting manifest at etag E0
    let a = make_device(&service, "device-a", ConflictStrategy::Ask);
    a.vault.put("a.md", b"shared v1");
    a.engine.sync(false).await.unwrap();

    let settings = settings_for("device-b", ConflictStrategy::Ask);
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel();
    let gated = Arc::new(GatedCommitTransport {
        inner: LoopbackTransport::new(Arc::clone(&service), &settings.device_id),
        gate: Mutex::new(Some(gate_rx)),
    });
    let b_vault = Arc::new(MemoryVault::default());
    let b_state = Arc::new(MemoryState::default());
    let b_engine = Arc::new(SyncEngine::new(
        gated.clone(),
        b_vault.clone(),
        b_state.clone(),
        Arc::new(FixedPrompt(None)),
        &settings,
    ));

    // B pulls down the shared state first
    gate_tx.send(()).ok();
    b_engine.sync(false).await.unwrap();

    // Arm the gate again for the racing cycle
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel();
    *gated.gate.lock().unwrap() = Some(gate_rx);

    // B starts a cycle that will stall just before its commit...
    b_vault.put("b.md", b"from b");
    let b_sync = {
        let engine = Arc::clone(&b_engine);
        tokio::spawn(async move { engine.sync(false).await })
    };
    tokio::task::yield_now().await;

    // ...while A commits first and advances the etag
    a.vault.put("a.md", b"shared v2");
    a.engine.sync(false).await.unwrap();

    // Release B: its held commit sees 412, the cycle restarts and wins
    gate_tx.send(()).ok();
    let report = b_sync.await.unwrap().unwrap();
    assert!(!report.skipped);
    assert!(
        gated.inner.commit_attempts.load(Ordering::SeqCst) >= 2,
        "B must have lost at least one commit"
    );

    // Both edits present; B's base mirrors the final server manifest
    let (manifest, etag) = server_manifest(&service).await;
    assert_eq!(
        manifest.get(&path("a.md")).unwrap().hash,
        ContentHash::of_bytes(b"shared v2")
    );
    assert_eq!(
        manifest.get(&path("b.md")).unwrap().hash,
        ContentHash::of_bytes(b"from b")
    );

    let state = b_state.load().await.unwrap().unwrap();
    assert_eq!(state.base_manifest, manifest);
    assert_eq!(state.last_etag, etag);
}

#[tokio::test]
async fn delete_vs_modify_keep_remote_restores_file() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::KeepRemote);
    a.vault.put("a.md", b"v1");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    b.engine.sync(false).await.unwrap();

    // Remote modifies while we delete
    b.vault.put("a.md", b"v2 from remote");
    b.engine.sync(false).await.unwrap();

    a.vault.remove("a.md");
    let report = a.engine.sync(false).await.unwrap();

    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(a.vault.text("a.md").unwrap(), "v2 from remote");

    let (manifest, _) = server_manifest(&service).await;
    assert_eq!(
        manifest.get(&path("a.md")).unwrap().hash,
        ContentHash::of_bytes(b"v2 from remote")
    );
}

#[tokio::test]
async fn modify_vs_delete_keep_local_restores_remote() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::KeepLocal);
    a.vault.put("a.md", b"v1");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    b.engine.sync(false).await.unwrap();

    // Remote deletes while we modify
    b.vault.remove("a.md");
    b.engine.sync(false).await.unwrap();
    let (manifest, _) = server_manifest(&service).await;
    assert!(manifest.get(&path("a.md")).is_none());

    a.vault.put("a.md", b"v2 local");
    let report = a.engine.sync(false).await.unwrap();
    assert_eq!(report.conflicts_resolved, 1);

    let (manifest, _) = server_manifest(&service).await;
    assert_eq!(
        manifest.get(&path("a.md")).unwrap().hash,
        ContentHash::of_bytes(b"v2 local")
    );
}

#[tokio::test]
async fn accepted_deletions_propagate_both_ways() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::Ask);
    a.vault.put("keep.md", b"keep");
    a.vault.put("gone.md", b"gone");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    b.engine.sync(false).await.unwrap();

    // A deletes; the object and manifest entry disappear
    a.vault.remove("gone.md");
    let report = a.engine.sync(false).await.unwrap();
    assert_eq!(report.deleted_remote, 1);

    let (manifest, _) = server_manifest(&service).await;
    assert!(manifest.get(&path("gone.md")).is_none());

    // B accepts the deletion locally
    let report = b.engine.sync(false).await.unwrap();
    assert_eq!(report.deleted_local, 1);
    assert!(b.vault.text("gone.md").is_none());
    assert_eq!(b.vault.text("keep.md").unwrap(), "keep");
}

#[tokio::test]
async fn dismissed_prompt_defaults_to_keep_local() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::Ask);
    a.vault.put("a.md", b"v1");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    b.engine.sync(false).await.unwrap();
    b.vault.put("a.md", b"remote edit");
    b.engine.sync(false).await.unwrap();

    // Prompt dismissed (FixedPrompt(None)) -> local wins
    a.vault.put("a.md", b"local edit");
    let report = a.engine.sync(false).await.unwrap();
    assert_eq!(report.conflicts_resolved, 1);

    let (manifest, _) = server_manifest(&service).await;
    assert_eq!(
        manifest.get(&path("a.md")).unwrap().hash,
        ContentHash::of_bytes(b"local edit")
    );
}

#[tokio::test]
async fn prompt_choosing_remote_downloads_it() {
    let service = new_service();

    let a = make_device_with_prompt(
        &service,
        "device-a",
        ConflictStrategy::Ask,
        FixedPrompt(Some(ConflictChoice::KeepRemote)),
    );
    a.vault.put("a.md", b"v1");
    a.engine.sync(false).await.unwrap();

    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    b.engine.sync(false).await.unwrap();
    b.vault.put("a.md", b"remote edit");
    b.engine.sync(false).await.unwrap();

    a.vault.put("a.md", b"local edit");
    a.engine.sync(false).await.unwrap();

    assert_eq!(a.vault.text("a.md").unwrap(), "remote edit");
}

#[tokio::test]
async fn force_full_sync_without_base_conflicts_on_divergence() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::KeepRemote);
    a.vault.put("a.md", b"local version");

    // Seed the server with a different version from another device
    let b = make_device(&service, "device-b", ConflictStrategy::Ask);
    b.vault.put("a.md", b"server version");
    b.engine.sync(false).await.unwrap();

    // With no base at all, the divergence is a conflict; keep-remote wins
    let report = a.engine.sync(true).await.unwrap();
    assert_eq!(report.conflicts_resolved, 1);
    assert_eq!(a.vault.text("a.md").unwrap(), "server version");
}

#[tokio::test]
async fn idle_cycle_is_a_noop_commit() {
    let service = new_service();

    let a = make_device(&service, "device-a", ConflictStrategy::Ask);
    a.vault.put("a.md", b"content");
    a.engine.sync(false).await.unwrap();
    let (_, etag_before) = server_manifest(&service).await;

    let report = a.engine.sync(false).await.unwrap();
    assert_eq!(report.uploaded, 0);
    assert_eq!(report.downloaded, 0);

    // The manifest is still recommitted (lastUpdated moves), but content
    // is unchanged
    let (manifest, _) = server_manifest(&service).await;
    assert_eq!(manifest.len(), 1);
    let _ = etag_before;
}
