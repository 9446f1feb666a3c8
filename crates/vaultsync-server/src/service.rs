//! Route handlers
//!
//! [`ManifestService`] implements every route contract independently of
//! any HTTP machinery; the hyper layer only parses requests and
//! serializes responses. That keeps the whole API exercisable in-process
//! (the engine's integration tests drive it exactly that way).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use vaultsync_core::constants::{object_key_for, MANIFEST_KEY, PRESIGNED_URL_EXPIRY_SECS};
use vaultsync_core::{ContentHash, DeviceId, Etag, SyncManifest, VaultPath};

use crate::auth::TokenVerifier;
use crate::error::ServiceError;
use crate::presign::UrlSigner;
use crate::store::{ObjectStore, StoreError};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ManifestResponse {
    pub manifest: SyncManifest,
    pub etag: Option<Etag>,
}

#[derive(Debug, Serialize)]
pub struct PutManifestResponse {
    pub ok: bool,
    pub etag: Etag,
}

#[derive(Debug, Deserialize)]
pub struct UploadUrlRequest {
    pub path: String,
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct DownloadUrlRequest {
    pub path: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteFilesRequest {
    pub paths: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFilesResponse {
    pub ok: bool,
    pub deleted: usize,
}

// ============================================================================
// ManifestService
// ============================================================================

/// The manifest service: auth gate, path validation, conditional writes,
/// presigned URL issuance, and the presigned object routes themselves.
pub struct ManifestService {
    store: Arc<dyn ObjectStore>,
    verifier: TokenVerifier,
    signer: UrlSigner,
    url_expiry_secs: u64,
}

impl ManifestService {
    pub fn new(store: Arc<dyn ObjectStore>, verifier: TokenVerifier, signer: UrlSigner) -> Self {
        Self {
            store,
            verifier,
            signer,
            url_expiry_secs: PRESIGNED_URL_EXPIRY_SECS,
        }
    }

    /// Override the presigned URL lifetime (tests shorten it)
    #[must_use]
    pub fn with_url_expiry(mut self, secs: u64) -> Self {
        self.url_expiry_secs = secs;
        self
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<DeviceId, ServiceError> {
        self.verifier.verify_bearer(authorization)
    }

    /// `GET /health` - unauthenticated liveness probe
    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            ok: true,
            version: env!("CARGO_PKG_VERSION"),
            timestamp: Utc::now(),
        }
    }

    /// `GET /manifest` - current manifest and ETag; an absent manifest
    /// reads as empty with a null ETag.
    pub async fn get_manifest(
        &self,
        authorization: Option<&str>,
    ) -> Result<ManifestResponse, ServiceError> {
        let device = self.authenticate(authorization)?;

        match self.store.get(MANIFEST_KEY).await.map_err(store_error)? {
            Some(object) => {
                let manifest: SyncManifest = serde_json::from_slice(&object.bytes)
                    .map_err(|e| ServiceError::Internal(format!("stored manifest corrupt: {e}")))?;
                Ok(ManifestResponse {
                    manifest,
                    etag: Some(object.etag),
                })
            }
            None => {
                debug!(device = %device, "No manifest yet, returning empty");
                Ok(ManifestResponse {
                    manifest: SyncManifest::empty(device),
                    etag: None,
                })
            }
        }
    }

    /// `PUT /manifest` - conditional write.
    ///
    /// First write to an empty store needs no `If-Match`; after that an
    /// omitted header is a 428 and a stale one a 412.
    pub async fn put_manifest(
        &self,
        authorization: Option<&str>,
        if_match: Option<&str>,
        body: &[u8],
    ) -> Result<PutManifestResponse, ServiceError> {
        let device = self.authenticate(authorization)?;

        let manifest: SyncManifest = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("invalid manifest body: {e}")))?;
        manifest
            .validate()
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;

        let current = self
            .store
            .get(MANIFEST_KEY)
            .await
            .map_err(store_error)?
            .map(|o| o.etag);

        let expected = match (&current, if_match) {
            (Some(_), None) => return Err(ServiceError::IfMatchRequired),
            (None, Some(_)) => return Err(ServiceError::PreconditionFailed),
            (Some(etag), Some(header)) => {
                if !etag.matches_header(header) {
                    return Err(ServiceError::PreconditionFailed);
                }
                Some(etag.clone())
            }
            (None, None) => None,
        };

        let bytes = serde_json::to_vec(&manifest)
            .map_err(|e| ServiceError::Internal(format!("encode manifest: {e}")))?;

        let etag = match self
            .store
            .put_if_match(MANIFEST_KEY, bytes, expected.as_ref())
            .await
        {
            Ok(etag) => etag,
            // The store moved between our read and the write; same outcome
            // as a stale If-Match.
            Err(StoreError::PreconditionFailed) => return Err(ServiceError::PreconditionFailed),
            Err(err) => return Err(store_error(err)),
        };

        info!(device = %device, files = manifest.len(), etag = %etag, "Manifest committed");
        Ok(PutManifestResponse { ok: true, etag })
    }

    /// `POST /files/upload-url`
    pub async fn upload_url(
        &self,
        authorization: Option<&str>,
        request: UploadUrlRequest,
    ) -> Result<PresignResponse, ServiceError> {
        let device = self.authenticate(authorization)?;

        let path = validate_path(&request.path)?;
        ContentHash::new(request.hash)
            .map_err(|e| ServiceError::BadRequest(e.to_string()))?;

        let presigned = self.signer.presign(
            "PUT",
            &object_key_for(path.as_str()),
            self.url_expiry_secs,
        );
        debug!(device = %device, path = %path, "Issued upload url");
        Ok(PresignResponse {
            url: presigned.url,
            expires_at: presigned.expires_at,
        })
    }

    /// `POST /files/download-url`
    pub async fn download_url(
        &self,
        authorization: Option<&str>,
        request: DownloadUrlRequest,
    ) -> Result<PresignResponse, ServiceError> {
        let device = self.authenticate(authorization)?;

        let path = validate_path(&request.path)?;
        let presigned = self.signer.presign(
            "GET",
            &object_key_for(path.as_str()),
            self.url_expiry_secs,
        );
        debug!(device = %device, path = %path, "Issued download url");
        Ok(PresignResponse {
            url: presigned.url,
            expires_at: presigned.expires_at,
        })
    }

    /// `POST /files/delete` - bulk delete; one invalid path rejects the
    /// whole request.
    pub async fn delete_files(
        &self,
        authorization: Option<&str>,
        request: DeleteFilesRequest,
    ) -> Result<DeleteFilesResponse, ServiceError> {
        let device = self.authenticate(authorization)?;

        if request.paths.is_empty() {
            return Err(ServiceError::BadRequest("paths must not be empty".into()));
        }
        let paths: Vec<VaultPath> = request
            .paths
            .iter()
            .map(|raw| validate_path(raw))
            .collect::<Result<_, _>>()?;

        let mut deleted = 0usize;
        for path in &paths {
            if self
                .store
                .delete(&object_key_for(path.as_str()))
                .await
                .map_err(store_error)?
            {
                deleted += 1;
            }
        }

        info!(device = %device, requested = paths.len(), deleted, "Bulk delete");
        Ok(DeleteFilesResponse { ok: true, deleted })
    }

    /// `PUT /objects?<presigned-query>` - direct upload against the store
    pub async fn presigned_put(&self, query: &str, bytes: Vec<u8>) -> Result<(), ServiceError> {
        let claim = UrlSigner::parse_claim(query)?;
        let key = self.signer.verify("PUT", &claim, Utc::now())?;
        self.store.put(&key, bytes).await.map_err(store_error)?;
        Ok(())
    }

    /// `GET /objects?<presigned-query>` - direct download against the store
    pub async fn presigned_get(&self, query: &str) -> Result<Vec<u8>, ServiceError> {
        let claim = UrlSigner::parse_claim(query)?;
        let key = self.signer.verify("GET", &claim, Utc::now())?;
        match self.store.get(&key).await.map_err(store_error)? {
            Some(object) => Ok(object.bytes),
            None => Err(ServiceError::NotFound),
        }
    }
}

/// Shared path validation for every file route.
///
/// The `VaultPath` constructor enforces the constraints (relative, no
/// traversal, outside the internal prefix); this just maps the failure
/// into a 400 whose message names the violation.
fn validate_path(raw: &str) -> Result<VaultPath, ServiceError> {
    VaultPath::new(raw).map_err(|e| ServiceError::BadRequest(e.to_string()))
}

fn store_error(err: StoreError) -> ServiceError {
    match err {
        StoreError::PreconditionFailed => ServiceError::PreconditionFailed,
        StoreError::Other(err) => ServiceError::Internal(format!("{err:#}")),
    }
}
