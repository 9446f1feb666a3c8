//! HTTP transport client
//!
//! Wraps `reqwest::Client` with the bearer token and base URL, maps
//! response statuses onto the typed [`ApiError`] taxonomy, and resolves
//! presigned URLs for the byte transfers. The presigned requests carry no
//! bearer token; the URL itself is the credential.

use chrono::{DateTime, Utc};
use reqwest::header::IF_MATCH;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use vaultsync_core::ports::{ApiError, RemoteManifest, SyncTransport};
use vaultsync_core::{ContentHash, Etag, SyncManifest, VaultPath};

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct ManifestEnvelope {
    manifest: SyncManifest,
    etag: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutManifestBody {
    etag: String,
}

#[derive(Debug, Deserialize)]
struct PresignBody {
    url: String,
}

/// Health probe response
#[derive(Debug, Deserialize)]
pub struct HealthInfo {
    pub ok: bool,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// HttpTransport
// ============================================================================

/// HTTP implementation of the sync transport port
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    /// Create a transport for the service at `endpoint` using `token`
    /// (`deviceId:hmacHex`) as the bearer credential.
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        let mut base_url = endpoint.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Presigned URLs may come back service-relative; anchor those on the
    /// configured endpoint.
    fn absolute(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            url.to_string()
        }
    }

    /// `GET /health` - unauthenticated liveness probe
    pub async fn health(&self) -> Result<HealthInfo, ApiError> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(transport_error)?;
        decode(check(response).await?).await
    }

    async fn negotiate_url(
        &self,
        route: &str,
        body: serde_json::Value,
    ) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url(route))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let presign: PresignBody = decode(check(response).await?).await?;
        Ok(self.absolute(&presign.url))
    }
}

#[async_trait::async_trait]
impl SyncTransport for HttpTransport {
    async fn fetch_manifest(&self) -> Result<RemoteManifest, ApiError> {
        let response = self
            .client
            .get(self.url("/manifest"))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;

        let envelope: ManifestEnvelope = decode(check(response).await?).await?;
        let etag = envelope
            .etag
            .map(Etag::new)
            .transpose()
            .map_err(|e| ApiError::Decode(e.to_string()))?;

        debug!(files = envelope.manifest.len(), etag = ?etag, "Fetched manifest");
        Ok(RemoteManifest {
            manifest: envelope.manifest,
            etag,
        })
    }

    async fn commit_manifest(
        &self,
        manifest: &SyncManifest,
        if_match: Option<&Etag>,
    ) -> Result<Etag, ApiError> {
        let mut request = self
            .client
            .put(self.url("/manifest"))
            .bearer_auth(&self.token)
            .json(manifest);
        if let Some(etag) = if_match {
            request = request.header(IF_MATCH, etag.as_str());
        }

        let response = request.send().await.map_err(transport_error)?;
        let body: PutManifestBody = decode(check(response).await?).await?;

        let etag = Etag::new(body.etag).map_err(|e| ApiError::Decode(e.to_string()))?;
        debug!(etag = %etag, "Committed manifest");
        Ok(etag)
    }

    async fn upload_file(
        &self,
        path: &VaultPath,
        hash: &ContentHash,
        bytes: Vec<u8>,
    ) -> Result<(), ApiError> {
        let url = self
            .negotiate_url(
                "/files/upload-url",
                serde_json::json!({ "path": path.as_str(), "hash": hash.as_str() }),
            )
            .await?;

        debug!(path = %path, bytes = bytes.len(), "Uploading via presigned url");
        let response = self
            .client
            .put(url)
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        Ok(())
    }

    async fn download_file(&self, path: &VaultPath) -> Result<Vec<u8>, ApiError> {
        let url = self
            .negotiate_url(
                "/files/download-url",
                serde_json::json!({ "path": path.as_str() }),
            )
            .await?;

        let response = self.client.get(url).send().await.map_err(transport_error)?;
        let response = check(response).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        debug!(path = %path, bytes = bytes.len(), "Downloaded via presigned url");
        Ok(bytes.to_vec())
    }

    async fn delete_files(&self, paths: &[VaultPath]) -> Result<(), ApiError> {
        let raw: Vec<&str> = paths.iter().map(VaultPath::as_str).collect();
        let response = self
            .client
            .post(self.url("/files/delete"))
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "paths": raw }))
            .send()
            .await
            .map_err(transport_error)?;
        check(response).await?;
        debug!(count = paths.len(), "Bulk delete accepted");
        Ok(())
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn transport_error(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

/// Map non-success statuses onto the typed error taxonomy.
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| status.to_string());

    Err(match status {
        StatusCode::UNAUTHORIZED => ApiError::Auth(message),
        StatusCode::PRECONDITION_FAILED => ApiError::PreconditionFailed,
        StatusCode::PRECONDITION_REQUIRED => ApiError::IfMatchRequired,
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => ApiError::Validation(message),
        _ => ApiError::Transport(format!("http {status}: {message}")),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    response
        .json()
        .await
        .map_err(|e| ApiError::Decode(e.to_string()))
}
