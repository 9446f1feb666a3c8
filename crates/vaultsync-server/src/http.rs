//! HTTP front for the manifest service
//!
//! A small hyper http1 serve loop; all semantics live in
//! [`ManifestService`]. Requests and responses are JSON except the
//! presigned object routes, which carry raw bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::{BodyExt, Full};
use hyper::body::{Bytes, Incoming};
use hyper::header::{AUTHORIZATION, CONTENT_TYPE, IF_MATCH};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::error::ServiceError;
use crate::service::ManifestService;

/// HTTP server wrapping a [`ManifestService`]
pub struct SyncServer {
    service: Arc<ManifestService>,
    addr: SocketAddr,
}

impl SyncServer {
    /// Create a server bound to `endpoint`, e.g. `"127.0.0.1:8787"`.
    pub fn new(service: Arc<ManifestService>, endpoint: &str) -> anyhow::Result<Self> {
        let addr: SocketAddr = endpoint.parse()?;
        Ok(Self { service, addr })
    }

    /// Serve until the cancellation token fires.
    pub async fn run(&self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        info!(addr = %listener.local_addr()?, "Manifest service listening");

        loop {
            tokio::select! {
                result = listener.accept() => {
                    let (stream, peer) = result?;
                    let io = TokioIo::new(stream);
                    let service = Arc::clone(&self.service);

                    tokio::spawn(async move {
                        let handler = service_fn(move |req| {
                            let service = Arc::clone(&service);
                            async move { Ok::<_, hyper::Error>(route(req, &service).await) }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, handler).await {
                            debug!(peer = %peer, error = %e, "Connection error");
                        }
                    });
                }
                () = shutdown.cancelled() => {
                    info!("Manifest service shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Dispatch one request.
async fn route(req: Request<Incoming>, service: &ManifestService) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().unwrap_or("").to_string();

    let authorization = header_string(&req, AUTHORIZATION.as_str());
    let if_match = header_string(&req, IF_MATCH.as_str());

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            error!(error = %e, "Failed to read request body");
            return error_response(&ServiceError::BadRequest("unreadable body".into()));
        }
    };

    debug!(method = %method, path = %path, bytes = body.len(), "Request");

    match (method.as_str(), path.as_str()) {
        ("GET", "/health") => json_response(StatusCode::OK, &service.health()),

        ("GET", "/manifest") => {
            respond(service.get_manifest(authorization.as_deref()).await)
        }

        ("PUT", "/manifest") => respond(
            service
                .put_manifest(authorization.as_deref(), if_match.as_deref(), &body)
                .await,
        ),

        ("POST", "/files/upload-url") => match parse_json(&body) {
            Ok(request) => respond(service.upload_url(authorization.as_deref(), request).await),
            Err(e) => error_response(&e),
        },

        ("POST", "/files/download-url") => match parse_json(&body) {
            Ok(request) => respond(service.download_url(authorization.as_deref(), request).await),
            Err(e) => error_response(&e),
        },

        ("POST", "/files/delete") => match parse_json(&body) {
            Ok(request) => respond(service.delete_files(authorization.as_deref(), request).await),
            Err(e) => error_response(&e),
        },

        ("PUT", "/objects") => match service.presigned_put(&query, body.to_vec()).await {
            Ok(()) => json_response(StatusCode::OK, &serde_json::json!({ "ok": true })),
            Err(e) => error_response(&e),
        },

        ("GET", "/objects") => match service.presigned_get(&query).await {
            Ok(bytes) => Response::builder()
                .status(StatusCode::OK)
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(Full::new(Bytes::from(bytes)))
                .expect("static response"),
            Err(e) => error_response(&e),
        },

        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from_static(b"Not Found")))
            .expect("static response"),
    }
}

fn header_string(req: &Request<Incoming>, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServiceError> {
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid request body: {e}")))
}

fn respond<T: Serialize>(result: Result<T, ServiceError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => json_response(StatusCode::OK, &value),
        Err(e) => error_response(&e),
    }
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response")
}

fn error_response(err: &ServiceError) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    json_response(status, &serde_json::json!({ "error": err.to_string() }))
}
