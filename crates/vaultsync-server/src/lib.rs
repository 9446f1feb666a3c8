//! Vaultsync Server - the manifest service
//!
//! A stateless, authenticated HTTP API in front of a key/value object
//! store. It exposes exactly the primitives the sync engine needs:
//!
//! - conditional read/write of the canonical manifest (ETag + If-Match)
//! - short-lived presigned upload/download URLs for file objects
//! - bulk delete
//!
//! Manifest mutation is serialized purely through the store's
//! compare-and-swap discipline; the server holds no locks and no
//! sessions.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod presign;
pub mod service;
pub mod store;

pub use config::ServerConfig;
pub use error::ServiceError;
pub use http::SyncServer;
pub use service::ManifestService;
pub use store::{FsObjectStore, MemoryObjectStore, ObjectStore};
