//! Vaultsync Core - Domain model and port definitions
//!
//! This crate contains the pieces every other crate agrees on:
//! - Domain entities (manifest, file entries, diff plans) and validated newtypes
//! - Port definitions (traits the engine consumes, adapters implement)
//! - Client settings and protocol constants
//! - Device token primitives shared by the CLI and the server

pub mod config;
pub mod constants;
pub mod domain;
pub mod ports;
pub mod token;

pub use domain::errors::DomainError;
pub use domain::manifest::{ConflictEntry, DiffResult, FileEntry, SyncManifest};
pub use domain::newtypes::{ContentHash, DeviceId, Etag, VaultPath};
