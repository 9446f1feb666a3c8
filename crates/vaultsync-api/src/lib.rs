//! Vaultsync API - typed HTTP client for the manifest service
//!
//! Implements the engine's [`SyncTransport`](vaultsync_core::ports::SyncTransport)
//! port over HTTPS: manifest fetch and conditional commit, presigned-URL
//! negotiation for file bytes, and bulk delete.

pub mod client;

pub use client::HttpTransport;
