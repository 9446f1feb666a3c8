//! Vault adapter port
//!
//! How the engine touches the local tree of files. The host decides what a
//! "vault" actually is (a directory, an app's document store); the engine
//! only needs these few operations.
//!
//! Uses `anyhow::Result` because errors at port boundaries are
//! adapter-specific and don't need domain-level classification.

use crate::domain::newtypes::VaultPath;

/// A file seen by the scanner, before hashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultFileInfo {
    pub path: VaultPath,
    /// Last-modified milliseconds since epoch
    pub mtime: i64,
    /// Byte length
    pub size: u64,
}

/// Port trait for local vault access
///
/// Write operations create parent directories as needed. Paths are always
/// vault-relative; adapters are responsible for keeping access inside the
/// vault root.
#[async_trait::async_trait]
pub trait VaultAdapter: Send + Sync {
    /// List every file in the vault (no directories, no exclusion applied)
    async fn list_files(&self) -> anyhow::Result<Vec<VaultFileInfo>>;

    /// Read a file's raw bytes
    async fn read_binary(&self, path: &VaultPath) -> anyhow::Result<Vec<u8>>;

    /// Read a file as UTF-8 text
    async fn read_text(&self, path: &VaultPath) -> anyhow::Result<String>;

    /// Write raw bytes, creating parent directories as needed
    async fn write_binary(&self, path: &VaultPath, bytes: &[u8]) -> anyhow::Result<()>;

    /// Write UTF-8 text, creating parent directories as needed
    async fn write_text(&self, path: &VaultPath, text: &str) -> anyhow::Result<()>;

    /// Whether a file exists at `path`
    async fn exists(&self, path: &VaultPath) -> anyhow::Result<bool>;

    /// Delete the file at `path`
    async fn delete(&self, path: &VaultPath) -> anyhow::Result<()>;
}
