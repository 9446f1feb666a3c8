//! Filesystem vault adapter
//!
//! Implements [`VaultAdapter`] over a root directory. Vault paths map to
//! paths under the root; the `VaultPath` invariants (no absolute paths,
//! no `..`) keep every access inside it.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::Context;
use tracing::warn;

use vaultsync_core::ports::{VaultAdapter, VaultFileInfo};
use vaultsync_core::VaultPath;

/// A vault rooted at a local directory
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    /// Create an adapter rooted at `root`. The directory is created if it
    /// does not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create vault root {}", root.display()))?;
        Ok(Self { root })
    }

    /// The vault root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &VaultPath) -> PathBuf {
        self.root.join(path.as_str())
    }

    fn walk<'a>(
        &'a self,
        dir: PathBuf,
        files: &'a mut Vec<VaultFileInfo>,
    ) -> futures::future::BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .with_context(|| format!("Failed to read directory {}", dir.display()))?;

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let metadata = entry.metadata().await?;

                if metadata.is_dir() {
                    self.walk(entry_path, files).await?;
                } else if metadata.is_file() {
                    let relative = entry_path
                        .strip_prefix(&self.root)
                        .context("Walked file escaped the vault root")?;
                    let relative = relative.to_string_lossy().replace('\\', "/");

                    let path = match VaultPath::new(relative) {
                        Ok(path) => path,
                        Err(err) => {
                            warn!(path = %entry_path.display(), error = %err, "Skipping unrepresentable path");
                            continue;
                        }
                    };

                    let mtime = metadata
                        .modified()
                        .ok()
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map_or(0, |d| d.as_millis() as i64);

                    files.push(VaultFileInfo {
                        path,
                        mtime,
                        size: metadata.len(),
                    });
                }
            }
            Ok(())
        })
    }
}

#[async_trait::async_trait]
impl VaultAdapter for FsVault {
    async fn list_files(&self) -> anyhow::Result<Vec<VaultFileInfo>> {
        let mut files = Vec::new();
        self.walk(self.root.clone(), &mut files).await?;
        Ok(files)
    }

    async fn read_binary(&self, path: &VaultPath) -> anyhow::Result<Vec<u8>> {
        tokio::fs::read(self.resolve(path))
            .await
            .with_context(|| format!("Failed to read {path}"))
    }

    async fn read_text(&self, path: &VaultPath) -> anyhow::Result<String> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .with_context(|| format!("Failed to read {path} as text"))
    }

    async fn write_binary(&self, path: &VaultPath, bytes: &[u8]) -> anyhow::Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create parent dirs for {path}"))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("Failed to write {path}"))
    }

    async fn write_text(&self, path: &VaultPath, text: &str) -> anyhow::Result<()> {
        self.write_binary(path, text.as_bytes()).await
    }

    async fn exists(&self, path: &VaultPath) -> anyhow::Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn delete(&self, path: &VaultPath) -> anyhow::Result<()> {
        tokio::fs::remove_file(self.resolve(path))
            .await
            .with_context(|| format!("Failed to delete {path}"))
    }
}
