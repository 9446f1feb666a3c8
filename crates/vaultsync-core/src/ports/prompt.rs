//! User prompt port
//!
//! Consumed by the engine when the conflict strategy is `ask`.

use crate::domain::newtypes::VaultPath;

/// The three answers a conflict prompt can yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    KeepLocal,
    KeepRemote,
    Merge,
}

/// Port trait for asking the user about a conflicted path
#[async_trait::async_trait]
pub trait ConflictPrompt: Send + Sync {
    /// Present both versions and wait for a choice.
    ///
    /// Returns `None` when the prompt was dismissed or cancelled; the
    /// engine treats that as keep-local.
    async fn ask_conflict(
        &self,
        path: &VaultPath,
        local_text: &str,
        remote_text: &str,
    ) -> anyhow::Result<Option<ConflictChoice>>;
}
