//! Protocol constants shared by the engine, client, and service.

/// Object-store key of the canonical manifest.
pub const MANIFEST_KEY: &str = ".obsidian-r2-sync/manifest.json";

/// Reserved key prefix for internal objects; never writable through file routes.
pub const INTERNAL_PREFIX: &str = ".obsidian-r2-sync";

/// Object-store key prefix under which tracked files live.
pub const FILES_PREFIX: &str = "vault/";

/// Default transfer queue fan-out.
pub const MAX_CONCURRENT_TRANSFERS: usize = 5;

/// Per-transfer retry budget.
pub const MAX_RETRIES: u32 = 3;

/// Base delay for transfer retry backoff (doubles per attempt).
pub const RETRY_BACKOFF_MS: u64 = 1000;

/// How many times a cycle restarts after losing the manifest commit race.
pub const MAX_MANIFEST_RETRIES: u32 = 3;

/// Lifetime of presigned upload/download URLs, in seconds.
pub const PRESIGNED_URL_EXPIRY_SECS: u64 = 900;

/// Maps a vault path to its object-store key.
pub fn object_key_for(path: &str) -> String {
    format!("{FILES_PREFIX}{path}")
}
