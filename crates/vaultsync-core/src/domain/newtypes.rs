//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the values the protocol passes around.
//! Each newtype validates at construction time, so the rest of the code
//! can assume a `VaultPath` is safe to hand to the object store and a
//! `ContentHash` really is a SHA-256 digest.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::constants::INTERNAL_PREFIX;

use super::errors::DomainError;

// ============================================================================
// VaultPath
// ============================================================================

/// A validated vault-relative path
///
/// Vault paths use forward slashes and are relative to the vault root,
/// e.g. `notes/2024/january.md`. Construction rejects:
/// - the empty string
/// - absolute paths (leading `/` or `\`)
/// - traversal (`..` segments, with either separator)
/// - paths under the reserved internal prefix
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VaultPath(String);

impl VaultPath {
    /// Create a new VaultPath
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path violates any of the
    /// constraints above. The message names the violated constraint
    /// ("traversal", "internal", ...) so callers can surface it verbatim.
    pub fn new(path: impl Into<String>) -> Result<Self, DomainError> {
        let path = path.into();

        if path.is_empty() {
            return Err(DomainError::InvalidPath("path is empty".to_string()));
        }

        if path.starts_with('/') || path.starts_with('\\') {
            return Err(DomainError::InvalidPath(format!(
                "path must be vault-relative: {path}"
            )));
        }

        if path.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(DomainError::InvalidPath(format!(
                "path traversal is not allowed: {path}"
            )));
        }

        if path == INTERNAL_PREFIX || path.starts_with(&format!("{INTERNAL_PREFIX}/")) {
            return Err(DomainError::InvalidPath(format!(
                "path addresses the internal sync prefix: {path}"
            )));
        }

        Ok(Self(path))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-name extension (lowercased), if any
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.0.rsplit('/').next()?;
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() {
            return None;
        }
        Some(ext)
    }

    /// Whether this path names a markdown document
    #[must_use]
    pub fn is_markdown(&self) -> bool {
        self.extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("md"))
    }
}

impl Display for VaultPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VaultPath {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for VaultPath {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<VaultPath> for String {
    fn from(path: VaultPath) -> Self {
        path.0
    }
}

// ============================================================================
// ContentHash
// ============================================================================

/// Lowercase hex SHA-256 digest of a file's raw bytes
///
/// The hash is the authoritative change signal; mtimes are advisory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// Hex-encoded length of a SHA-256 digest
    const HEX_LEN: usize = 64;

    /// Create a ContentHash from an existing hex digest
    ///
    /// # Errors
    /// Returns `DomainError::InvalidHash` unless the value is exactly 64
    /// lowercase hex characters.
    pub fn new(hash: impl Into<String>) -> Result<Self, DomainError> {
        let hash = hash.into();

        if hash.len() != Self::HEX_LEN {
            return Err(DomainError::InvalidHash(format!(
                "expected {} hex chars, got {}",
                Self::HEX_LEN,
                hash.len()
            )));
        }

        if !hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(DomainError::InvalidHash(format!(
                "not lowercase hex: {hash}"
            )));
        }

        Ok(Self(hash))
    }

    /// Hash raw bytes
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        Self(hex::encode(digest))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentHash {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

// ============================================================================
// DeviceId
// ============================================================================

/// Opaque client-generated device identifier
///
/// Stable across restarts. The protocol gives it no meaning beyond being
/// the HMAC input for the device token and the audit attribute on manifest
/// entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a DeviceId from an existing string
    ///
    /// # Errors
    /// Returns `DomainError::InvalidDeviceId` if empty or if it contains
    /// `:` (which would break the token format).
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidDeviceId(
                "device id cannot be empty".to_string(),
            ));
        }
        if id.contains(':') {
            return Err(DomainError::InvalidDeviceId(format!(
                "device id cannot contain ':': {id}"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random DeviceId
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DeviceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeviceId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

// ============================================================================
// Etag
// ============================================================================

/// Opaque revision identifier for the stored manifest
///
/// The object store mints these; the protocol only ever compares them.
/// `If-Match` headers may carry the value quoted, so comparison goes
/// through [`Etag::matches_header`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Etag(String);

impl Etag {
    /// Create an Etag
    ///
    /// # Errors
    /// Returns `DomainError::InvalidEtag` if empty.
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        if value.is_empty() {
            return Err(DomainError::InvalidEtag("etag cannot be empty".to_string()));
        }
        Ok(Self(value))
    }

    /// Mint a fresh random Etag
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a raw `If-Match` header value, stripping any
    /// surrounding quotes and a weak-validator prefix first
    #[must_use]
    pub fn matches_header(&self, header: &str) -> bool {
        let trimmed = header.trim();
        let trimmed = trimmed.strip_prefix("W/").unwrap_or(trimmed);
        let trimmed = trimmed.trim_matches('"');
        self.0 == trimmed
    }
}

impl Display for Etag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Etag {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Etag {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Etag> for String {
    fn from(etag: Etag) -> Self {
        etag.0
    }
}

// ============================================================================
// Tests
// ============================================================================
