//! Presigned object URLs
//!
//! The service hands clients short-lived URLs granting exactly one
//! operation (PUT or GET) on exactly one object key. The grant is an
//! HMAC-SHA-256 over `METHOD\nkey\nexpires` under a signing key only the
//! service holds, carried in the URL's query string:
//!
//! ```text
//! <public-url>/objects?key=vault/notes/a.md&expires=1723800000&sig=<hex>
//! ```

use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// A minted URL and its hard expiry
#[derive(Debug, Clone)]
pub struct PresignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Components recovered from a presigned request's query string
#[derive(Debug)]
pub struct PresignedClaim {
    pub key: String,
    pub expires: i64,
    pub signature: String,
}

/// Mints and verifies presigned object URLs
pub struct UrlSigner {
    key: Vec<u8>,
    public_url: String,
}

impl UrlSigner {
    /// `public_url` is prefixed onto minted URLs; empty yields
    /// service-relative URLs.
    pub fn new(key: impl Into<Vec<u8>>, public_url: impl Into<String>) -> Self {
        let mut public_url = public_url.into();
        while public_url.ends_with('/') {
            public_url.pop();
        }
        Self {
            key: key.into(),
            public_url,
        }
    }

    fn signature(&self, method: &str, key: &str, expires: i64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(method.as_bytes());
        mac.update(b"\n");
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Mint a URL allowing `method` on `key` for `ttl_secs` from now.
    #[must_use]
    pub fn presign(&self, method: &str, key: &str, ttl_secs: u64) -> PresignedUrl {
        let expires_at = Utc::now() + chrono::Duration::seconds(ttl_secs as i64);
        let expires = expires_at.timestamp();
        let sig = self.signature(method, key, expires);

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("key", key)
            .append_pair("expires", &expires.to_string())
            .append_pair("sig", &sig)
            .finish();

        PresignedUrl {
            url: format!("{}/objects?{query}", self.public_url),
            expires_at,
        }
    }

    /// Parse a raw query string into its presigned components.
    pub fn parse_claim(query: &str) -> Result<PresignedClaim, ServiceError> {
        let mut key = None;
        let mut expires = None;
        let mut signature = None;

        for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match name.as_ref() {
                "key" => key = Some(value.into_owned()),
                "expires" => expires = value.parse::<i64>().ok(),
                "sig" => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        Ok(PresignedClaim {
            key: key.ok_or_else(|| ServiceError::BadRequest("missing key parameter".into()))?,
            expires: expires
                .ok_or_else(|| ServiceError::BadRequest("missing or bad expires parameter".into()))?,
            signature: signature
                .ok_or_else(|| ServiceError::BadRequest("missing sig parameter".into()))?,
        })
    }

    /// Verify a claim for `method` at time `now`, returning the granted key.
    pub fn verify(
        &self,
        method: &str,
        claim: &PresignedClaim,
        now: DateTime<Utc>,
    ) -> Result<String, ServiceError> {
        let expiry = Utc
            .timestamp_opt(claim.expires, 0)
            .single()
            .ok_or_else(|| ServiceError::BadRequest("bad expires timestamp".into()))?;
        if now > expiry {
            return Err(ServiceError::BadRequest("presigned url expired".into()));
        }

        let provided = hex::decode(&claim.signature)
            .map_err(|_| ServiceError::Unauthorized("bad url signature encoding".into()))?;

        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(method.as_bytes());
        mac.update(b"\n");
        mac.update(claim.key.as_bytes());
        mac.update(b"\n");
        mac.update(claim.expires.to_string().as_bytes());
        mac.verify_slice(&provided)
            .map_err(|_| ServiceError::Unauthorized("url signature mismatch".into()))?;

        Ok(claim.key.clone())
    }
}
