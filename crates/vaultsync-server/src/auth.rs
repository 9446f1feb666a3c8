//! Device token verification
//!
//! Every authenticated route runs through [`TokenVerifier::verify_bearer`]:
//! parse the bearer token, recompute the HMAC over the claimed device id
//! with the shared secret, and compare in constant time. The HMAC
//! comparison (`Mac::verify_slice`) does work proportional to the input
//! length regardless of where a mismatch occurs; a length mismatch is
//! rejected up front.
//!
//! There is no per-token state to revoke. Rotating the shared secret
//! invalidates every outstanding token at once.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use vaultsync_core::token::split_token;
use vaultsync_core::DeviceId;

use crate::error::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Verifies `Authorization: Bearer <deviceId>:<hmacHex>` headers
pub struct TokenVerifier {
    secret: Vec<u8>,
}

impl TokenVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify the Authorization header and return the authenticated device.
    ///
    /// # Errors
    /// `ServiceError::Unauthorized` for a missing header, a non-bearer
    /// scheme, a malformed token, or a signature that does not verify.
    pub fn verify_bearer(&self, authorization: Option<&str>) -> Result<DeviceId, ServiceError> {
        let header = authorization
            .ok_or_else(|| ServiceError::Unauthorized("missing authorization header".into()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::Unauthorized("expected bearer authorization".into()))?;

        let (device_id, signature_hex) = split_token(token)
            .ok_or_else(|| ServiceError::Unauthorized("invalid token format".into()))?;

        let signature = hex::decode(signature_hex)
            .map_err(|_| ServiceError::Unauthorized("invalid token signature encoding".into()))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| ServiceError::Internal(format!("hmac init: {e}")))?;
        mac.update(device_id.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServiceError::Unauthorized("invalid token signature".into()))?;

        DeviceId::new(device_id)
            .map_err(|e| ServiceError::Unauthorized(format!("invalid device id: {e}")))
    }
}
