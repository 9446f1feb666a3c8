//! Device token primitives
//!
//! A device token is `<deviceId>:<hmacHex>` where `hmacHex` is the
//! lowercase hex HMAC-SHA-256 of the device id under the shared secret.
//! The CLI mints tokens with these helpers; the server recomputes and
//! verifies with constant-time comparison (see `vaultsync-server`).
//!
//! There is no per-token revocation: rotating the shared secret
//! invalidates every outstanding token at once.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::newtypes::DeviceId;

type HmacSha256 = Hmac<Sha256>;

/// Lowercase hex HMAC-SHA-256 of `device_id` under `secret`
#[must_use]
pub fn sign_device_id(secret: &[u8], device_id: &DeviceId) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(device_id.as_str().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Build a complete bearer token for `device_id`
#[must_use]
pub fn make_device_token(secret: &[u8], device_id: &DeviceId) -> String {
    format!("{}:{}", device_id, sign_device_id(secret, device_id))
}

/// Split a raw token on its first `:` into (device id, signature hex).
///
/// Returns `None` when the separator is absent or either half is empty.
#[must_use]
pub fn split_token(token: &str) -> Option<(&str, &str)> {
    let (device_id, sig) = token.split_once(':')?;
    if device_id.is_empty() || sig.is_empty() {
        return None;
    }
    Some((device_id, sig))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrips_through_split() {
        let device = DeviceId::new("device-a").unwrap();
        let token = make_device_token(b"secret", &device);

        let (id, sig) = split_token(&token).unwrap();
        assert_eq!(id, "device-a");
        assert_eq!(sig, sign_device_id(b"secret", &device));
    }

    #[test]
    fn test_signature_is_lowercase_hex() {
        let device = DeviceId::new("device-a").unwrap();
        let sig = sign_device_id(b"secret", &device);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_different_secrets_differ() {
        let device = DeviceId::new("device-a").unwrap();
        assert_ne!(
            sign_device_id(b"secret-1", &device),
            sign_device_id(b"secret-2", &device)
        );
    }

    #[test]
    fn test_split_token_rejects_malformed() {
        assert!(split_token("no-separator").is_none());
        assert!(split_token(":sig-only").is_none());
        assert!(split_token("id:").is_none());
    }

    #[test]
    fn test_split_token_uses_first_colon() {
        let (id, sig) = split_token("dev:ab:cd").unwrap();
        assert_eq!(id, "dev");
        assert_eq!(sig, "ab:cd");
    }
}
