//! HMAC-signed download tokens for locally-stored bundles, mirroring the control
//! plane's webhook-signature verification: constant-time comparison via `Mac::verify_slice`.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{BundleStoreError, Result};

fn signing_payload(slug: &str, version: &str, path: &str, expires_at_ms: i64) -> String {
    format!("v1\n{slug}\n{version}\n{path}\n{expires_at_ms}")
}

/// Sign `(slug, version, path, expires_at)` and return the hex-encoded signature.
pub fn sign(secret: &str, slug: &str, version: &str, path: &str, expires_at: DateTime<Utc>) -> String {
    let payload = signing_payload(slug, version, path, expires_at.timestamp_millis());
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take any size key");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a signature produced by [`sign`], rejecting expired tokens.
pub fn verify(
    secret: &str,
    slug: &str,
    version: &str,
    path: &str,
    expires_at: DateTime<Utc>,
    signature_hex: &str,
) -> Result<()> {
    if expires_at < Utc::now() {
        return Err(BundleStoreError::InvalidToken("download url expired".into()));
    }
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return Err(BundleStoreError::InvalidToken("malformed signature".into()));
    };
    let payload = signing_payload(slug, version, path, expires_at.timestamp_millis());
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take any size key");
    mac.update(payload.as_bytes());
    mac.verify_slice(&sig_bytes)
        .map_err(|_| BundleStoreError::InvalidToken("signature mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn round_trips() {
        let expires = Utc::now() + Duration::minutes(5);
        let sig = sign("secret", "my-job", "1.0.0", "my-job/1.0.0/bundle.tar.gz", expires);
        assert!(verify("secret", "my-job", "1.0.0", "my-job/1.0.0/bundle.tar.gz", expires, &sig).is_ok());
    }

    #[test]
    fn rejects_tampered_path() {
        let expires = Utc::now() + Duration::minutes(5);
        let sig = sign("secret", "my-job", "1.0.0", "my-job/1.0.0/bundle.tar.gz", expires);
        assert!(verify("secret", "my-job", "1.0.0", "other/1.0.0/bundle.tar.gz", expires, &sig).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let expires = Utc::now() - Duration::minutes(1);
        let sig = sign("secret", "my-job", "1.0.0", "my-job/1.0.0/bundle.tar.gz", expires);
        assert!(verify("secret", "my-job", "1.0.0", "my-job/1.0.0/bundle.tar.gz", expires, &sig).is_err());
    }
}
