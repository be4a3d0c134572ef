//! Webhook signature verification (Svix-style HMAC-SHA256).
//!
//! Signed content is `"{msg_id}.{timestamp}.{body}"`. The signature header holds
//! space-separated `v1,<base64>` entries; any match accepts.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing header {0}")]
    MissingHeader(&'static str),
    #[error("webhook secret is not valid base64")]
    InvalidSecret,
    #[error("invalid signature timestamp")]
    InvalidTimestamp,
    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,
    #[error("no matching signature")]
    SignatureMismatch,
}

/// Look up `svix-<name>`, falling back to the unbranded `webhook-<name>` header.
fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, VerifyError> {
    let (svix, generic) = match name {
        "id" => ("svix-id", "webhook-id"),
        "timestamp" => ("svix-timestamp", "webhook-timestamp"),
        _ => ("svix-signature", "webhook-signature"),
    };
    headers
        .get(svix)
        .or_else(|| headers.get(generic))
        .and_then(|v| v.to_str().ok())
        .ok_or(VerifyError::MissingHeader(svix))
}

pub struct WebhookVerifier {
    keyed: HmacSha256,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: &str, tolerance: Duration) -> Result<Self, VerifyError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);
        let key = STANDARD.decode(encoded).map_err(|_| VerifyError::InvalidSecret)?;
        let keyed = <HmacSha256 as Mac>::new_from_slice(&key).map_err(|_| VerifyError::InvalidSecret)?;
        Ok(Self { keyed, tolerance })
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), VerifyError> {
        self.verify_at(headers, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), VerifyError> {
        let msg_id = header(headers, "id")?;
        let ts_raw = header(headers, "timestamp")?;
        let signatures = header(headers, "signature")?;

        let ts: i64 = ts_raw.trim().parse().map_err(|_| VerifyError::InvalidTimestamp)?;
        if now.abs_diff(ts) > self.tolerance.as_secs() {
            return Err(VerifyError::TimestampOutOfTolerance);
        }

        let mac = self.mac(msg_id, ts_raw.trim(), body);
        let matched = signatures
            .split_whitespace()
            .filter_map(|entry| entry.strip_prefix("v1,"))
            .filter_map(|sig| STANDARD.decode(sig).ok())
            .any(|sig| mac.clone().verify_slice(&sig).is_ok());
        if matched {
            Ok(())
        } else {
            Err(VerifyError::SignatureMismatch)
        }
    }

    /// Base64 signature for the given message; what the provider puts after `v1,`.
    pub fn sign(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> String {
        let mac = self.mac(msg_id, &timestamp.to_string(), body);
        STANDARD.encode(mac.finalize().into_bytes())
    }

    fn mac(&self, msg_id: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = self.keyed.clone();
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookConfig;
    use axum::http::HeaderValue;

    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const NOW: i64 = 1_714_557_600;

    fn verifier(secret: &str) -> Result<WebhookVerifier, VerifyError> {
        WebhookVerifier::new(secret, WebhookConfig::default().tolerance())
    }

    fn signed_headers(v: &WebhookVerifier, id: &str, ts: i64, body: &[u8]) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert("svix-id", HeaderValue::from_str(id).unwrap());
        h.insert("svix-timestamp", HeaderValue::from_str(&ts.to_string()).unwrap());
        let sig = format!("v1,bm90LWl0 v1,{}", v.sign(id, ts, body));
        h.insert("svix-signature", HeaderValue::from_str(&sig).unwrap());
        h
    }

    #[test]
    fn accepts_valid_signature_among_several() {
        let v = verifier(SECRET).unwrap();
        let body = br#"{"type":"v1.conversation.message"}"#;
        let headers = signed_headers(&v, "msg_1", NOW, body);
        assert_eq!(v.verify_at(&headers, body, NOW + 10), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let v = verifier(SECRET).unwrap();
        let headers = signed_headers(&v, "msg_1", NOW, b"original");
        assert_eq!(
            v.verify_at(&headers, b"tampered", NOW),
            Err(VerifyError::SignatureMismatch)
        );
    }

    #[test]
    fn rejects_other_secret() {
        let signer = verifier(SECRET).unwrap();
        let other = verifier("whsec_c2Vjb25kLXNlY3JldA==").unwrap();
        let headers = signed_headers(&signer, "msg_1", NOW, b"x");
        assert_eq!(other.verify_at(&headers, b"x", NOW), Err(VerifyError::SignatureMismatch));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let v = verifier(SECRET).unwrap();
        let headers = signed_headers(&v, "msg_1", NOW, b"x");
        assert_eq!(
            v.verify_at(&headers, b"x", NOW + 301),
            Err(VerifyError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn rejects_missing_headers() {
        let v = verifier(SECRET).unwrap();
        assert_eq!(
            v.verify_at(&HeaderMap::new(), b"x", NOW),
            Err(VerifyError::MissingHeader("svix-id"))
        );
    }

    #[test]
    fn accepts_unbranded_headers() {
        let v = verifier(SECRET).unwrap();
        let sig = v.sign("msg_2", NOW, b"x");
        let mut h = HeaderMap::new();
        h.insert("webhook-id", HeaderValue::from_static("msg_2"));
        h.insert("webhook-timestamp", HeaderValue::from_str(&NOW.to_string()).unwrap());
        h.insert("webhook-signature", HeaderValue::from_str(&format!("v1,{}", sig)).unwrap());
        assert_eq!(v.verify_at(&h, b"x", NOW), Ok(()));
    }

    #[test]
    fn invalid_secret_is_rejected_up_front() {
        assert!(matches!(
            verifier("whsec_***"),
            Err(VerifyError::InvalidSecret)
        ));
    }
}
