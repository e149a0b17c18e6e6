//! Webhook signature verification.
//!
//! The processor signs `"{timestamp}.{raw_body}"` with HMAC-SHA256 and
//! sends the result in the signature header as `t=<unix>,v1=<hex>`.
//! Verification runs over the exact raw bytes as received, before any
//! parsing, and compares digests in constant time.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::webhook_errors::ReconcileError;
use crate::domain::foundation::Timestamp;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed event, in seconds.
const MAX_EVENT_AGE_SECS: i64 = 300;

/// Allowance for the processor's clock running ahead of ours, in seconds.
const MAX_FUTURE_SKEW_SECS: i64 = 60;

/// Parsed contents of the signature header.
///
/// Unknown scheme keys are ignored so the processor can add schemes
/// without breaking verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signature: String,
}

impl SignatureHeader {
    /// Parses a `t=<unix>,v1=<hex>` header value.
    pub fn parse(header: &str) -> Result<Self, ReconcileError> {
        let mut timestamp = None;
        let mut signature = None;

        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        ReconcileError::ParseError("invalid signature timestamp".to_string())
                    })?);
                }
                Some(("v1", value)) => {
                    signature = Some(value.to_string());
                }
                _ => {} // unknown scheme, skip
            }
        }

        match (timestamp, signature) {
            (Some(timestamp), Some(signature)) => Ok(Self {
                timestamp,
                signature,
            }),
            _ => Err(ReconcileError::ParseError(
                "signature header missing t= or v1=".to_string(),
            )),
        }
    }
}

/// Verifies webhook authenticity against the shared signing secret.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature header against the raw request body.
    ///
    /// Distinguishes two failure modes: a digest mismatch is
    /// `InvalidSignature` (permanent); a timestamp outside the tolerance
    /// window on an otherwise authentic payload is `ClockSkew`
    /// (transient, the processor may redeliver). The digest is checked
    /// first so that an unauthentic payload is never classified as
    /// retryable, whatever its timestamp claims.
    pub fn verify(&self, raw_body: &[u8], header: &str, now: Timestamp) -> Result<(), ReconcileError> {
        let parsed = SignatureHeader::parse(header)?;

        let expected = self.compute(parsed.timestamp, raw_body)?;
        let provided = hex::decode(&parsed.signature)
            .map_err(|_| ReconcileError::InvalidSignature)?;
        if !bool::from(expected.ct_eq(provided.as_slice())) {
            return Err(ReconcileError::InvalidSignature);
        }

        let age = now.as_unix_secs() - parsed.timestamp;
        if age > MAX_EVENT_AGE_SECS {
            return Err(ReconcileError::ClockSkew(format!(
                "event is {}s old, tolerance is {}s",
                age, MAX_EVENT_AGE_SECS
            )));
        }
        if age < -MAX_FUTURE_SKEW_SECS {
            return Err(ReconcileError::ClockSkew(format!(
                "event timestamp is {}s in the future",
                -age
            )));
        }

        Ok(())
    }

    /// Computes the expected digest for `"{timestamp}.{raw_body}"`.
    fn compute(&self, timestamp: i64, raw_body: &[u8]) -> Result<Vec<u8>, ReconcileError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| ReconcileError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Builds a valid signature header for the given body and timestamp.
    ///
    /// Test helper; the engine never signs outbound payloads.
    pub fn sign_for_test(&self, raw_body: &[u8], timestamp: i64) -> Result<String, ReconcileError> {
        let digest = self.compute(timestamp, raw_body)?;
        Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::new("whsec_test_secret".to_string()))
    }

    fn now_at(unix: i64) -> Timestamp {
        Timestamp::from_unix_secs(unix)
    }

    #[test]
    fn header_parses_known_schemes_and_ignores_unknown() {
        let parsed = SignatureHeader::parse("t=1704067200,v0=deadbeef,v1=abc123").unwrap();
        assert_eq!(parsed.timestamp, 1_704_067_200);
        assert_eq!(parsed.signature, "abc123");
    }

    #[test]
    fn header_missing_v1_is_parse_error() {
        let result = SignatureHeader::parse("t=1704067200");
        assert!(matches!(result, Err(ReconcileError::ParseError(_))));
    }

    #[test]
    fn valid_signature_verifies() {
        let v = verifier();
        let body = br#"{"id":"evt_1"}"#;
        let header = v.sign_for_test(body, 1_704_067_200).unwrap();

        assert!(v.verify(body, &header, now_at(1_704_067_210)).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let v = verifier();
        let header = v.sign_for_test(br#"{"id":"evt_1"}"#, 1_704_067_200).unwrap();

        let result = v.verify(br#"{"id":"evt_2"}"#, &header, now_at(1_704_067_210));
        assert!(matches!(result, Err(ReconcileError::InvalidSignature)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let signer = WebhookVerifier::new(SecretString::new("whsec_other".to_string()));
        let body = br#"{"id":"evt_1"}"#;
        let header = signer.sign_for_test(body, 1_704_067_200).unwrap();

        let result = verifier().verify(body, &header, now_at(1_704_067_210));
        assert!(matches!(result, Err(ReconcileError::InvalidSignature)));
    }

    #[test]
    fn stale_timestamp_is_clock_skew_not_invalid() {
        let v = verifier();
        let body = br#"{"id":"evt_1"}"#;
        let header = v.sign_for_test(body, 1_704_067_200).unwrap();

        let result = v.verify(body, &header, now_at(1_704_067_200 + 301));
        assert!(matches!(result, Err(ReconcileError::ClockSkew(_))));
    }

    #[test]
    fn tampered_body_with_stale_timestamp_is_invalid_not_skew() {
        let v = verifier();
        let header = v.sign_for_test(br#"{"id":"evt_1"}"#, 1_704_067_200).unwrap();

        let result = v.verify(
            br#"{"id":"evt_2"}"#,
            &header,
            now_at(1_704_067_200 + 600),
        );
        assert!(matches!(result, Err(ReconcileError::InvalidSignature)));
    }

    #[test]
    fn future_timestamp_beyond_skew_is_rejected() {
        let v = verifier();
        let body = br#"{"id":"evt_1"}"#;
        let header = v.sign_for_test(body, 1_704_067_200 + 120).unwrap();

        let result = v.verify(body, &header, now_at(1_704_067_200));
        assert!(matches!(result, Err(ReconcileError::ClockSkew(_))));
    }

    #[test]
    fn boundary_age_is_accepted() {
        let v = verifier();
        let body = br#"{"id":"evt_1"}"#;
        let header = v.sign_for_test(body, 1_704_067_200).unwrap();

        assert!(v
            .verify(body, &header, now_at(1_704_067_200 + MAX_EVENT_AGE_SECS))
            .is_ok());
    }

    #[test]
    fn non_hex_signature_is_invalid() {
        let v = verifier();
        let result = v.verify(b"{}", "t=1704067200,v1=zzzz", now_at(1_704_067_210));
        assert!(matches!(result, Err(ReconcileError::InvalidSignature)));
    }
}
