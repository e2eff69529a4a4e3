//! Stripe webhook signature verification.
//!
//! HMAC-SHA256 over `"{t}.{body}"`, compared in constant time, with a
//! bounded replay window.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::stripe_event::StripeEvent;
use super::webhook_errors::WebhookError;

/// Oldest acceptable signature, in seconds.
pub const MAX_EVENT_AGE_SECS: i64 = 300;

/// How far in the future a signature may be dated.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Parsed `Stripe-Signature` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    /// Every `v1` entry; Stripe sends several while a secret is being rolled.
    pub v1_signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    /// Parses `t=<unix>,v1=<hex>[,v1=<hex>...]`. Unknown keys are ignored.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signatures = Vec::new();

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    let signature = hex::decode(value).map_err(|_| {
                        WebhookError::ParseError("invalid v1 signature hex".to_string())
                    })?;
                    v1_signatures.push(signature);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        if v1_signatures.is_empty() {
            return Err(WebhookError::ParseError("missing v1 signature".to_string()));
        }

        Ok(Self {
            timestamp,
            v1_signatures,
        })
    }
}

/// Verifies webhook deliveries against the endpoint secret of the active mode.
pub struct StripeWebhookVerifier {
    secret: SecretString,
}

impl StripeWebhookVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Verifies the signature against the current clock and parses the event.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: &str,
    ) -> Result<StripeEvent, WebhookError> {
        self.verify_and_parse_at(payload, signature_header, chrono::Utc::now().timestamp())
    }

    /// Same as [`verify_and_parse`](Self::verify_and_parse) with an explicit clock.
    pub fn verify_and_parse_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<StripeEvent, WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;
        validate_timestamp(header.timestamp, now)?;

        let expected = compute_signature(self.secret.expose_secret(), header.timestamp, payload)?;
        let matched = header
            .v1_signatures
            .iter()
            .any(|candidate| constant_time_compare(&expected, candidate));
        if !matched {
            return Err(WebhookError::InvalidSignature);
        }

        serde_json::from_slice(payload).map_err(|e| WebhookError::ParseError(e.to_string()))
    }
}

fn validate_timestamp(timestamp: i64, now: i64) -> Result<(), WebhookError> {
    let age = now.checked_sub(timestamp).ok_or(WebhookError::InvalidTimestamp)?;
    if age > MAX_EVENT_AGE_SECS {
        return Err(WebhookError::TimestampOutOfRange);
    }
    if age < -MAX_CLOCK_SKEW_SECS {
        return Err(WebhookError::InvalidTimestamp);
    }
    Ok(())
}

fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSecret)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a `Stripe-Signature` header value for `payload`.
///
/// Used by local tooling and tests that replay events against the endpoint.
pub fn signature_header(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, WebhookError> {
    let signature = compute_signature(secret, timestamp, payload)?;
    Ok(format!("t={},v1={}", timestamp, hex::encode(signature)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "whsec_test_secret_12345";
    const NOW: i64 = 1_700_000_000;

    fn verifier() -> StripeWebhookVerifier {
        StripeWebhookVerifier::new(SecretString::new(TEST_SECRET.to_string()))
    }

    fn payload() -> Vec<u8> {
        br#"{"id":"evt_1","type":"invoice.paid","created":1700000000,"data":{"object":{"id":"in_1","subscription":"sub_1"}},"livemode":false}"#.to_vec()
    }

    // ══════════════════════════════════════════════════════════════
    // Header Parsing
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parse_header_collects_all_v1_entries() {
        let header = format!("t=123,v1={},v1={},v0=ignored", "a".repeat(64), "b".repeat(64));
        let parsed = SignatureHeader::parse(&header).unwrap();

        assert_eq!(parsed.timestamp, 123);
        assert_eq!(parsed.v1_signatures.len(), 2);
    }

    #[test]
    fn parse_header_missing_timestamp_fails() {
        let result = SignatureHeader::parse(&format!("v1={}", "a".repeat(64)));
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn parse_header_missing_v1_fails() {
        assert!(matches!(
            SignatureHeader::parse("t=123"),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn parse_header_invalid_hex_fails() {
        assert!(matches!(
            SignatureHeader::parse("t=123,v1=zz"),
            Err(WebhookError::ParseError(_))
        ));
    }

    #[test]
    fn extreme_timestamps_are_rejected_without_overflow() {
        let signature = "00".repeat(32);
        for t in [i64::MIN, i64::MAX] {
            let header = format!("t={},v1={}", t, signature);
            assert_eq!(SignatureHeader::parse(&header).unwrap().timestamp, t);

            let result = verifier().verify_and_parse_at(&payload(), &header, NOW);

            assert!(matches!(result, Err(WebhookError::InvalidTimestamp)));
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn valid_signature_parses_event() {
        let body = payload();
        let header = signature_header(TEST_SECRET, NOW, &body).unwrap();

        let event = verifier().verify_and_parse_at(&body, &header, NOW + 10).unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.subscription_id(), Some("sub_1"));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let body = payload();
        let header = signature_header("whsec_other", NOW, &body).unwrap();

        let result = verifier().verify_and_parse_at(&body, &header, NOW);
        assert_eq!(result.unwrap_err(), WebhookError::InvalidSignature);
    }

    #[test]
    fn tampered_body_is_rejected() {
        let body = payload();
        let header = signature_header(TEST_SECRET, NOW, &body).unwrap();
        let mut tampered = body.clone();
        tampered.extend_from_slice(b" ");

        let result = verifier().verify_and_parse_at(&tampered, &header, NOW);
        assert_eq!(result.unwrap_err(), WebhookError::InvalidSignature);
    }

    #[test]
    fn stale_signature_is_rejected() {
        let body = payload();
        let header = signature_header(TEST_SECRET, NOW, &body).unwrap();

        let result = verifier().verify_and_parse_at(&body, &header, NOW + MAX_EVENT_AGE_SECS + 1);
        assert_eq!(result.unwrap_err(), WebhookError::TimestampOutOfRange);
    }

    #[test]
    fn future_signature_beyond_skew_is_rejected() {
        let body = payload();
        let header = signature_header(TEST_SECRET, NOW, &body).unwrap();

        let result = verifier().verify_and_parse_at(&body, &header, NOW - MAX_CLOCK_SKEW_SECS - 1);
        assert_eq!(result.unwrap_err(), WebhookError::InvalidTimestamp);
    }

    #[test]
    fn signed_garbage_is_a_parse_error() {
        let body = b"not json".to_vec();
        let header = signature_header(TEST_SECRET, NOW, &body).unwrap();

        let result = verifier().verify_and_parse_at(&body, &header, NOW);
        assert!(matches!(result, Err(WebhookError::ParseError(_))));
    }

    #[test]
    fn any_matching_v1_entry_is_accepted() {
        let body = payload();
        let good = signature_header(TEST_SECRET, NOW, &body).unwrap();
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", NOW, "0".repeat(64), good_sig);

        assert!(verifier().verify_and_parse_at(&body, &header, NOW).is_ok());
    }
}
