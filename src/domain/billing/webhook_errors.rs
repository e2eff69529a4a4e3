//! Errors raised while authenticating an inbound Stripe webhook.

use thiserror::Error;

/// Failures of signature or payload verification.
///
/// Every variant is terminal for the delivery: the event is rejected before
/// any state is read or written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WebhookError {
    /// Signature did not match any configured secret.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Signed timestamp is older than the replay window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Signed timestamp is too far in the future.
    #[error("Invalid timestamp")]
    InvalidTimestamp,

    /// Header or body could not be parsed.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The signing secret could not be used as an HMAC key.
    #[error("Invalid signing secret")]
    InvalidSecret,
}

impl WebhookError {
    /// Whether the failure concerns the signature rather than the body.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            WebhookError::InvalidSignature
                | WebhookError::TimestampOutOfRange
                | WebhookError::InvalidTimestamp
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_parse_error_detail() {
        let err = WebhookError::ParseError("missing timestamp".to_string());
        assert_eq!(err.to_string(), "Parse error: missing timestamp");
    }

    #[test]
    fn signature_failures_are_authentication_failures() {
        assert!(WebhookError::InvalidSignature.is_authentication_failure());
        assert!(WebhookError::TimestampOutOfRange.is_authentication_failure());
        assert!(!WebhookError::ParseError("x".into()).is_authentication_failure());
    }
}
