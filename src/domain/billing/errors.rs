//! Billing error taxonomy.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | PaymentDeclined | 402 |
//! | SignatureVerification | 400 |
//! | UnrecognizedEvent | 400 |
//! | UnknownAssociation | 400 |
//! | Validation | 400 |
//! | UserNotFound | 404 |
//! | RemoteService | 502 |
//! | DuplicateCharge, Persistence, Cancellation | 500 |

use thiserror::Error;

use super::association::AssociationError;
use super::webhook_errors::WebhookError;
use crate::domain::foundation::{DomainError, ErrorCode, UserId, ValidationError};

/// Errors surfaced by the billing commands, the reconciler and event intake.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BillingError {
    /// Stripe failed or rejected a call.
    #[error("Remote billing service error: {message}")]
    RemoteService { message: String },

    /// Another writer inserted a record for the same Stripe object first.
    #[error("Charge already recorded for {stripe_id}")]
    DuplicateCharge { stripe_id: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Webhook verification failed: {0}")]
    SignatureVerification(String),

    #[error("Cancellation failed: {0}")]
    Cancellation(String),

    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    #[error("Unknown association: {0}")]
    UnknownAssociation(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Unrecognized event type: {0}")]
    UnrecognizedEvent(String),

    #[error("Validation failed for '{field}': {message}")]
    Validation { field: String, message: String },
}

impl BillingError {
    pub fn remote(message: impl Into<String>) -> Self {
        BillingError::RemoteService {
            message: message.into(),
        }
    }

    pub fn duplicate(stripe_id: impl Into<String>) -> Self {
        BillingError::DuplicateCharge {
            stripe_id: stripe_id.into(),
        }
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        BillingError::Persistence(message.into())
    }

    pub fn cancellation(message: impl Into<String>) -> Self {
        BillingError::Cancellation(message.into())
    }

    pub fn payment_declined(reason: impl Into<String>) -> Self {
        BillingError::PaymentDeclined {
            reason: reason.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BillingError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, BillingError::DuplicateCharge { .. })
    }

    /// Closest foundation error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            BillingError::Validation { .. }
            | BillingError::SignatureVerification(_)
            | BillingError::UnrecognizedEvent(_) => ErrorCode::ValidationFailed,
            BillingError::UnknownAssociation(_) => ErrorCode::AssociationNotFound,
            BillingError::UserNotFound(_) => ErrorCode::UserNotFound,
            BillingError::Persistence(_) | BillingError::DuplicateCharge { .. } => {
                ErrorCode::DatabaseError
            }
            BillingError::RemoteService { .. }
            | BillingError::Cancellation(_)
            | BillingError::PaymentDeclined { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<DomainError> for BillingError {
    fn from(err: DomainError) -> Self {
        BillingError::Persistence(err.to_string())
    }
}

impl From<WebhookError> for BillingError {
    fn from(err: WebhookError) -> Self {
        BillingError::SignatureVerification(err.to_string())
    }
}

impl From<AssociationError> for BillingError {
    fn from(err: AssociationError) -> Self {
        BillingError::UnknownAssociation(err.to_string())
    }
}

impl From<ValidationError> for BillingError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::EmptyField { field } => {
                BillingError::validation(field, "must not be empty")
            }
            ValidationError::InvalidFormat { field, reason } => BillingError::validation(field, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_become_persistence_errors() {
        let err: BillingError = DomainError::database("connection reset").into();
        assert!(matches!(err, BillingError::Persistence(msg) if msg.contains("connection reset")));
    }

    #[test]
    fn webhook_errors_become_signature_verification_errors() {
        let err: BillingError = WebhookError::InvalidSignature.into();
        assert_eq!(
            err,
            BillingError::SignatureVerification("Invalid signature".to_string())
        );
    }

    #[test]
    fn association_errors_become_unknown_association() {
        let err: BillingError = AssociationError::UnknownCollection("posts".to_string()).into();
        assert!(matches!(err, BillingError::UnknownAssociation(_)));
        assert_eq!(err.code(), ErrorCode::AssociationNotFound);
    }

    #[test]
    fn validation_errors_keep_field_name() {
        let err: BillingError = ValidationError::empty_field("customer_id").into();
        assert_eq!(
            err,
            BillingError::validation("customer_id", "must not be empty")
        );
    }

    #[test]
    fn duplicate_is_detectable() {
        assert!(BillingError::duplicate("sub_1").is_duplicate());
        assert!(!BillingError::persistence("x").is_duplicate());
    }

    #[test]
    fn declined_message_carries_reason() {
        let err = BillingError::payment_declined("insufficient_funds");
        assert_eq!(err.to_string(), "Payment declined: insufficient_funds");
    }
}
