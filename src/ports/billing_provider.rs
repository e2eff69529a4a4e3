//! Billing provider port - the remote Stripe API at its request/response boundary.
//!
//! # Design
//!
//! - Calls are single attempts; nothing is retried behind this trait
//! - Subscriptions and invoices come back as full snapshots, never as deltas
//! - Card declines carry Stripe's decline code so callers can surface it

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{
    BillingError, InvoiceSnapshot, SubscriptionMetadata, SubscriptionSnapshot,
};

/// Port for the remote billing service.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// Creates a customer and returns its id (`cus_...`).
    async fn create_customer(&self, email: &str) -> Result<String, ProviderError>;

    /// Attaches a payment method to a customer.
    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), ProviderError>;

    /// Makes a payment method the customer's default for invoices.
    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), ProviderError>;

    /// Creates a subscription with its latest invoice and payment intent expanded.
    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, ProviderError>;

    /// Fetches an invoice with its payment intent expanded.
    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<InvoiceSnapshot, ProviderError>;

    /// Cancels a subscription immediately and returns the final snapshot.
    async fn delete_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError>;

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError>;
}

/// Request to create a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSubscriptionRequest {
    pub customer_id: String,
    pub price_id: String,
    pub metadata: SubscriptionMetadata,
    /// Start with the trial configured on the plan, if any.
    pub trial_from_plan: bool,
}

/// Failure reported by the billing provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: ProviderErrorCode,
    pub message: String,
    /// Stripe `decline_code`, present on card errors.
    pub decline_code: Option<String>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            decline_code: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Network, message)
    }

    pub fn card_declined(message: impl Into<String>, decline_code: Option<String>) -> Self {
        Self {
            code: ProviderErrorCode::CardDeclined,
            message: message.into(),
            decline_code,
        }
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(ProviderErrorCode::NotFound, format!("{} not found", resource))
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidRequest, message)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ProviderError, message)
    }

    pub fn is_card_declined(&self) -> bool {
        self.code == ProviderErrorCode::CardDeclined
    }

    /// Reason shown to the customer for a declined card.
    pub fn decline_reason(&self) -> String {
        self.decline_code
            .clone()
            .unwrap_or_else(|| self.message.clone())
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for BillingError {
    fn from(err: ProviderError) -> Self {
        BillingError::remote(err.to_string())
    }
}

/// Provider error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorCode {
    Network,
    CardDeclined,
    NotFound,
    InvalidRequest,
    ProviderError,
}

impl std::fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProviderErrorCode::Network => "network",
            ProviderErrorCode::CardDeclined => "card_declined",
            ProviderErrorCode::NotFound => "not_found",
            ProviderErrorCode::InvalidRequest => "invalid_request",
            ProviderErrorCode::ProviderError => "provider_error",
        };
        write!(f, "{}", s)
    }
}
