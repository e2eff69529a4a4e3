//! HTTP DTOs for billing endpoints.
//!
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::billing::InvoiceSnapshot;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductRequest {
    pub product_key: String,
    pub price_id: String,
}

/// Body of `POST /api/billing/subscription`.
///
/// With `retry` set, only `customerId`, `paymentMethodId` and `invoiceId`
/// are used.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    pub customer_id: String,
    pub payment_method_id: String,
    #[serde(default)]
    pub product: Option<ProductRequest>,
    #[serde(default)]
    pub associated_collection: Option<String>,
    #[serde(default)]
    pub associated_document: Option<String>,
    #[serde(default)]
    pub retry: bool,
    #[serde(default)]
    pub invoice_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerResponse {
    pub stripe_customer_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    pub subscription: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoiceResponse {
    pub invoice: InvoiceSnapshot,
}

/// `subscription` is null when there was nothing to cancel.
#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub subscription: Option<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntitlementResponse {
    pub entitled: bool,
}

/// Standard error body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}
