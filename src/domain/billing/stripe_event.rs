//! Stripe webhook envelope.
//!
//! Only the envelope is typed. The `data.object` payload is interpreted by
//! the intake handler according to the event type.

use serde::{Deserialize, Serialize};

/// Stripe webhook event.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEvent {
    /// Event id (`evt_...`).
    pub id: String,

    #[serde(rename = "type")]
    pub event_type: String,

    /// Unix seconds.
    #[serde(default)]
    pub created: i64,

    pub data: StripeEventData,

    #[serde(default)]
    pub livemode: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn parsed_type(&self) -> BillingEventType {
        BillingEventType::parse(&self.event_type)
    }

    /// `data.object.id`.
    pub fn object_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(|v| v.as_str())
    }

    /// `data.object.subscription` for invoice events.
    ///
    /// Stripe sends either the id or, when expanded, the subscription object.
    pub fn subscription_id(&self) -> Option<&str> {
        match self.data.object.get("subscription")? {
            serde_json::Value::String(id) => Some(id.as_str()),
            serde_json::Value::Object(map) => map.get("id").and_then(|v| v.as_str()),
            _ => None,
        }
    }
}

/// Event types the intake dispatches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEventType {
    InvoicePaid,
    InvoicePaymentSucceeded,
    InvoicePaymentFailed,
    SubscriptionDeleted,
    Unknown(String),
}

impl BillingEventType {
    pub fn parse(s: &str) -> Self {
        match s {
            "invoice.paid" => Self::InvoicePaid,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::InvoicePaid => "invoice.paid",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::Unknown(s) => s,
        }
    }

    /// Invoice events all re-fetch the owning subscription and reconcile it.
    pub fn is_invoice_event(&self) -> bool {
        matches!(
            self,
            Self::InvoicePaid | Self::InvoicePaymentSucceeded | Self::InvoicePaymentFailed
        )
    }
}

/// Builder for test events.
#[cfg(test)]
pub struct StripeEventBuilder {
    id: String,
    event_type: String,
    created: i64,
    object: serde_json::Value,
    livemode: bool,
}

#[cfg(test)]
impl Default for StripeEventBuilder {
    fn default() -> Self {
        Self {
            id: "evt_test_1".to_string(),
            event_type: "invoice.paid".to_string(),
            created: chrono::Utc::now().timestamp(),
            object: serde_json::json!({}),
            livemode: false,
        }
    }
}

#[cfg(test)]
impl StripeEventBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = event_type.into();
        self
    }

    pub fn object(mut self, object: serde_json::Value) -> Self {
        self.object = object;
        self
    }

    pub fn build(self) -> StripeEvent {
        StripeEvent {
            id: self.id,
            event_type: self.event_type,
            created: self.created,
            data: StripeEventData {
                object: self.object,
            },
            livemode: self.livemode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_handled_types() {
        assert_eq!(BillingEventType::parse("invoice.paid"), BillingEventType::InvoicePaid);
        assert_eq!(
            BillingEventType::parse("customer.subscription.deleted"),
            BillingEventType::SubscriptionDeleted
        );
        assert!(BillingEventType::parse("invoice.payment_failed").is_invoice_event());
    }

    #[test]
    fn unknown_type_keeps_its_name() {
        let parsed = BillingEventType::parse("charge.refunded");
        assert_eq!(parsed, BillingEventType::Unknown("charge.refunded".to_string()));
        assert_eq!(parsed.as_str(), "charge.refunded");
        assert!(!parsed.is_invoice_event());
    }

    #[test]
    fn subscription_id_accepts_string_or_expanded_object() {
        let by_id = StripeEventBuilder::new()
            .object(json!({ "id": "in_1", "subscription": "sub_1" }))
            .build();
        assert_eq!(by_id.subscription_id(), Some("sub_1"));

        let expanded = StripeEventBuilder::new()
            .object(json!({ "id": "in_1", "subscription": { "id": "sub_2" } }))
            .build();
        assert_eq!(expanded.subscription_id(), Some("sub_2"));

        let none = StripeEventBuilder::new()
            .object(json!({ "id": "in_1", "subscription": null }))
            .build();
        assert_eq!(none.subscription_id(), None);
    }

    #[test]
    fn parses_minimal_envelope() {
        let event: StripeEvent = serde_json::from_value(json!({
            "id": "evt_1",
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_1" } }
        }))
        .unwrap();

        assert_eq!(event.parsed_type(), BillingEventType::SubscriptionDeleted);
        assert_eq!(event.object_id(), Some("sub_1"));
        assert!(!event.livemode);
    }
}
