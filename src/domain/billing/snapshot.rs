//! Remote object snapshots.
//!
//! A snapshot is the full Stripe object as last fetched. Only the fields the
//! reconciler reads are typed; the complete JSON is retained so the stored
//! charge record always carries the provider's own view.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::association::{Association, AssociationError};
use super::status::{ChargeStatus, ChargeType};
use crate::domain::foundation::UserId;

/// A Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSnapshot {
    pub id: String,

    #[serde(default = "default_object")]
    pub object: ChargeType,

    pub status: ChargeStatus,

    #[serde(default)]
    pub customer: Option<String>,

    /// Unix seconds.
    pub current_period_start: i64,

    /// Unix seconds.
    pub current_period_end: i64,

    #[serde(default)]
    pub livemode: bool,

    #[serde(default)]
    pub metadata: SubscriptionMetadata,

    #[serde(default)]
    pub plan: Option<PlanSnapshot>,

    #[serde(default)]
    pub latest_invoice: Option<InvoiceRef>,

    #[serde(default)]
    pub canceled_at: Option<i64>,

    #[serde(skip)]
    raw: Value,
}

fn default_object() -> ChargeType {
    ChargeType::Subscription
}

impl SubscriptionSnapshot {
    /// Parses a subscription from its JSON form, keeping the JSON as the raw snapshot.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let mut snapshot: Self = serde_json::from_value(value.clone())?;
        snapshot.raw = value;
        Ok(snapshot)
    }

    /// Parses a subscription from a response body.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// The full JSON object as received.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Overrides the status in both the typed field and the raw JSON.
    ///
    /// Used for locally forced transitions so the stored `status` and
    /// `data.status` stay identical.
    pub fn with_status(mut self, status: ChargeStatus) -> Self {
        if let Value::Object(map) = &mut self.raw {
            map.insert("status".to_string(), Value::String(status.as_str().to_string()));
        }
        self.status = status;
        self
    }

    /// Product key: explicit argument wins, then metadata, then the plan id.
    pub fn product_key(&self, explicit: Option<&str>) -> Option<String> {
        explicit
            .map(str::to_string)
            .or_else(|| self.metadata.product_key.clone())
            .or_else(|| self.plan.as_ref().map(|p| p.id.clone()))
    }

    pub fn amount(&self) -> Option<i64> {
        self.plan.as_ref().and_then(|p| p.amount)
    }

    /// Stripe dashboard link for this subscription.
    pub fn dashboard_url(&self) -> String {
        let mode = if self.livemode { "" } else { "test/" };
        format!("https://dashboard.stripe.com/{}subscriptions/{}", mode, self.id)
    }
}

#[cfg(test)]
impl SubscriptionSnapshot {
    /// Subscription owned by `user_id` whose 30-day period ends at `period_end`.
    pub fn test_fixture(
        id: &str,
        status: &str,
        user_id: &str,
        period_end: crate::domain::foundation::Timestamp,
    ) -> Self {
        let value = serde_json::json!({
            "id": id,
            "object": "subscription",
            "status": status,
            "customer": "cus_fixture",
            "current_period_start": period_end.minus_days(30).as_unix_secs(),
            "current_period_end": period_end.as_unix_secs(),
            "livemode": false,
            "metadata": { "userId": user_id, "productKey": "premium" },
            "plan": { "id": "price_premium", "amount": 1500 },
            "latest_invoice": {
                "id": format!("in_{}", id),
                "invoice_pdf": format!("https://pay.stripe.com/invoice/in_{}/pdf", id)
            },
            "canceled_at": null
        });
        match Self::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(e) => panic!("invalid fixture: {}", e),
        }
    }
}

/// Plan attached to a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlanSnapshot {
    pub id: String,

    #[serde(default)]
    pub amount: Option<i64>,
}

/// `latest_invoice` is an id unless the request expanded it.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InvoiceRef {
    Id(String),
    Expanded(Box<InvoiceSnapshot>),
}

impl InvoiceRef {
    /// Reference usable without a remote call, if the invoice was embedded.
    pub fn embedded_reference(&self) -> Option<String> {
        match self {
            InvoiceRef::Id(_) => None,
            InvoiceRef::Expanded(invoice) => Some(invoice.reference()),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            InvoiceRef::Id(id) => id,
            InvoiceRef::Expanded(invoice) => &invoice.id,
        }
    }
}

/// A Stripe invoice object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSnapshot {
    pub id: String,

    #[serde(default)]
    pub subscription: Option<String>,

    #[serde(default)]
    pub invoice_pdf: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    /// Remaining fields, passed back to clients untouched.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

impl InvoiceSnapshot {
    /// PDF link when Stripe has rendered one, otherwise the invoice id.
    pub fn reference(&self) -> String {
        self.invoice_pdf.clone().unwrap_or_else(|| self.id.clone())
    }
}

/// Metadata this system writes onto subscriptions and reads back from webhooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_collection: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub associated_document: Option<String>,
}

impl SubscriptionMetadata {
    pub fn new(user_id: &UserId, product_key: &str, association: Option<&Association>) -> Self {
        Self {
            user_id: Some(user_id.to_string()),
            product_key: Some(product_key.to_string()),
            associated_collection: association.map(|a| a.collection_name().to_string()),
            associated_document: association.map(|a| a.document_id().to_string()),
        }
    }

    /// Owning user, if the metadata names a valid one.
    pub fn user_id(&self) -> Option<UserId> {
        self.user_id.as_deref().and_then(|id| UserId::new(id).ok())
    }

    pub fn association(&self) -> Result<Option<Association>, AssociationError> {
        Association::parse_optional(
            self.associated_collection.as_deref(),
            self.associated_document.as_deref(),
        )
    }

    /// Form-encoded pairs in Stripe's `metadata[key]` notation.
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        let entries = [
            ("userId", &self.user_id),
            ("productKey", &self.product_key),
            ("associatedCollection", &self.associated_collection),
            ("associatedDocument", &self.associated_document),
        ];
        entries
            .into_iter()
            .filter_map(|(key, value)| {
                value
                    .as_ref()
                    .map(|v| (format!("metadata[{}]", key), v.clone()))
            })
            .collect()
    }
}
