//! Mock billing provider for testing.
//!
//! Keeps subscriptions and invoices as Stripe-shaped JSON so snapshots go
//! through the same parsing as real responses. Supports:
//! - Seeding remote objects
//! - Error injection per method or for the next call
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::domain::billing::{InvoiceSnapshot, SubscriptionSnapshot};
use crate::ports::{BillingProvider, CreateSubscriptionRequest, ProviderError};

const PERIOD_SECS: i64 = 30 * 24 * 60 * 60;

/// Mock billing provider.
///
/// # Example
///
/// ```ignore
/// let mock = MockBillingProvider::new();
/// mock.add_subscription(json!({ "id": "sub_1", "status": "active", ... }));
/// mock.set_method_error("attach_payment_method", ProviderError::card_declined("declined", None));
/// ```
#[derive(Clone, Default)]
pub struct MockBillingProvider {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    subscriptions: HashMap<String, Value>,
    invoices: HashMap<String, InvoiceSnapshot>,
    next_subscription_status: Option<String>,
    omit_canceled_at: bool,
    next_error: Option<ProviderError>,
    method_errors: HashMap<String, ProviderError>,
    call_log: Vec<MethodCall>,
    sequence: u32,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration
    // ════════════════════════════════════════════════════════════════════════════

    /// Seeds or replaces a remote subscription.
    pub fn add_subscription(&self, subscription: Value) {
        if let Some(id) = subscription.get("id").and_then(|v| v.as_str()) {
            let id = id.to_string();
            self.state().subscriptions.insert(id, subscription);
        }
    }

    /// Changes the status of a seeded subscription, as Stripe would after a payment.
    pub fn set_subscription_status(&self, subscription_id: &str, status: &str) {
        if let Some(Value::Object(map)) = self.state().subscriptions.get_mut(subscription_id) {
            map.insert("status".to_string(), Value::String(status.to_string()));
        }
    }

    pub fn add_invoice(&self, invoice: InvoiceSnapshot) {
        self.state().invoices.insert(invoice.id.clone(), invoice);
    }

    /// Status given to the next subscription created. Defaults to `active`.
    pub fn set_next_subscription_status(&self, status: &str) {
        self.state().next_subscription_status = Some(status.to_string());
    }

    /// Makes `delete_subscription` return a snapshot without `canceled_at`.
    pub fn omit_canceled_at(&self) {
        self.state().omit_canceled_at = true;
    }

    /// Fails the next call to any method.
    pub fn set_error(&self, error: ProviderError) {
        self.state().next_error = Some(error);
    }

    /// Fails every call to `method` until cleared.
    pub fn set_method_error(&self, method: &str, error: ProviderError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Current remote JSON of a subscription.
    pub fn subscription(&self, subscription_id: &str) -> Option<Value> {
        self.state().subscriptions.get(subscription_id).cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn begin(&self, method: &str, args: Vec<String>) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state();
        state.sequence += 1;
        format!("{}_mock_{}", prefix, state.sequence)
    }

    fn snapshot(value: Value) -> Result<SubscriptionSnapshot, ProviderError> {
        SubscriptionSnapshot::from_value(value).map_err(|e| ProviderError::provider(e.to_string()))
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn create_customer(&self, email: &str) -> Result<String, ProviderError> {
        self.begin("create_customer", vec![email.to_string()])?;
        Ok(self.next_id("cus"))
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), ProviderError> {
        self.begin(
            "attach_payment_method",
            vec![payment_method_id.to_string(), customer_id.to_string()],
        )
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), ProviderError> {
        self.begin(
            "set_default_payment_method",
            vec![customer_id.to_string(), payment_method_id.to_string()],
        )
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        self.begin(
            "create_subscription",
            vec![request.customer_id.clone(), request.price_id.clone()],
        )?;

        let subscription_id = self.next_id("sub");
        let invoice_id = self.next_id("in");
        let now = chrono::Utc::now().timestamp();

        let mut state = self.state();
        let status = state
            .next_subscription_status
            .take()
            .unwrap_or_else(|| "active".to_string());
        let subscription = json!({
            "id": subscription_id,
            "object": "subscription",
            "status": status,
            "customer": request.customer_id,
            "current_period_start": now,
            "current_period_end": now + PERIOD_SECS,
            "livemode": false,
            "metadata": request.metadata,
            "plan": { "id": request.price_id, "amount": 1000 },
            "latest_invoice": {
                "id": invoice_id,
                "subscription": subscription_id,
                "invoice_pdf": format!("https://pay.stripe.com/invoice/{}/pdf", invoice_id),
                "status": "open",
                "payment_intent": { "id": format!("pi_for_{}", invoice_id), "status": "succeeded" }
            },
            "canceled_at": null
        });
        state
            .subscriptions
            .insert(subscription_id.clone(), subscription.clone());
        drop(state);

        Self::snapshot(subscription)
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<InvoiceSnapshot, ProviderError> {
        self.begin("retrieve_invoice", vec![invoice_id.to_string()])?;
        self.state()
            .invoices
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("invoice"))
    }

    async fn delete_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        self.begin("delete_subscription", vec![subscription_id.to_string()])?;

        let mut state = self.state();
        let omit_canceled_at = state.omit_canceled_at;
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| ProviderError::not_found("subscription"))?;
        if let Value::Object(map) = subscription {
            map.insert("status".to_string(), json!("canceled"));
            let canceled_at = if omit_canceled_at {
                Value::Null
            } else {
                json!(chrono::Utc::now().timestamp())
            };
            map.insert("canceled_at".to_string(), canceled_at);
        }
        let value = subscription.clone();
        drop(state);

        Self::snapshot(value)
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        self.begin("retrieve_subscription", vec![subscription_id.to_string()])?;
        let value = self
            .state()
            .subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| ProviderError::not_found("subscription"))?;
        Self::snapshot(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::{ChargeStatus, SubscriptionMetadata};
    use crate::domain::foundation::UserId;
    use crate::ports::ProviderErrorCode;

    fn request() -> CreateSubscriptionRequest {
        CreateSubscriptionRequest {
            customer_id: "cus_1".to_string(),
            price_id: "price_1".to_string(),
            metadata: SubscriptionMetadata::new(&UserId::new("u1").unwrap(), "premium", None),
            trial_from_plan: true,
        }
    }

    #[tokio::test]
    async fn created_subscription_is_retrievable() {
        let mock = MockBillingProvider::new();
        mock.set_next_subscription_status("trialing");

        let created = mock.create_subscription(request()).await.unwrap();
        let fetched = mock.retrieve_subscription(&created.id).await.unwrap();

        assert_eq!(created.status, ChargeStatus::Trialing);
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.metadata.user_id.as_deref(), Some("u1"));
        assert!(created.latest_invoice.unwrap().embedded_reference().is_some());
    }

    #[tokio::test]
    async fn delete_marks_canceled_with_timestamp() {
        let mock = MockBillingProvider::new();
        let created = mock.create_subscription(request()).await.unwrap();

        let deleted = mock.delete_subscription(&created.id).await.unwrap();

        assert_eq!(deleted.status, ChargeStatus::Canceled);
        assert!(deleted.canceled_at.is_some());
    }

    #[tokio::test]
    async fn method_error_is_sticky_and_next_error_is_consumed() {
        let mock = MockBillingProvider::new();
        mock.set_method_error(
            "attach_payment_method",
            ProviderError::card_declined("declined", Some("do_not_honor".into())),
        );
        mock.set_error(ProviderError::network("down"));

        let first = mock.create_customer("a@example.com").await.unwrap_err();
        assert_eq!(first.code, ProviderErrorCode::Network);
        assert!(mock.create_customer("a@example.com").await.is_ok());

        for _ in 0..2 {
            let err = mock.attach_payment_method("pm_1", "cus_1").await.unwrap_err();
            assert!(err.is_card_declined());
        }
        assert_eq!(mock.call_count("attach_payment_method"), 2);
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        let mock = MockBillingProvider::new();
        let err = mock.retrieve_subscription("sub_nope").await.unwrap_err();
        assert_eq!(err.code, ProviderErrorCode::NotFound);
    }
}
