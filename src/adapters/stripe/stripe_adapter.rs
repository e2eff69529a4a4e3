//! Stripe billing adapter.
//!
//! Implements the `BillingProvider` port over Stripe's form-encoded REST API.
//! Every call is a single attempt bounded by the client timeout.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::from_payment_config(&app_config.payment)?;
//! let adapter = StripeBillingAdapter::new(config)?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::config::PaymentConfig;
use crate::domain::billing::{InvoiceSnapshot, SubscriptionSnapshot};
use crate::ports::{BillingProvider, CreateSubscriptionRequest, ProviderError};

use super::stripe_types::{provider_error_from_response, StripeCustomer};

/// Credentials and endpoint for the active Stripe mode.
#[derive(Clone)]
pub struct StripeConfig {
    api_key: SecretString,
    api_base_url: String,
    timeout: Duration,
}

impl StripeConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            api_base_url: "https://api.stripe.com".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Picks the secret key of the configured mode.
    pub fn from_payment_config(config: &PaymentConfig) -> Result<Self, ProviderError> {
        let key = config.active_secret_key().ok_or_else(|| {
            ProviderError::invalid_request(format!(
                "no Stripe secret key configured for {} mode",
                config.mode.as_str()
            ))
        })?;
        Ok(Self::new(key)
            .with_base_url(config.api_base_url.clone())
            .with_timeout(config.request_timeout()))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct StripeBillingAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripeBillingAdapter {
    pub fn new(config: StripeConfig) -> Result<Self, ProviderError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::network(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    /// URL of a single object, e.g. `subscriptions/sub_123`.
    fn object_url(&self, resource: &str, id: &str) -> Result<String, ProviderError> {
        Ok(self.url(&format!("{}/{}", resource, object_id(id)?)))
    }

    /// Sends an authenticated request and decodes the JSON body.
    async fn send(&self, operation: &'static str, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let response = request
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(operation, error = %e, "Stripe request failed");
                ProviderError::network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = provider_error_from_response(status.as_u16(), &body);
            tracing::warn!(operation, status = status.as_u16(), code = %err.code, "Stripe rejected request");
            return Err(err);
        }

        response.json::<Value>().await.map_err(|e| {
            ProviderError::provider(format!("Failed to parse Stripe response: {}", e))
        })
    }

    fn subscription(value: Value) -> Result<SubscriptionSnapshot, ProviderError> {
        SubscriptionSnapshot::from_value(value)
            .map_err(|e| ProviderError::provider(format!("Unexpected subscription shape: {}", e)))
    }
}

/// Rejects ids that are not plain Stripe object ids before they reach a URL path.
fn object_id(id: &str) -> Result<&str, ProviderError> {
    let well_formed =
        !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if well_formed {
        Ok(id)
    } else {
        Err(ProviderError::invalid_request(format!("malformed Stripe id: {:?}", id)))
    }
}

/// Form fields for `POST /v1/subscriptions`.
fn subscription_form(request: &CreateSubscriptionRequest) -> Vec<(String, String)> {
    let mut params = vec![
        ("customer".to_string(), request.customer_id.clone()),
        ("items[0][price]".to_string(), request.price_id.clone()),
        ("expand[]".to_string(), "latest_invoice.payment_intent".to_string()),
    ];
    if request.trial_from_plan {
        params.push(("trial_from_plan".to_string(), "true".to_string()));
    }
    params.extend(request.metadata.form_pairs());
    params
}

#[async_trait]
impl BillingProvider for StripeBillingAdapter {
    async fn create_customer(&self, email: &str) -> Result<String, ProviderError> {
        let request = self
            .http_client
            .post(self.url("customers"))
            .form(&[("email", email)]);
        let body = self.send("create_customer", request).await?;

        let customer: StripeCustomer = serde_json::from_value(body)
            .map_err(|e| ProviderError::provider(format!("Unexpected customer shape: {}", e)))?;
        Ok(customer.id)
    }

    async fn attach_payment_method(
        &self,
        payment_method_id: &str,
        customer_id: &str,
    ) -> Result<(), ProviderError> {
        let request = self
            .http_client
            .post(format!("{}/attach", self.object_url("payment_methods", payment_method_id)?))
            .form(&[("customer", customer_id)]);
        self.send("attach_payment_method", request).await?;
        Ok(())
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<(), ProviderError> {
        let request = self
            .http_client
            .post(self.object_url("customers", customer_id)?)
            .form(&[("invoice_settings[default_payment_method]", payment_method_id)]);
        self.send("set_default_payment_method", request).await?;
        Ok(())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        let http = self
            .http_client
            .post(self.url("subscriptions"))
            .form(&subscription_form(&request));
        let body = self.send("create_subscription", http).await?;
        Self::subscription(body)
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<InvoiceSnapshot, ProviderError> {
        let request = self
            .http_client
            .get(self.object_url("invoices", invoice_id)?)
            .query(&[("expand[]", "payment_intent")]);
        let body = self.send("retrieve_invoice", request).await?;

        serde_json::from_value(body)
            .map_err(|e| ProviderError::provider(format!("Unexpected invoice shape: {}", e)))
    }

    async fn delete_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        let request = self
            .http_client
            .delete(self.object_url("subscriptions", subscription_id)?);
        let body = self.send("delete_subscription", request).await?;
        Self::subscription(body)
    }

    async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionSnapshot, ProviderError> {
        let request = self
            .http_client
            .get(self.object_url("subscriptions", subscription_id)?);
        let body = self.send("retrieve_subscription", request).await?;
        Self::subscription(body)
    }
}
