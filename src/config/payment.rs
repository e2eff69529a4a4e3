//! Payment configuration (Stripe)
//!
//! Test and live credentials are configured side by side; `mode` picks the
//! pair in use once at startup.

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Which Stripe account credentials are active
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    #[default]
    Test,
    Live,
}

impl PaymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMode::Test => "test",
            PaymentMode::Live => "live",
        }
    }

    fn key_prefix(&self) -> &'static str {
        match self {
            PaymentMode::Test => "sk_test_",
            PaymentMode::Live => "sk_live_",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    #[serde(default)]
    pub mode: PaymentMode,

    /// Live secret key
    #[serde(default)]
    pub secret_key: Option<String>,

    #[serde(default)]
    pub secret_key_test: Option<String>,

    /// Live webhook endpoint secret
    #[serde(default)]
    pub webhook_secret: Option<String>,

    #[serde(default)]
    pub webhook_secret_test: Option<String>,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl PaymentConfig {
    pub fn is_test_mode(&self) -> bool {
        self.mode == PaymentMode::Test
    }

    /// Secret key for the active mode.
    pub fn active_secret_key(&self) -> Option<&str> {
        match self.mode {
            PaymentMode::Test => self.secret_key_test.as_deref(),
            PaymentMode::Live => self.secret_key.as_deref(),
        }
        .filter(|k| !k.is_empty())
    }

    /// Webhook endpoint secret for the active mode.
    pub fn active_webhook_secret(&self) -> Option<&str> {
        match self.mode {
            PaymentMode::Test => self.webhook_secret_test.as_deref(),
            PaymentMode::Live => self.webhook_secret.as_deref(),
        }
        .filter(|s| !s.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let (key_name, secret_name) = match self.mode {
            PaymentMode::Test => ("PAYMENT__SECRET_KEY_TEST", "PAYMENT__WEBHOOK_SECRET_TEST"),
            PaymentMode::Live => ("PAYMENT__SECRET_KEY", "PAYMENT__WEBHOOK_SECRET"),
        };

        let key = self
            .active_secret_key()
            .ok_or(ValidationError::MissingRequired(key_name))?;
        if !key.starts_with(self.mode.key_prefix()) {
            return Err(ValidationError::StripeKeyModeMismatch(self.mode.as_str()));
        }

        let secret = self
            .active_webhook_secret()
            .ok_or(ValidationError::MissingRequired(secret_name))?;
        if !secret.starts_with("whsec_") {
            return Err(ValidationError::InvalidStripeWebhookSecret);
        }

        if self.request_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            mode: PaymentMode::default(),
            secret_key: None,
            secret_key_test: None,
            webhook_secret: None,
            webhook_secret_test: None,
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_api_base_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}
