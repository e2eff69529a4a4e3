//! Stripe billing adapter.
//!
//! Implements the `BillingProvider` port over Stripe's REST API, plus a mock
//! used by tests and local runs.
//!
//! # Security
//!
//! - The secret key is held as `secrecy::SecretString` and only exposed to
//!   build the basic-auth header
//! - Test and live keys are never mixed: the key is chosen once from
//!   `payment.mode`

mod mock_billing_provider;
mod stripe_adapter;
mod stripe_types;

pub use mock_billing_provider::{MethodCall, MockBillingProvider};
pub use stripe_adapter::{StripeBillingAdapter, StripeConfig};
pub use stripe_types::{provider_error_from_response, StripeErrorBody, StripeErrorEnvelope};
