//! Billing handlers.
//!
//! ## Commands
//! - Ensuring a Stripe customer exists for a user
//! - Creating, retrying and cancelling subscriptions
//! - Processing Stripe webhooks
//!
//! ## Queries
//! - Entitlement check (with lapse expiry)
//!
//! The `Reconciler` and `EntitlementResolver` are shared by the handlers and
//! are the only writers of charge records and entitlement groups.

mod apply_entitlement;
mod cancel_subscription;
mod check_entitlement;
mod create_subscription;
mod ensure_customer;
mod handle_billing_webhook;
mod reconcile_subscription;
mod retry_subscription;

// Core
pub use apply_entitlement::{EntitlementChange, EntitlementResolver};
pub use reconcile_subscription::{ReconcileCommand, ReconcileOutcome, Reconciler};

// Commands
pub use cancel_subscription::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
};
pub use create_subscription::{
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult, ProductRef,
};
pub use ensure_customer::{EnsureCustomerCommand, EnsureCustomerHandler, EnsureCustomerResult};
pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, HandleBillingWebhookResult,
};
pub use retry_subscription::{
    RetrySubscriptionCommand, RetrySubscriptionHandler, RetrySubscriptionResult,
};

// Queries
pub use check_entitlement::{
    EntitlementQuery, EntitlementStatus, IsEntitledHandler, IsEntitledQuery,
};
