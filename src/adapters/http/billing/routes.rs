//! Axum router configuration for billing endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    cancel_subscription, check_entitlement, create_subscription, ensure_customer,
    handle_stripe_webhook, health, BillingAppState,
};

/// Routes for the current user, mounted under `/api/billing`.
///
/// - `POST /customer` - Ensure a Stripe customer exists
/// - `POST /subscription` - Create a subscription (or retry with `retry: true`)
/// - `POST /subscription/cancel` - Cancel the live subscription
/// - `GET /entitlement` - Entitlement check
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/customer", post(ensure_customer))
        .route("/subscription", post(create_subscription))
        .route("/subscription/cancel", post(cancel_subscription))
        .route("/entitlement", get(check_entitlement))
}

/// Complete billing router.
///
/// The webhook sits outside `/api` since Stripe authenticates it by
/// signature, not by user.
///
/// ```ignore
/// let app = billing_router().with_state(state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .nest("/api/billing", billing_routes())
        .route("/webhook", post(handle_stripe_webhook))
        .route("/health", get(health))
}
