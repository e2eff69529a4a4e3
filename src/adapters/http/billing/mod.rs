//! HTTP adapter for billing endpoints.
//!
//! - `POST /api/billing/customer` - Ensure a Stripe customer for the current user
//! - `POST /api/billing/subscription` - Create or retry a subscription
//! - `POST /api/billing/subscription/cancel` - Cancel the current subscription
//! - `GET /api/billing/entitlement` - Entitlement check
//! - `POST /webhook` - Stripe webhooks
//! - `GET /health` - Liveness

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingApiError, BillingAppState};
pub use routes::{billing_router, billing_routes};
