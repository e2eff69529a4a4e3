//! subscription-sync - keeps local subscription charge records and user
//! entitlements consistent with Stripe.
//!
//! Writes arrive through two paths, the client command API and Stripe
//! webhooks. Both funnel into the reconciler, which upserts the charge
//! record and then recomputes the owner's entitlement groups.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
