//! Billing domain - charge records, entitlement rules and webhook envelopes.
//!
//! # Module Organization
//!
//! - `status` - Stripe status and object type enums
//! - `association` - Typed target of a charge (`users/...`, `products/...`)
//! - `snapshot` - Subscription and invoice objects as fetched from Stripe
//! - `charge` - The locally persisted charge record
//! - `entitlement` - Status to entitlement-group mapping
//! - `errors` - Billing error taxonomy
//! - `stripe_event`, `webhook_verifier`, `webhook_errors` - Webhook intake

mod association;
mod charge;
mod entitlement;
mod errors;
mod snapshot;
mod status;
mod stripe_event;
mod webhook_errors;
mod webhook_verifier;

pub use association::{Association, AssociationError};
pub use charge::{ChargeRecord, NewChargeContext, CHARGE_SOURCE, EXPIRY_GRACE_DAYS};
pub use entitlement::{
    entitlement_for, grants_access, resolve_groups, Entitlement, EntitlementGroup,
};
pub use errors::BillingError;
pub use snapshot::{
    InvoiceRef, InvoiceSnapshot, PlanSnapshot, SubscriptionMetadata, SubscriptionSnapshot,
};
pub use status::{ChargeStatus, ChargeType};
pub use stripe_event::{BillingEventType, StripeEvent, StripeEventData};
pub use webhook_errors::WebhookError;
pub use webhook_verifier::{
    signature_header, SignatureHeader, StripeWebhookVerifier, MAX_CLOCK_SKEW_SECS,
    MAX_EVENT_AGE_SECS,
};

#[cfg(test)]
pub use stripe_event::StripeEventBuilder;
