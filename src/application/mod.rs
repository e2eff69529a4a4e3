//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers (write) and query handlers (read) are kept separate.

pub mod handlers;

pub use handlers::billing::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CreateSubscriptionCommand, CreateSubscriptionHandler, CreateSubscriptionResult,
    EnsureCustomerCommand, EnsureCustomerHandler, EnsureCustomerResult, EntitlementQuery,
    EntitlementResolver, EntitlementStatus, HandleBillingWebhookCommand,
    HandleBillingWebhookHandler, HandleBillingWebhookResult, IsEntitledHandler, IsEntitledQuery,
    ProductRef, ReconcileCommand, ReconcileOutcome, Reconciler, RetrySubscriptionCommand,
    RetrySubscriptionHandler, RetrySubscriptionResult,
};
