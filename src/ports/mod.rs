//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the billing core and the outside world. Adapters implement these ports.
//!
//! ## Remote Ports
//!
//! - `BillingProvider` - Stripe API calls
//!
//! ## Storage Ports
//!
//! - `ChargeRepository` - Charge records keyed by Stripe object id
//! - `UserRepository` - Customer id and entitlement groups per user
//! - `AssociationRepository` - Documents a charge can be linked to
//!
//! ## Task Ports
//!
//! - `AssociationQueue` - Deferred charge-to-document linking
//!
//! ## Event Ports
//!
//! - `ChargeEventPublisher` - Notifications after charge writes commit

mod association_queue;
mod association_repository;
mod billing_provider;
mod charge_event_publisher;
mod charge_repository;
mod user_repository;

pub use association_queue::{AssociationQueue, AssociationTask};
pub use association_repository::AssociationRepository;
pub use billing_provider::{
    BillingProvider, CreateSubscriptionRequest, ProviderError, ProviderErrorCode,
};
pub use charge_event_publisher::{ChargeEvent, ChargeEventPublisher};
pub use charge_repository::{ChargeRepository, SaveResult};
pub use user_repository::{BillingUser, UserRepository};
