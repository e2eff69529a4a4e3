//! ChargeEventPublisher port - notifications after charge writes commit.
//!
//! Downstream consumers (receipts, analytics, product hooks) learn about new
//! charges and status transitions through this port. Publishing happens
//! after the charge record is stored; a failed publish is logged by the
//! caller and never undoes the write.

use async_trait::async_trait;

use crate::domain::billing::{Association, ChargeRecord, ChargeStatus, ChargeType};
use crate::domain::foundation::{ChargeId, DomainError, UserId};

/// A committed change to a charge record.
#[derive(Debug, Clone, PartialEq)]
pub enum ChargeEvent {
    /// First sighting of a Stripe object.
    Inserted {
        charge_id: ChargeId,
        stripe_id: String,
        charge_type: ChargeType,
        user_id: UserId,
        status: ChargeStatus,
        association: Option<Association>,
        product_key: Option<String>,
    },

    /// Stored status moved from `from` to `to`.
    StatusChanged {
        charge_id: ChargeId,
        stripe_id: String,
        user_id: UserId,
        from: ChargeStatus,
        to: ChargeStatus,
    },
}

impl ChargeEvent {
    pub fn inserted(record: &ChargeRecord) -> Self {
        ChargeEvent::Inserted {
            charge_id: record.id,
            stripe_id: record.stripe_id.clone(),
            charge_type: record.charge_type.clone(),
            user_id: record.user_id.clone(),
            status: record.status.clone(),
            association: record.association.clone(),
            product_key: record.product_key.clone(),
        }
    }

    pub fn status_changed(record: &ChargeRecord, from: ChargeStatus) -> Self {
        ChargeEvent::StatusChanged {
            charge_id: record.id,
            stripe_id: record.stripe_id.clone(),
            user_id: record.user_id.clone(),
            from,
            to: record.status.clone(),
        }
    }

    /// Routing key, e.g. `charge.inserted`.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChargeEvent::Inserted { .. } => "charge.inserted",
            ChargeEvent::StatusChanged { .. } => "charge.status_changed",
        }
    }

    pub fn stripe_id(&self) -> &str {
        match self {
            ChargeEvent::Inserted { stripe_id, .. } | ChargeEvent::StatusChanged { stripe_id, .. } => {
                stripe_id
            }
        }
    }
}

/// Port for publishing charge events.
///
/// Delivery is at-most-once: there is no outbox, so an event lost between
/// commit and publish is not replayed.
#[async_trait]
pub trait ChargeEventPublisher: Send + Sync {
    /// # Errors
    ///
    /// - `QueueError` if the event could not be handed to the transport
    async fn publish(&self, event: ChargeEvent) -> Result<(), DomainError>;
}
