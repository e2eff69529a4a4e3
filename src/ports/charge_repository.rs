//! Charge record store port.
//!
//! The store is the only local source of truth for billing history. Records
//! are keyed by the Stripe object id, which is unique across the store.

use async_trait::async_trait;

use crate::domain::billing::{ChargeRecord, ChargeStatus, ChargeType};
use crate::domain::foundation::{DomainError, UserId};

/// Result of an insert-if-absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveResult {
    /// First record for this `stripe_id`.
    Inserted,
    /// A record with this `stripe_id` already existed; nothing was written.
    AlreadyExists,
}

#[async_trait]
pub trait ChargeRepository: Send + Sync {
    /// Inserts the record unless one with the same `stripe_id` exists.
    ///
    /// The check and the write are a single atomic step (`ON CONFLICT DO
    /// NOTHING` in Postgres). Two concurrent first sightings of the same
    /// object yield exactly one `Inserted`.
    async fn insert_if_absent(&self, record: &ChargeRecord) -> Result<SaveResult, DomainError>;

    async fn find_by_stripe_id(&self, stripe_id: &str) -> Result<Option<ChargeRecord>, DomainError>;

    /// Replaces the mutable state of an existing record.
    ///
    /// # Errors
    ///
    /// - `ChargeNotFound` if no record has this `stripe_id`
    async fn update(&self, record: &ChargeRecord) -> Result<(), DomainError>;

    /// Most recently created record of a user with the given type and status.
    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
        charge_type: &ChargeType,
        status: &ChargeStatus,
    ) -> Result<Option<ChargeRecord>, DomainError>;
}
