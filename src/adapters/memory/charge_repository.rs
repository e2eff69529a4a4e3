//! In-memory charge record store.
//!
//! Backs local runs and tests. The uniqueness check and the push happen under
//! one write lock, so concurrent first sightings of an object produce one row.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::{ChargeRecord, ChargeStatus, ChargeType};
use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{ChargeRepository, SaveResult};

#[derive(Default)]
pub struct InMemoryChargeRepository {
    records: RwLock<Vec<ChargeRecord>>,
}

impl InMemoryChargeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // === Test Helpers ===

    pub async fn all(&self) -> Vec<ChargeRecord> {
        self.records.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ChargeRepository for InMemoryChargeRepository {
    async fn insert_if_absent(&self, record: &ChargeRecord) -> Result<SaveResult, DomainError> {
        let mut records = self.records.write().await;
        if records.iter().any(|r| r.stripe_id == record.stripe_id) {
            return Ok(SaveResult::AlreadyExists);
        }
        records.push(record.clone());
        Ok(SaveResult::Inserted)
    }

    async fn find_by_stripe_id(&self, stripe_id: &str) -> Result<Option<ChargeRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.stripe_id == stripe_id).cloned())
    }

    async fn update(&self, record: &ChargeRecord) -> Result<(), DomainError> {
        let mut records = self.records.write().await;
        let existing = records
            .iter_mut()
            .find(|r| r.stripe_id == record.stripe_id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::ChargeNotFound, "charge record not found")
                    .with_detail("stripe_id", record.stripe_id.clone())
            })?;

        // Identity and creation time are fixed at insert.
        let id = existing.id;
        let created_at = existing.created_at;
        *existing = record.clone();
        existing.id = id;
        existing.created_at = created_at;
        Ok(())
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
        charge_type: &ChargeType,
        status: &ChargeStatus,
    ) -> Result<Option<ChargeRecord>, DomainError> {
        let records = self.records.read().await;
        // Later inserts win ties on created_at.
        let latest = records
            .iter()
            .enumerate()
            .filter(|(_, r)| &r.user_id == user_id && &r.charge_type == charge_type && &r.status == status)
            .max_by_key(|(index, r)| (r.created_at, *index))
            .map(|(_, r)| r.clone());
        Ok(latest)
    }
}
