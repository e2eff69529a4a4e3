//! In-memory associated documents.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::billing::Association;
use crate::domain::foundation::{ChargeId, DomainError, ErrorCode};
use crate::ports::AssociationRepository;

/// Documents keyed by their typed association, each holding its charge ids.
#[derive(Default)]
pub struct InMemoryAssociationRepository {
    documents: RwLock<HashMap<Association, Vec<ChargeId>>>,
}

impl InMemoryAssociationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a document with no charges.
    pub async fn add_document(&self, association: Association) {
        self.documents.write().await.entry(association).or_default();
    }

    pub async fn charges_for(&self, association: &Association) -> Vec<ChargeId> {
        self.documents
            .read()
            .await
            .get(association)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl AssociationRepository for InMemoryAssociationRepository {
    async fn exists(&self, association: &Association) -> Result<bool, DomainError> {
        Ok(self.documents.read().await.contains_key(association))
    }

    async fn append_charge(
        &self,
        association: &Association,
        charge_id: &ChargeId,
    ) -> Result<(), DomainError> {
        let mut documents = self.documents.write().await;
        let charges = documents.get_mut(association).ok_or_else(|| {
            DomainError::new(ErrorCode::AssociationNotFound, "associated document not found")
                .with_detail("association", association.to_string())
        })?;
        if !charges.contains(charge_id) {
            charges.push(*charge_id);
        }
        Ok(())
    }
}
