//! Associated document port.
//!
//! Each [`Association`] variant resolves to its own table; implementations
//! match on the variant rather than interpolating a collection name.

use async_trait::async_trait;

use crate::domain::billing::Association;
use crate::domain::foundation::{ChargeId, DomainError};

#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Whether the associated document exists.
    async fn exists(&self, association: &Association) -> Result<bool, DomainError>;

    /// Appends a charge id to the document's charge list.
    ///
    /// Appending an id already present is a no-op.
    ///
    /// # Errors
    ///
    /// - `AssociationNotFound` if the document does not exist
    async fn append_charge(
        &self,
        association: &Association,
        charge_id: &ChargeId,
    ) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn association_repository_is_object_safe() {
        fn _accepts_dyn(_repo: &dyn AssociationRepository) {}
    }
}
