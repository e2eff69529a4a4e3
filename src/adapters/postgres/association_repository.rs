//! PostgreSQL implementation of AssociationRepository.
//!
//! Each association variant maps to its own table; both keep the linked
//! charges in a `charge_ids UUID[]` column.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::billing::Association;
use crate::domain::foundation::{ChargeId, DomainError, ErrorCode};
use crate::ports::AssociationRepository;

pub struct PostgresAssociationRepository {
    pool: PgPool,
}

impl PostgresAssociationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Table holding the documents of a variant.
fn table_for(association: &Association) -> &'static str {
    match association {
        Association::User(_) => "billing_users",
        Association::Product(_) => "products",
    }
}

#[async_trait]
impl AssociationRepository for PostgresAssociationRepository {
    async fn exists(&self, association: &Association) -> Result<bool, DomainError> {
        let query = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = $1)",
            table_for(association)
        );

        let (exists,): (bool,) = sqlx::query_as(&query)
            .bind(association.document_id())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to look up {}: {}", association, e),
                )
            })?;

        Ok(exists)
    }

    async fn append_charge(
        &self,
        association: &Association,
        charge_id: &ChargeId,
    ) -> Result<(), DomainError> {
        // Appending an id that is already present is a no-op
        let query = format!(
            r#"
            UPDATE {}
            SET charge_ids = CASE
                WHEN $2 = ANY(charge_ids) THEN charge_ids
                ELSE array_append(charge_ids, $2)
            END
            WHERE id = $1
            "#,
            table_for(association)
        );

        let result = sqlx::query(&query)
            .bind(association.document_id())
            .bind(charge_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DomainError::new(
                    ErrorCode::DatabaseError,
                    format!("Failed to link charge to {}: {}", association, e),
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(
                DomainError::new(ErrorCode::AssociationNotFound, "Associated document not found")
                    .with_detail("association", association.to_string()),
            );
        }
        Ok(())
    }
}
