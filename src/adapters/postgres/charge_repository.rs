//! PostgreSQL implementation of ChargeRepository.
//!
//! `stripe_id` is guarded by the `charges_stripe_id_key` unique constraint;
//! first sightings use `ON CONFLICT DO NOTHING` so concurrent inserts never
//! produce a second row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::billing::{Association, ChargeRecord, ChargeStatus, ChargeType};
use crate::domain::foundation::{ChargeId, DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{ChargeRepository, SaveResult};

const COLUMNS: &str = r#"
    id, stripe_id, charge_type, status, user_id, association_collection,
    association_document, product_key, amount, current_period_start,
    current_period_end, latest_invoice_ref, source, test, charge_url, data,
    created_at, updated_at
"#;

pub struct PostgresChargeRepository {
    pool: PgPool,
}

impl PostgresChargeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of a charge record.
#[derive(Debug, sqlx::FromRow)]
struct ChargeRow {
    id: Uuid,
    stripe_id: String,
    charge_type: String,
    status: String,
    user_id: String,
    association_collection: Option<String>,
    association_document: Option<String>,
    product_key: Option<String>,
    amount: Option<i64>,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    latest_invoice_ref: Option<String>,
    source: String,
    test: bool,
    charge_url: String,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ChargeRow> for ChargeRecord {
    type Error = DomainError;

    fn try_from(row: ChargeRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.user_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
        })?;
        let association = Association::parse_optional(
            row.association_collection.as_deref(),
            row.association_document.as_deref(),
        )
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid association: {}", e))
        })?;

        Ok(ChargeRecord {
            id: ChargeId::from_uuid(row.id),
            stripe_id: row.stripe_id,
            charge_type: ChargeType::parse(&row.charge_type),
            status: ChargeStatus::parse(&row.status),
            user_id,
            association,
            product_key: row.product_key,
            amount: row.amount,
            current_period_start: Timestamp::from_datetime(row.current_period_start),
            current_period_end: Timestamp::from_datetime(row.current_period_end),
            latest_invoice_ref: row.latest_invoice_ref,
            source: row.source,
            test: row.test,
            charge_url: row.charge_url,
            data: row.data,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn association_columns(association: &Option<Association>) -> (Option<&'static str>, Option<&str>) {
    match association {
        Some(a) => (Some(a.collection_name()), Some(a.document_id())),
        None => (None, None),
    }
}

fn database_error(action: &str, e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl ChargeRepository for PostgresChargeRepository {
    async fn insert_if_absent(&self, record: &ChargeRecord) -> Result<SaveResult, DomainError> {
        let (collection, document) = association_columns(&record.association);

        let result = sqlx::query(
            r#"
            INSERT INTO charges (
                id, stripe_id, charge_type, status, user_id, association_collection,
                association_document, product_key, amount, current_period_start,
                current_period_end, latest_invoice_ref, source, test, charge_url, data,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT ON CONSTRAINT charges_stripe_id_key DO NOTHING
            "#,
        )
        .bind(record.id.as_uuid())
        .bind(&record.stripe_id)
        .bind(record.charge_type.as_str())
        .bind(record.status.as_str())
        .bind(record.user_id.as_str())
        .bind(collection)
        .bind(document)
        .bind(&record.product_key)
        .bind(record.amount)
        .bind(record.current_period_start.as_datetime())
        .bind(record.current_period_end.as_datetime())
        .bind(&record.latest_invoice_ref)
        .bind(&record.source)
        .bind(record.test)
        .bind(&record.charge_url)
        .bind(&record.data)
        .bind(record.created_at.as_datetime())
        .bind(record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("insert charge", e))?;

        Ok(if result.rows_affected() == 0 {
            SaveResult::AlreadyExists
        } else {
            SaveResult::Inserted
        })
    }

    async fn find_by_stripe_id(&self, stripe_id: &str) -> Result<Option<ChargeRecord>, DomainError> {
        let row: Option<ChargeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM charges WHERE stripe_id = $1",
            COLUMNS
        ))
        .bind(stripe_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("find charge", e))?;

        row.map(ChargeRecord::try_from).transpose()
    }

    async fn update(&self, record: &ChargeRecord) -> Result<(), DomainError> {
        let result = sqlx::query(
            r#"
            UPDATE charges SET
                status = $2,
                data = $3,
                current_period_start = $4,
                current_period_end = $5,
                charge_url = $6,
                updated_at = $7
            WHERE stripe_id = $1
            "#,
        )
        .bind(&record.stripe_id)
        .bind(record.status.as_str())
        .bind(&record.data)
        .bind(record.current_period_start.as_datetime())
        .bind(record.current_period_end.as_datetime())
        .bind(&record.charge_url)
        .bind(record.updated_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(|e| database_error("update charge", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::new(ErrorCode::ChargeNotFound, "Charge not found")
                .with_detail("stripe_id", record.stripe_id.clone()));
        }

        Ok(())
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
        charge_type: &ChargeType,
        status: &ChargeStatus,
    ) -> Result<Option<ChargeRecord>, DomainError> {
        let row: Option<ChargeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {}
            FROM charges
            WHERE user_id = $1 AND charge_type = $2 AND status = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(charge_type.as_str())
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| database_error("find latest charge", e))?;

        row.map(ChargeRecord::try_from).transpose()
    }
}
