//! PostgreSQL implementation of UserRepository over `billing_users`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{BillingUser, UserRepository};

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: String,
    email: String,
    external_customer_id: Option<String>,
    groups: Vec<String>,
}

impl TryFrom<UserRow> for BillingUser {
    type Error = DomainError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let id = UserId::new(row.id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user id: {}", e))
        })?;
        Ok(BillingUser {
            id,
            email: row.email,
            external_customer_id: row.external_customer_id,
            groups: row.groups.into_iter().collect(),
        })
    }
}

fn user_not_found(id: &UserId) -> DomainError {
    DomainError::new(ErrorCode::UserNotFound, "User not found").with_detail("user_id", id.as_str())
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<BillingUser>, DomainError> {
        let row: Option<UserRow> = sqlx::query_as(
            r#"
            SELECT id, email, external_customer_id, groups
            FROM billing_users
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to find user: {}", e))
        })?;

        row.map(BillingUser::try_from).transpose()
    }

    async fn set_external_customer_id(
        &self,
        id: &UserId,
        customer_id: &str,
    ) -> Result<String, DomainError> {
        // COALESCE keeps the first value written
        let stored: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE billing_users
            SET external_customer_id = COALESCE(external_customer_id, $2),
                updated_at = now()
            WHERE id = $1
            RETURNING external_customer_id
            "#,
        )
        .bind(id.as_str())
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to set customer id: {}", e))
        })?;

        match stored {
            Some((Some(value),)) => Ok(value),
            Some((None,)) => Err(DomainError::database("customer id not stored")),
            None => Err(user_not_found(id)),
        }
    }

    async fn update_groups(&self, id: &UserId, groups: &BTreeSet<String>) -> Result<(), DomainError> {
        let groups: Vec<&str> = groups.iter().map(String::as_str).collect();

        let result = sqlx::query(
            r#"
            UPDATE billing_users
            SET groups = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(&groups)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Failed to update groups: {}", e))
        })?;

        if result.rows_affected() == 0 {
            return Err(user_not_found(id));
        }
        Ok(())
    }
}
