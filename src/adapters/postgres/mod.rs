//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresChargeRepository` - Charge records with atomic first insert
//! - `PostgresUserRepository` - Billing profiles and entitlement groups
//! - `PostgresAssociationRepository` - Users and products that charges link to
//!
//! The schema lives in `migrations/` and is applied with `sqlx::migrate!`.

mod association_repository;
mod charge_repository;
mod user_repository;

pub use association_repository::PostgresAssociationRepository;
pub use charge_repository::PostgresChargeRepository;
pub use user_repository::PostgresUserRepository;
