//! In-memory storage adapters for tests and local runs.

mod association_repository;
mod charge_repository;
mod user_repository;

pub use association_repository::InMemoryAssociationRepository;
pub use charge_repository::InMemoryChargeRepository;
pub use user_repository::InMemoryUserRepository;
