//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the billing core to external systems:
//! - `stripe` - Remote billing service over Stripe's REST API (plus a mock)
//! - `postgres` - sqlx-backed charge, user and association stores
//! - `memory` - In-memory stores for tests and local runs
//! - `tasks` - Association sync queue and worker
//! - `events` - In-process charge event fan-out
//! - `http` - axum routes for webhooks and the billing commands

pub mod events;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
pub mod tasks;
