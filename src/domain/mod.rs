//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, timestamps, errors)
//! - `billing` - Charge records, entitlement rules and webhook verification

pub mod billing;
pub mod foundation;
