//! Charge event adapters.

mod broadcast;

pub use broadcast::{BroadcastChargeEventPublisher, ChargeEventLogger, DEFAULT_EVENT_CAPACITY};
