//! ChargeRecord - the local projection of one remote billing object.

use serde_json::Value;

use super::association::Association;
use super::snapshot::SubscriptionSnapshot;
use super::status::{ChargeStatus, ChargeType};
use crate::domain::foundation::{ChargeId, Timestamp, UserId, ValidationError};

/// Days of leeway after `current_period_end` before a subscription counts as lapsed.
pub const EXPIRY_GRACE_DAYS: i64 = 1;

/// Source tag written on every record.
pub const CHARGE_SOURCE: &str = "stripe";

/// Locally persisted view of a Stripe object.
///
/// `stripe_id` is unique across the store. `status` always mirrors
/// `data["status"]`: both are replaced together from a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeRecord {
    pub id: ChargeId,
    pub stripe_id: String,
    pub charge_type: ChargeType,
    pub status: ChargeStatus,
    pub user_id: UserId,
    pub association: Option<Association>,
    pub product_key: Option<String>,
    pub amount: Option<i64>,
    pub current_period_start: Timestamp,
    pub current_period_end: Timestamp,
    pub latest_invoice_ref: Option<String>,
    pub source: String,
    pub test: bool,
    pub charge_url: String,
    pub data: Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Inputs for a first-sighting insert that are not part of the snapshot.
#[derive(Debug, Clone, Default)]
pub struct NewChargeContext {
    pub association: Option<Association>,
    pub product_key: Option<String>,
    pub latest_invoice_ref: Option<String>,
}

impl ChargeRecord {
    /// Builds a new record from a snapshot seen for the first time.
    pub fn from_snapshot(
        snapshot: &SubscriptionSnapshot,
        user_id: UserId,
        context: NewChargeContext,
        now: Timestamp,
    ) -> Result<Self, ValidationError> {
        let (start, end) = period_bounds(snapshot)?;

        Ok(Self {
            id: ChargeId::new(),
            stripe_id: snapshot.id.clone(),
            charge_type: snapshot.object.clone(),
            status: snapshot.status.clone(),
            user_id,
            association: context.association,
            product_key: snapshot.product_key(context.product_key.as_deref()),
            amount: snapshot.amount(),
            current_period_start: start,
            current_period_end: end,
            latest_invoice_ref: context.latest_invoice_ref,
            source: CHARGE_SOURCE.to_string(),
            test: !snapshot.livemode,
            charge_url: snapshot.dashboard_url(),
            data: snapshot.raw().clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Overwrites the mutable state with a newer snapshot of the same object.
    ///
    /// Last write wins: the snapshot is a full replacement, never a delta.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &SubscriptionSnapshot,
        now: Timestamp,
    ) -> Result<(), ValidationError> {
        if snapshot.id != self.stripe_id {
            return Err(ValidationError::invalid_format(
                "stripe_id",
                format!("snapshot {} does not match record {}", snapshot.id, self.stripe_id),
            ));
        }

        let (start, end) = period_bounds(snapshot)?;
        self.status = snapshot.status.clone();
        self.data = snapshot.raw().clone();
        self.current_period_start = start;
        self.current_period_end = end;
        self.charge_url = snapshot.dashboard_url();
        self.updated_at = now;
        Ok(())
    }

    /// Rebuilds the stored snapshot so it can be fed back through the update path.
    pub fn stored_snapshot(&self) -> Result<SubscriptionSnapshot, serde_json::Error> {
        SubscriptionSnapshot::from_value(self.data.clone())
    }

    pub fn is_subscription(&self) -> bool {
        self.charge_type == ChargeType::Subscription
    }

    /// True once `now - grace` is past the end of the paid period.
    ///
    /// Only active, trialing and canceled records are period bound; every
    /// other status is already non-entitling and never lapses here.
    pub fn has_lapsed(&self, now: Timestamp) -> bool {
        self.status.is_period_bound()
            && now.minus_days(EXPIRY_GRACE_DAYS).is_after(&self.current_period_end)
    }
}

fn period_bounds(snapshot: &SubscriptionSnapshot) -> Result<(Timestamp, Timestamp), ValidationError> {
    let start = Timestamp::from_unix_secs(snapshot.current_period_start).ok_or_else(|| {
        ValidationError::invalid_format("current_period_start", "timestamp out of range")
    })?;
    let end = Timestamp::from_unix_secs(snapshot.current_period_end).ok_or_else(|| {
        ValidationError::invalid_format("current_period_end", "timestamp out of range")
    })?;
    Ok((start, end))
}
