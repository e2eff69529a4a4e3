//! CancelSubscriptionHandler - cancels the current user's live subscription.
//!
//! Cancellation is immediate on Stripe's side. Locally the record moves to
//! `canceled` and access continues until the paid period lapses.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::billing::{BillingError, ChargeRecord, ChargeStatus, ChargeType};
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, ChargeRepository, UserRepository};

use super::reconcile_subscription::Reconciler;

#[derive(Debug, Clone)]
pub struct CancelSubscriptionCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone)]
pub enum CancelSubscriptionResult {
    /// No customer or no active/trialing subscription; Stripe was not called.
    NothingToCancel,
    Canceled {
        subscription: Value,
        charge: ChargeRecord,
    },
}

pub struct CancelSubscriptionHandler {
    users: Arc<dyn UserRepository>,
    charges: Arc<dyn ChargeRepository>,
    provider: Arc<dyn BillingProvider>,
    reconciler: Reconciler,
}

impl CancelSubscriptionHandler {
    pub fn new(
        users: Arc<dyn UserRepository>,
        charges: Arc<dyn ChargeRepository>,
        provider: Arc<dyn BillingProvider>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            users,
            charges,
            provider,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: CancelSubscriptionCommand,
    ) -> Result<CancelSubscriptionResult, BillingError> {
        // 1. Users that never became customers have nothing to cancel
        let user = self
            .users
            .find_by_id(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(cmd.user_id.clone()))?;
        if user.external_customer_id.is_none() {
            return Ok(CancelSubscriptionResult::NothingToCancel);
        }

        // 2. Most recent live subscription
        let Some(record) = latest_live_subscription(self.charges.as_ref(), &cmd.user_id).await?
        else {
            tracing::info!(user_id = %cmd.user_id, "No active subscription to cancel");
            return Ok(CancelSubscriptionResult::NothingToCancel);
        };

        // 3. Cancel remotely
        let deleted = self
            .provider
            .delete_subscription(&record.stripe_id)
            .await
            .map_err(|e| {
                tracing::error!(stripe_id = %record.stripe_id, error = %e, "Stripe cancellation failed");
                BillingError::cancellation(e.to_string())
            })?;
        if deleted.canceled_at.is_none() {
            return Err(BillingError::cancellation(format!(
                "subscription {} was not canceled",
                record.stripe_id
            )));
        }

        // 4. Record the cancellation
        let subscription = deleted.raw().clone();
        let charge = self.reconciler.cancel(deleted, record).await?;
        tracing::info!(user_id = %cmd.user_id, stripe_id = %charge.stripe_id, "Subscription canceled");

        Ok(CancelSubscriptionResult::Canceled {
            subscription,
            charge,
        })
    }
}

/// Latest `active` subscription record, else latest `trialing` one.
async fn latest_live_subscription(
    charges: &dyn ChargeRepository,
    user_id: &UserId,
) -> Result<Option<ChargeRecord>, BillingError> {
    for status in [ChargeStatus::Active, ChargeStatus::Trialing] {
        let found = charges
            .find_latest_for_user(user_id, &ChargeType::Subscription, &status)
            .await?;
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}
