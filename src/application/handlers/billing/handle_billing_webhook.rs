//! HandleBillingWebhookHandler - verifies Stripe deliveries and reconciles them.
//!
//! Every branch re-fetches the subscription from Stripe instead of trusting
//! the event payload, so replays and out-of-order deliveries converge on
//! the current remote state.

use std::sync::Arc;

use crate::domain::billing::{
    BillingError, BillingEventType, ChargeStatus, StripeEvent, StripeWebhookVerifier,
};
use crate::ports::{AssociationRepository, BillingProvider, ChargeRepository};

use super::reconcile_subscription::{ReconcileCommand, ReconcileOutcome, Reconciler};

#[derive(Debug, Clone)]
pub struct HandleBillingWebhookCommand {
    /// Raw request body, exactly as signed.
    pub payload: Vec<u8>,
    /// `Stripe-Signature` header value.
    pub signature: String,
}

#[derive(Debug, Clone)]
pub enum HandleBillingWebhookResult {
    Reconciled(ReconcileOutcome),
    Canceled { stripe_id: String },
    /// Acknowledged without changes.
    Skipped { reason: String },
}

impl HandleBillingWebhookResult {
    fn skipped(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Webhook skipped");
        HandleBillingWebhookResult::Skipped { reason }
    }
}

pub struct HandleBillingWebhookHandler {
    verifier: Arc<StripeWebhookVerifier>,
    provider: Arc<dyn BillingProvider>,
    charges: Arc<dyn ChargeRepository>,
    associations: Arc<dyn AssociationRepository>,
    reconciler: Reconciler,
}

impl HandleBillingWebhookHandler {
    pub fn new(
        verifier: Arc<StripeWebhookVerifier>,
        provider: Arc<dyn BillingProvider>,
        charges: Arc<dyn ChargeRepository>,
        associations: Arc<dyn AssociationRepository>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            verifier,
            provider,
            charges,
            associations,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: HandleBillingWebhookCommand,
    ) -> Result<HandleBillingWebhookResult, BillingError> {
        let event = self
            .verifier
            .verify_and_parse(&cmd.payload, &cmd.signature)
            .map_err(|e| {
                tracing::warn!(error = %e, "Webhook verification failed");
                BillingError::from(e)
            })?;

        self.process(&event).await
    }

    /// Dispatches an already verified event.
    pub async fn process(
        &self,
        event: &StripeEvent,
    ) -> Result<HandleBillingWebhookResult, BillingError> {
        tracing::info!(event_id = %event.id, event_type = %event.event_type, "Processing webhook");

        match event.parsed_type() {
            t if t.is_invoice_event() => self.handle_invoice_event(event).await,
            BillingEventType::SubscriptionDeleted => self.handle_subscription_deleted(event).await,
            other => {
                tracing::warn!(event_id = %event.id, event_type = %other.as_str(), "Unrecognized webhook type");
                Err(BillingError::UnrecognizedEvent(other.as_str().to_string()))
            }
        }
    }

    async fn handle_invoice_event(
        &self,
        event: &StripeEvent,
    ) -> Result<HandleBillingWebhookResult, BillingError> {
        // 1. Invoices outside subscriptions are not ours
        let Some(subscription_id) = event.subscription_id() else {
            return Ok(HandleBillingWebhookResult::skipped(format!(
                "invoice {} has no subscription",
                event.object_id().unwrap_or("<unknown>")
            )));
        };

        // 2. Current remote state
        let snapshot = self.provider.retrieve_subscription(subscription_id).await?;

        // 3. Owner and association from metadata
        let Some(user_id) = snapshot.metadata.user_id() else {
            return Ok(HandleBillingWebhookResult::skipped(format!(
                "subscription {} has no userId metadata",
                snapshot.id
            )));
        };
        let association = snapshot.metadata.association()?;
        if let Some(association) = &association {
            if !self.associations.exists(association).await? {
                return Ok(HandleBillingWebhookResult::skipped(format!(
                    "associated document {} does not exist",
                    association
                )));
            }
        }

        // 4. Reconcile
        let product_key = snapshot.metadata.product_key.clone();
        let cmd = ReconcileCommand::new(snapshot, user_id)
            .with_association(association)
            .with_product_key(product_key);
        let outcome = self.reconciler.reconcile(cmd).await?;

        Ok(HandleBillingWebhookResult::Reconciled(outcome))
    }

    async fn handle_subscription_deleted(
        &self,
        event: &StripeEvent,
    ) -> Result<HandleBillingWebhookResult, BillingError> {
        let subscription_id = event
            .object_id()
            .ok_or_else(|| BillingError::validation("data.object.id", "missing subscription id"))?;

        let snapshot = self.provider.retrieve_subscription(subscription_id).await?;

        let Some(user_id) = snapshot.metadata.user_id() else {
            return Ok(HandleBillingWebhookResult::skipped(format!(
                "subscription {} has no userId metadata",
                snapshot.id
            )));
        };

        // The deleted subscription's own record, not the user's latest one
        let Some(record) = self.charges.find_by_stripe_id(&snapshot.id).await? else {
            return Ok(HandleBillingWebhookResult::skipped(format!(
                "subscription {} has no local record",
                snapshot.id
            )));
        };
        if !record.is_subscription() || record.user_id != user_id {
            return Ok(HandleBillingWebhookResult::skipped(format!(
                "record {} is not a subscription of user {}",
                record.stripe_id, user_id
            )));
        }
        if !matches!(record.status, ChargeStatus::Active | ChargeStatus::Trialing) {
            return Ok(HandleBillingWebhookResult::skipped(format!(
                "subscription {} is already {}",
                record.stripe_id, record.status
            )));
        }

        let charge = self.reconciler.cancel(snapshot, record).await?;
        Ok(HandleBillingWebhookResult::Canceled {
            stripe_id: charge.stripe_id,
        })
    }
}
