//! CreateSubscriptionHandler - starts a subscription for a saved card.

use std::sync::Arc;

use serde_json::Value;

use crate::domain::billing::{Association, BillingError, ChargeRecord, SubscriptionMetadata};
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, CreateSubscriptionRequest, ProviderError};

use super::reconcile_subscription::{ReconcileCommand, Reconciler};

/// Product being purchased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRef {
    pub product_key: String,
    /// Stripe price id.
    pub price_id: String,
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionCommand {
    pub user_id: UserId,
    pub customer_id: String,
    pub payment_method_id: String,
    pub product: ProductRef,
    pub association: Option<Association>,
}

impl CreateSubscriptionCommand {
    fn validate(&self) -> Result<(), BillingError> {
        let required = [
            ("customerId", &self.customer_id),
            ("paymentMethodId", &self.payment_method_id),
            ("product.productKey", &self.product.product_key),
            ("product.priceId", &self.product.price_id),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(BillingError::validation(field, "must not be empty"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CreateSubscriptionResult {
    /// Subscription exactly as Stripe returned it, payment intent included.
    pub subscription: Value,
    /// The local record, unless a webhook recorded it first.
    pub charge: Option<ChargeRecord>,
}

pub struct CreateSubscriptionHandler {
    provider: Arc<dyn BillingProvider>,
    reconciler: Reconciler,
}

impl CreateSubscriptionHandler {
    pub fn new(provider: Arc<dyn BillingProvider>, reconciler: Reconciler) -> Self {
        Self {
            provider,
            reconciler,
        }
    }

    pub async fn handle(
        &self,
        cmd: CreateSubscriptionCommand,
    ) -> Result<CreateSubscriptionResult, BillingError> {
        cmd.validate()?;

        // 1. Attach the card and make it the default
        self.provider
            .attach_payment_method(&cmd.payment_method_id, &cmd.customer_id)
            .await
            .map_err(payment_error)?;
        self.provider
            .set_default_payment_method(&cmd.customer_id, &cmd.payment_method_id)
            .await
            .map_err(payment_error)?;

        // 2. Create the subscription
        let metadata = SubscriptionMetadata::new(
            &cmd.user_id,
            &cmd.product.product_key,
            cmd.association.as_ref(),
        );
        let snapshot = self
            .provider
            .create_subscription(CreateSubscriptionRequest {
                customer_id: cmd.customer_id.clone(),
                price_id: cmd.product.price_id.clone(),
                metadata,
                trial_from_plan: true,
            })
            .await
            .map_err(payment_error)?;

        tracing::info!(
            user_id = %cmd.user_id,
            stripe_id = %snapshot.id,
            status = %snapshot.status,
            "Subscription created"
        );

        // 3. Record it locally
        let subscription = snapshot.raw().clone();
        let reconcile = ReconcileCommand::new(snapshot, cmd.user_id.clone())
            .with_association(cmd.association)
            .with_product_key(Some(cmd.product.product_key));

        let charge = match self.reconciler.insert(reconcile).await {
            Ok(record) => Some(record),
            Err(err) if err.is_duplicate() => {
                tracing::info!(user_id = %cmd.user_id, "Subscription already recorded by webhook");
                None
            }
            Err(err) => return Err(err),
        };

        Ok(CreateSubscriptionResult {
            subscription,
            charge,
        })
    }
}

/// Declines carry their reason; anything else is a remote failure.
pub(super) fn payment_error(err: ProviderError) -> BillingError {
    if err.is_card_declined() {
        tracing::info!(reason = %err.decline_reason(), "Card declined");
        BillingError::payment_declined(err.decline_reason())
    } else {
        err.into()
    }
}
