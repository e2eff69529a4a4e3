//! RetrySubscriptionHandler - retries an unpaid invoice with a new card.
//!
//! Only touches Stripe. The webhook for the eventual payment does the local
//! bookkeeping.

use std::sync::Arc;

use crate::domain::billing::{BillingError, InvoiceSnapshot};
use crate::ports::BillingProvider;

use super::create_subscription::payment_error;

#[derive(Debug, Clone)]
pub struct RetrySubscriptionCommand {
    pub customer_id: String,
    pub payment_method_id: String,
    pub invoice_id: String,
}

#[derive(Debug, Clone)]
pub struct RetrySubscriptionResult {
    /// Invoice with its payment intent expanded.
    pub invoice: InvoiceSnapshot,
}

pub struct RetrySubscriptionHandler {
    provider: Arc<dyn BillingProvider>,
}

impl RetrySubscriptionHandler {
    pub fn new(provider: Arc<dyn BillingProvider>) -> Self {
        Self { provider }
    }

    pub async fn handle(
        &self,
        cmd: RetrySubscriptionCommand,
    ) -> Result<RetrySubscriptionResult, BillingError> {
        if cmd.invoice_id.trim().is_empty() {
            return Err(BillingError::validation("invoiceId", "must not be empty"));
        }

        self.provider
            .attach_payment_method(&cmd.payment_method_id, &cmd.customer_id)
            .await
            .map_err(payment_error)?;
        self.provider
            .set_default_payment_method(&cmd.customer_id, &cmd.payment_method_id)
            .await
            .map_err(payment_error)?;

        let invoice = self.provider.retrieve_invoice(&cmd.invoice_id).await?;
        tracing::info!(
            customer_id = %cmd.customer_id,
            invoice_id = %invoice.id,
            "Payment method replaced for unpaid invoice"
        );

        Ok(RetrySubscriptionResult { invoice })
    }
}
