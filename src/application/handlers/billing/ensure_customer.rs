//! EnsureCustomerHandler - returns the user's Stripe customer, creating it once.

use std::sync::Arc;

use crate::domain::billing::BillingError;
use crate::domain::foundation::UserId;
use crate::ports::{BillingProvider, UserRepository};

#[derive(Debug, Clone)]
pub struct EnsureCustomerCommand {
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureCustomerResult {
    pub customer_id: String,
    /// True when this call created the remote customer.
    pub created: bool,
    /// False when the new id could not be stored on the user.
    pub persisted: bool,
}

pub struct EnsureCustomerHandler {
    users: Arc<dyn UserRepository>,
    provider: Arc<dyn BillingProvider>,
}

impl EnsureCustomerHandler {
    pub fn new(users: Arc<dyn UserRepository>, provider: Arc<dyn BillingProvider>) -> Self {
        Self { users, provider }
    }

    pub async fn handle(
        &self,
        cmd: EnsureCustomerCommand,
    ) -> Result<EnsureCustomerResult, BillingError> {
        // 1. Load the user
        let user = self
            .users
            .find_by_id(&cmd.user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(cmd.user_id.clone()))?;

        // 2. Existing customer needs no remote call
        if let Some(customer_id) = user.external_customer_id {
            return Ok(EnsureCustomerResult {
                customer_id,
                created: false,
                persisted: true,
            });
        }

        // 3. Create the remote customer
        let created_id = self.provider.create_customer(&user.email).await?;

        // 4. Store it; a racing writer's value wins
        match self
            .users
            .set_external_customer_id(&cmd.user_id, &created_id)
            .await
        {
            Ok(stored_id) => {
                if stored_id != created_id {
                    tracing::warn!(
                        user_id = %cmd.user_id,
                        created = %created_id,
                        stored = %stored_id,
                        "Customer already set by a concurrent request"
                    );
                } else {
                    tracing::info!(user_id = %cmd.user_id, customer_id = %stored_id, "Stripe customer created");
                }
                Ok(EnsureCustomerResult {
                    customer_id: stored_id,
                    created: true,
                    persisted: true,
                })
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %cmd.user_id,
                    customer_id = %created_id,
                    error = %err,
                    "Stripe customer created but not stored on user"
                );
                Ok(EnsureCustomerResult {
                    customer_id: created_id,
                    created: true,
                    persisted: false,
                })
            }
        }
    }
}
