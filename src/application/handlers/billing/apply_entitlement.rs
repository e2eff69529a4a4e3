//! EntitlementResolver - applies a charge status to the owner's groups.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::billing::{entitlement_for, resolve_groups, BillingError, ChargeStatus};
use crate::domain::foundation::UserId;
use crate::ports::UserRepository;

/// What applying an entitlement did to the user record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementChange {
    /// Groups already matched; nothing was written.
    Unchanged,
    Updated { groups: BTreeSet<String> },
}

/// Sole writer of the `paidMembers` / `trialMembers` groups.
#[derive(Clone)]
pub struct EntitlementResolver {
    users: Arc<dyn UserRepository>,
}

impl EntitlementResolver {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }

    pub async fn apply(
        &self,
        user_id: &UserId,
        status: &ChargeStatus,
    ) -> Result<EntitlementChange, BillingError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| BillingError::UserNotFound(user_id.clone()))?;

        let desired = resolve_groups(&user.groups, entitlement_for(status));
        if desired == user.groups {
            tracing::debug!(user_id = %user_id, status = %status, "Entitlement groups unchanged");
            return Ok(EntitlementChange::Unchanged);
        }

        self.users.update_groups(user_id, &desired).await?;
        tracing::info!(
            user_id = %user_id,
            status = %status,
            groups = ?desired,
            "Entitlement groups updated"
        );

        Ok(EntitlementChange::Updated { groups: desired })
    }
}
