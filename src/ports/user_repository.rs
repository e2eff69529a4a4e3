//! User billing profile port.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, UserId};

/// The billing-relevant slice of a user document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingUser {
    pub id: UserId,
    pub email: String,
    /// Stripe customer id. Set once, never replaced.
    pub external_customer_id: Option<String>,
    pub groups: BTreeSet<String>,
}

impl BillingUser {
    pub fn new(id: UserId, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            external_customer_id: None,
            groups: BTreeSet::new(),
        }
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.external_customer_id = Some(customer_id.into());
        self
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<BillingUser>, DomainError>;

    /// Stores the customer id if none is set yet.
    ///
    /// Returns the id now on record: `customer_id` if this call set it, the
    /// earlier value if a concurrent call got there first.
    ///
    /// # Errors
    ///
    /// - `UserNotFound` if the user does not exist
    async fn set_external_customer_id(
        &self,
        id: &UserId,
        customer_id: &str,
    ) -> Result<String, DomainError>;

    /// Replaces the user's group set.
    async fn update_groups(&self, id: &UserId, groups: &BTreeSet<String>) -> Result<(), DomainError>;
}
