//! In-memory user billing profiles.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{DomainError, ErrorCode, UserId};
use crate::ports::{BillingUser, UserRepository};

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, BillingUser>>,
    group_writes: AtomicUsize,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a user.
    pub async fn insert(&self, user: BillingUser) {
        self.users.write().await.insert(user.id.clone(), user);
    }

    pub async fn get(&self, id: &UserId) -> Option<BillingUser> {
        self.users.read().await.get(id).cloned()
    }

    /// Number of `update_groups` calls so far.
    pub fn group_writes(&self) -> usize {
        self.group_writes.load(Ordering::SeqCst)
    }
}

fn not_found(id: &UserId) -> DomainError {
    DomainError::new(ErrorCode::UserNotFound, "user not found").with_detail("user_id", id.to_string())
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<BillingUser>, DomainError> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn set_external_customer_id(
        &self,
        id: &UserId,
        customer_id: &str,
    ) -> Result<String, DomainError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(id).ok_or_else(|| not_found(id))?;
        let stored = user
            .external_customer_id
            .get_or_insert_with(|| customer_id.to_string());
        Ok(stored.clone())
    }

    async fn update_groups(&self, id: &UserId, groups: &BTreeSet<String>) -> Result<(), DomainError> {
        let mut users = self.users.write().await;
        let user = users.get_mut(id).ok_or_else(|| not_found(id))?;
        user.groups = groups.clone();
        self.group_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
