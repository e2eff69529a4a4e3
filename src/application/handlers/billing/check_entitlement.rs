//! Entitlement check with lapse detection.
//!
//! `EntitlementQuery` only reads. `IsEntitledHandler` performs the expiry
//! write when the query reports a lapsed subscription.

use std::sync::Arc;

use crate::domain::billing::{grants_access, BillingError, ChargeRecord, ChargeStatus, ChargeType};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{ChargeRepository, UserRepository};

use super::reconcile_subscription::Reconciler;

#[derive(Debug, Clone, PartialEq)]
pub enum EntitlementStatus {
    Entitled,
    NotEntitled,
    /// The paid period ended more than the grace period ago.
    Lapsed(ChargeRecord),
}

/// Read-only entitlement evaluation.
#[derive(Clone)]
pub struct EntitlementQuery {
    charges: Arc<dyn ChargeRepository>,
    users: Arc<dyn UserRepository>,
}

impl EntitlementQuery {
    pub fn new(charges: Arc<dyn ChargeRepository>, users: Arc<dyn UserRepository>) -> Self {
        Self { charges, users }
    }

    pub async fn evaluate(
        &self,
        user_id: Option<&UserId>,
        now: Timestamp,
    ) -> Result<EntitlementStatus, BillingError> {
        let Some(user_id) = user_id else {
            return Ok(EntitlementStatus::NotEntitled);
        };

        let Some(record) = self.latest_subscription(user_id).await? else {
            return Ok(EntitlementStatus::NotEntitled);
        };

        if record.has_lapsed(now) {
            return Ok(EntitlementStatus::Lapsed(record));
        }

        let entitled = self
            .users
            .find_by_id(user_id)
            .await?
            .map(|user| grants_access(&user.groups))
            .unwrap_or(false);

        Ok(if entitled {
            EntitlementStatus::Entitled
        } else {
            EntitlementStatus::NotEntitled
        })
    }

    /// Latest active subscription, else latest canceled one.
    async fn latest_subscription(
        &self,
        user_id: &UserId,
    ) -> Result<Option<ChargeRecord>, BillingError> {
        for status in [ChargeStatus::Active, ChargeStatus::Canceled] {
            let found = self
                .charges
                .find_latest_for_user(user_id, &ChargeType::Subscription, &status)
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct IsEntitledQuery {
    pub user_id: Option<UserId>,
}

pub struct IsEntitledHandler {
    query: EntitlementQuery,
    reconciler: Reconciler,
}

impl IsEntitledHandler {
    pub fn new(query: EntitlementQuery, reconciler: Reconciler) -> Self {
        Self { query, reconciler }
    }

    pub async fn handle(&self, query: IsEntitledQuery) -> Result<bool, BillingError> {
        match self
            .query
            .evaluate(query.user_id.as_ref(), Timestamp::now())
            .await?
        {
            EntitlementStatus::Entitled => Ok(true),
            EntitlementStatus::NotEntitled => Ok(false),
            EntitlementStatus::Lapsed(record) => {
                self.reconciler.expire(record).await?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryChargeRepository, InMemoryUserRepository};
    use crate::adapters::stripe::MockBillingProvider;
    use crate::adapters::tasks::ChannelAssociationQueue;
    use crate::domain::billing::{NewChargeContext, SubscriptionSnapshot};
    use crate::ports::BillingUser;

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    struct Harness {
        handler: IsEntitledHandler,
        query: EntitlementQuery,
        charges: Arc<InMemoryChargeRepository>,
        users: Arc<InMemoryUserRepository>,
    }

    fn user_id() -> UserId {
        UserId::new("user-1").unwrap()
    }

    async fn harness(groups: &[&str]) -> Harness {
        let charges = Arc::new(InMemoryChargeRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());
        users
            .insert(BillingUser::new(user_id(), "a@example.com").with_groups(groups.iter().copied()))
            .await;
        let (queue, _tasks) = ChannelAssociationQueue::new();
        let reconciler = Reconciler::new(
            charges.clone(),
            users.clone(),
            Arc::new(MockBillingProvider::new()),
            Arc::new(queue),
        );
        let query = EntitlementQuery::new(charges.clone(), users.clone());

        Harness {
            handler: IsEntitledHandler::new(query.clone(), reconciler),
            query,
            charges,
            users,
        }
    }

    async fn store(h: &Harness, id: &str, status: &str, period_end: Timestamp, created_at: Timestamp) {
        let snapshot = SubscriptionSnapshot::test_fixture(id, status, "user-1", period_end);
        let record =
            ChargeRecord::from_snapshot(&snapshot, user_id(), NewChargeContext::default(), created_at)
                .unwrap();
        h.charges.insert_if_absent(&record).await.unwrap();
    }

    fn query_for_user() -> IsEntitledQuery {
        IsEntitledQuery {
            user_id: Some(user_id()),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Evaluation
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn anonymous_caller_is_not_entitled() {
        let h = harness(&["paidMembers"]).await;
        let result = h.handler.handle(IsEntitledQuery { user_id: None }).await.unwrap();
        assert!(!result);
    }

    #[tokio::test]
    async fn user_without_records_is_not_entitled() {
        let h = harness(&["paidMembers"]).await;
        assert!(!h.handler.handle(query_for_user()).await.unwrap());
    }

    #[tokio::test]
    async fn active_record_in_period_with_paid_group_is_entitled() {
        let h = harness(&["paidMembers"]).await;
        let now = Timestamp::now();
        store(&h, "sub_1", "active", now.add_days(20), now.minus_days(10)).await;

        assert!(h.handler.handle(query_for_user()).await.unwrap());
    }

    #[tokio::test]
    async fn canceled_record_two_days_ahead_is_still_entitled() {
        let h = harness(&["paidMembers"]).await;
        let now = Timestamp::now();
        store(&h, "sub_1", "canceled", now.add_days(2), now.minus_days(28)).await;

        assert!(h.handler.handle(query_for_user()).await.unwrap());
        let stored = h.charges.find_by_stripe_id("sub_1").await.unwrap().unwrap();
        assert_eq!(stored.status, ChargeStatus::Canceled);
    }

    #[tokio::test]
    async fn canceled_record_two_days_past_is_expired_and_revoked() {
        let h = harness(&["paidMembers"]).await;
        let now = Timestamp::now();
        store(&h, "sub_1", "canceled", now.minus_days(2), now.minus_days(32)).await;

        assert!(!h.handler.handle(query_for_user()).await.unwrap());

        let stored = h.charges.find_by_stripe_id("sub_1").await.unwrap().unwrap();
        assert_eq!(stored.status, ChargeStatus::Expired);
        assert_eq!(stored.data["status"], "expired");
        assert!(h.users.get(&user_id()).await.unwrap().groups.is_empty());
    }

    #[tokio::test]
    async fn evaluate_reports_lapse_without_writing() {
        let h = harness(&["trialMembers"]).await;
        let now = Timestamp::now();
        store(&h, "sub_1", "active", now.minus_days(3), now.minus_days(33)).await;

        let status = h.query.evaluate(Some(&user_id()), now).await.unwrap();

        assert!(matches!(status, EntitlementStatus::Lapsed(_)));
        let stored = h.charges.find_by_stripe_id("sub_1").await.unwrap().unwrap();
        assert_eq!(stored.status, ChargeStatus::Active);
        assert_eq!(h.users.group_writes(), 0);
    }

    #[tokio::test]
    async fn active_record_is_preferred_over_newer_canceled_one() {
        let h = harness(&["paidMembers"]).await;
        let now = Timestamp::now();
        store(&h, "sub_old", "active", now.add_days(10), now.minus_days(20)).await;
        store(&h, "sub_new", "canceled", now.minus_days(5), now.minus_days(1)).await;

        assert!(h.handler.handle(query_for_user()).await.unwrap());
    }

    #[tokio::test]
    async fn group_membership_decides_when_not_lapsed() {
        let h = harness(&[]).await;
        let now = Timestamp::now();
        store(&h, "sub_1", "active", now.add_days(10), now.minus_days(20)).await;

        assert!(!h.handler.handle(query_for_user()).await.unwrap());
    }
}
