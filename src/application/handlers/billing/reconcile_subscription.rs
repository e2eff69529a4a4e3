//! Reconciler - maps remote subscription snapshots onto local charge records.
//!
//! Every path ends the same way: the charge record is written first, then
//! the entitlement groups of the record's owner are brought in line with the
//! stored status. Remote lookups happen before any local write.
//!
//! ## Paths
//!
//! - `reconcile` - insert on first sighting, update afterwards; a lost insert
//!   race converges through the update path
//! - `insert` - first sighting only; a lost race is reported as a duplicate
//! - `cancel` - deletion snapshot with the status forced to `canceled`
//! - `expire` - stored snapshot with the status forced to `expired`
//!
//! Inserts and status transitions are published as [`ChargeEvent`]s once the
//! record is stored, when a publisher is attached.

use std::sync::Arc;

use crate::domain::billing::{
    Association, BillingError, ChargeRecord, ChargeStatus, NewChargeContext, SubscriptionSnapshot,
};
use crate::domain::foundation::{ChargeId, Timestamp, UserId};
use crate::ports::{
    AssociationQueue, AssociationTask, BillingProvider, ChargeEvent, ChargeEventPublisher,
    ChargeRepository, SaveResult, UserRepository,
};

use super::apply_entitlement::EntitlementResolver;

/// A snapshot to reconcile, plus the inputs only a first sighting needs.
#[derive(Debug, Clone)]
pub struct ReconcileCommand {
    pub snapshot: SubscriptionSnapshot,
    pub user_id: UserId,
    pub association: Option<Association>,
    pub product_key: Option<String>,
}

impl ReconcileCommand {
    pub fn new(snapshot: SubscriptionSnapshot, user_id: UserId) -> Self {
        Self {
            snapshot,
            user_id,
            association: None,
            product_key: None,
        }
    }

    pub fn with_association(mut self, association: Option<Association>) -> Self {
        self.association = association;
        self
    }

    pub fn with_product_key(mut self, product_key: Option<String>) -> Self {
        self.product_key = product_key;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Inserted(ChargeRecord),
    Updated(ChargeRecord),
}

impl ReconcileOutcome {
    pub fn record(&self) -> &ChargeRecord {
        match self {
            ReconcileOutcome::Inserted(record) | ReconcileOutcome::Updated(record) => record,
        }
    }

    pub fn into_record(self) -> ChargeRecord {
        match self {
            ReconcileOutcome::Inserted(record) | ReconcileOutcome::Updated(record) => record,
        }
    }

    pub fn was_inserted(&self) -> bool {
        matches!(self, ReconcileOutcome::Inserted(_))
    }
}

#[derive(Clone)]
pub struct Reconciler {
    charges: Arc<dyn ChargeRepository>,
    provider: Arc<dyn BillingProvider>,
    association_queue: Arc<dyn AssociationQueue>,
    events: Option<Arc<dyn ChargeEventPublisher>>,
    entitlements: EntitlementResolver,
}

impl Reconciler {
    pub fn new(
        charges: Arc<dyn ChargeRepository>,
        users: Arc<dyn UserRepository>,
        provider: Arc<dyn BillingProvider>,
        association_queue: Arc<dyn AssociationQueue>,
    ) -> Self {
        Self {
            charges,
            provider,
            association_queue,
            events: None,
            entitlements: EntitlementResolver::new(users),
        }
    }

    pub fn with_event_publisher(mut self, events: Arc<dyn ChargeEventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Idempotent insert-or-update keyed by `snapshot.id`.
    pub async fn reconcile(&self, cmd: ReconcileCommand) -> Result<ReconcileOutcome, BillingError> {
        if let Some(existing) = self.charges.find_by_stripe_id(&cmd.snapshot.id).await? {
            return self
                .update_existing(existing, &cmd.snapshot)
                .await
                .map(ReconcileOutcome::Updated);
        }

        match self.insert_new(&cmd).await {
            Ok(record) => Ok(ReconcileOutcome::Inserted(record)),
            Err(err) if err.is_duplicate() => {
                tracing::info!(
                    stripe_id = %cmd.snapshot.id,
                    "Concurrent insert won, converging through update"
                );
                let existing = self
                    .charges
                    .find_by_stripe_id(&cmd.snapshot.id)
                    .await?
                    .ok_or_else(|| {
                        BillingError::persistence(format!(
                            "charge {} missing after duplicate insert",
                            cmd.snapshot.id
                        ))
                    })?;
                self.update_existing(existing, &cmd.snapshot)
                    .await
                    .map(ReconcileOutcome::Updated)
            }
            Err(err) => Err(err),
        }
    }

    /// First-sighting insert. Fails with `DuplicateCharge` if the record exists.
    pub async fn insert(&self, cmd: ReconcileCommand) -> Result<ChargeRecord, BillingError> {
        self.insert_new(&cmd).await
    }

    /// Applies a deletion snapshot to `record` as `canceled`.
    pub async fn cancel(
        &self,
        snapshot: SubscriptionSnapshot,
        record: ChargeRecord,
    ) -> Result<ChargeRecord, BillingError> {
        let snapshot = snapshot.with_status(ChargeStatus::Canceled);
        self.apply_update(record, &snapshot).await
    }

    /// Rewrites the stored snapshot of `record` as `expired`.
    pub async fn expire(&self, record: ChargeRecord) -> Result<ChargeRecord, BillingError> {
        let snapshot = record
            .stored_snapshot()
            .map_err(|e| BillingError::validation("data", e.to_string()))?
            .with_status(ChargeStatus::Expired);
        tracing::info!(stripe_id = %record.stripe_id, user_id = %record.user_id, "Expiring lapsed subscription");
        self.apply_update(record, &snapshot).await
    }

    async fn update_existing(
        &self,
        existing: ChargeRecord,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<ChargeRecord, BillingError> {
        if !existing.is_subscription() {
            tracing::warn!(
                stripe_id = %existing.stripe_id,
                charge_type = %existing.charge_type,
                "Stripe id already recorded for a different object type"
            );
            return Err(BillingError::duplicate(&existing.stripe_id));
        }
        self.apply_update(existing, snapshot).await
    }

    async fn apply_update(
        &self,
        mut record: ChargeRecord,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<ChargeRecord, BillingError> {
        let previous = record.status.clone();
        record.apply_snapshot(snapshot, Timestamp::now())?;
        self.charges.update(&record).await?;

        tracing::info!(
            stripe_id = %record.stripe_id,
            user_id = %record.user_id,
            from = %previous,
            to = %record.status,
            "Charge record updated"
        );

        if record.status != previous {
            self.publish(ChargeEvent::status_changed(&record, previous)).await;
        }

        self.entitlements.apply(&record.user_id, &record.status).await?;
        Ok(record)
    }

    async fn insert_new(&self, cmd: &ReconcileCommand) -> Result<ChargeRecord, BillingError> {
        let latest_invoice_ref = self.resolve_invoice_ref(&cmd.snapshot).await?;

        let context = NewChargeContext {
            association: cmd.association.clone(),
            product_key: cmd.product_key.clone(),
            latest_invoice_ref,
        };
        let record =
            ChargeRecord::from_snapshot(&cmd.snapshot, cmd.user_id.clone(), context, Timestamp::now())?;

        if self.charges.insert_if_absent(&record).await? == SaveResult::AlreadyExists {
            return Err(BillingError::duplicate(&record.stripe_id));
        }

        tracing::info!(
            stripe_id = %record.stripe_id,
            user_id = %record.user_id,
            status = %record.status,
            "Charge record inserted"
        );

        if let Some(association) = &record.association {
            self.enqueue_association(association, record.id);
        }
        self.publish(ChargeEvent::inserted(&record)).await;

        self.entitlements.apply(&record.user_id, &record.status).await?;
        Ok(record)
    }

    /// Embedded invoice if expanded, otherwise fetched by id.
    async fn resolve_invoice_ref(
        &self,
        snapshot: &SubscriptionSnapshot,
    ) -> Result<Option<String>, BillingError> {
        let Some(invoice) = &snapshot.latest_invoice else {
            return Ok(None);
        };
        if let Some(reference) = invoice.embedded_reference() {
            return Ok(Some(reference));
        }

        let fetched = self.provider.retrieve_invoice(invoice.id()).await?;
        Ok(Some(fetched.reference()))
    }

    fn enqueue_association(&self, association: &Association, charge_id: ChargeId) {
        let task = AssociationTask::new(association.clone(), charge_id);
        if let Err(err) = self.association_queue.enqueue(task) {
            tracing::warn!(
                association = %association,
                charge_id = %charge_id,
                error = %err,
                "Failed to enqueue association update"
            );
        }
    }

    async fn publish(&self, event: ChargeEvent) {
        let Some(events) = &self.events else {
            return;
        };
        let event_type = event.event_type();
        let stripe_id = event.stripe_id().to_string();
        if let Err(err) = events.publish(event).await {
            tracing::warn!(
                event_type,
                stripe_id = %stripe_id,
                error = %err,
                "Failed to publish charge event"
            );
        }
    }
}
