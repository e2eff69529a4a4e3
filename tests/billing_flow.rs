//! End-to-end billing flows over the in-memory stores and the mock provider.
//!
//! These tests drive the public API the way the HTTP layer does:
//! 1. Commands create and cancel subscriptions
//! 2. Signed webhooks reconcile remote state
//! 3. The entitlement check expires lapsed subscriptions

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;

use subscription_sync::adapters::events::BroadcastChargeEventPublisher;
use subscription_sync::adapters::http::{billing_router, BillingAppState};
use subscription_sync::adapters::memory::{
    InMemoryAssociationRepository, InMemoryChargeRepository, InMemoryUserRepository,
};
use subscription_sync::adapters::stripe::MockBillingProvider;
use subscription_sync::adapters::tasks::{
    AssociationSyncWorker, AssociationSyncWorkerConfig, ChannelAssociationQueue,
};
use subscription_sync::application::{
    CancelSubscriptionCommand, CancelSubscriptionHandler, CancelSubscriptionResult,
    CreateSubscriptionCommand, CreateSubscriptionHandler, EntitlementQuery,
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, HandleBillingWebhookResult,
    IsEntitledHandler, IsEntitledQuery, ProductRef, ReconcileCommand, Reconciler,
};
use subscription_sync::domain::billing::{
    signature_header, Association, ChargeStatus, StripeWebhookVerifier, SubscriptionSnapshot,
};
use subscription_sync::domain::foundation::{Timestamp, UserId};
use subscription_sync::ports::{AssociationTask, BillingUser, ChargeEvent, ChargeRepository};

const SECRET: &str = "whsec_integration";
const PAID: &str = "paidMembers";
const TRIAL: &str = "trialMembers";

// =============================================================================
// Test Infrastructure
// =============================================================================

struct World {
    charges: Arc<InMemoryChargeRepository>,
    users: Arc<InMemoryUserRepository>,
    associations: Arc<InMemoryAssociationRepository>,
    provider: MockBillingProvider,
    queue: ChannelAssociationQueue,
    tasks: Option<tokio::sync::mpsc::UnboundedReceiver<AssociationTask>>,
    events: BroadcastChargeEventPublisher,
    verifier: Arc<StripeWebhookVerifier>,
}

impl World {
    async fn new() -> Self {
        let users = Arc::new(InMemoryUserRepository::new());
        users
            .insert(BillingUser::new(user_id(), "member@example.com").with_customer_id("cus_1"))
            .await;
        let (queue, tasks) = ChannelAssociationQueue::new();

        Self {
            charges: Arc::new(InMemoryChargeRepository::new()),
            users,
            associations: Arc::new(InMemoryAssociationRepository::new()),
            provider: MockBillingProvider::new(),
            queue,
            tasks: Some(tasks),
            events: BroadcastChargeEventPublisher::new(),
            verifier: Arc::new(StripeWebhookVerifier::new(SecretString::new(
                SECRET.to_string(),
            ))),
        }
    }

    fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            self.charges.clone(),
            self.users.clone(),
            Arc::new(self.provider.clone()),
            Arc::new(self.queue.clone()),
        )
        .with_event_publisher(Arc::new(self.events.clone()))
    }

    fn create_handler(&self) -> CreateSubscriptionHandler {
        CreateSubscriptionHandler::new(Arc::new(self.provider.clone()), self.reconciler())
    }

    fn cancel_handler(&self) -> CancelSubscriptionHandler {
        CancelSubscriptionHandler::new(
            self.users.clone(),
            self.charges.clone(),
            Arc::new(self.provider.clone()),
            self.reconciler(),
        )
    }

    fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            self.verifier.clone(),
            Arc::new(self.provider.clone()),
            self.charges.clone(),
            self.associations.clone(),
            self.reconciler(),
        )
    }

    fn entitlement_handler(&self) -> IsEntitledHandler {
        IsEntitledHandler::new(
            EntitlementQuery::new(self.charges.clone(), self.users.clone()),
            self.reconciler(),
        )
    }

    fn app(&self) -> axum::Router {
        billing_router().with_state(BillingAppState {
            charges: self.charges.clone(),
            users: self.users.clone(),
            associations: self.associations.clone(),
            provider: Arc::new(self.provider.clone()),
            association_queue: Arc::new(self.queue.clone()),
            charge_events: Arc::new(self.events.clone()),
            webhook_verifier: self.verifier.clone(),
        })
    }

    async fn groups(&self) -> Vec<String> {
        self.users
            .get(&user_id())
            .await
            .map(|u| u.groups.into_iter().collect())
            .unwrap_or_default()
    }

    async fn is_entitled(&self) -> bool {
        self.entitlement_handler()
            .handle(IsEntitledQuery {
                user_id: Some(user_id()),
            })
            .await
            .unwrap()
    }
}

fn user_id() -> UserId {
    UserId::new("member-1").unwrap()
}

fn create_command(association: Option<Association>) -> CreateSubscriptionCommand {
    CreateSubscriptionCommand {
        user_id: user_id(),
        customer_id: "cus_1".to_string(),
        payment_method_id: "pm_card_visa".to_string(),
        product: ProductRef {
            product_key: "premium".to_string(),
            price_id: "price_premium".to_string(),
        },
        association,
    }
}

/// Stripe-shaped subscription owned by `member-1`.
fn subscription_json(id: &str, status: &str, period_end: Timestamp) -> Value {
    json!({
        "id": id,
        "object": "subscription",
        "status": status,
        "customer": "cus_1",
        "current_period_start": period_end.minus_days(30).as_unix_secs(),
        "current_period_end": period_end.as_unix_secs(),
        "livemode": false,
        "metadata": { "userId": "member-1", "productKey": "premium" },
        "plan": { "id": "price_premium", "amount": 1500 },
        "latest_invoice": {
            "id": format!("in_{}", id),
            "invoice_pdf": format!("https://pay.stripe.com/invoice/in_{}/pdf", id)
        },
        "canceled_at": null
    })
}

fn snapshot(id: &str, status: &str, period_end: Timestamp) -> SubscriptionSnapshot {
    SubscriptionSnapshot::from_value(subscription_json(id, status, period_end)).unwrap()
}

fn invoice_paid(subscription_id: &str) -> Value {
    json!({
        "id": format!("evt_paid_{}", subscription_id),
        "type": "invoice.paid",
        "created": Timestamp::now().as_unix_secs(),
        "livemode": false,
        "data": { "object": { "id": format!("in_{}", subscription_id), "subscription": subscription_id } }
    })
}

fn signed(event: Value) -> HandleBillingWebhookCommand {
    let payload = event.to_string().into_bytes();
    let signature = signature_header(SECRET, Timestamp::now().as_unix_secs(), &payload).unwrap();
    HandleBillingWebhookCommand { payload, signature }
}

// =============================================================================
// Reconcile
// =============================================================================

#[tokio::test]
async fn reconciling_the_same_snapshot_twice_is_idempotent() {
    let world = World::new().await;
    let reconciler = world.reconciler();
    let snap = snapshot("sub_idem", "active", Timestamp::now().add_days(20));

    let first = reconciler
        .reconcile(ReconcileCommand::new(snap.clone(), user_id()))
        .await
        .unwrap();
    let groups_after_first = world.groups().await;
    let second = reconciler
        .reconcile(ReconcileCommand::new(snap, user_id()))
        .await
        .unwrap();

    assert!(first.was_inserted());
    assert!(!second.was_inserted());
    assert_eq!(world.charges.count().await, 1);
    assert_eq!(world.groups().await, groups_after_first);
    assert_eq!(first.record().id, second.record().id);
}

#[tokio::test]
async fn concurrent_first_sightings_store_one_record() {
    let world = World::new().await;
    let snap = snapshot("sub_race", "active", Timestamp::now().add_days(20));
    let a = world.reconciler();
    let b = world.reconciler();

    let (left, right) = futures::join!(
        a.reconcile(ReconcileCommand::new(snap.clone(), user_id())),
        b.reconcile(ReconcileCommand::new(snap.clone(), user_id())),
    );

    let left = left.unwrap();
    let right = right.unwrap();
    assert_eq!(world.charges.count().await, 1);
    assert_eq!(left.record().id, right.record().id);
    assert!(left.was_inserted() ^ right.was_inserted());
    assert_eq!(world.groups().await, vec![PAID.to_string()]);
}

// =============================================================================
// Commands
// =============================================================================

#[tokio::test]
async fn new_trialing_subscription_grants_trial_access() {
    let world = World::new().await;
    world.provider.set_next_subscription_status("trialing");

    let result = world
        .create_handler()
        .handle(create_command(None))
        .await
        .unwrap();

    assert_eq!(result.subscription["status"], "trialing");
    let stripe_id = result.subscription["id"].as_str().unwrap();
    let record = world.charges.find_by_stripe_id(stripe_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChargeStatus::Trialing);
    assert_eq!(world.groups().await, vec![TRIAL.to_string()]);
}

#[tokio::test]
async fn webhook_after_api_response_activates_subscription() {
    let world = World::new().await;
    world.provider.set_next_subscription_status("incomplete");

    // 1. The API response records the incomplete subscription
    let result = world
        .create_handler()
        .handle(create_command(None))
        .await
        .unwrap();
    let stripe_id = result.subscription["id"].as_str().unwrap().to_string();
    assert!(world.groups().await.is_empty());

    // 2. Payment settles and Stripe delivers invoice.paid
    world.provider.set_subscription_status(&stripe_id, "active");
    let outcome = world
        .webhook_handler()
        .handle(signed(invoice_paid(&stripe_id)))
        .await
        .unwrap();

    assert!(matches!(outcome, HandleBillingWebhookResult::Reconciled(ref o) if !o.was_inserted()));
    let record = world.charges.find_by_stripe_id(&stripe_id).await.unwrap().unwrap();
    assert_eq!(record.status, ChargeStatus::Active);
    assert_eq!(world.charges.count().await, 1);
    assert_eq!(world.groups().await, vec![PAID.to_string()]);
}

#[tokio::test]
async fn associated_product_is_linked_by_the_worker() {
    let mut world = World::new().await;
    let product = Association::Product("prod_course".to_string());
    world.associations.add_document(product.clone()).await;

    let tasks = world.tasks.take().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = AssociationSyncWorker::with_config(
        world.associations.clone(),
        AssociationSyncWorkerConfig::default().with_retry_delay(std::time::Duration::ZERO),
    );
    let handle = tokio::spawn(async move { worker.run(tasks, shutdown_rx).await });

    let result = world
        .create_handler()
        .handle(create_command(Some(product.clone())))
        .await
        .unwrap();
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let charge = result.charge.unwrap();
    assert_eq!(charge.association, Some(product.clone()));
    assert_eq!(world.associations.charges_for(&product).await, vec![charge.id]);
}

#[tokio::test]
async fn cancel_without_active_subscription_makes_no_remote_call() {
    let world = World::new().await;
    world
        .reconciler()
        .reconcile(ReconcileCommand::new(
            snapshot("sub_past", "past_due", Timestamp::now().add_days(3)),
            user_id(),
        ))
        .await
        .unwrap();

    let result = world
        .cancel_handler()
        .handle(CancelSubscriptionCommand { user_id: user_id() })
        .await
        .unwrap();

    assert!(matches!(result, CancelSubscriptionResult::NothingToCancel));
    assert!(!world.provider.was_called("delete_subscription"));
}

#[tokio::test]
async fn canceled_subscription_keeps_access_until_period_lapses() {
    let world = World::new().await;
    let period_end = Timestamp::now().add_days(10);
    world
        .provider
        .add_subscription(subscription_json("sub_cancel", "active", period_end));
    world
        .reconciler()
        .reconcile(ReconcileCommand::new(
            snapshot("sub_cancel", "active", period_end),
            user_id(),
        ))
        .await
        .unwrap();

    let result = world
        .cancel_handler()
        .handle(CancelSubscriptionCommand { user_id: user_id() })
        .await
        .unwrap();

    assert!(matches!(result, CancelSubscriptionResult::Canceled { .. }));
    let record = world.charges.find_by_stripe_id("sub_cancel").await.unwrap().unwrap();
    assert_eq!(record.status, ChargeStatus::Canceled);
    assert!(world.is_entitled().await);
}

// =============================================================================
// Entitlement expiry
// =============================================================================

async fn seed_canceled(world: &World, period_end: Timestamp) {
    let reconciler = world.reconciler();
    reconciler
        .reconcile(ReconcileCommand::new(
            snapshot("sub_grace", "active", period_end),
            user_id(),
        ))
        .await
        .unwrap();
    reconciler
        .reconcile(ReconcileCommand::new(
            snapshot("sub_grace", "canceled", period_end),
            user_id(),
        ))
        .await
        .unwrap();
}

#[tokio::test]
async fn canceled_within_grace_day_is_still_entitled() {
    let world = World::new().await;
    let half_day_ago = Timestamp::from_unix_secs(Timestamp::now().as_unix_secs() - 12 * 3600)
        .unwrap();
    seed_canceled(&world, half_day_ago).await;

    assert!(world.is_entitled().await);
    let record = world.charges.find_by_stripe_id("sub_grace").await.unwrap().unwrap();
    assert_eq!(record.status, ChargeStatus::Canceled);
}

#[tokio::test]
async fn canceled_past_grace_day_is_expired_and_revoked() {
    let world = World::new().await;
    seed_canceled(&world, Timestamp::now().minus_days(2)).await;

    assert!(!world.is_entitled().await);
    let record = world.charges.find_by_stripe_id("sub_grace").await.unwrap().unwrap();
    assert_eq!(record.status, ChargeStatus::Expired);
    assert_eq!(record.data["status"], "expired");
    assert!(world.groups().await.is_empty());
}

// =============================================================================
// HTTP
// =============================================================================

#[tokio::test]
async fn unrecognized_webhook_is_400_with_no_mutation() {
    let world = World::new().await;
    let command = signed(json!({
        "id": "evt_refund",
        "type": "charge.refunded",
        "created": Timestamp::now().as_unix_secs(),
        "data": { "object": { "id": "ch_1" } }
    }));

    let response = world
        .app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("Stripe-Signature", command.signature)
                .body(Body::from(command.payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(world.charges.count().await, 0);
    assert!(world.groups().await.is_empty());
    assert!(world.provider.calls().is_empty());
}

#[tokio::test]
async fn signed_invoice_webhook_is_acknowledged_with_empty_body() {
    let world = World::new().await;
    world.provider.add_subscription(subscription_json(
        "sub_hook",
        "active",
        Timestamp::now().add_days(25),
    ));
    let command = signed(invoice_paid("sub_hook"));

    let response = world
        .app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("Stripe-Signature", command.signature)
                .body(Body::from(command.payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());
    assert!(world.charges.find_by_stripe_id("sub_hook").await.unwrap().is_some());
    assert_eq!(world.groups().await, vec![PAID.to_string()]);
}

#[tokio::test]
async fn webhooks_publish_charge_events_after_each_write() {
    let world = World::new().await;
    let mut events = world.events.subscribe();
    world.provider.add_subscription(subscription_json(
        "sub_events",
        "active",
        Timestamp::now().add_days(25),
    ));

    // 1. First sighting
    let paid = signed(invoice_paid("sub_events"));
    let response = world
        .app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("Stripe-Signature", paid.signature)
                .body(Body::from(paid.payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let inserted = events.try_recv().unwrap();
    assert!(matches!(
        inserted,
        ChargeEvent::Inserted { ref stripe_id, status: ChargeStatus::Active, .. } if stripe_id == "sub_events"
    ));

    // 2. Stripe deletes the subscription
    world.provider.set_subscription_status("sub_events", "canceled");
    let deleted = signed(json!({
        "id": "evt_deleted",
        "type": "customer.subscription.deleted",
        "created": Timestamp::now().as_unix_secs(),
        "data": { "object": { "id": "sub_events", "object": "subscription" } }
    }));
    world.webhook_handler().handle(deleted).await.unwrap();

    let changed = events.try_recv().unwrap();
    assert!(matches!(
        changed,
        ChargeEvent::StatusChanged { from: ChargeStatus::Active, to: ChargeStatus::Canceled, .. }
    ));
    assert!(events.try_recv().is_err());
}
