//! Broadcast charge events - in-process fan-out over a tokio broadcast channel.
//!
//! Every subscriber sees every event published after it subscribed. A slow
//! subscriber that falls more than `capacity` events behind loses the oldest
//! ones and is told how many it missed.

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};

use crate::domain::foundation::DomainError;
use crate::ports::{ChargeEvent, ChargeEventPublisher};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct BroadcastChargeEventPublisher {
    sender: broadcast::Sender<ChargeEvent>,
}

impl BroadcastChargeEventPublisher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChargeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastChargeEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChargeEventPublisher for BroadcastChargeEventPublisher {
    async fn publish(&self, event: ChargeEvent) -> Result<(), DomainError> {
        // No subscribers is not a failure; nobody is listening yet.
        if let Err(broadcast::error::SendError(event)) = self.sender.send(event) {
            tracing::debug!(
                event_type = event.event_type(),
                stripe_id = %event.stripe_id(),
                "No charge event subscribers"
            );
        }
        Ok(())
    }
}

/// Subscriber that writes every charge event to the log.
pub struct ChargeEventLogger;

impl ChargeEventLogger {
    /// Logs events until shutdown is signalled or the publisher is dropped.
    pub async fn run(
        mut events: broadcast::Receiver<ChargeEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("charge event logger stopped");
                        return;
                    }
                }

                next = events.recv() => {
                    match next {
                        Ok(event) => log_event(&event),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "charge event logger lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!("charge event publisher closed");
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn log_event(event: &ChargeEvent) {
    match event {
        ChargeEvent::Inserted {
            charge_id,
            stripe_id,
            user_id,
            status,
            ..
        } => tracing::info!(
            event_type = event.event_type(),
            %charge_id,
            %stripe_id,
            %user_id,
            %status,
            "charge event"
        ),
        ChargeEvent::StatusChanged {
            charge_id,
            stripe_id,
            user_id,
            from,
            to,
        } => tracing::info!(
            event_type = event.event_type(),
            %charge_id,
            %stripe_id,
            %user_id,
            %from,
            %to,
            "charge event"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::billing::ChargeStatus;
    use crate::domain::foundation::{ChargeId, UserId};

    fn status_changed(stripe_id: &str) -> ChargeEvent {
        ChargeEvent::StatusChanged {
            charge_id: ChargeId::new(),
            stripe_id: stripe_id.to_string(),
            user_id: UserId::new("user-1").unwrap(),
            from: ChargeStatus::Trialing,
            to: ChargeStatus::Active,
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_published_event() {
        let publisher = BroadcastChargeEventPublisher::new();
        let mut first = publisher.subscribe();
        let mut second = publisher.subscribe();

        publisher.publish(status_changed("sub_1")).await.unwrap();

        assert_eq!(first.recv().await.unwrap().stripe_id(), "sub_1");
        assert_eq!(second.recv().await.unwrap().stripe_id(), "sub_1");
    }

    #[tokio::test]
    async fn publish_without_subscribers_succeeds() {
        let publisher = BroadcastChargeEventPublisher::new();

        let result = publisher.publish(status_changed("sub_1")).await;

        assert!(result.is_ok());
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn logger_stops_on_shutdown() {
        let publisher = BroadcastChargeEventPublisher::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let logger = tokio::spawn(ChargeEventLogger::run(publisher.subscribe(), shutdown_rx));

        publisher.publish(status_changed("sub_1")).await.unwrap();
        shutdown_tx.send(true).unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(1), logger)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn logger_stops_when_publisher_is_dropped() {
        let publisher = BroadcastChargeEventPublisher::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let logger = tokio::spawn(ChargeEventLogger::run(publisher.subscribe(), shutdown_rx));

        drop(publisher);

        tokio::time::timeout(std::time::Duration::from_secs(1), logger)
            .await
            .unwrap()
            .unwrap();
    }
}
