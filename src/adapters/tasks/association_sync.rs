//! Association sync - background linking of charges to their documents.
//!
//! The reconciler enqueues an [`AssociationTask`] after a charge insert
//! commits. [`AssociationSyncWorker`] drains the channel and appends the
//! charge id to the associated document, retrying a bounded number of times.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `max_attempts` | 3 | Attempts per task before it is dropped |
//! | `retry_delay` | 500ms | Pause between attempts |
//!
//! ## Graceful Shutdown
//!
//! On shutdown the worker drains tasks already queued, then stops.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::config::AssociationSyncConfig;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{AssociationQueue, AssociationRepository, AssociationTask};

/// Queue backed by an unbounded tokio channel.
#[derive(Clone)]
pub struct ChannelAssociationQueue {
    sender: mpsc::UnboundedSender<AssociationTask>,
}

impl ChannelAssociationQueue {
    /// Creates the queue and the receiver the worker consumes.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AssociationTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AssociationQueue for ChannelAssociationQueue {
    fn enqueue(&self, task: AssociationTask) -> Result<(), DomainError> {
        self.sender.send(task).map_err(|e| {
            DomainError::new(ErrorCode::QueueError, "association worker is not running")
                .with_detail("association", e.0.association.to_string())
        })
    }
}

/// Retry policy for the worker.
#[derive(Debug, Clone)]
pub struct AssociationSyncWorkerConfig {
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for AssociationSyncWorkerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl AssociationSyncWorkerConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

impl From<&AssociationSyncConfig> for AssociationSyncWorkerConfig {
    fn from(config: &AssociationSyncConfig) -> Self {
        Self::default()
            .with_max_attempts(config.max_attempts)
            .with_retry_delay(Duration::from_millis(config.retry_delay_ms))
    }
}

/// How a single task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Linked { attempts: u32 },
    Abandoned { attempts: u32 },
}

pub struct AssociationSyncWorker {
    associations: Arc<dyn AssociationRepository>,
    config: AssociationSyncWorkerConfig,
}

impl AssociationSyncWorker {
    pub fn new(associations: Arc<dyn AssociationRepository>) -> Self {
        Self::with_config(associations, AssociationSyncWorkerConfig::default())
    }

    pub fn with_config(
        associations: Arc<dyn AssociationRepository>,
        config: AssociationSyncWorkerConfig,
    ) -> Self {
        Self {
            associations,
            config,
        }
    }

    /// Consumes tasks until shutdown is signalled or every sender is dropped.
    pub async fn run(
        &self,
        mut tasks: mpsc::UnboundedReceiver<AssociationTask>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        while let Ok(task) = tasks.try_recv() {
                            self.process(task).await;
                        }
                        tracing::info!("association sync worker stopped");
                        return;
                    }
                }

                next = tasks.recv() => {
                    match next {
                        Some(task) => {
                            self.process(task).await;
                        }
                        None => {
                            tracing::info!("association queue closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Runs one task to completion under the retry policy.
    pub async fn process(&self, task: AssociationTask) -> TaskOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .associations
                .append_charge(&task.association, &task.charge_id)
                .await
            {
                Ok(()) => {
                    tracing::info!(
                        association = %task.association,
                        charge_id = %task.charge_id,
                        attempts,
                        "charge linked to associated document"
                    );
                    return TaskOutcome::Linked { attempts };
                }
                Err(e) if e.code == ErrorCode::AssociationNotFound => {
                    tracing::error!(
                        association = %task.association,
                        charge_id = %task.charge_id,
                        error = %e,
                        "associated document does not exist"
                    );
                    return TaskOutcome::Abandoned { attempts };
                }
                Err(e) if attempts >= self.config.max_attempts => {
                    tracing::error!(
                        association = %task.association,
                        charge_id = %task.charge_id,
                        attempts,
                        error = %e,
                        "giving up on association update"
                    );
                    return TaskOutcome::Abandoned { attempts };
                }
                Err(e) => {
                    tracing::warn!(
                        association = %task.association,
                        charge_id = %task.charge_id,
                        attempts,
                        error = %e,
                        "association update failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
    }
}
