//! Association task queue port.
//!
//! After a charge insert commits, the reconciler enqueues a task that links
//! the new charge to its associated document. Enqueueing never blocks on the
//! link itself; a worker drains the queue with its own retry policy.

use crate::domain::billing::Association;
use crate::domain::foundation::{ChargeId, DomainError};

/// Link a charge to the document it was bought for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationTask {
    pub association: Association,
    pub charge_id: ChargeId,
}

impl AssociationTask {
    pub fn new(association: Association, charge_id: ChargeId) -> Self {
        Self {
            association,
            charge_id,
        }
    }
}

pub trait AssociationQueue: Send + Sync {
    /// Hands a task to the worker.
    ///
    /// # Errors
    ///
    /// - `QueueError` if the worker is gone
    fn enqueue(&self, task: AssociationTask) -> Result<(), DomainError>;
}
