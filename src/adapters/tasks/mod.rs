//! Background task adapters.

mod association_sync;

pub use association_sync::{
    AssociationSyncWorker, AssociationSyncWorkerConfig, ChannelAssociationQueue, TaskOutcome,
};
