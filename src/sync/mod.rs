//! Dual-channel synchronization of the dashboard collections.

mod collection;
mod manager;
mod model;

pub use collection::{document_fields, CollectionKind, CollectionState, LocalIdGenerator, ManagedRecord};
pub use manager::{Result, SyncError, Synchronizer, WriteOutcome, FIRST_SNAPSHOT_TIMEOUT};
pub use model::DashboardModel;
