//! Team dashboard persistence: events, tasks, links and the morph chart,
//! kept in step between a live remote document store and a local snapshot
//! store that always works.

pub mod config;
pub mod remote;
pub mod storage;
pub mod sync;

pub use config::{ConfigError, DashboardConfig};
pub use remote::{MemoryRemoteStore, RemoteError, RemoteStore, RestRemoteStore};
pub use storage::LocalSnapshotStore;
pub use sync::{CollectionKind, CollectionState, DashboardModel, SyncError, Synchronizer, WriteOutcome};
