pub mod local;
mod models;

pub use local::{keys, FileBackend, LocalSnapshotStore, MemoryBackend, SnapshotBackend};
pub use models::*;
