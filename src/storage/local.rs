//! Local snapshot persistence.
//!
//! A key-value store of serialized collections on this device. Always
//! available and synchronous; writes are best-effort and unreadable payloads
//! are treated as missing.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Conventional keys the dashboard persists under
pub mod keys {
    pub const EVENTS: &str = "solarTruckEvents";
    pub const TASKS: &str = "solarTruckTasks";
    pub const LINKS: &str = "solarTruckLinks";
    pub const MORPH_CHART: &str = "solarTruckMorphChart";
    pub const USER_NAME: &str = "solarTruckUserName";
    pub const SESSION_ID: &str = "solarTruckSessionId";
}

/// Raw string storage behind the snapshot store
pub trait SnapshotBackend: Send + Sync {
    fn read(&self, key: &str) -> io::Result<Option<String>>;
    fn write(&self, key: &str, value: &str) -> io::Result<()>;
    fn remove(&self, key: &str) -> io::Result<()>;
}

/// One JSON file per key under a directory
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    pub fn new(dir: PathBuf) -> io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl SnapshotBackend for FileBackend {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        match fs::read_to_string(self.key_path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        let path = self.key_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        match fs::remove_file(self.key_path(key)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

/// In-process backend. Clones share the same map, so a second store built
/// from a clone sees what the first one wrote.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw payload stored under a key
    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Total writes accepted since creation
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl SnapshotBackend for MemoryBackend {
    fn read(&self, key: &str) -> io::Result<Option<String>> {
        Ok(self.raw(key))
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove(&self, key: &str) -> io::Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Typed snapshot store over a backend
#[derive(Clone)]
pub struct LocalSnapshotStore {
    backend: Arc<dyn SnapshotBackend>,
}

impl LocalSnapshotStore {
    pub fn new(backend: impl SnapshotBackend + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// File-backed store rooted at `<data_dir>/local`
    pub fn open(data_dir: &std::path::Path) -> io::Result<Self> {
        Ok(Self::new(FileBackend::new(data_dir.join("local"))?))
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Serialize and persist. Failures are logged, never returned.
    pub fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("local store: failed to serialize '{}': {}", key, e);
                return;
            }
        };
        if let Err(e) = self.backend.write(key, &data) {
            log::warn!("local store: failed to write '{}': {}", key, e);
        }
    }

    /// Load and deserialize. Missing, unreadable or corrupt payloads yield `None`.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let data = match self.backend.read(key) {
            Ok(Some(data)) => data,
            Ok(None) => return None,
            Err(e) => {
                log::warn!("local store: failed to read '{}': {}", key, e);
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("local store: ignoring corrupt payload under '{}': {}", key, e);
                None
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(e) = self.backend.remove(key) {
            log::warn!("local store: failed to remove '{}': {}", key, e);
        }
    }

    /// Session id for this device, created on first use
    pub fn session_id(&self) -> String {
        if let Some(id) = self.load::<String>(keys::SESSION_ID) {
            return id;
        }
        let id = generate_session_id();
        self.save(keys::SESSION_ID, &id);
        id
    }
}

fn generate_session_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_backend_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::open(temp.path()).unwrap();

        store.save(keys::EVENTS, &vec!["a", "b"]);
        let loaded: Option<Vec<String>> = store.load(keys::EVENTS);
        assert_eq!(loaded, Some(vec!["a".to_string(), "b".to_string()]));

        // Survives reopening
        let reopened = LocalSnapshotStore::open(temp.path()).unwrap();
        let loaded: Option<Vec<String>> = reopened.load(keys::EVENTS);
        assert_eq!(loaded.map(|v| v.len()), Some(2));
        assert!(!temp.path().join("local").join("solarTruckEvents.json.tmp").exists());
    }

    #[test]
    fn test_missing_key_is_none() {
        let store = LocalSnapshotStore::in_memory();
        let loaded: Option<Vec<String>> = store.load(keys::TASKS);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_corrupt_payload_is_treated_as_absent() {
        let backend = MemoryBackend::new();
        backend.write(keys::TASKS, "{not json").unwrap();
        let store = LocalSnapshotStore::new(backend);

        let loaded: Option<Vec<String>> = store.load(keys::TASKS);
        assert!(loaded.is_none());
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let temp = TempDir::new().unwrap();
        let backend = FileBackend::new(temp.path().to_path_buf()).unwrap();
        assert!(backend.remove("nothing").is_ok());
    }

    #[test]
    fn test_session_id_is_stable() {
        let store = LocalSnapshotStore::in_memory();
        let first = store.session_id();
        assert!(first.starts_with("session_"));
        assert_eq!(store.session_id(), first);
    }
}
