use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{sort_snapshot, Document, RemoteError, RemoteStore, Snapshot, Subscription};

struct Subscriber {
    order_key: String,
    sender: mpsc::UnboundedSender<Snapshot>,
}

#[derive(Default)]
struct Collections {
    documents: HashMap<String, HashMap<String, Map<String, Value>>>,
    subscribers: HashMap<String, Vec<Subscriber>>,
    created: u64,
}

impl Collections {
    /// Ids sort in creation order, so ties in a live query keep insertion order
    fn next_id(&mut self) -> String {
        self.created += 1;
        let suffix = Uuid::new_v4().simple().to_string();
        format!("{:012x}{}", self.created, &suffix[..8])
    }

    fn snapshot(&self, collection: &str, order_key: &str) -> Snapshot {
        let mut snapshot: Snapshot = self
            .documents
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        sort_snapshot(&mut snapshot, order_key);
        snapshot
    }

    /// Push the current contents to every live subscriber, dropping closed ones
    fn publish(&mut self, collection: &str) {
        let Some(mut subscribers) = self.subscribers.remove(collection) else {
            return;
        };
        subscribers.retain(|sub| {
            let snapshot = self.snapshot(collection, &sub.order_key);
            sub.sender.send(snapshot).is_ok()
        });
        if !subscribers.is_empty() {
            self.subscribers.insert(collection.to_string(), subscribers);
        }
    }
}

/// In-process document store with live queries.
///
/// Clones share state, so a clone can act as a second client writing to the
/// same collections. `set_available(false)` makes every call fail as if the
/// network were down.
#[derive(Clone)]
pub struct MemoryRemoteStore {
    collections: Arc<Mutex<Collections>>,
    available: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
}

impl Default for MemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(Mutex::new(Collections::default())),
            available: Arc::new(AtomicBool::new(true)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Successful create/update/delete calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current contents of a collection, ordered by id
    pub fn documents(&self, collection: &str) -> Snapshot {
        self.lock().snapshot(collection, "")
    }

    /// Re-send the current contents to every subscriber of a collection
    pub fn republish(&self, collection: &str) {
        self.lock().publish(collection);
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.collections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_available(&self) -> Result<(), RemoteError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(RemoteError::Connectivity("remote store unavailable".to_string()))
        }
    }

    fn object(value: Value) -> Result<Map<String, Value>, RemoteError> {
        match value {
            Value::Object(map) => Ok(map),
            other => Err(RemoteError::Validation(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn create(&self, collection: &str, fields: Value) -> Result<String, RemoteError> {
        self.ensure_available()?;
        let fields = Self::object(fields)?;

        let mut collections = self.lock();
        let id = collections.next_id();
        collections
            .documents
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        self.writes.fetch_add(1, Ordering::SeqCst);
        collections.publish(collection);

        Ok(id)
    }

    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<(), RemoteError> {
        self.ensure_available()?;
        let partial = Self::object(partial)?;

        let mut collections = self.lock();
        let document = collections
            .documents
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", collection, id)))?;
        document.extend(partial);
        self.writes.fetch_add(1, Ordering::SeqCst);
        collections.publish(collection);

        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError> {
        self.ensure_available()?;

        let mut collections = self.lock();
        collections
            .documents
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .ok_or_else(|| RemoteError::NotFound(format!("{}/{}", collection, id)))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        collections.publish(collection);

        Ok(())
    }

    async fn subscribe(&self, collection: &str, order_key: &str) -> Result<Subscription, RemoteError> {
        self.ensure_available()?;
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut collections = self.lock();
        let initial = collections.snapshot(collection, order_key);
        // Receiver is alive, so this cannot fail
        let _ = sender.send(initial);
        collections
            .subscribers
            .entry(collection.to_string())
            .or_default()
            .push(Subscriber {
                order_key: order_key.to_string(),
                sender,
            });

        Ok(Subscription::new(receiver))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_subscribe_emits_initial_and_after_changes() {
        let store = MemoryRemoteStore::new();
        let mut sub = store.subscribe("events", "date").await.unwrap();
        assert!(sub.next().await.unwrap().is_empty());

        store
            .create("events", json!({"title": "Late", "date": "2025-06-01"}))
            .await
            .unwrap();
        store
            .create("events", json!({"title": "Early", "date": "2025-01-01"}))
            .await
            .unwrap();

        assert_eq!(sub.next().await.unwrap().len(), 1);
        let snapshot = sub.next().await.unwrap();
        let titles: Vec<_> = snapshot.iter().map(|d| d.fields["title"].clone()).collect();
        assert_eq!(titles, vec![json!("Early"), json!("Late")]);
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let store = MemoryRemoteStore::new();
        let id = store
            .create("tasks", json!({"title": "Wire harness", "completed": false}))
            .await
            .unwrap();
        store.update("tasks", &id, json!({"completed": true})).await.unwrap();

        let docs = store.documents("tasks");
        assert_eq!(docs[0].fields["title"], "Wire harness");
        assert_eq!(docs[0].fields["completed"], true);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_errors() {
        let store = MemoryRemoteStore::new();
        assert!(matches!(
            store.create("tasks", json!("nope")).await,
            Err(RemoteError::Validation(_))
        ));
        assert!(matches!(
            store.update("tasks", "missing", json!({})).await,
            Err(RemoteError::NotFound(_))
        ));
        assert!(matches!(
            store.delete("tasks", "missing").await,
            Err(RemoteError::NotFound(_))
        ));

        store.set_available(false);
        assert!(matches!(
            store.create("tasks", json!({})).await,
            Err(RemoteError::Connectivity(_))
        ));
        assert!(store.subscribe("tasks", "category").await.is_err());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let store = MemoryRemoteStore::new();
        let sub = store.subscribe("links", "category").await.unwrap();
        drop(sub);

        store.create("links", json!({"title": "x"})).await.unwrap();
        assert!(store.lock().subscribers.get("links").is_none());
    }

    #[tokio::test]
    async fn test_ties_keep_creation_order() {
        let store = MemoryRemoteStore::new();
        for title in ["Discord", "Slack", "Drive"] {
            store
                .create("links", json!({"title": title, "category": "communication"}))
                .await
                .unwrap();
        }
        let mut sub = store.subscribe("links", "category").await.unwrap();
        let snapshot = sub.next().await.unwrap();
        let titles: Vec<_> = snapshot.iter().map(|d| d.fields["title"].clone()).collect();
        assert_eq!(titles, vec![json!("Discord"), json!("Slack"), json!("Drive")]);
    }
}
