//! Remote collection store: a document database with live queries.
//!
//! The synchronizer only relies on the four operations of [`RemoteStore`].
//! Every failure is treated the same way by callers, so the error variants
//! exist for logging, not for branching.

mod memory;
mod rest;

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub use memory::MemoryRemoteStore;
pub use rest::RestRemoteStore;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Remote store unreachable: {0}")]
    Connectivity(String),
    #[error("Invalid document: {0}")]
    Validation(String),
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A stored document. The id travels in the envelope, not in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Fields plus the id under `"id"`, ready to decode into a record
    pub fn into_record_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert("id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

/// Complete, ordered contents of one collection
pub type Snapshot = Vec<Document>;

/// Order documents ascending by `order_key`, ties broken by id.
/// Documents missing the key sort first.
pub fn sort_snapshot(documents: &mut [Document], order_key: &str) {
    documents.sort_by(|a, b| {
        compare_values(a.fields.get(order_key), b.fields.get(order_key)).then_with(|| a.id.cmp(&b.id))
    });
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}

/// Live query over one collection.
///
/// Yields the full snapshot once after subscribing and again after every
/// change. Dropping the subscription cancels it.
pub struct Subscription {
    snapshots: mpsc::UnboundedReceiver<Snapshot>,
    cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    pub fn new(snapshots: mpsc::UnboundedReceiver<Snapshot>) -> Self {
        Self {
            snapshots,
            cancel: None,
        }
    }

    /// Subscription whose producer task listens for cancellation
    pub fn with_cancel(snapshots: mpsc::UnboundedReceiver<Snapshot>, cancel: oneshot::Sender<()>) -> Self {
        Self {
            snapshots,
            cancel: Some(cancel),
        }
    }

    /// Next snapshot, or `None` once the stream has ended or been cancelled
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.snapshots.recv().await
    }

    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.snapshots.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store a new document and return its id
    async fn create(&self, collection: &str, fields: Value) -> Result<String, RemoteError>;

    /// Shallow-merge `partial` into an existing document
    async fn update(&self, collection: &str, id: &str, partial: Value) -> Result<(), RemoteError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RemoteError>;

    /// Start a live query ordered by `order_key`
    async fn subscribe(&self, collection: &str, order_key: &str) -> Result<Subscription, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        Document {
            id: id.to_string(),
            fields: fields.as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_sort_snapshot_by_key_then_id() {
        let mut docs = vec![
            doc("b", json!({"date": "2025-05-01"})),
            doc("c", json!({"date": "2025-04-01"})),
            doc("a", json!({"date": "2025-05-01"})),
            doc("d", json!({})),
        ];
        sort_snapshot(&mut docs, "date");

        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "a", "b"]);
    }

    #[test]
    fn test_record_value_carries_id() {
        let value = doc("xyz", json!({"title": "Kickoff"})).into_record_value();
        assert_eq!(value["id"], "xyz");
        assert_eq!(value["title"], "Kickoff");
    }

    #[tokio::test]
    async fn test_cancelled_subscription_ends() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut sub = Subscription::new(rx);
        tx.send(Vec::new()).unwrap();

        sub.cancel();
        // Already-queued snapshots drain, then the stream ends
        assert!(sub.next().await.is_some());
        assert!(sub.next().await.is_none());
        assert!(tx.send(Vec::new()).is_err());
    }
}
