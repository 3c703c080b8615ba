use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::remote::Document;
use crate::storage::{
    keys, Event, EventPatch, Link, LinkPatch, RecordId, Task, TaskPatch, ValidationError,
};

use super::model::DashboardModel;

/// The four collections kept in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionKind {
    Events,
    Tasks,
    Links,
    MorphChart,
}

impl CollectionKind {
    pub const ALL: [CollectionKind; 4] = [Self::Events, Self::Tasks, Self::Links, Self::MorphChart];

    /// Name of the remote collection
    pub fn remote_name(&self) -> &'static str {
        match self {
            Self::Events => "events",
            Self::Tasks => "tasks",
            Self::Links => "links",
            Self::MorphChart => "morphChart",
        }
    }

    /// Key of the local snapshot
    pub fn local_key(&self) -> &'static str {
        match self {
            Self::Events => keys::EVENTS,
            Self::Tasks => keys::TASKS,
            Self::Links => keys::LINKS,
            Self::MorphChart => keys::MORPH_CHART,
        }
    }

    /// Field the live query is ordered by
    pub fn order_key(&self) -> &'static str {
        match self {
            Self::Events => "date",
            Self::Tasks | Self::Links => "category",
            Self::MorphChart => "updatedAt",
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remote_name())
    }
}

/// Which store currently drives a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CollectionState {
    /// Nothing loaded yet
    Uninitialized,
    /// Memory follows the remote live query
    Live,
    /// Memory follows local writes; left again on the next live snapshot
    LocalOnly,
}

/// Issues local record ids: wall-clock milliseconds, strictly increasing
/// within the process.
#[derive(Debug, Default)]
pub struct LocalIdGenerator {
    last: AtomicI64,
}

impl LocalIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}

/// Serialize a record as remote document fields; the id stays in the envelope
pub fn document_fields<T: Serialize>(record: &T) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(fields) = &mut value {
        fields.remove("id");
    }
    Ok(value)
}

/// A record type living in one of the per-item collections.
///
/// Ties a record type to its slot in the [`DashboardModel`] so add, update
/// and delete can be written once for events, tasks and links.
pub trait ManagedRecord: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const KIND: CollectionKind;

    type Patch: Serialize + Send + Sync;

    fn id(&self) -> Option<&RecordId>;

    fn set_id(&mut self, id: RecordId);

    fn validate(&self) -> Result<(), ValidationError>;

    fn validate_patch(patch: &Self::Patch) -> Result<(), ValidationError>;

    fn insert(model: &mut DashboardModel, record: Self);

    /// Merge a patch into the record with `id`; false if there is none
    fn update(model: &mut DashboardModel, id: &RecordId, patch: &Self::Patch) -> bool;

    /// Remove the record with `id`; false if there is none
    fn remove(model: &mut DashboardModel, id: &RecordId) -> bool;

    /// Replace the whole collection
    fn replace_all(model: &mut DashboardModel, records: Vec<Self>);

    fn from_document(document: Document) -> Result<Self, serde_json::Error> {
        serde_json::from_value(document.into_record_value())
    }
}

impl ManagedRecord for Event {
    const KIND: CollectionKind = CollectionKind::Events;

    type Patch = EventPatch;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Event::validate(self)
    }

    fn validate_patch(patch: &EventPatch) -> Result<(), ValidationError> {
        patch.validate()
    }

    fn insert(model: &mut DashboardModel, record: Self) {
        model.events.push(record);
    }

    fn update(model: &mut DashboardModel, id: &RecordId, patch: &EventPatch) -> bool {
        match model.events.iter_mut().find(|e| e.id.as_ref() == Some(id)) {
            Some(event) => {
                event.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    fn remove(model: &mut DashboardModel, id: &RecordId) -> bool {
        let before = model.events.len();
        model.events.retain(|e| e.id.as_ref() != Some(id));
        model.events.len() != before
    }

    fn replace_all(model: &mut DashboardModel, records: Vec<Self>) {
        model.events = records;
    }
}

impl ManagedRecord for Task {
    const KIND: CollectionKind = CollectionKind::Tasks;

    type Patch = TaskPatch;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Task::validate(self)
    }

    fn validate_patch(patch: &TaskPatch) -> Result<(), ValidationError> {
        patch.validate()
    }

    fn insert(model: &mut DashboardModel, record: Self) {
        model.tasks.push(record);
    }

    fn update(model: &mut DashboardModel, id: &RecordId, patch: &TaskPatch) -> bool {
        match model.tasks.iter_mut().find(|t| t.id.as_ref() == Some(id)) {
            Some(task) => {
                task.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    fn remove(model: &mut DashboardModel, id: &RecordId) -> bool {
        let before = model.tasks.len();
        model.tasks.retain(|t| t.id.as_ref() != Some(id));
        model.tasks.len() != before
    }

    fn replace_all(model: &mut DashboardModel, records: Vec<Self>) {
        model.tasks = records;
    }
}

impl ManagedRecord for Link {
    const KIND: CollectionKind = CollectionKind::Links;

    type Patch = LinkPatch;

    fn id(&self) -> Option<&RecordId> {
        self.id.as_ref()
    }

    fn set_id(&mut self, id: RecordId) {
        self.id = Some(id);
    }

    fn validate(&self) -> Result<(), ValidationError> {
        Link::validate(self)
    }

    fn validate_patch(patch: &LinkPatch) -> Result<(), ValidationError> {
        patch.validate()
    }

    fn insert(model: &mut DashboardModel, record: Self) {
        model.links.push(record);
    }

    fn update(model: &mut DashboardModel, id: &RecordId, patch: &LinkPatch) -> bool {
        model.links.update(id, patch)
    }

    fn remove(model: &mut DashboardModel, id: &RecordId) -> bool {
        model.links.remove(id).is_some()
    }

    fn replace_all(model: &mut DashboardModel, records: Vec<Self>) {
        model.links = crate::storage::Links::from_records(records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EventDraft, TaskCategory, ANONYMOUS};
    use serde_json::json;

    #[test]
    fn test_local_ids_strictly_increase() {
        let ids = LocalIdGenerator::new();
        let issued: Vec<i64> = (0..1000).map(|_| ids.next()).collect();
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        assert!(issued[0] >= Utc::now().timestamp_millis() - 60_000);
    }

    #[test]
    fn test_document_fields_drop_id() {
        let mut event = EventDraft::new("Kickoff", "2025-02-03").into_event(ANONYMOUS);
        event.id = Some(RecordId::Local(5));

        let fields = document_fields(&event).unwrap();
        assert!(fields.get("id").is_none());
        assert_eq!(fields["createdBy"], "Anonymous");
    }

    #[test]
    fn test_task_from_document() {
        let document = Document {
            id: "r1".to_string(),
            fields: json!({"title": "Order cells", "category": "procurement"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let task = Task::from_document(document).unwrap();
        assert_eq!(task.id, Some(RecordId::Remote("r1".to_string())));
        assert_eq!(task.category, TaskCategory::Procurement);
        assert!(!task.completed);
        assert_eq!(task.created_by, "Anonymous");
    }

    #[test]
    fn test_unknown_task_category_document_is_rejected() {
        let document = Document {
            id: "r2".to_string(),
            fields: json!({"title": "Paint", "category": "marketing"})
                .as_object()
                .cloned()
                .unwrap(),
        };
        assert!(Task::from_document(document).is_err());
    }
}
