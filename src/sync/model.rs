use serde::Serialize;

use crate::storage::{Event, Links, LocalSnapshotStore, MorphChart, RecordId, Task, TaskCategory};

use super::collection::{CollectionKind, ManagedRecord};

/// In-memory view of the dashboard that readers observe
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardModel {
    pub events: Vec<Event>,
    pub tasks: Vec<Task>,
    pub links: Links,
    pub morph_chart: Option<MorphChart>,
}

impl DashboardModel {
    /// Replace one collection with its local snapshot.
    ///
    /// Missing or corrupt snapshots count as empty, except links which fall
    /// back to the built-in defaults.
    pub fn load_collection(&mut self, kind: CollectionKind, local: &LocalSnapshotStore) {
        let key = kind.local_key();
        match kind {
            CollectionKind::Events => self.events = local.load(key).unwrap_or_default(),
            CollectionKind::Tasks => self.tasks = local.load(key).unwrap_or_default(),
            CollectionKind::Links => self.links = local.load(key).unwrap_or_else(Links::defaults),
            CollectionKind::MorphChart => self.morph_chart = local.load(key),
        }
    }

    /// Write one collection to its local snapshot
    pub fn persist(&self, kind: CollectionKind, local: &LocalSnapshotStore) {
        let key = kind.local_key();
        match kind {
            CollectionKind::Events => local.save(key, &self.events),
            CollectionKind::Tasks => local.save(key, &self.tasks),
            CollectionKind::Links => local.save(key, &self.links),
            CollectionKind::MorphChart => match &self.morph_chart {
                Some(chart) => local.save(key, chart),
                None => local.remove(key),
            },
        }
    }

    /// Events by date; same-day events keep their stored order
    pub fn events_sorted(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.events.iter().collect();
        events.sort_by(|a, b| a.date.cmp(&b.date));
        events
    }

    pub fn events_on(&self, date: &str) -> Vec<&Event> {
        self.events.iter().filter(|e| e.date == date).collect()
    }

    pub fn tasks_in(&self, category: TaskCategory) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.category == category).collect()
    }

    /// Every task category with its tasks, empty categories included
    pub fn tasks_by_category(&self) -> Vec<(TaskCategory, Vec<&Task>)> {
        TaskCategory::ALL
            .iter()
            .map(|category| (*category, self.tasks_in(*category)))
            .collect()
    }

    /// The id of the record in `kind` that prints as `text`.
    ///
    /// Remote stores may hand out all-digit ids, which read like local ids
    /// when parsed on their own.
    pub fn find_id(&self, kind: CollectionKind, text: &str) -> Option<RecordId> {
        let text = text.trim();
        let matching = |id: Option<&RecordId>| id.filter(|id| id.to_string() == text).cloned();
        match kind {
            CollectionKind::Events => self.events.iter().find_map(|e| matching(e.id())),
            CollectionKind::Tasks => self.tasks.iter().find_map(|t| matching(t.id())),
            CollectionKind::Links => self.links.iter().find_map(|l| matching(l.id())),
            CollectionKind::MorphChart => self.morph_chart.as_ref().and_then(|c| matching(c.id.as_ref())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{keys, EventDraft, MemoryBackend, SnapshotBackend, TaskDraft, ANONYMOUS};

    fn load_all(local: &LocalSnapshotStore) -> DashboardModel {
        let mut model = DashboardModel::default();
        for kind in CollectionKind::ALL {
            model.load_collection(kind, local);
        }
        model
    }

    #[test]
    fn test_empty_store_loads_default_links() {
        let model = load_all(&LocalSnapshotStore::in_memory());
        assert!(model.events.is_empty());
        assert!(model.tasks.is_empty());
        assert!(model.morph_chart.is_none());
        assert_eq!(model.links, Links::defaults());
    }

    #[test]
    fn test_corrupt_links_fall_back_to_defaults() {
        let backend = MemoryBackend::new();
        backend.write(keys::LINKS, "[[[").unwrap();
        backend.write(keys::EVENTS, "not json").unwrap();
        let local = LocalSnapshotStore::new(backend);

        let model = load_all(&local);
        assert_eq!(model.links.len(), 8);
        assert!(model.events.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let local = LocalSnapshotStore::in_memory();
        let mut model = DashboardModel::default();
        model.tasks.push(TaskDraft::new("Mount panels", "assembly").into_task(ANONYMOUS).unwrap());
        model.morph_chart = Some(MorphChart::new(
            vec!["Function".to_string()],
            vec![vec!["Steer".to_string()]],
            String::new(),
            ANONYMOUS,
        ));
        model.persist(CollectionKind::Tasks, &local);
        model.persist(CollectionKind::MorphChart, &local);

        let mut reloaded = DashboardModel::default();
        reloaded.load_collection(CollectionKind::Tasks, &local);
        reloaded.load_collection(CollectionKind::MorphChart, &local);
        assert_eq!(reloaded.tasks, model.tasks);
        assert_eq!(reloaded.morph_chart, model.morph_chart);

        model.morph_chart = None;
        model.persist(CollectionKind::MorphChart, &local);
        reloaded.load_collection(CollectionKind::MorphChart, &local);
        assert!(reloaded.morph_chart.is_none());
    }

    #[test]
    fn test_grouping_helpers() {
        let mut model = DashboardModel::default();
        model.events.push(EventDraft::new("B", "2025-05-02").into_event(ANONYMOUS));
        model.events.push(EventDraft::new("A", "2025-05-01").into_event(ANONYMOUS));
        model.events.push(EventDraft::new("C", "2025-05-02").into_event(ANONYMOUS));
        model.tasks.push(TaskDraft::new("Test brakes", "testing").into_task(ANONYMOUS).unwrap());

        let titles: Vec<_> = model.events_sorted().iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(model.events_on("2025-05-02").len(), 2);

        let grouped = model.tasks_by_category();
        assert_eq!(grouped.len(), 5);
        assert_eq!(model.tasks_in(TaskCategory::Testing).len(), 1);
        assert!(model.tasks_in(TaskCategory::Design).is_empty());
    }

    #[test]
    fn test_find_id_prefers_existing_records() {
        let mut model = DashboardModel::default();
        let mut numeric = TaskDraft::new("Charge pack", "testing").into_task(ANONYMOUS).unwrap();
        numeric.id = Some(RecordId::Remote("1042".to_string()));
        let mut local = TaskDraft::new("Tape seams", "assembly").into_task(ANONYMOUS).unwrap();
        local.id = Some(RecordId::Local(1042));
        model.tasks.push(numeric);

        assert_eq!(
            model.find_id(CollectionKind::Tasks, "1042"),
            Some(RecordId::Remote("1042".to_string()))
        );
        assert_eq!(model.find_id(CollectionKind::Events, "1042"), None);

        model.tasks = vec![local];
        assert_eq!(model.find_id(CollectionKind::Tasks, " 1042 "), Some(RecordId::Local(1042)));
        assert_eq!(model.find_id(CollectionKind::Tasks, "7"), None);
    }
}
