use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{ConfigError, DashboardConfig};
use crate::remote::{Document, RemoteError, RemoteStore, RestRemoteStore, Snapshot, Subscription};
use crate::storage::{
    keys, Event, EventDraft, EventPatch, Link, LinkDraft, Links, LocalSnapshotStore, MorphChart,
    RecordId, Task, TaskDraft, TaskPatch, ValidationError, ANONYMOUS,
};

use super::collection::{
    document_fields, CollectionKind, CollectionState, LocalIdGenerator, ManagedRecord,
};
use super::model::DashboardModel;

/// How long a live query may stay silent before its collection is loaded
/// from the local snapshot store instead
pub const FIRST_SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a remote toggle waits for its own change to come back
const ECHO_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Record not found: {0}")]
    RecordNotFound(RecordId),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Where a write ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Accepted by the remote store; memory follows on the next live snapshot
    Remote,
    /// Applied to memory and the local snapshot store
    Local,
}

/// State shared between the synchronizer and its pump tasks
struct SyncInner {
    local: LocalSnapshotStore,
    remote: Option<Arc<dyn RemoteStore>>,
    model: Mutex<DashboardModel>,
    states: Mutex<HashMap<CollectionKind, CollectionState>>,
    /// Collections with a running live query
    subscribed: Mutex<HashSet<CollectionKind>>,
    /// Collections whose contents have been loaded at least once
    loaded: Mutex<HashSet<CollectionKind>>,
    revision: watch::Sender<u64>,
    ids: LocalIdGenerator,
    /// Remote morph chart document created by this session. Held across the
    /// remote write so saves run one at a time.
    morph_chart_id: tokio::sync::Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncInner {
    fn model(&self) -> MutexGuard<'_, DashboardModel> {
        lock(&self.model)
    }

    fn state(&self, kind: CollectionKind) -> CollectionState {
        lock(&self.states)
            .get(&kind)
            .copied()
            .unwrap_or(CollectionState::Uninitialized)
    }

    fn set_state(&self, kind: CollectionKind, state: CollectionState) {
        let previous = lock(&self.states).insert(kind, state);
        if previous != Some(state) {
            log::debug!("Sync: {} is now {:?}", kind, state);
        }
    }

    fn mark_loaded(&self, kind: CollectionKind) {
        lock(&self.loaded).insert(kind);
    }

    fn is_loaded(&self, kind: CollectionKind) -> bool {
        lock(&self.loaded).contains(&kind)
    }

    fn is_ready(&self) -> bool {
        lock(&self.loaded).len() == CollectionKind::ALL.len()
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    /// Remote handle for a collection that currently has a live query
    fn live_remote(&self, kind: CollectionKind) -> Option<Arc<dyn RemoteStore>> {
        let remote = self.remote.clone()?;
        lock(&self.subscribed).contains(&kind).then_some(remote)
    }

    fn load_local(&self, kind: CollectionKind) {
        self.model().load_collection(kind, &self.local);
        self.set_state(kind, CollectionState::LocalOnly);
        self.mark_loaded(kind);
        self.notify();
    }

    /// Run a change against memory, then persist the collection and notify
    fn apply_local<F>(&self, kind: CollectionKind, change: F) -> Result<()>
    where
        F: FnOnce(&mut DashboardModel) -> Result<()>,
    {
        {
            let mut model = self.model();
            change(&mut model)?;
            model.persist(kind, &self.local);
        }
        self.notify();
        Ok(())
    }

    /// Replace a collection with a live snapshot and mirror it locally
    fn apply_snapshot(&self, kind: CollectionKind, snapshot: Snapshot) {
        log::debug!("Sync: {} snapshot with {} documents", kind, snapshot.len());
        {
            let mut model = self.model();
            match kind {
                CollectionKind::Events => {
                    Event::replace_all(&mut model, decode_all(kind, snapshot, Event::from_document))
                }
                CollectionKind::Tasks => {
                    Task::replace_all(&mut model, decode_all(kind, snapshot, Task::from_document))
                }
                CollectionKind::Links => {
                    Link::replace_all(&mut model, decode_all(kind, snapshot, Link::from_document))
                }
                CollectionKind::MorphChart => {
                    model.morph_chart = decode_all(kind, snapshot, |document| {
                        serde_json::from_value::<MorphChart>(document.into_record_value())
                    })
                    .pop();
                }
            }
            model.persist(kind, &self.local);
        }
        self.set_state(kind, CollectionState::Live);
        self.mark_loaded(kind);
        self.notify();
    }

    /// Write the built-in links to an empty remote collection. Memory is left
    /// to the emissions that follow; if seeding fails the defaults are applied
    /// locally instead.
    async fn seed_links(&self) {
        let Some(remote) = self.remote.clone() else {
            return;
        };
        let defaults = Links::defaults();
        log::info!("Sync: links collection is empty, seeding {} defaults", defaults.len());

        for link in defaults.iter() {
            let seeded = match document_fields(link) {
                Ok(fields) => remote
                    .create(CollectionKind::Links.remote_name(), fields)
                    .await
                    .map(|_| ()),
                Err(e) => Err(RemoteError::Json(e)),
            };
            if let Err(e) = seeded {
                log::warn!("Sync: seeding links failed, using defaults locally: {}", e);
                self.set_state(CollectionKind::Links, CollectionState::LocalOnly);
                if let Err(e) = self.apply_local(CollectionKind::Links, |model| {
                    model.links = Links::defaults();
                    Ok(())
                }) {
                    log::error!("Sync: failed to apply default links: {}", e);
                }
                self.mark_loaded(CollectionKind::Links);
                self.notify();
                return;
            }
        }
    }
}

/// Decode snapshot documents, skipping the ones that do not fit the record type
fn decode_all<T, F>(kind: CollectionKind, snapshot: Snapshot, decode: F) -> Vec<T>
where
    F: Fn(Document) -> std::result::Result<T, serde_json::Error>,
{
    snapshot
        .into_iter()
        .filter_map(|document| {
            let id = document.id.clone();
            match decode(document) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("Sync: skipping undecodable {} document {}: {}", kind, id, e);
                    None
                }
            }
        })
        .collect()
}

/// Consume one collection's live query until it ends or is cancelled.
///
/// A collection that has seen no snapshot within `first_timeout`, or whose
/// stream ends first, is loaded from the local snapshot store. A snapshot
/// arriving later still makes it live.
async fn pump(
    inner: Arc<SyncInner>,
    kind: CollectionKind,
    mut subscription: Subscription,
    first_timeout: Duration,
) {
    let mut first = true;
    loop {
        let next = if first && !inner.is_loaded(kind) {
            match tokio::time::timeout(first_timeout, subscription.next()).await {
                Ok(next) => next,
                Err(_) => {
                    log::warn!(
                        "Sync: no snapshot for {} within {:?}, using local snapshot",
                        kind,
                        first_timeout
                    );
                    if !inner.is_loaded(kind) {
                        inner.load_local(kind);
                    }
                    continue;
                }
            }
        } else {
            subscription.next().await
        };
        let Some(snapshot) = next else {
            break;
        };

        let seed = first && kind == CollectionKind::Links && snapshot.is_empty();
        first = false;
        if seed {
            inner.seed_links().await;
        } else {
            inner.apply_snapshot(kind, snapshot);
        }
    }

    log::info!("Sync: live query for {} ended", kind);
    lock(&inner.subscribed).remove(&kind);
    if inner.is_loaded(kind) {
        inner.set_state(kind, CollectionState::LocalOnly);
    } else {
        inner.load_local(kind);
    }
}

/// Keeps the dashboard collections in step between the remote store and the
/// local snapshot store.
///
/// While a collection is live, memory is replaced by every remote snapshot
/// and writes go to the remote store. When a remote write fails, that one
/// write is applied to memory and persisted locally instead; the next live
/// snapshot overwrites it again. A fallback edit racing a resync can be lost,
/// and there is no version check on remote updates (last writer wins).
pub struct Synchronizer {
    inner: Arc<SyncInner>,
    pumps: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    session_id: String,
    default_name: Option<String>,
    first_snapshot_timeout: Duration,
}

impl Synchronizer {
    pub fn new(local: LocalSnapshotStore, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        let session_id = local.session_id();
        let (revision, _) = watch::channel(0);
        let states = CollectionKind::ALL
            .iter()
            .map(|kind| (*kind, CollectionState::Uninitialized))
            .collect();

        Self {
            inner: Arc::new(SyncInner {
                local,
                remote,
                model: Mutex::new(DashboardModel::default()),
                states: Mutex::new(states),
                subscribed: Mutex::new(HashSet::new()),
                loaded: Mutex::new(HashSet::new()),
                revision,
                ids: LocalIdGenerator::new(),
                morph_chart_id: tokio::sync::Mutex::new(None),
            }),
            pumps: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            session_id,
            default_name: None,
            first_snapshot_timeout: FIRST_SNAPSHOT_TIMEOUT,
        }
    }

    /// Wait at most `timeout` for a live query's first snapshot before
    /// falling back to local data
    pub fn with_first_snapshot_timeout(mut self, timeout: Duration) -> Self {
        self.first_snapshot_timeout = timeout;
        self
    }

    /// Build a session from configuration. `offline` skips the remote store.
    pub fn from_config(config: &DashboardConfig, offline: bool) -> std::result::Result<Self, ConfigError> {
        let data_dir = config.data_dir()?;
        let local = LocalSnapshotStore::open(&data_dir)?;

        let remote: Option<Arc<dyn RemoteStore>> = match (&config.remote, offline) {
            (Some(remote), false) => Some(Arc::new(RestRemoteStore::new(
                remote.base_url.clone(),
                remote.token.clone(),
            )?)),
            _ => None,
        };
        log::info!(
            "Sync: session at {} ({})",
            data_dir.display(),
            if remote.is_some() { "remote" } else { "local only" }
        );

        let mut synchronizer = Self::new(local, remote);
        synchronizer.default_name = config.display_name.clone();
        Ok(synchronizer)
    }

    /// Load or subscribe every collection. Calling it again does nothing.
    pub async fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let Some(remote) = self.inner.remote.clone() else {
            log::info!("Sync: no remote store, working from local snapshots");
            for kind in CollectionKind::ALL {
                self.inner.load_local(kind);
            }
            return;
        };

        for kind in CollectionKind::ALL {
            match remote.subscribe(kind.remote_name(), kind.order_key()).await {
                Ok(subscription) => {
                    lock(&self.inner.subscribed).insert(kind);
                    self.inner.set_state(kind, CollectionState::Live);
                    let handle = tokio::spawn(pump(
                        self.inner.clone(),
                        kind,
                        subscription,
                        self.first_snapshot_timeout,
                    ));
                    lock(&self.pumps).push(handle);
                }
                Err(e) => {
                    log::warn!("Sync: cannot subscribe to {}, using local snapshot: {}", kind, e);
                    self.inner.load_local(kind);
                }
            }
        }
    }

    /// Cancel every live query. Memory keeps its last contents.
    pub fn shutdown(&self) {
        let pumps: Vec<_> = lock(&self.pumps).drain(..).collect();
        if !pumps.is_empty() {
            log::info!("Sync: shutting down {} live queries", pumps.len());
        }
        for handle in pumps {
            handle.abort();
        }
        lock(&self.inner.subscribed).clear();
    }

    // ===== Readers =====

    /// Copy of the current in-memory model
    pub fn model(&self) -> DashboardModel {
        self.inner.model().clone()
    }

    pub fn state(&self, kind: CollectionKind) -> CollectionState {
        self.inner.state(kind)
    }

    /// Receiver that observes a new revision after every memory change
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.inner.revision.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn display_name(&self) -> String {
        self.inner
            .local
            .load::<String>(keys::USER_NAME)
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.default_name.clone())
            .unwrap_or_else(|| ANONYMOUS.to_string())
    }

    /// Wait until every collection has been loaded once, from either store
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        self.wait_for(timeout, |inner| inner.is_ready()).await
    }

    /// Wait until `predicate` holds for the model, or the timeout elapses
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> bool
    where
        F: FnMut(&DashboardModel) -> bool,
    {
        self.wait_for(timeout, |inner| predicate(&inner.model())).await
    }

    async fn wait_for<F>(&self, timeout: Duration, mut check: F) -> bool
    where
        F: FnMut(&SyncInner) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut changes = self.changes();
        loop {
            if check(&self.inner) {
                return true;
            }
            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                _ => return check(&self.inner),
            }
        }
    }

    // ===== Generic write path =====

    /// Try `remote_op` when the collection is live; otherwise, or when it
    /// fails, apply `local_op` to memory and persist the collection.
    async fn with_fallback<RemoteOp, Fut, LocalOp>(
        &self,
        kind: CollectionKind,
        remote_op: RemoteOp,
        local_op: LocalOp,
    ) -> Result<WriteOutcome>
    where
        RemoteOp: FnOnce(Arc<dyn RemoteStore>) -> Fut,
        Fut: Future<Output = std::result::Result<(), RemoteError>>,
        LocalOp: FnOnce(&mut DashboardModel) -> Result<()>,
    {
        if let Some(remote) = self.inner.live_remote(kind) {
            match remote_op(remote).await {
                Ok(()) => return Ok(WriteOutcome::Remote),
                Err(e) => {
                    log::warn!("Sync: remote write to {} failed, applying locally: {}", kind, e);
                    self.inner.set_state(kind, CollectionState::LocalOnly);
                }
            }
        }

        // Persisting an unloaded collection would overwrite its snapshot
        if !self.inner.is_loaded(kind) {
            log::info!("Sync: loading local {} before a fallback write", kind);
            self.inner.load_local(kind);
        }
        self.inner.apply_local(kind, local_op)?;
        Ok(WriteOutcome::Local)
    }

    /// Validate and store a new record
    pub async fn add_record<R: ManagedRecord>(&self, record: R) -> Result<WriteOutcome> {
        record.validate()?;
        let fields = document_fields(&record)?;
        let ids = &self.inner.ids;

        self.with_fallback(
            R::KIND,
            |remote| async move { remote.create(R::KIND.remote_name(), fields).await.map(|_| ()) },
            move |model| {
                let mut record = record;
                record.set_id(RecordId::Local(ids.next()));
                R::insert(model, record);
                Ok(())
            },
        )
        .await
    }

    /// Merge the set fields of `patch` into the record with `id`
    pub async fn update_record<R: ManagedRecord>(&self, id: &RecordId, patch: R::Patch) -> Result<WriteOutcome> {
        R::validate_patch(&patch)?;
        let partial = serde_json::to_value(&patch)?;

        self.with_fallback(
            R::KIND,
            |remote| async move {
                match id.as_remote() {
                    Some(remote_id) => remote.update(R::KIND.remote_name(), remote_id, partial).await,
                    None => Err(RemoteError::NotFound(format!("{}/{} is local only", R::KIND, id))),
                }
            },
            |model| {
                if R::update(model, id, &patch) {
                    Ok(())
                } else {
                    Err(SyncError::RecordNotFound(id.clone()))
                }
            },
        )
        .await
    }

    pub async fn delete_record<R: ManagedRecord>(&self, id: &RecordId) -> Result<WriteOutcome> {
        self.with_fallback(
            R::KIND,
            |remote| async move {
                match id.as_remote() {
                    Some(remote_id) => remote.delete(R::KIND.remote_name(), remote_id).await,
                    None => Err(RemoteError::NotFound(format!("{}/{} is local only", R::KIND, id))),
                }
            },
            |model| {
                if R::remove(model, id) {
                    Ok(())
                } else {
                    Err(SyncError::RecordNotFound(id.clone()))
                }
            },
        )
        .await
    }

    /// Overwrite the shared morph chart
    pub async fn save_morph_chart(
        &self,
        header: Vec<String>,
        table: Vec<Vec<String>>,
        notes: String,
    ) -> Result<WriteOutcome> {
        let chart = MorphChart::new(header, table, notes, &self.display_name());
        chart.validate()?;
        let fields = document_fields(&chart)?;

        let mut created = self.inner.morph_chart_id.lock().await;
        let existing = self
            .inner
            .model()
            .morph_chart
            .as_ref()
            .and_then(|current| current.id.clone());
        let remote_id = existing
            .as_ref()
            .and_then(RecordId::as_remote)
            .map(str::to_string)
            .or_else(|| created.clone());
        let ids = &self.inner.ids;
        let collection = CollectionKind::MorphChart.remote_name();
        let created = &mut *created;

        self.with_fallback(
            CollectionKind::MorphChart,
            |remote| async move {
                match remote_id {
                    Some(id) => remote.update(collection, &id, fields).await,
                    None => {
                        let id = remote.create(collection, fields).await?;
                        *created = Some(id);
                        Ok(())
                    }
                }
            },
            move |model| {
                let mut chart = chart;
                chart.id = Some(existing.unwrap_or_else(|| RecordId::Local(ids.next())));
                model.morph_chart = Some(chart);
                Ok(())
            },
        )
        .await
    }

    // ===== Typed conveniences =====

    pub async fn add_event(&self, draft: EventDraft) -> Result<WriteOutcome> {
        let event = draft.into_event(&self.display_name());
        self.add_record(event).await
    }

    pub async fn edit_event(&self, id: &RecordId, patch: EventPatch) -> Result<WriteOutcome> {
        self.update_record::<Event>(id, patch).await
    }

    pub async fn delete_event(&self, id: &RecordId) -> Result<WriteOutcome> {
        self.delete_record::<Event>(id).await
    }

    pub async fn add_task(&self, draft: TaskDraft) -> Result<WriteOutcome> {
        let task = draft.into_task(&self.display_name())?;
        self.add_record(task).await
    }

    /// Flip a task's completion flag based on what memory currently holds.
    ///
    /// A remote toggle returns once memory shows the new flag (or after a
    /// short timeout), so a second toggle reads the first one's result.
    pub async fn toggle_task(&self, id: &RecordId) -> Result<WriteOutcome> {
        let completed = self
            .inner
            .model()
            .tasks
            .iter()
            .find(|task| task.id.as_ref() == Some(id))
            .map(|task| task.completed)
            .ok_or_else(|| SyncError::RecordNotFound(id.clone()))?;

        let outcome = self.update_record::<Task>(id, TaskPatch::completed(!completed)).await?;
        if outcome == WriteOutcome::Remote {
            let echoed = self
                .wait_until(ECHO_TIMEOUT, |model| {
                    model
                        .tasks
                        .iter()
                        .any(|task| task.id.as_ref() == Some(id) && task.completed != completed)
                })
                .await;
            if !echoed {
                log::warn!("Sync: toggle of task {} not reflected within {:?}", id, ECHO_TIMEOUT);
            }
        }
        Ok(outcome)
    }

    pub async fn delete_task(&self, id: &RecordId) -> Result<WriteOutcome> {
        self.delete_record::<Task>(id).await
    }

    pub async fn add_link(&self, draft: LinkDraft) -> Result<WriteOutcome> {
        self.add_record(draft.into_link()?).await
    }

    /// Add a link for a PDF picked from disk. Only the file name is kept.
    pub async fn add_uploaded_document(&self, draft: LinkDraft, file_name: &str) -> Result<WriteOutcome> {
        let file_name = file_name.trim();
        if !file_name.to_ascii_lowercase().ends_with(".pdf") {
            return Err(ValidationError("Only PDF files can be uploaded".to_string()).into());
        }
        let mut link = draft.into_link()?;
        link.is_uploaded = true;
        link.file_name = Some(file_name.to_string());
        self.add_record(link).await
    }

    pub async fn delete_link(&self, id: &RecordId) -> Result<WriteOutcome> {
        self.delete_record::<Link>(id).await
    }

    // ===== Local-only settings and maintenance =====

    pub fn set_display_name(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError("Display name is required".to_string()).into());
        }
        self.inner.local.save(keys::USER_NAME, name);
        Ok(())
    }

    /// Drop the local collection snapshots and reset memory to a fresh board.
    /// Live collections are refilled by their next snapshot.
    pub fn clear_local_data(&self) {
        log::info!("Sync: clearing local data");
        for kind in CollectionKind::ALL {
            self.inner.local.remove(kind.local_key());
        }
        {
            let mut model = self.inner.model();
            *model = DashboardModel {
                links: Links::defaults(),
                ..DashboardModel::default()
            };
            model.persist(CollectionKind::Links, &self.inner.local);
        }
        self.inner.notify();
    }

    /// Replace the links with the built-in set, in memory and locally
    pub fn reset_links_to_defaults(&self) -> Result<()> {
        self.inner.apply_local(CollectionKind::Links, |model| {
            model.links = Links::defaults();
            Ok(())
        })
    }
}

impl Drop for Synchronizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
