use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::watch;

use teamboard::storage::RecordId;
use teamboard::{CollectionKind, DashboardConfig, Synchronizer, WriteOutcome};

/// How long to wait for the first live snapshot of every collection
const READY_TIMEOUT: Duration = Duration::from_secs(10);
/// How long to wait for a remote write to come back through the live query
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

/// One dashboard session for the duration of a command
pub struct App {
    pub sync: Synchronizer,
}

impl App {
    /// Load config, open the stores and wait for the initial snapshots
    pub async fn start(config_path: Option<&Path>, offline: bool) -> Result<Self> {
        let path = match config_path {
            Some(path) => path.to_path_buf(),
            None => DashboardConfig::default_path().context("Failed to locate config directory")?,
        };
        let mut config = DashboardConfig::load(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        config.apply_env();

        let sync = Synchronizer::from_config(&config, offline).context("Failed to open dashboard")?;
        sync.start().await;
        if !sync.wait_ready(READY_TIMEOUT).await {
            log::warn!("Some collections did not load within {:?}", READY_TIMEOUT);
        }

        Ok(Self { sync })
    }

    /// Run a write and, when it went to the remote store, wait for the live
    /// snapshot that reflects it
    pub async fn write<F>(&self, write: F) -> Result<WriteOutcome>
    where
        F: std::future::Future<Output = teamboard::sync::Result<WriteOutcome>>,
    {
        let changes = self.sync.changes();
        let outcome = write.await?;
        self.settle(outcome, changes).await;
        Ok(outcome)
    }

    async fn settle(&self, outcome: WriteOutcome, mut changes: watch::Receiver<u64>) {
        if outcome == WriteOutcome::Remote
            && tokio::time::timeout(SETTLE_TIMEOUT, changes.changed()).await.is_err()
        {
            log::warn!("No live update within {:?}; the change may show up later", SETTLE_TIMEOUT);
        }
    }

    /// Resolve a record id typed on the command line. Ids already on the
    /// board win over parsing, so numeric remote ids stay addressable.
    pub fn parse_id(&self, kind: CollectionKind, id: &str) -> Result<RecordId> {
        if let Some(found) = self.sync.model().find_id(kind, id) {
            return Ok(found);
        }
        id.parse::<RecordId>()
            .map_err(|e| anyhow::anyhow!("Invalid record id '{}': {}", id, e))
    }
}
