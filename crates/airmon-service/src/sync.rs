//! Reconciling the local cache with the remote store.
//!
//! A pass selects pending rows, writes each to the remote store and records
//! the outcome on the row. Rows that fail stay pending with their error and
//! are picked up again on the next pass; nothing is retried within a pass.
//! The store lock is taken only around cache access, never across a remote
//! call.

use std::sync::Arc;

use time::{Duration as TimeDuration, OffsetDateTime};
use tokio::sync::Mutex;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use airmon_core::{HttpRemote, MockRemote, RemoteError, RemoteReading, RemoteStore};
use airmon_store::Store;
use airmon_types::UserSettings;

use crate::config::{MEMORY_REMOTE_URL, RemoteConfig, SyncConfig};
use crate::state::AppState;

/// Build the remote store the configuration points at.
///
/// Returns `None` when no remote is configured.
pub fn remote_from_config(config: &RemoteConfig) -> Result<Option<Arc<dyn RemoteStore>>, SyncError> {
    let Some(url) = config.base_url.as_deref() else {
        return Ok(None);
    };
    if url == MEMORY_REMOTE_URL {
        info!("Using in-memory remote store");
        return Ok(Some(Arc::new(MockRemote::new())));
    }
    let remote = HttpRemote::with_timeout(url, config.api_token.clone(), config.timeout())?;
    info!("Using remote store at {}", remote.base_url());
    Ok(Some(Arc::new(remote)))
}

/// Outcome of one reconcile pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Rows a write was attempted for.
    pub attempted: usize,
    /// Rows now marked uploaded.
    pub uploaded: usize,
    /// Rows left pending with an error.
    pub failed: usize,
    /// Reading id and cause for every failed row.
    pub errors: Vec<(String, RemoteError)>,
}

impl SyncReport {
    /// True when every attempted row was uploaded.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Outcome of restoring remote documents into the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Documents returned by the remote store.
    pub fetched: usize,
    /// Documents that were not cached yet.
    pub inserted: usize,
}

/// Rows removed by a retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub readings: usize,
    pub simulated: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.readings + self.simulated
    }
}

/// Moves readings and settings between the local cache and one user's
/// remote documents.
#[derive(Clone)]
pub struct Reconciler {
    remote: Arc<dyn RemoteStore>,
    user_id: String,
    batch_size: Option<u32>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("user_id", &self.user_id)
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

impl Reconciler {
    pub fn new(remote: Arc<dyn RemoteStore>, user_id: impl Into<String>) -> Self {
        Self {
            remote,
            user_id: user_id.into(),
            batch_size: None,
        }
    }

    /// Cap the rows attempted per pass; `None` attempts all of them.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: Option<u32>) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Upload pending readings, oldest first.
    ///
    /// Remote failures are recorded per row and reported; only cache errors
    /// abort the pass.
    pub async fn reconcile(&self, store: &Mutex<Store>) -> Result<SyncReport, SyncError> {
        let pending = store.lock().await.unsynced_readings(self.batch_size)?;
        let mut report = SyncReport {
            attempted: pending.len(),
            ..SyncReport::default()
        };
        if pending.is_empty() {
            debug!("Nothing to sync");
            return Ok(report);
        }

        debug!("Syncing {} pending readings", pending.len());
        for row in &pending {
            let document = RemoteReading::from_reading(&row.reading, &self.user_id);
            let outcome = self.remote.save_reading(&self.user_id, &document).await;

            let store = store.lock().await;
            match outcome {
                Ok(doc_id) => {
                    store.mark_uploaded(row.id())?;
                    report.uploaded += 1;
                    debug!("Uploaded reading {} as {}", row.id(), doc_id);
                }
                Err(e) => {
                    store.mark_sync_error(row.id(), &e.to_string())?;
                    report.failed += 1;
                    warn!("Failed to upload reading {}: {}", row.id(), e);
                    report.errors.push((row.id().to_string(), e));
                }
            }
        }

        info!(
            "Sync pass: {} uploaded, {} failed of {}",
            report.uploaded, report.failed, report.attempted
        );
        Ok(report)
    }

    /// Restore the most recent remote readings into the cache.
    ///
    /// Restored rows are already uploaded. Rows the cache already holds are
    /// left untouched.
    pub async fn pull_latest(&self, store: &Mutex<Store>, limit: usize) -> Result<PullReport, SyncError> {
        let documents = self.remote.latest_readings(&self.user_id, limit).await?;
        let mut report = PullReport {
            fetched: documents.len(),
            ..PullReport::default()
        };

        let store = store.lock().await;
        for document in documents {
            if store.insert_remote_reading(&document.into_reading())? {
                report.inserted += 1;
            }
        }
        info!(
            "Pulled {} remote readings ({} new)",
            report.fetched, report.inserted
        );
        Ok(report)
    }

    /// Replace the remote settings document.
    pub async fn push_settings(&self, settings: &UserSettings) -> Result<(), SyncError> {
        self.remote.save_settings(&self.user_id, settings).await?;
        info!("Saved settings for {}", self.user_id);
        Ok(())
    }

    /// Fetch the remote settings document.
    pub async fn pull_settings(&self) -> Result<Option<UserSettings>, SyncError> {
        Ok(self.remote.get_settings(&self.user_id).await?)
    }

    /// Upload an exported file; returns its download URL.
    pub async fn upload_file(&self, name: &str, data: &[u8]) -> Result<String, SyncError> {
        let url = self.remote.upload_file(&self.user_id, name, data).await?;
        info!("Uploaded {} ({} bytes)", name, data.len());
        Ok(url)
    }
}

/// Delete readings past their retention window.
///
/// Rows are removed whether or not they were uploaded.
pub fn cleanup(store: &Store, config: &SyncConfig, now: OffsetDateTime) -> Result<CleanupReport, SyncError> {
    let mut report = CleanupReport::default();

    if let Some(days) = config.simulated_retention_days {
        let cutoff = now - TimeDuration::days(i64::from(days));
        report.simulated = store.delete_simulated_before(cutoff)?;
    }

    let cutoff = now - TimeDuration::days(i64::from(config.retention_days));
    report.readings = store.delete_readings_before(cutoff)?;

    if report.total() > 0 {
        info!(
            "Retention removed {} readings ({} simulated)",
            report.total(),
            report.simulated
        );
    }
    Ok(report)
}

/// Run reconcile and retention passes on the configured interval.
///
/// Without a reconciler only retention runs.
pub async fn run_sync_loop(
    state: Arc<AppState>,
    reconciler: Option<Reconciler>,
    cancel: CancellationToken,
) {
    let sync_config = state.config.read().await.sync.clone();
    let mut ticker = interval(sync_config.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut consecutive_failures = 0u32;

    info!(
        "Starting sync loop (interval: {}s, remote: {})",
        sync_config.interval_secs,
        if reconciler.is_some() { "enabled" } else { "disabled" }
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Sync loop cancelled");
                break;
            }
            _ = ticker.tick() => {}
        }

        if let Some(reconciler) = &reconciler {
            match reconciler.reconcile(&state.store).await {
                Ok(report) if report.is_clean() => consecutive_failures = 0,
                Ok(report) => {
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!("{} readings could not be uploaded", report.failed);
                    }
                }
                Err(e) => error!("Sync pass failed: {}", e),
            }
        }

        let sync_config = state.config.read().await.sync.clone();
        let store = state.store.lock().await;
        if let Err(e) = cleanup(&store, &sync_config, OffsetDateTime::now_utc()) {
            error!("Retention cleanup failed: {}", e);
        }
    }
}

/// Sync errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Local store error: {0}")]
    Store(#[from] airmon_store::Error),
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),
}
