//! Application state shared by the collector and sync tasks.
//!
//! # Broadcast Channel Behavior
//!
//! Every reading the collector stores is also sent on `readings_tx`.
//! Subscribers that fall behind lose the oldest events; senders never block.
//! A send with no subscribers is not an error for the collector.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, broadcast};

use airmon_store::Store;
use airmon_types::SensorReading;

use crate::config::Config;

/// Capacity of the reading broadcast channel.
pub const BROADCAST_BUFFER: usize = 100;

/// Shared application state.
pub struct AppState {
    /// The local cache. Never hold this lock across a remote call.
    pub store: Mutex<Store>,
    /// Configuration (RwLock for runtime updates).
    pub config: RwLock<Config>,
    /// Broadcast channel for freshly stored readings.
    pub readings_tx: broadcast::Sender<ReadingEvent>,
    /// Collector progress.
    pub collector: CollectorState,
}

impl AppState {
    /// Create new application state.
    pub fn new(store: Store, config: Config) -> Arc<Self> {
        let (readings_tx, _) = broadcast::channel(BROADCAST_BUFFER);
        Arc::new(Self {
            store: Mutex::new(store),
            config: RwLock::new(config),
            readings_tx,
            collector: CollectorState::new(),
        })
    }
}

/// Counters and status of the collector task.
#[derive(Debug, Default)]
pub struct CollectorState {
    running: AtomicBool,
    /// Unix timestamp of the last start, 0 when never started.
    started_at: AtomicU64,
    stats: RwLock<CollectionStats>,
}

impl CollectorState {
    /// Create a new collector state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the collector is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the collector as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// Get the collector start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// Snapshot of the counters.
    pub async fn stats(&self) -> CollectionStats {
        self.stats.read().await.clone()
    }

    pub(crate) async fn record_success(&self) {
        let mut stats = self.stats.write().await;
        stats.success_count += 1;
        stats.last_reading_at = Some(OffsetDateTime::now_utc());
    }

    pub(crate) async fn record_failure(&self, error: impl Into<String>) {
        let mut stats = self.stats.write().await;
        stats.failure_count += 1;
        stats.last_error_at = Some(OffsetDateTime::now_utc());
        stats.last_error = Some(error.into());
    }
}

/// Collection statistics for the configured device.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct CollectionStats {
    /// Time of the last stored reading.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_reading_at: Option<OffsetDateTime>,
    /// Time of the last failed sample or write.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Readings stored.
    pub success_count: u64,
    /// Samples or writes that failed.
    pub failure_count: u64,
}

/// A stored reading, as broadcast to subscribers.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReadingEvent {
    /// Device ID.
    pub device_id: String,
    /// The reading data.
    pub reading: SensorReading,
}

impl ReadingEvent {
    pub fn new(reading: SensorReading) -> Self {
        Self {
            device_id: reading.device_id.clone(),
            reading,
        }
    }
}
