//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use airmon_types::SensorReading;

/// Upload bookkeeping kept beside each reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// The remote store has accepted this reading.
    pub is_uploaded: bool,
    /// When an upload was last attempted.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_attempt: Option<OffsetDateTime>,
    /// Reason the last attempt failed.
    pub sync_error: Option<String>,
}

impl SyncStatus {
    /// Status of a row pulled from the remote store.
    pub fn uploaded() -> Self {
        Self {
            is_uploaded: true,
            last_sync_attempt: Some(OffsetDateTime::now_utc()),
            sync_error: None,
        }
    }

    /// True when an upload was attempted and failed.
    pub fn has_failed(&self) -> bool {
        !self.is_uploaded && self.sync_error.is_some()
    }
}

/// A reading stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// The reading as ingested.
    #[serde(flatten)]
    pub reading: SensorReading,
    /// Upload state.
    #[serde(flatten)]
    pub sync: SyncStatus,
}

impl StoredReading {
    /// Row id (the reading's UUID).
    pub fn id(&self) -> &str {
        &self.reading.id
    }

    /// Unwrap into the reading.
    pub fn into_reading(self) -> SensorReading {
        self.reading
    }
}

/// Upload progress across the whole cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    /// Rows the remote store has accepted.
    pub uploaded: u64,
    /// Rows never attempted.
    pub pending: u64,
    /// Rows whose last attempt failed.
    pub failed: u64,
}

impl SyncCounts {
    /// Rows still waiting for an upload, failed ones included.
    pub fn unsynced(&self) -> u64 {
        self.pending + self.failed
    }
}
