//! Local data persistence for AirMonitor readings.
//!
//! This crate provides the SQLite cache that sits between ingestion and the
//! remote store. It keeps every reading with its upload state, the active
//! configuration of each device and its calibration history.
//!
//! # Features
//!
//! - Store classified readings with upload bookkeeping
//! - Query by device, time window, alert level, with pagination
//! - Averages, extremes and per-gas statistics over a window
//! - One active configuration per device, soft deactivation
//! - Calibration audit trail
//! - Retention cleanup and CSV export
//!
//! # Example
//!
//! ```no_run
//! use airmon_store::{Store, ReadingQuery};
//!
//! let store = Store::open_default()?;
//!
//! let pending = store.unsynced_readings(Some(50))?;
//! println!("{} readings waiting for upload", pending.len());
//!
//! let query = ReadingQuery::new()
//!     .device("AirMonitor_TI3042_001")
//!     .limit(10);
//! let readings = store.query_readings(&query)?;
//! # Ok::<(), airmon_store::Error>(())
//! ```

mod error;
mod export;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{StoredReading, SyncCounts, SyncStatus};
pub use queries::ReadingQuery;
pub use schema::SCHEMA_VERSION;
pub use store::{GasStatistics, ReadingAverages, ReadingExtremes, Store};

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/airmon/data.db`
/// - macOS: `~/Library/Application Support/airmon/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\airmon\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("airmon")
        .join("data.db")
}
