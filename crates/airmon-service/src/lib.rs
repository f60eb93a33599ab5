//! Background collector and sync service for AirMonitor sensors.
//!
//! This crate provides a service that:
//! - Samples the configured board (or the built-in simulator)
//! - Classifies and stores readings in the local cache
//! - Uploads pending readings to the remote per-user store
//! - Applies retention to old rows
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/airmon/service.toml`:
//!
//! ```toml
//! [app]
//! device_address = "192.168.4.1:8080"
//! simulation_mode = false
//! data_refresh_interval_ms = 2000
//! warning_threshold = 200
//! critical_threshold = 400
//!
//! [device]
//! id = "AirMonitor_TI3042_001"
//! location = "Office"
//!
//! [storage]
//! path = "~/.local/share/airmon/data.db"
//!
//! [remote]
//! base_url = "https://store.example.com/v1"
//! user_id = "user-1"
//! api_token = "..."
//!
//! [sync]
//! interval_secs = 300
//! batch_size = 100
//! retention_days = 30
//! ```
//!
//! Without a `[remote]` base URL the service runs local-only.

pub mod collector;
pub mod config;
pub mod state;
pub mod sync;

pub use collector::{Collector, CollectorError, build_ingestor, open_source};
pub use config::{
    Config, ConfigError, DeviceConfig, RemoteConfig, StorageConfig, SyncConfig, ValidationError,
};
pub use state::{AppState, CollectionStats, ReadingEvent};
pub use sync::{
    CleanupReport, PullReport, Reconciler, SyncError, SyncReport, cleanup, remote_from_config,
    run_sync_loop,
};
