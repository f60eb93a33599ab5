//! Core library for AirMonitor air-quality sensors.
//!
//! This crate sits between the wire types in `airmon-types` and the
//! persistence/service layers. It turns what a board sends into classified
//! readings and moves those readings to a remote per-user store.
//!
//! # Features
//!
//! - **Classification**: inclusive threshold bands for PPM and per-gas levels
//! - **Wire codec**: line-delimited JSON frames and commands
//! - **Data sources**: a TCP/serial device link and a built-in simulator
//! - **Streaming**: poll any source on a background task with command routing
//! - **Remote store**: a uniform `Result<T, RemoteError>` adapter with an
//!   in-memory implementation and an optional HTTP client (`http-remote`)
//!
//! # Quick Start
//!
//! ```
//! use airmon_core::{Classifier, DataSource, Ingestor, Simulator, SimulatorConfig};
//! use airmon_types::AlertLevel;
//!
//! # async fn example() -> airmon_core::Result<()> {
//! let mut source = Simulator::new(SimulatorConfig::default());
//! let ingestor = Ingestor::new("AirMonitor_TI3042_001", Classifier::default());
//!
//! let sample = source.next_sample().await?;
//! let reading = ingestor.ingest(&sample);
//! assert_eq!(reading.alert_level, AlertLevel::Normal);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
#[cfg(feature = "http-remote")]
pub mod http_remote;
pub mod ingest;
pub mod link;
pub mod mock;
pub mod remote;
pub mod simulator;
pub mod streaming;
pub mod thresholds;
pub mod traits;

pub use airmon_types::types;

pub use error::{Error, Result};
pub use ingest::{Ingestor, Sample};
pub use link::{DeviceLink, LinkConfig};
pub use mock::MockRemote;
pub use remote::{RemoteError, RemoteReading, RemoteResult, RemoteStore};
pub use simulator::{Scenario, SimulationMode, Simulator, SimulatorConfig};
pub use streaming::{CommandSender, SampleStream, StreamOptions};
pub use thresholds::{AlertPair, Classifier, ClassifierConfig, Direction};
pub use traits::DataSource;

#[cfg(feature = "http-remote")]
pub use http_remote::HttpRemote;

pub use airmon_types::{
    AirQualityLevel, AlertLevel, ControlCommand, DataOrigin, GasLevels, GasType, SensorData,
    SensorReading,
};
