//! Remote per-user document store.
//!
//! Documents live under one tree per user:
//!
//! | Path | Contents |
//! |------|----------|
//! | `users/{uid}` | [`UserProfile`] |
//! | `users/{uid}/sensor_readings` | one [`RemoteReading`] per document |
//! | `users/{uid}/settings` | [`UserSettings`] |
//! | `users/{uid}/files/{name}` | uploaded blobs |
//!
//! Every operation is a single request/response. Writes replace the whole
//! document. Nothing is retried at this layer; failures come back as a
//! [`RemoteError`] carrying the cause.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use airmon_types::{
    AirQualityLevel, AlertLevel, DataOrigin, GasLevels, GasType, SensorReading, UserProfile,
    UserSettings, from_unix_millis, to_unix_millis,
};

/// Errors returned by a [`RemoteStore`].
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteError {
    /// The store could not be reached.
    #[error("Remote store unreachable: {0}")]
    Network(String),

    /// Credentials missing or rejected.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Authenticated but not allowed to touch this path.
    #[error("Permission denied for {path}")]
    PermissionDenied { path: String },

    /// The document does not exist.
    #[error("Document not found: {path}")]
    NotFound { path: String },

    /// A document could not be encoded or decoded.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// The store answered with an error.
    #[error("Remote store error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Map an HTTP status to the closest variant.
    pub fn from_status(status: u16, path: &str, message: impl Into<String>) -> Self {
        match status {
            401 => RemoteError::Unauthenticated,
            403 => RemoteError::PermissionDenied {
                path: path.to_string(),
            },
            404 => RemoteError::NotFound {
                path: path.to_string(),
            },
            _ => RemoteError::Server {
                status,
                message: message.into(),
            },
        }
    }
}

/// Result type for remote operations.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Collection holding one document per user.
pub const USERS: &str = "users";
/// Per-user reading collection.
pub const READINGS: &str = "sensor_readings";
/// Per-user settings document.
pub const SETTINGS: &str = "settings";
/// Per-user file folder.
pub const FILES: &str = "files";

// The helpers below build display keys; transports that address documents
// by URL must encode each segment on its own.

/// `users/{uid}`
pub fn user_path(user_id: &str) -> String {
    format!("{USERS}/{user_id}")
}

/// `users/{uid}/sensor_readings`
pub fn readings_path(user_id: &str) -> String {
    format!("{USERS}/{user_id}/{READINGS}")
}

/// `users/{uid}/settings`
pub fn settings_path(user_id: &str) -> String {
    format!("{USERS}/{user_id}/{SETTINGS}")
}

/// `users/{uid}/files/{name}`
pub fn file_path(user_id: &str, name: &str) -> String {
    format!("{USERS}/{user_id}/{FILES}/{name}")
}

/// A reading as stored in the remote document tree.
///
/// Gas concentrations are kept as a map keyed by storage column name so
/// documents written without a breakdown simply have an empty map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReading {
    /// Id of the local row this document was created from.
    pub reading_id: String,
    pub device_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Capture time, epoch milliseconds.
    pub captured_at: i64,
    pub ppm: u32,
    pub air_quality_level: AirQualityLevel,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default)]
    pub pressure: Option<f64>,
    #[serde(default)]
    pub gas_composition: BTreeMap<String, f64>,
    pub quality_index: u16,
    pub alert_level: AlertLevel,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub is_simulated: bool,
    #[serde(default)]
    pub data_source: DataOrigin,
    #[serde(default)]
    pub calibration_version: Option<String>,
    /// Assigned by the store on write; ignored on upload.
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<OffsetDateTime>,
}

impl RemoteReading {
    /// Build the remote document for a local reading.
    pub fn from_reading(reading: &SensorReading, user_id: &str) -> Self {
        let gas_composition = reading
            .gases
            .map(|g| {
                g.iter()
                    .map(|(gas, value)| (gas.column().to_string(), value))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            reading_id: reading.id.clone(),
            device_id: reading.device_id.clone(),
            user_id: user_id.to_string(),
            captured_at: to_unix_millis(reading.timestamp),
            ppm: reading.ppm,
            air_quality_level: reading.air_quality_level,
            temperature: reading.temperature,
            humidity: reading.humidity,
            pressure: reading.pressure,
            gas_composition,
            quality_index: reading.quality_index,
            alert_level: reading.alert_level,
            location: reading.location.clone(),
            is_simulated: reading.is_simulated,
            data_source: reading.data_source,
            calibration_version: Some(reading.calibration_version.clone()),
            timestamp: None,
        }
    }

    /// Rebuild a local reading from a remote document.
    ///
    /// The capture time wins over the server timestamp; a breakdown is only
    /// restored when every gas is present.
    pub fn into_reading(self) -> SensorReading {
        let timestamp = from_unix_millis(self.captured_at)
            .or(self.timestamp)
            .unwrap_or_else(OffsetDateTime::now_utc);

        let gases = gas_levels_from_map(&self.gas_composition);

        SensorReading {
            id: self.reading_id,
            timestamp,
            device_id: self.device_id,
            location: self.location,
            ppm: self.ppm,
            gases,
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            air_quality_level: self.air_quality_level,
            quality_index: self.quality_index,
            alert_level: self.alert_level,
            is_simulated: self.is_simulated,
            calibration_version: self
                .calibration_version
                .unwrap_or_else(|| airmon_types::types::DEFAULT_CALIBRATION_VERSION.to_string()),
            data_source: self.data_source,
        }
    }
}

fn gas_levels_from_map(map: &BTreeMap<String, f64>) -> Option<GasLevels> {
    let get = |gas: GasType| map.get(gas.column()).copied();
    Some(GasLevels {
        oxygen: get(GasType::Oxygen)?,
        carbon_dioxide: get(GasType::CarbonDioxide)?,
        carbon_monoxide: get(GasType::CarbonMonoxide)?,
        ammonia: get(GasType::Ammonia)?,
        nitrogen_oxides: get(GasType::NitrogenOxides)?,
        water_vapor: get(GasType::WaterVapor)?,
        alcohol: get(GasType::Alcohol)?,
        toluene: get(GasType::Toluene)?,
        benzene: get(GasType::Benzene)?,
        acetone: get(GasType::Acetone)?,
    })
}

/// A per-user remote document store.
///
/// Implementations must be cheap to share behind an `Arc`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Append a reading document; returns the new document id.
    async fn save_reading(&self, user_id: &str, reading: &RemoteReading) -> RemoteResult<String>;

    /// Most recent readings, newest first by server timestamp.
    async fn latest_readings(&self, user_id: &str, limit: usize)
    -> RemoteResult<Vec<RemoteReading>>;

    /// Replace the profile document.
    async fn save_profile(&self, profile: &UserProfile) -> RemoteResult<()>;

    /// Fetch the profile document, if one exists.
    async fn get_profile(&self, user_id: &str) -> RemoteResult<Option<UserProfile>>;

    /// Replace the settings document.
    async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> RemoteResult<()>;

    /// Fetch the settings document, if one exists.
    async fn get_settings(&self, user_id: &str) -> RemoteResult<Option<UserSettings>>;

    /// Store a blob; returns its download URL.
    async fn upload_file(&self, user_id: &str, name: &str, data: &[u8]) -> RemoteResult<String>;
}
