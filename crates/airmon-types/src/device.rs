//! Per-device configuration and calibration history records.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;
use crate::types::{DEFAULT_CALIBRATION_VERSION, GasType};

/// Inclusive `[min, max]` range, encoded as a two-element JSON array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRange(pub f64, pub f64);

impl ThresholdRange {
    pub fn min(&self) -> f64 {
        self.0
    }

    pub fn max(&self) -> f64 {
        self.1
    }

    /// True when `value` lies within the range, bounds included.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.0 && value <= self.1
    }
}

/// Normal / warning / critical bands for one gas, in percent.
///
/// Stored as JSON text, e.g. `{"normal":[19,22],"warning":[16,19],"critical":[0,16]}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasThresholds {
    pub normal: ThresholdRange,
    pub warning: ThresholdRange,
    pub critical: ThresholdRange,
}

impl GasThresholds {
    /// Bands for a gas where higher concentrations are worse.
    pub const fn rising(warning: f64, critical: f64) -> Self {
        Self {
            normal: ThresholdRange(0.0, warning),
            warning: ThresholdRange(warning, critical),
            critical: ThresholdRange(critical, 100.0),
        }
    }
}

/// Threshold bands for every gas a configuration tracks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GasThresholdSet {
    pub oxygen: GasThresholds,
    pub co2: GasThresholds,
    pub co: GasThresholds,
    pub ammonia: GasThresholds,
    pub nox: GasThresholds,
    pub vapor: GasThresholds,
    pub smoke: GasThresholds,
    pub toluene: GasThresholds,
}

impl Default for GasThresholdSet {
    fn default() -> Self {
        Self {
            oxygen: GasThresholds {
                normal: ThresholdRange(19.0, 22.0),
                warning: ThresholdRange(16.0, 19.0),
                critical: ThresholdRange(0.0, 16.0),
            },
            co2: GasThresholds::rising(0.1, 0.5),
            co: GasThresholds::rising(0.2, 0.5),
            ammonia: GasThresholds::rising(0.5, 1.5),
            nox: GasThresholds::rising(0.05, 0.2),
            vapor: GasThresholds::rising(3.0, 5.0),
            smoke: GasThresholds::rising(0.1, 0.3),
            toluene: GasThresholds::rising(0.05, 0.2),
        }
    }
}

impl GasThresholdSet {
    /// Bands configured for `gas`, if this set tracks it.
    pub fn for_gas(&self, gas: GasType) -> Option<&GasThresholds> {
        match gas {
            GasType::Oxygen => Some(&self.oxygen),
            GasType::CarbonDioxide => Some(&self.co2),
            GasType::CarbonMonoxide => Some(&self.co),
            GasType::Ammonia => Some(&self.ammonia),
            GasType::NitrogenOxides => Some(&self.nox),
            GasType::WaterVapor => Some(&self.vapor),
            GasType::Toluene => Some(&self.toluene),
            GasType::Alcohol | GasType::Benzene | GasType::Acetone => None,
        }
    }
}

/// Lifecycle of a device's calibration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationStatus {
    #[default]
    Active,
    Expired,
    Pending,
}

impl CalibrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationStatus::Active => "active",
            CalibrationStatus::Expired => "expired",
            CalibrationStatus::Pending => "pending",
        }
    }
}

impl FromStr for CalibrationStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CalibrationStatus::Active),
            "expired" => Ok(CalibrationStatus::Expired),
            "pending" => Ok(CalibrationStatus::Pending),
            other => Err(ParseError::InvalidData(format!(
                "unknown calibration status '{other}'"
            ))),
        }
    }
}

/// Alerting, sync and placement settings for one device.
///
/// At most one active configuration exists per `device_id`; superseded rows
/// are deactivated rather than deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfiguration {
    pub id: String,
    pub device_id: String,
    pub device_name: String,
    /// Sensor family, e.g. `MQ135` or `Simulation`.
    pub device_type: String,
    #[serde(with = "time::serde::rfc3339")]
    pub calibration_date: OffsetDateTime,
    pub calibration_version: String,
    pub calibration_status: CalibrationStatus,
    pub thresholds: GasThresholdSet,
    pub location: Option<String>,
    /// bedroom, kitchen, office, living_room
    pub room_type: Option<String>,
    pub is_indoor: bool,
    pub alerts_enabled: bool,
    pub critical_alerts_enabled: bool,
    pub alert_cooldown_minutes: u32,
    pub email_notifications: bool,
    pub push_notifications: bool,
    pub auto_sync: bool,
    pub sync_interval_minutes: u32,
    pub only_wifi: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub is_active: bool,
    pub user_id: Option<String>,
}

impl DeviceConfiguration {
    /// A fresh active configuration with default bands and settings.
    pub fn new(device_id: &str, device_name: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            device_name: device_name.to_string(),
            device_type: "MQ135".to_string(),
            calibration_date: now,
            calibration_version: DEFAULT_CALIBRATION_VERSION.to_string(),
            calibration_status: CalibrationStatus::Active,
            thresholds: GasThresholdSet::default(),
            location: None,
            room_type: None,
            is_indoor: true,
            alerts_enabled: true,
            critical_alerts_enabled: true,
            alert_cooldown_minutes: 15,
            email_notifications: false,
            push_notifications: true,
            auto_sync: true,
            sync_interval_minutes: 30,
            only_wifi: false,
            created_at: now,
            updated_at: now,
            is_active: true,
            user_id: None,
        }
    }
}

/// How a calibration was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationType {
    Manual,
    Automatic,
    FactoryReset,
}

impl CalibrationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalibrationType::Manual => "manual",
            CalibrationType::Automatic => "automatic",
            CalibrationType::FactoryReset => "factory_reset",
        }
    }
}

impl FromStr for CalibrationType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(CalibrationType::Manual),
            "automatic" => Ok(CalibrationType::Automatic),
            "factory_reset" => Ok(CalibrationType::FactoryReset),
            other => Err(ParseError::InvalidData(format!(
                "unknown calibration type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CalibrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One calibration event. Never updated after insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub id: String,
    pub device_id: String,
    pub calibration_type: CalibrationType,
    #[serde(with = "time::serde::rfc3339")]
    pub calibration_date: OffsetDateTime,
    /// Reference values the sensor was calibrated against.
    pub reference_values: serde_json::Value,
    /// Values measured before adjustment.
    pub measured_values: serde_json::Value,
    /// Correction factors applied.
    pub adjustment_factors: serde_json::Value,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub calibration_success: bool,
    /// Accuracy gain in percent.
    pub accuracy_improvement: Option<f64>,
    pub notes: Option<String>,
    /// user, system, technician
    pub performed_by: Option<String>,
    pub version: String,
    pub is_active: bool,
}

impl CalibrationRecord {
    /// A new active record dated now.
    pub fn new(device_id: &str, calibration_type: CalibrationType, success: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            device_id: device_id.to_string(),
            calibration_type,
            calibration_date: OffsetDateTime::now_utc(),
            reference_values: serde_json::Value::Null,
            measured_values: serde_json::Value::Null,
            adjustment_factors: serde_json::Value::Null,
            temperature: 0.0,
            humidity: 0.0,
            pressure: None,
            calibration_success: success,
            accuracy_improvement: None,
            notes: None,
            performed_by: None,
            version: DEFAULT_CALIBRATION_VERSION.to_string(),
            is_active: true,
        }
    }
}
