//! Core types for AirMonitor sensor data.

use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::ParseError;

/// Parts-per-million contained in one volume percent.
pub const PPM_PER_PERCENT: f64 = 10_000.0;

/// Upper PPM bound (inclusive) of [`AirQualityLevel::Good`].
pub const GOOD_MAX_PPM: u32 = 150;
/// Upper PPM bound (inclusive) of [`AirQualityLevel::Moderate`].
pub const MODERATE_MAX_PPM: u32 = 300;
/// Upper PPM bound (inclusive) of [`AirQualityLevel::Poor`].
pub const POOR_MAX_PPM: u32 = 500;

/// Four-band air quality level reported for an MQ-135 PPM value.
///
/// # Ordering
///
/// Values are ordered by severity: `Unknown < Good < Moderate < Poor < Critical`.
///
/// # Serialization
///
/// Levels travel as lowercase strings (`"good"`, `"moderate"`, ...). Any other
/// string the device sends decodes as [`AirQualityLevel::Unknown`].
///
/// ```
/// use airmon_types::AirQualityLevel;
///
/// assert_eq!(AirQualityLevel::from_ppm(150), AirQualityLevel::Good);
/// assert_eq!(AirQualityLevel::from_ppm(501), AirQualityLevel::Critical);
/// assert!(AirQualityLevel::Poor > AirQualityLevel::Moderate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AirQualityLevel {
    /// 0-150 PPM.
    Good,
    /// 151-300 PPM.
    Moderate,
    /// 301-500 PPM.
    Poor,
    /// Above 500 PPM.
    Critical,
    /// Level string not recognised. Orders below every band.
    #[serde(other)]
    Unknown,
}

impl AirQualityLevel {
    /// Position in severity order; [`AirQualityLevel::Unknown`] is lowest.
    fn severity(self) -> u8 {
        match self {
            AirQualityLevel::Unknown => 0,
            AirQualityLevel::Good => 1,
            AirQualityLevel::Moderate => 2,
            AirQualityLevel::Poor => 3,
            AirQualityLevel::Critical => 4,
        }
    }

    /// Classify a PPM value using the fixed bands.
    ///
    /// Boundaries are inclusive: a value equal to a band's upper bound stays in
    /// that band.
    #[must_use]
    pub fn from_ppm(ppm: u32) -> Self {
        if ppm <= GOOD_MAX_PPM {
            AirQualityLevel::Good
        } else if ppm <= MODERATE_MAX_PPM {
            AirQualityLevel::Moderate
        } else if ppm <= POOR_MAX_PPM {
            AirQualityLevel::Poor
        } else {
            AirQualityLevel::Critical
        }
    }

    /// Lowercase wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            AirQualityLevel::Unknown => "unknown",
            AirQualityLevel::Good => "good",
            AirQualityLevel::Moderate => "moderate",
            AirQualityLevel::Poor => "poor",
            AirQualityLevel::Critical => "critical",
        }
    }

    /// Display colour used by dashboards (hex RGB).
    pub fn color(&self) -> &'static str {
        match self {
            AirQualityLevel::Good => "#4CAF50",
            AirQualityLevel::Moderate => "#FF9800",
            AirQualityLevel::Poor => "#F44336",
            AirQualityLevel::Critical => "#9C27B0",
            AirQualityLevel::Unknown => "#9E9E9E",
        }
    }

    /// Short human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            AirQualityLevel::Good => "Good - clean air",
            AirQualityLevel::Moderate => "Moderate - acceptable for most people",
            AirQualityLevel::Poor => "Poor - ventilation recommended",
            AirQualityLevel::Critical => "Critical - unhealthy air",
            AirQualityLevel::Unknown => "Unknown - no valid reading",
        }
    }

    /// Suggested action for this level.
    pub fn action(&self) -> &'static str {
        match self {
            AirQualityLevel::Good | AirQualityLevel::Unknown => "No action needed",
            AirQualityLevel::Moderate => "Consider opening windows",
            AirQualityLevel::Poor => "Turn on the fan or ventilate",
            AirQualityLevel::Critical => "Ventilate immediately and leave the area",
        }
    }
}

impl PartialOrd for AirQualityLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for AirQualityLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.severity().cmp(&other.severity())
    }
}

impl FromStr for AirQualityLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "good" => Ok(AirQualityLevel::Good),
            "moderate" => Ok(AirQualityLevel::Moderate),
            "poor" => Ok(AirQualityLevel::Poor),
            "critical" => Ok(AirQualityLevel::Critical),
            "unknown" => Ok(AirQualityLevel::Unknown),
            other => Err(ParseError::InvalidData(format!(
                "unknown air quality level '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AirQualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AirQualityLevel::Unknown => write!(f, "Unknown"),
            AirQualityLevel::Good => write!(f, "Good"),
            AirQualityLevel::Moderate => write!(f, "Moderate"),
            AirQualityLevel::Poor => write!(f, "Poor"),
            AirQualityLevel::Critical => write!(f, "Critical"),
        }
    }
}

/// Three-level alert severity.
///
/// Ordered by severity so the overall level of a reading is the `max` of its
/// parts.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    /// Within normal bounds.
    #[default]
    Normal,
    /// Caution.
    Warning,
    /// Dangerous.
    Critical,
}

impl AlertLevel {
    /// Uppercase label used in storage and remote documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Normal => "NORMAL",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Critical => "CRITICAL",
        }
    }
}

impl FromStr for AlertLevel {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NORMAL" => Ok(AlertLevel::Normal),
            "WARNING" => Ok(AlertLevel::Warning),
            "CRITICAL" => Ok(AlertLevel::Critical),
            other => Err(ParseError::InvalidData(format!(
                "unknown alert level '{other}'"
            ))),
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gases estimated from the MQ-135 response curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasType {
    /// O2.
    Oxygen,
    /// CO2.
    CarbonDioxide,
    /// CO.
    CarbonMonoxide,
    /// NH3.
    Ammonia,
    /// NOx.
    NitrogenOxides,
    /// H2O vapour.
    WaterVapor,
    /// Ethanol.
    Alcohol,
    /// C7H8.
    Toluene,
    /// C6H6.
    Benzene,
    /// C3H6O.
    Acetone,
}

impl GasType {
    /// Every gas, in storage column order.
    pub const ALL: [GasType; 10] = [
        GasType::Oxygen,
        GasType::CarbonDioxide,
        GasType::CarbonMonoxide,
        GasType::Ammonia,
        GasType::NitrogenOxides,
        GasType::WaterVapor,
        GasType::Alcohol,
        GasType::Toluene,
        GasType::Benzene,
        GasType::Acetone,
    ];

    /// Chemical symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            GasType::Oxygen => "O2",
            GasType::CarbonDioxide => "CO2",
            GasType::CarbonMonoxide => "CO",
            GasType::Ammonia => "NH3",
            GasType::NitrogenOxides => "NOx",
            GasType::WaterVapor => "H2O",
            GasType::Alcohol => "C2H5OH",
            GasType::Toluene => "C7H8",
            GasType::Benzene => "C6H6",
            GasType::Acetone => "C3H6O",
        }
    }

    /// Database column holding this gas.
    pub fn column(&self) -> &'static str {
        match self {
            GasType::Oxygen => "oxygen",
            GasType::CarbonDioxide => "co2",
            GasType::CarbonMonoxide => "co",
            GasType::Ammonia => "ammonia",
            GasType::NitrogenOxides => "nox",
            GasType::WaterVapor => "water_vapor",
            GasType::Alcohol => "alcohol",
            GasType::Toluene => "toluene",
            GasType::Benzene => "benzene",
            GasType::Acetone => "acetone",
        }
    }
}

impl FromStr for GasType {
    type Err = ParseError;

    /// Accepts symbols and common names, case-insensitively.
    ///
    /// ```
    /// use airmon_types::GasType;
    ///
    /// assert_eq!("co2".parse::<GasType>().unwrap(), GasType::CarbonDioxide);
    /// assert_eq!("NOX".parse::<GasType>().unwrap(), GasType::NitrogenOxides);
    /// assert!("radon".parse::<GasType>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "O2" | "OXYGEN" => Ok(GasType::Oxygen),
            "CO2" | "CARBON_DIOXIDE" => Ok(GasType::CarbonDioxide),
            "CO" | "CARBON_MONOXIDE" => Ok(GasType::CarbonMonoxide),
            "NH3" | "AMMONIA" => Ok(GasType::Ammonia),
            "NOX" | "NITROGEN_OXIDES" => Ok(GasType::NitrogenOxides),
            "H2O" | "VAPOR" | "WATER_VAPOR" => Ok(GasType::WaterVapor),
            "ALCOHOL" | "ETHANOL" | "C2H5OH" => Ok(GasType::Alcohol),
            "TOLUENE" | "C7H8" => Ok(GasType::Toluene),
            "BENZENE" | "C6H6" => Ok(GasType::Benzene),
            "ACETONE" | "C3H6O" => Ok(GasType::Acetone),
            _ => Err(ParseError::UnknownGas(s.to_string())),
        }
    }
}

impl fmt::Display for GasType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Per-gas concentrations, in volume percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GasLevels {
    pub oxygen: f64,
    pub carbon_dioxide: f64,
    pub carbon_monoxide: f64,
    pub ammonia: f64,
    pub nitrogen_oxides: f64,
    pub water_vapor: f64,
    pub alcohol: f64,
    pub toluene: f64,
    pub benzene: f64,
    pub acetone: f64,
}

impl GasLevels {
    /// Concentration of one gas, in percent.
    pub fn get(&self, gas: GasType) -> f64 {
        match gas {
            GasType::Oxygen => self.oxygen,
            GasType::CarbonDioxide => self.carbon_dioxide,
            GasType::CarbonMonoxide => self.carbon_monoxide,
            GasType::Ammonia => self.ammonia,
            GasType::NitrogenOxides => self.nitrogen_oxides,
            GasType::WaterVapor => self.water_vapor,
            GasType::Alcohol => self.alcohol,
            GasType::Toluene => self.toluene,
            GasType::Benzene => self.benzene,
            GasType::Acetone => self.acetone,
        }
    }

    /// Concentration of one gas, in PPM.
    pub fn ppm(&self, gas: GasType) -> f64 {
        self.get(gas) * PPM_PER_PERCENT
    }

    /// Iterate `(gas, percent)` pairs in [`GasType::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (GasType, f64)> + '_ {
        GasType::ALL.into_iter().map(move |gas| (gas, self.get(gas)))
    }
}

/// Where a reading came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataOrigin {
    /// The physical MQ-135 board.
    #[default]
    #[serde(rename = "MQ135")]
    Mq135,
    /// The built-in simulator.
    Simulation,
    /// Entered by hand.
    Manual,
}

impl DataOrigin {
    /// Storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataOrigin::Mq135 => "MQ135",
            DataOrigin::Simulation => "Simulation",
            DataOrigin::Manual => "Manual",
        }
    }
}

impl FromStr for DataOrigin {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MQ135" => Ok(DataOrigin::Mq135),
            "Simulation" => Ok(DataOrigin::Simulation),
            "Manual" => Ok(DataOrigin::Manual),
            other => Err(ParseError::InvalidData(format!(
                "unknown data origin '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DataOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default calibration version stamped on new readings.
pub const DEFAULT_CALIBRATION_VERSION: &str = "1.0";

/// One classified air-quality reading.
///
/// Readings are immutable once created. Upload bookkeeping lives in the
/// local cache, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// UUID v4 string.
    pub id: String,
    /// When the reading was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Device that produced the reading.
    pub device_id: String,
    /// Free-form location label.
    pub location: Option<String>,
    /// Raw MQ-135 PPM value.
    pub ppm: u32,
    /// Per-gas breakdown, when the source provides one.
    pub gases: Option<GasLevels>,
    /// Temperature in Celsius.
    pub temperature: f64,
    /// Relative humidity percentage.
    pub humidity: f64,
    /// Pressure in hPa.
    pub pressure: Option<f64>,
    /// Four-band level derived from `ppm`.
    pub air_quality_level: AirQualityLevel,
    /// Composite index, 0-500.
    pub quality_index: u16,
    /// Overall alert level.
    pub alert_level: AlertLevel,
    /// Produced by the simulator rather than hardware.
    pub is_simulated: bool,
    /// Calibration version in effect when captured.
    pub calibration_version: String,
    /// Source label.
    pub data_source: DataOrigin,
}

impl SensorReading {
    /// Generate a fresh reading id.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// True when the overall alert level is critical.
    pub fn is_critical(&self) -> bool {
        self.alert_level == AlertLevel::Critical
    }
}

/// Convert epoch milliseconds into a UTC timestamp.
///
/// Out-of-range values yield `None`.
pub fn from_unix_millis(millis: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()
}

/// Convert a timestamp into epoch milliseconds.
pub fn to_unix_millis(ts: OffsetDateTime) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}
