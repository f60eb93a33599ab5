//! JSON documents exchanged with the ESP32 board.
//!
//! The board emits one [`SensorData`] document per line and accepts one
//! [`ControlCommand`] document per line. Field names follow the firmware's
//! snake_case keys exactly.
//!
//! ```
//! use airmon_types::wire::ControlCommand;
//!
//! let cmd = ControlCommand::fan(true);
//! assert_eq!(cmd.action, "control");
//! assert!(cmd.buzzer.is_none());
//! ```

use serde::{Deserialize, Serialize};

use crate::types::AirQualityLevel;

/// Device name the firmware reports by default.
pub const DEFAULT_DEVICE_NAME: &str = "AirMonitor_TI3042";

/// Default warning threshold (PPM).
pub const DEFAULT_WARNING_PPM: u32 = 200;

/// Default critical threshold (PPM).
pub const DEFAULT_CRITICAL_PPM: u32 = 400;

fn default_device_name() -> String {
    DEFAULT_DEVICE_NAME.to_string()
}

/// A status frame sent by the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    /// Device name.
    #[serde(default = "default_device_name")]
    pub device: String,
    /// Firmware version string, if reported.
    #[serde(default)]
    pub version: Option<String>,
    /// Milliseconds since the Unix epoch (0 when the board has no clock).
    #[serde(default)]
    pub timestamp: i64,
    /// Current air-quality sample.
    pub air_quality: AirQuality,
    /// Actuator state.
    pub system: SystemStatus,
    /// Thresholds the board is using.
    #[serde(default)]
    pub thresholds: Thresholds,
}

/// The `air_quality` object of a [`SensorData`] frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirQuality {
    /// MQ-135 reading.
    pub ppm: u32,
    /// Level as computed on the board.
    pub level: AirQualityLevel,
    /// Temperature in Celsius.
    pub temperature: f32,
    /// Relative humidity percentage.
    pub humidity: u8,
}

/// The `system` object of a [`SensorData`] frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Fan relay on.
    pub fan_status: bool,
    /// Buzzer sounding.
    pub buzzer_active: bool,
    /// Board drives fan/buzzer from thresholds.
    pub auto_mode: bool,
    /// Milliseconds since boot.
    pub uptime: u64,
}

impl SystemStatus {
    /// Human-readable uptime using the two most significant units.
    ///
    /// ```
    /// use airmon_types::wire::SystemStatus;
    ///
    /// let status = SystemStatus { fan_status: false, buzzer_active: false, auto_mode: true, uptime: 90_061_000 };
    /// assert_eq!(status.formatted_uptime(), "1d 1h");
    /// ```
    pub fn formatted_uptime(&self) -> String {
        let seconds = self.uptime / 1000;
        let minutes = seconds / 60;
        let hours = minutes / 60;
        let days = hours / 24;

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds % 60)
        } else {
            format!("{}s", seconds)
        }
    }
}

/// Warning/critical PPM pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warning: u32,
    pub critical: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: DEFAULT_WARNING_PPM,
            critical: DEFAULT_CRITICAL_PPM,
        }
    }
}

/// `{"enable": bool}` switch used for both fan and buzzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Toggle {
    pub enable: bool,
}

fn default_action() -> String {
    "control".to_string()
}

/// A command sent to the board.
///
/// Unset fields are omitted from the encoded document so the board only
/// touches what the command names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlCommand {
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fan: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buzzer: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Thresholds>,
}

impl Default for ControlCommand {
    fn default() -> Self {
        Self {
            action: default_action(),
            fan: None,
            buzzer: None,
            auto_mode: None,
            thresholds: None,
        }
    }
}

impl ControlCommand {
    /// Switch the fan.
    pub fn fan(enable: bool) -> Self {
        Self {
            fan: Some(Toggle { enable }),
            ..Self::default()
        }
    }

    /// Switch the buzzer.
    pub fn buzzer(enable: bool) -> Self {
        Self {
            buzzer: Some(Toggle { enable }),
            ..Self::default()
        }
    }

    /// Enable or disable automatic fan/buzzer control.
    pub fn auto_mode(enable: bool) -> Self {
        Self {
            auto_mode: Some(enable),
            ..Self::default()
        }
    }

    /// Push new thresholds to the board.
    pub fn set_thresholds(warning: u32, critical: u32) -> Self {
        Self {
            thresholds: Some(Thresholds { warning, critical }),
            ..Self::default()
        }
    }

    /// True when the command would change nothing.
    pub fn is_empty(&self) -> bool {
        self.fan.is_none()
            && self.buzzer.is_none()
            && self.auto_mode.is_none()
            && self.thresholds.is_none()
    }
}
