//! Application, user and profile settings documents.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::wire::{DEFAULT_CRITICAL_PPM, DEFAULT_DEVICE_NAME, DEFAULT_WARNING_PPM, Thresholds};

/// Local application preferences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Name of the device to connect to.
    pub device_name: String,
    /// Device address (`host:port` for the socket link), if known.
    pub device_address: Option<String>,
    pub auto_connect: bool,
    /// How often the UI expects a fresh frame, in milliseconds.
    pub data_refresh_interval_ms: u64,
    pub notifications_enabled: bool,
    /// PPM above which a reading is a warning.
    pub warning_threshold: u32,
    /// PPM above which a reading is critical.
    pub critical_threshold: u32,
    /// Use the simulator instead of hardware.
    pub simulation_mode: bool,
    pub dark_mode: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            device_address: None,
            auto_connect: true,
            data_refresh_interval_ms: 2000,
            notifications_enabled: true,
            warning_threshold: DEFAULT_WARNING_PPM,
            critical_threshold: DEFAULT_CRITICAL_PPM,
            simulation_mode: true,
            dark_mode: false,
        }
    }
}

impl AppSettings {
    /// Thresholds as sent to the board.
    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            warning: self.warning_threshold,
            critical: self.critical_threshold,
        }
    }
}

/// Per-user settings document kept in the remote store.
///
/// Saved wholesale; the remote assigns `last_modified`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserSettings {
    /// PPM alert threshold.
    pub alert_threshold: u32,
    pub notifications_enabled: bool,
    pub alert_sound: bool,
    pub vibration: bool,
    /// Seconds between automatic saves.
    pub auto_save_interval_secs: u32,
    pub data_retention_days: u32,
    pub device_name: String,
    pub location: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_modified: Option<OffsetDateTime>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            alert_threshold: 300,
            notifications_enabled: true,
            alert_sound: true,
            vibration: true,
            auto_save_interval_secs: 60,
            data_retention_days: 30,
            device_name: "AirMonitor".to_string(),
            location: String::new(),
            last_modified: None,
        }
    }
}

/// Per-gas alert thresholds attached to a profile, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub co2_warning: f64,
    pub co2_critical: f64,
    pub co_warning: f64,
    pub co_critical: f64,
    /// Oxygen below this is a warning.
    pub o2_low: f64,
    /// Oxygen below this is critical.
    pub o2_critical: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            co2_warning: 0.1,
            co2_critical: 0.5,
            co_warning: 0.2,
            co_critical: 0.5,
            o2_low: 16.0,
            o2_critical: 12.0,
        }
    }
}

/// The user document at `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub device_ids: Vec<String>,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
    #[serde(default)]
    pub alert_thresholds: AlertThresholds,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_login_at: OffsetDateTime,
}

fn default_true() -> bool {
    true
}

impl UserProfile {
    /// A new profile with default thresholds, created now.
    pub fn new(id: &str, email: &str, display_name: &str) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            phone_number: None,
            location: None,
            device_ids: Vec::new(),
            notifications_enabled: true,
            alert_thresholds: AlertThresholds::default(),
            created_at: now,
            last_login_at: now,
        }
    }
}
