//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use airmon_core::{ClassifierConfig, SimulationMode};
use airmon_types::{AlertThresholds, AppSettings, UserSettings};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection and threshold preferences shared with the dashboard.
    pub app: AppSettings,
    /// How readings are labelled and where they come from.
    pub device: DeviceConfig,
    /// Per-gas alert thresholds used for classification.
    pub alerts: AlertThresholds,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Remote document store.
    pub remote: RemoteConfig,
    /// Sync and retention schedule.
    pub sync: SyncConfig,
    /// Settings document pushed to the remote store.
    pub user_settings: UserSettings,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    ///
    /// ```
    /// use airmon_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(validate_app(&self.app));
        errors.extend(self.device.validate());
        errors.extend(validate_alerts(&self.alerts));
        errors.extend(self.storage.validate());
        errors.extend(self.remote.validate());
        errors.extend(self.sync.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Classifier settings from the board thresholds and the alert section.
    pub fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::from_profile(self.app.thresholds(), &self.alerts)
    }

    /// Delay between samples.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.app.data_refresh_interval_ms)
    }
}

/// Smallest accepted refresh interval in milliseconds.
pub const MIN_REFRESH_INTERVAL_MS: u64 = 100;
/// Largest accepted refresh interval in milliseconds (1 hour).
pub const MAX_REFRESH_INTERVAL_MS: u64 = 3_600_000;

fn validate_app(app: &AppSettings) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if app.warning_threshold >= app.critical_threshold {
        errors.push(ValidationError {
            field: "app.warning_threshold".to_string(),
            message: format!(
                "warning threshold {} must be below critical threshold {}",
                app.warning_threshold, app.critical_threshold
            ),
        });
    }

    if app.data_refresh_interval_ms < MIN_REFRESH_INTERVAL_MS {
        errors.push(ValidationError {
            field: "app.data_refresh_interval_ms".to_string(),
            message: format!(
                "refresh interval {} is too short (minimum {} ms)",
                app.data_refresh_interval_ms, MIN_REFRESH_INTERVAL_MS
            ),
        });
    } else if app.data_refresh_interval_ms > MAX_REFRESH_INTERVAL_MS {
        errors.push(ValidationError {
            field: "app.data_refresh_interval_ms".to_string(),
            message: format!(
                "refresh interval {} is too long (maximum {} ms / 1 hour)",
                app.data_refresh_interval_ms, MAX_REFRESH_INTERVAL_MS
            ),
        });
    }

    match &app.device_address {
        Some(address) => {
            if let Some(message) = check_host_port(address) {
                errors.push(ValidationError {
                    field: "app.device_address".to_string(),
                    message,
                });
            }
        }
        None if !app.simulation_mode => errors.push(ValidationError {
            field: "app.device_address".to_string(),
            message: "a device address is required when simulation_mode is false".to_string(),
        }),
        None => {}
    }

    errors
}

fn check_host_port(address: &str) -> Option<String> {
    if address.is_empty() {
        return Some("device address cannot be empty".to_string());
    }
    let Some((_, port)) = address.rsplit_once(':') else {
        return Some(format!(
            "invalid device address '{}': expected format 'host:port'",
            address
        ));
    };
    match port.parse::<u16>() {
        Ok(0) => Some("port cannot be 0".to_string()),
        Ok(_) => None,
        Err(_) => Some(format!("invalid port '{}': must be a number 1-65535", port)),
    }
}

fn validate_alerts(alerts: &AlertThresholds) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut rising = |field: &str, warning: f64, critical: f64| {
        if warning >= critical {
            errors.push(ValidationError {
                field: format!("alerts.{}", field),
                message: format!("warning {} must be below critical {}", warning, critical),
            });
        }
    };
    rising("co2_warning", alerts.co2_warning, alerts.co2_critical);
    rising("co_warning", alerts.co_warning, alerts.co_critical);

    if alerts.o2_low <= alerts.o2_critical {
        errors.push(ValidationError {
            field: "alerts.o2_low".to_string(),
            message: format!(
                "low oxygen level {} must be above critical level {}",
                alerts.o2_low, alerts.o2_critical
            ),
        });
    }
    errors
}

/// Reading labels and simulator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device id stamped on every reading.
    pub id: String,
    /// Location stamped on every reading.
    pub location: Option<String>,
    /// Simulator behaviour when `app.simulation_mode` is on.
    pub simulation: SimulationMode,
    /// Fixed simulator seed for reproducible runs.
    pub seed: Option<u64>,
    /// Stop collecting after this many consecutive source failures.
    pub max_consecutive_failures: Option<u32>,
}

/// Device id used when none is configured.
pub const DEFAULT_DEVICE_ID: &str = "AirMonitor_TI3042_001";

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: DEFAULT_DEVICE_ID.to_string(),
            location: None,
            simulation: SimulationMode::Replay,
            seed: None,
            max_consecutive_failures: None,
        }
    }
}

impl DeviceConfig {
    /// Validate device configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.id.trim().is_empty() {
            errors.push(ValidationError {
                field: "device.id".to_string(),
                message: "device id cannot be empty".to_string(),
            });
        }

        if let Some(location) = &self.location
            && location.is_empty()
        {
            errors.push(ValidationError {
                field: "device.location".to_string(),
                message: "location cannot be empty string (omit it instead)".to_string(),
            });
        }

        if self.max_consecutive_failures == Some(0) {
            errors.push(ValidationError {
                field: "device.max_consecutive_failures".to_string(),
                message: "must be at least 1 (omit it to retry forever)".to_string(),
            });
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: airmon_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// URL scheme selecting the in-memory remote store.
pub const MEMORY_REMOTE_URL: &str = "memory://";

/// Remote document store configuration.
///
/// Without a `base_url` the service runs local-only and never syncs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// `http(s)://` gateway URL, or `memory://` for an in-process store.
    pub base_url: Option<String>,
    /// Owner of the remote documents.
    pub user_id: String,
    /// Bearer token sent with every request.
    pub api_token: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_id: String::new(),
            api_token: None,
            timeout_secs: 10,
        }
    }
}

impl RemoteConfig {
    /// True when a remote store is configured.
    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate remote configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let Some(url) = &self.base_url else {
            return errors;
        };

        if url != MEMORY_REMOTE_URL && !url.starts_with("http://") && !url.starts_with("https://")
        {
            errors.push(ValidationError {
                field: "remote.base_url".to_string(),
                message: format!(
                    "URL must start with http://, https:// or be {}, got: {}",
                    MEMORY_REMOTE_URL, url
                ),
            });
        }

        if self.user_id.trim().is_empty() {
            errors.push(ValidationError {
                field: "remote.user_id".to_string(),
                message: "user id is required when a remote store is configured".to_string(),
            });
        }

        if self.timeout_secs == 0 {
            errors.push(ValidationError {
                field: "remote.timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }

        errors
    }
}

/// Sync loop and retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between reconcile passes.
    pub interval_secs: u64,
    /// Most readings uploaded per pass.
    pub batch_size: Option<u32>,
    /// Readings older than this many days are deleted.
    pub retention_days: u32,
    /// Simulated readings are deleted sooner when set.
    pub simulated_retention_days: Option<u32>,
}

/// Minimum sync interval in seconds.
pub const MIN_SYNC_INTERVAL: u64 = 10;
/// Maximum sync interval in seconds (1 day).
pub const MAX_SYNC_INTERVAL: u64 = 86_400;

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            batch_size: Some(100),
            retention_days: 30,
            simulated_retention_days: None,
        }
    }
}

impl SyncConfig {
    /// Delay between reconcile passes.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.interval_secs < MIN_SYNC_INTERVAL {
            errors.push(ValidationError {
                field: "sync.interval_secs".to_string(),
                message: format!(
                    "sync interval {} is too short (minimum {} seconds)",
                    self.interval_secs, MIN_SYNC_INTERVAL
                ),
            });
        } else if self.interval_secs > MAX_SYNC_INTERVAL {
            errors.push(ValidationError {
                field: "sync.interval_secs".to_string(),
                message: format!(
                    "sync interval {} is too long (maximum {} seconds / 1 day)",
                    self.interval_secs, MAX_SYNC_INTERVAL
                ),
            });
        }

        if self.batch_size == Some(0) {
            errors.push(ValidationError {
                field: "sync.batch_size".to_string(),
                message: "batch size must be at least 1 (omit it for no cap)".to_string(),
            });
        }

        if self.retention_days == 0 {
            errors.push(ValidationError {
                field: "sync.retention_days".to_string(),
                message: "retention must be at least 1 day".to_string(),
            });
        }

        if self.simulated_retention_days == Some(0) {
            errors.push(ValidationError {
                field: "sync.simulated_retention_days".to_string(),
                message: "retention must be at least 1 day".to_string(),
            });
        }

        errors
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `app.device_address` or `sync.interval_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("airmon")
        .join("service.toml")
}
