//! Platform-agnostic types for AirMonitor air-quality sensors.
//!
//! This crate provides the shared vocabulary of the AirMonitor pipeline:
//! the JSON documents exchanged with the ESP32/MQ-135 board, severity
//! levels, per-gas concentrations, classified readings and the settings
//! documents stored per user.
//!
//! # Features
//!
//! - Wire model for status frames and control commands
//! - Four-band air quality and three-level alert enums
//! - Reading, device configuration and calibration records
//! - Error types for data parsing
//!
//! # Example
//!
//! ```
//! use airmon_types::{AirQualityLevel, SensorData};
//!
//! let json = r#"{"device":"AirMonitor_TI3042","version":"1.0","timestamp":0,
//!     "air_quality":{"ppm":234,"level":"moderate","temperature":23.1,"humidity":52},
//!     "system":{"fan_status":true,"buzzer_active":false,"auto_mode":true,"uptime":67890},
//!     "thresholds":{"warning":200,"critical":400}}"#;
//! let frame: SensorData = serde_json::from_str(json).unwrap();
//! assert_eq!(frame.air_quality.level, AirQualityLevel::Moderate);
//! ```

pub mod device;
pub mod error;
pub mod settings;
pub mod types;
pub mod wire;

pub use device::{
    CalibrationRecord, CalibrationStatus, CalibrationType, DeviceConfiguration, GasThresholdSet,
    GasThresholds, ThresholdRange,
};
pub use error::{ParseError, ParseResult};
pub use settings::{AlertThresholds, AppSettings, UserProfile, UserSettings};
pub use types::{
    AirQualityLevel, AlertLevel, DataOrigin, GasLevels, GasType, SensorReading,
    from_unix_millis, to_unix_millis,
};
pub use wire::{AirQuality, ControlCommand, SensorData, SystemStatus, Thresholds, Toggle};


/// Property-based tests for the wire model.
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn level_strategy() -> impl Strategy<Value = AirQualityLevel> {
        prop_oneof![
            Just(AirQualityLevel::Good),
            Just(AirQualityLevel::Moderate),
            Just(AirQualityLevel::Poor),
            Just(AirQualityLevel::Critical),
        ]
    }

    proptest! {
        /// Encoding then decoding a frame preserves every field.
        #[test]
        fn sensor_data_json_roundtrip(
            ppm in 0u32..5000,
            level in level_strategy(),
            tenths in -400i32..850,
            humidity in 0u8..=100,
            fan: bool,
            buzzer: bool,
            auto_mode: bool,
            uptime: u64,
            version in proptest::option::of("[0-9]\\.[0-9]"),
            timestamp in 0i64..4_000_000_000_000,
        ) {
            let frame = SensorData {
                device: "AirMonitor_TI3042".to_string(),
                version,
                timestamp,
                air_quality: AirQuality { ppm, level, temperature: tenths as f32 / 10.0, humidity },
                system: SystemStatus { fan_status: fan, buzzer_active: buzzer, auto_mode, uptime },
                thresholds: Thresholds::default(),
            };
            let json = serde_json::to_string(&frame).unwrap();
            let back: SensorData = serde_json::from_str(&json).unwrap();

            prop_assert_eq!(&back.version, &frame.version);
            prop_assert_eq!(back.timestamp, frame.timestamp);
            prop_assert_eq!(&back.system, &frame.system);
            prop_assert_eq!(back.air_quality.ppm, ppm);
            prop_assert_eq!(back.air_quality.level, level);
            prop_assert!((back.air_quality.temperature - frame.air_quality.temperature).abs() < 1e-3);
        }

        /// Decoding arbitrary text never panics.
        #[test]
        fn sensor_data_decode_never_panics(text: String) {
            let _ = serde_json::from_str::<SensorData>(&text);
        }

        /// Levels are monotonic in PPM.
        #[test]
        fn air_quality_level_monotonic(a: u32, b: u32) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(AirQualityLevel::from_ppm(lo) <= AirQualityLevel::from_ppm(hi));
        }
    }
}
