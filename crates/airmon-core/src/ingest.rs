//! Turning raw samples into classified readings.
//!
//! A [`Sample`] is what a data source measured; a [`SensorReading`] is the
//! immutable record the rest of the pipeline stores and syncs. The
//! [`Ingestor`] does the conversion, stamping the id and the computed
//! levels.

use time::OffsetDateTime;
use tracing::trace;

use airmon_types::types::DEFAULT_CALIBRATION_VERSION;
use airmon_types::{
    DataOrigin, GasLevels, SensorData, SensorReading, SystemStatus, from_unix_millis,
};

use crate::thresholds::{Classifier, quality_index};

/// One measurement as produced by a data source.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub timestamp: OffsetDateTime,
    pub ppm: u32,
    pub gases: Option<GasLevels>,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: Option<f64>,
    pub origin: DataOrigin,
    /// Actuator state reported alongside the measurement.
    pub system: Option<SystemStatus>,
}

impl Sample {
    /// Build a sample from a status frame.
    ///
    /// Frames without a usable clock (`timestamp <= 0`) are stamped with the
    /// current time.
    pub fn from_frame(frame: &SensorData, origin: DataOrigin) -> Self {
        let timestamp = if frame.timestamp > 0 {
            from_unix_millis(frame.timestamp)
        } else {
            None
        };
        Self {
            timestamp: timestamp.unwrap_or_else(OffsetDateTime::now_utc),
            ppm: frame.air_quality.ppm,
            gases: None,
            temperature: round2(f64::from(frame.air_quality.temperature)),
            humidity: f64::from(frame.air_quality.humidity),
            pressure: None,
            origin,
            system: Some(frame.system.clone()),
        }
    }

    /// Attach a gas breakdown.
    #[must_use]
    pub fn with_gases(mut self, gases: GasLevels) -> Self {
        self.gases = Some(gases);
        self
    }

    /// Attach a pressure value in hPa.
    #[must_use]
    pub fn with_pressure(mut self, pressure: f64) -> Self {
        self.pressure = Some(pressure);
        self
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Converts samples into classified readings for one device.
#[derive(Debug, Clone)]
pub struct Ingestor {
    device_id: String,
    location: Option<String>,
    calibration_version: String,
    classifier: Classifier,
}

impl Ingestor {
    pub fn new(device_id: impl Into<String>, classifier: Classifier) -> Self {
        Self {
            device_id: device_id.into(),
            location: None,
            calibration_version: DEFAULT_CALIBRATION_VERSION.to_string(),
            classifier,
        }
    }

    /// Location label stamped on every reading.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_calibration_version(mut self, version: impl Into<String>) -> Self {
        self.calibration_version = version.into();
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    /// Replace the classifier, e.g. after the board reports new thresholds.
    pub fn set_classifier(&mut self, classifier: Classifier) {
        self.classifier = classifier;
    }

    /// Classify a sample into a new reading with a fresh id.
    ///
    /// The air quality level is recomputed from the PPM value rather than
    /// trusted from the board, whose level labels are not guaranteed.
    pub fn ingest(&self, sample: &Sample) -> SensorReading {
        let gases = sample.gases.as_ref();
        let reading = SensorReading {
            id: SensorReading::new_id(),
            timestamp: sample.timestamp,
            device_id: self.device_id.clone(),
            location: self.location.clone(),
            ppm: sample.ppm,
            gases: sample.gases,
            temperature: sample.temperature,
            humidity: sample.humidity,
            pressure: sample.pressure,
            air_quality_level: self.classifier.air_quality(sample.ppm),
            quality_index: quality_index(sample.ppm, gases),
            alert_level: self.classifier.alert_level(sample.ppm, gases),
            is_simulated: sample.origin == DataOrigin::Simulation,
            calibration_version: self.calibration_version.clone(),
            data_source: sample.origin,
        };
        trace!(
            "Ingested {} ppm as {} / {}",
            reading.ppm, reading.air_quality_level, reading.alert_level
        );
        reading
    }

    /// Shorthand for [`Sample::from_frame`] followed by [`Ingestor::ingest`].
    pub fn ingest_frame(&self, frame: &SensorData, origin: DataOrigin) -> SensorReading {
        self.ingest(&Sample::from_frame(frame, origin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airmon_types::{AirQuality, AirQualityLevel, AlertLevel, Thresholds};

    fn frame(ppm: u32, timestamp: i64) -> SensorData {
        SensorData {
            device: "AirMonitor_TI3042".to_string(),
            version: None,
            timestamp,
            air_quality: AirQuality {
                ppm,
                level: AirQualityLevel::Unknown,
                temperature: 23.5,
                humidity: 62,
            },
            system: SystemStatus {
                fan_status: true,
                buzzer_active: false,
                auto_mode: true,
                uptime: 7500,
            },
            thresholds: Thresholds::default(),
        }
    }

    #[test]
    fn test_ingest_frame_recomputes_levels() {
        let ingestor = Ingestor::new("AirMonitor_TI3042_001", Classifier::default());
        let reading = ingestor.ingest_frame(&frame(421, 1_699_099_200_000), DataOrigin::Mq135);

        assert_eq!(reading.device_id, "AirMonitor_TI3042_001");
        assert_eq!(reading.air_quality_level, AirQualityLevel::Poor);
        assert_eq!(reading.alert_level, AlertLevel::Critical);
        assert_eq!(reading.quality_index, 21);
        assert!(!reading.is_simulated);
        assert_eq!(reading.gases, None);
        assert_eq!(reading.calibration_version, "1.0");
        assert_eq!(airmon_types::to_unix_millis(reading.timestamp), 1_699_099_200_000);
    }

    #[test]
    fn test_frame_without_clock_uses_now() {
        let before = OffsetDateTime::now_utc();
        let sample = Sample::from_frame(&frame(145, 0), DataOrigin::Simulation);
        assert!(sample.timestamp >= before);
        assert!((sample.temperature - 23.5).abs() < 1e-9);
    }

    #[test]
    fn test_ingest_with_gases() {
        let ingestor = Ingestor::new("dev", Classifier::default()).with_location("Lab");
        let sample = Sample::from_frame(&frame(145, 0), DataOrigin::Simulation)
            .with_gases(GasLevels {
                oxygen: 20.9,
                carbon_dioxide: 0.3,
                ..GasLevels::default()
            })
            .with_pressure(1013.25);

        let reading = ingestor.ingest(&sample);
        assert_eq!(reading.alert_level, AlertLevel::Warning);
        assert_eq!(reading.location.as_deref(), Some("Lab"));
        assert_eq!(reading.pressure, Some(1013.25));
        assert!(reading.is_simulated);
    }

    #[test]
    fn test_each_reading_gets_unique_id() {
        let ingestor = Ingestor::new("dev", Classifier::default());
        let sample = Sample::from_frame(&frame(100, 0), DataOrigin::Manual);
        assert_ne!(ingestor.ingest(&sample).id, ingestor.ingest(&sample).id);
    }
}
