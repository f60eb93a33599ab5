//! Alert thresholds and severity classification.
//!
//! Every rule here is a pure function of its inputs: there is no hysteresis,
//! smoothing or debounce, and a reading is classified on its own.
//!
//! Boundaries are inclusive. For a rising pair `(warning, critical)`:
//!
//! | Value | Level |
//! |-------|-------|
//! | `<= warning` | Normal |
//! | `<= critical` | Warning |
//! | above | Critical |
//!
//! # Example
//!
//! ```
//! use airmon_core::{Classifier, thresholds::classify};
//! use airmon_types::{AirQualityLevel, AlertLevel};
//!
//! assert_eq!(classify(200, 200, 400), AlertLevel::Normal);
//! assert_eq!(classify(401, 200, 400), AlertLevel::Critical);
//!
//! let classifier = Classifier::default();
//! assert_eq!(classifier.air_quality(300), AirQualityLevel::Moderate);
//! ```

use serde::{Deserialize, Serialize};

use airmon_types::wire::Thresholds as PpmThresholds;
use airmon_types::{AirQualityLevel, AlertLevel, AlertThresholds, GasLevels, GasType};

/// Largest value the quality index can take.
pub const MAX_QUALITY_INDEX: u16 = 500;

/// Classify a PPM value against a rising `(warning, critical)` pair.
#[must_use]
pub fn classify(ppm: u32, warning: u32, critical: u32) -> AlertLevel {
    if ppm <= warning {
        AlertLevel::Normal
    } else if ppm <= critical {
        AlertLevel::Warning
    } else {
        AlertLevel::Critical
    }
}

/// Classify a value where lower is worse (oxygen).
#[must_use]
pub fn classify_falling(value: f64, warning: f64, critical: f64) -> AlertLevel {
    if value >= warning {
        AlertLevel::Normal
    } else if value >= critical {
        AlertLevel::Warning
    } else {
        AlertLevel::Critical
    }
}

/// Composite air quality index, 0-500.
///
/// With a gas breakdown the index is `co2_ppm / 1000 * 50 + co_ppm / 100 * 100`;
/// without one it falls back to the MQ-135 PPM as the CO2 term.
#[must_use]
pub fn quality_index(ppm: u32, gases: Option<&GasLevels>) -> u16 {
    let raw = match gases {
        Some(g) => {
            let co2_ppm = g.ppm(GasType::CarbonDioxide);
            let co_ppm = g.ppm(GasType::CarbonMonoxide);
            (co2_ppm / 1000.0) * 50.0 + (co_ppm / 100.0) * 100.0
        }
        None => (f64::from(ppm) / 1000.0) * 50.0,
    };
    raw.clamp(0.0, f64::from(MAX_QUALITY_INDEX)) as u16
}

/// Which way a gas gets more dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Higher is worse.
    Rising,
    /// Lower is worse.
    Falling,
}

/// A warning/critical pair for one gas, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertPair {
    pub warning: f64,
    pub critical: f64,
    pub direction: Direction,
}

impl AlertPair {
    pub const fn rising(warning: f64, critical: f64) -> Self {
        Self {
            warning,
            critical,
            direction: Direction::Rising,
        }
    }

    pub const fn falling(warning: f64, critical: f64) -> Self {
        Self {
            warning,
            critical,
            direction: Direction::Falling,
        }
    }

    /// Classify `value` against this pair.
    pub fn evaluate(&self, value: f64) -> AlertLevel {
        match self.direction {
            Direction::Rising => {
                if value <= self.warning {
                    AlertLevel::Normal
                } else if value <= self.critical {
                    AlertLevel::Warning
                } else {
                    AlertLevel::Critical
                }
            }
            Direction::Falling => classify_falling(value, self.warning, self.critical),
        }
    }
}

/// Configuration for the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// PPM pair the board itself uses.
    pub ppm: PpmThresholds,
    pub co2: AlertPair,
    pub co: AlertPair,
    pub oxygen: AlertPair,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self::from_profile(PpmThresholds::default(), &AlertThresholds::default())
    }
}

impl ClassifierConfig {
    /// Build a configuration from board thresholds and a profile's gas thresholds.
    pub fn from_profile(ppm: PpmThresholds, alerts: &AlertThresholds) -> Self {
        Self {
            ppm,
            co2: AlertPair::rising(alerts.co2_warning, alerts.co2_critical),
            co: AlertPair::rising(alerts.co_warning, alerts.co_critical),
            oxygen: AlertPair::falling(alerts.o2_low, alerts.o2_critical),
        }
    }

    /// Same gas pairs with a different PPM pair.
    #[must_use]
    pub fn with_ppm(mut self, warning: u32, critical: u32) -> Self {
        self.ppm = PpmThresholds { warning, critical };
        self
    }
}

/// Threshold evaluator for readings.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    /// Create a new classifier with the given configuration.
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Four-band level for a PPM value.
    pub fn air_quality(&self, ppm: u32) -> AirQualityLevel {
        AirQualityLevel::from_ppm(ppm)
    }

    /// Alert level of a PPM value against the board thresholds.
    pub fn evaluate_ppm(&self, ppm: u32) -> AlertLevel {
        classify(ppm, self.config.ppm.warning, self.config.ppm.critical)
    }

    /// Alert level of one gas, if the classifier tracks it.
    pub fn evaluate_gas(&self, gas: GasType, percent: f64) -> Option<AlertLevel> {
        let pair = match gas {
            GasType::CarbonDioxide => &self.config.co2,
            GasType::CarbonMonoxide => &self.config.co,
            GasType::Oxygen => &self.config.oxygen,
            _ => return None,
        };
        Some(pair.evaluate(percent))
    }

    /// Worst level across the tracked gases.
    pub fn evaluate_gases(&self, gases: &GasLevels) -> AlertLevel {
        gases
            .iter()
            .filter_map(|(gas, value)| self.evaluate_gas(gas, value))
            .max()
            .unwrap_or_default()
    }

    /// Overall alert level of a reading.
    ///
    /// The maximum of the PPM level and, when present, every gas level.
    pub fn alert_level(&self, ppm: u32, gases: Option<&GasLevels>) -> AlertLevel {
        let ppm_level = self.evaluate_ppm(ppm);
        match gases {
            Some(g) => ppm_level.max(self.evaluate_gases(g)),
            None => ppm_level,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_boundaries() {
        assert_eq!(classify(0, 200, 400), AlertLevel::Normal);
        assert_eq!(classify(200, 200, 400), AlertLevel::Normal);
        assert_eq!(classify(201, 200, 400), AlertLevel::Warning);
        assert_eq!(classify(400, 200, 400), AlertLevel::Warning);
        assert_eq!(classify(401, 200, 400), AlertLevel::Critical);
    }

    #[test]
    fn test_classify_falling_oxygen() {
        assert_eq!(classify_falling(20.9, 16.0, 12.0), AlertLevel::Normal);
        assert_eq!(classify_falling(16.0, 16.0, 12.0), AlertLevel::Normal);
        assert_eq!(classify_falling(15.9, 16.0, 12.0), AlertLevel::Warning);
        assert_eq!(classify_falling(12.0, 16.0, 12.0), AlertLevel::Warning);
        assert_eq!(classify_falling(11.9, 16.0, 12.0), AlertLevel::Critical);
    }

    #[test]
    fn test_quality_index() {
        // 625 ppm CO2 + 156.25 ppm CO -> 31.25 + 156.25
        let gases = GasLevels {
            carbon_dioxide: 0.0625,
            carbon_monoxide: 0.015625,
            ..GasLevels::default()
        };
        assert_eq!(quality_index(0, Some(&gases)), 187);
        assert_eq!(quality_index(1000, None), 50);
        assert_eq!(quality_index(u32::MAX, None), MAX_QUALITY_INDEX);

        let negative = GasLevels {
            carbon_dioxide: -1.0,
            ..GasLevels::default()
        };
        assert_eq!(quality_index(0, Some(&negative)), 0);
    }

    #[test]
    fn test_default_classifier_ppm() {
        let c = Classifier::default();
        assert_eq!(c.evaluate_ppm(145), AlertLevel::Normal);
        assert_eq!(c.evaluate_ppm(234), AlertLevel::Warning);
        assert_eq!(c.evaluate_ppm(421), AlertLevel::Critical);
    }

    #[test]
    fn test_custom_ppm_thresholds() {
        let c = Classifier::new(ClassifierConfig::default().with_ppm(250, 450));
        assert_eq!(c.evaluate_ppm(234), AlertLevel::Normal);
        assert_eq!(c.evaluate_ppm(421), AlertLevel::Warning);
    }

    #[test]
    fn test_evaluate_gas_untracked() {
        let c = Classifier::default();
        assert_eq!(c.evaluate_gas(GasType::Benzene, 99.0), None);
        assert_eq!(
            c.evaluate_gas(GasType::CarbonDioxide, 0.3),
            Some(AlertLevel::Warning)
        );
    }

    #[test]
    fn test_alert_level_takes_worst() {
        let c = Classifier::default();
        let gases = GasLevels {
            oxygen: 11.0,
            carbon_dioxide: 0.05,
            ..GasLevels::default()
        };
        assert_eq!(c.alert_level(100, None), AlertLevel::Normal);
        assert_eq!(c.alert_level(100, Some(&gases)), AlertLevel::Critical);
    }

    #[test]
    fn test_gases_at_defaults_are_normal() {
        let c = Classifier::default();
        let gases = GasLevels {
            oxygen: 20.9,
            carbon_dioxide: 0.04,
            carbon_monoxide: 0.001,
            ..GasLevels::default()
        };
        assert_eq!(c.evaluate_gases(&gases), AlertLevel::Normal);
    }
}
