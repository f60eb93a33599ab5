//! Built-in data source that needs no hardware.
//!
//! Two modes are available:
//!
//! - [`SimulationMode::Replay`] cycles through a fixed script of board frames
//!   (clean air, a moderate spike, a critical episode, recovery). Named
//!   scenarios jump to a point in the script.
//! - [`SimulationMode::Generated`] produces a full multi-gas reading whose
//!   CO2 baseline follows the hour of day.
//!
//! Commands are honoured the way the firmware does: fan and buzzer switches
//! apply immediately, and in auto mode both follow the thresholds.
//!
//! # Example
//!
//! ```
//! use airmon_core::{DataSource, Simulator, SimulatorConfig};
//!
//! # async fn example() -> airmon_core::Result<()> {
//! let mut sim = Simulator::new(SimulatorConfig::default().seed(7));
//! let sample = sim.next_sample().await?;
//! assert_eq!(sample.ppm, 145);
//! # Ok(())
//! # }
//! ```

use std::time::Instant;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, info};

use airmon_types::wire::DEFAULT_DEVICE_NAME;
use airmon_types::{
    AirQuality, AirQualityLevel, ControlCommand, DataOrigin, GasLevels, SensorData, SystemStatus,
    Thresholds,
};

use crate::error::{Error, Result};
use crate::ingest::Sample;
use crate::traits::DataSource;

/// How the simulator produces samples.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    /// Cycle through the built-in script of frames.
    #[default]
    Replay,
    /// Generate multi-gas readings from the time of day.
    Generated,
}

/// A named point in the replay script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    GoodAir,
    ModerateAir,
    BadAir,
    Improving,
}

impl Scenario {
    /// Index of the first script frame for this scenario.
    pub fn script_index(&self) -> usize {
        match self {
            Scenario::GoodAir => 0,
            Scenario::ModerateAir => 1,
            Scenario::BadAir => 4,
            Scenario::Improving => 5,
        }
    }
}

impl std::str::FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "good_air" => Ok(Scenario::GoodAir),
            "moderate_air" => Ok(Scenario::ModerateAir),
            "bad_air" => Ok(Scenario::BadAir),
            "improving" => Ok(Scenario::Improving),
            other => Err(Error::invalid_config(format!("unknown scenario '{other}'"))),
        }
    }
}

/// One step of the replay script: ppm, temperature, humidity.
struct ScriptFrame {
    ppm: u32,
    temperature: f32,
    humidity: u8,
}

const SCRIPT: [ScriptFrame; 7] = [
    ScriptFrame { ppm: 145, temperature: 23.5, humidity: 62 },
    ScriptFrame { ppm: 234, temperature: 24.8, humidity: 58 },
    ScriptFrame { ppm: 288, temperature: 25.2, humidity: 55 },
    ScriptFrame { ppm: 356, temperature: 25.7, humidity: 51 },
    ScriptFrame { ppm: 421, temperature: 26.1, humidity: 48 },
    ScriptFrame { ppm: 262, temperature: 25.0, humidity: 52 },
    ScriptFrame { ppm: 168, temperature: 24.1, humidity: 57 },
];

/// Configuration for [`Simulator`].
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub mode: SimulationMode,
    pub device_name: String,
    /// RNG seed; `None` seeds from the OS.
    pub seed: Option<u64>,
    pub thresholds: Thresholds,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            mode: SimulationMode::Replay,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            seed: None,
            thresholds: Thresholds::default(),
        }
    }
}

impl SimulatorConfig {
    #[must_use]
    pub fn mode(mut self, mode: SimulationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    #[must_use]
    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }
}

/// A simulated AirMonitor board.
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
    index: usize,
    fan_status: bool,
    buzzer_active: bool,
    auto_mode: bool,
    started: Instant,
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulator")
            .field("mode", &self.config.mode)
            .field("index", &self.index)
            .field("auto_mode", &self.auto_mode)
            .finish()
    }
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
        Self {
            config,
            rng,
            index: 0,
            fan_status: false,
            buzzer_active: false,
            auto_mode: true,
            started: Instant::now(),
        }
    }

    /// Jump to a named point of the replay script.
    pub fn simulate_scenario(&mut self, scenario: Scenario) {
        debug!("Simulator jumping to {:?}", scenario);
        self.index = scenario.script_index();
    }

    /// Thresholds currently in effect.
    pub fn thresholds(&self) -> Thresholds {
        self.config.thresholds
    }

    /// Current actuator state.
    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            fan_status: self.fan_status,
            buzzer_active: self.buzzer_active,
            auto_mode: self.auto_mode,
            uptime: self.started.elapsed().as_millis() as u64,
        }
    }

    fn apply_auto_mode(&mut self, ppm: u32) {
        if self.auto_mode {
            self.fan_status = ppm > self.config.thresholds.warning;
            self.buzzer_active = ppm > self.config.thresholds.critical;
        }
    }

    /// Produce the next frame of the replay script.
    pub fn next_frame(&mut self) -> SensorData {
        let step = &SCRIPT[self.index % SCRIPT.len()];
        self.index = (self.index + 1) % SCRIPT.len();
        self.apply_auto_mode(step.ppm);

        SensorData {
            device: self.config.device_name.clone(),
            version: Some("sim".to_string()),
            timestamp: airmon_types::to_unix_millis(OffsetDateTime::now_utc()),
            air_quality: AirQuality {
                ppm: step.ppm,
                level: AirQualityLevel::from_ppm(step.ppm),
                temperature: step.temperature,
                humidity: step.humidity,
            },
            system: self.system_status(),
            thresholds: self.config.thresholds,
        }
    }

    /// Generate a multi-gas sample for the given hour of day (0-23).
    pub fn generate(&mut self, hour: u8) -> Sample {
        let co2_ppm = match hour {
            6..=8 => 450 + self.rng.random_range(0..150),
            9..=17 => 600 + self.rng.random_range(0..400),
            18..=22 => 500 + self.rng.random_range(0..300),
            _ => 350 + self.rng.random_range(0..100),
        };

        let mut jitter = |base: f64, low: f64, high: f64| -> f64 {
            (base + self.rng.random_range(low..high)).max(0.0)
        };
        let co = jitter(10.0, -5.0, 25.0);
        let nh3 = jitter(5.0, -2.0, 20.0);
        let nox = jitter(50.0, -20.0, 100.0);
        let alcohol = jitter(100.0, -50.0, 300.0);
        let benzene = jitter(2.0, -1.0, 8.0);
        let toluene = jitter(150.0, -50.0, 200.0);
        let acetone = jitter(500.0, -200.0, 500.0);
        let temperature = jitter(20.0, -5.0, 15.0);
        let humidity = jitter(45.0, -15.0, 30.0).min(100.0);
        let pressure = jitter(1013.25, -20.0, 20.0);
        let oxygen = jitter(20.9, -0.3, 0.1);

        let to_percent = |ppm: f64| ppm / airmon_types::types::PPM_PER_PERCENT;
        let gases = GasLevels {
            oxygen,
            carbon_dioxide: to_percent(f64::from(co2_ppm)),
            carbon_monoxide: to_percent(co),
            ammonia: to_percent(nh3),
            nitrogen_oxides: to_percent(nox),
            // Saturation vapour is roughly 3.2 % at room temperature.
            water_vapor: humidity / 100.0 * 3.2,
            alcohol: to_percent(alcohol),
            toluene: to_percent(toluene),
            benzene: to_percent(benzene),
            acetone: to_percent(acetone),
        };

        self.apply_auto_mode(co2_ppm);
        Sample {
            timestamp: OffsetDateTime::now_utc(),
            ppm: co2_ppm,
            gases: Some(gases),
            temperature,
            humidity,
            pressure: Some(pressure),
            origin: DataOrigin::Simulation,
            system: Some(self.system_status()),
        }
    }
}

#[async_trait]
impl DataSource for Simulator {
    fn name(&self) -> &str {
        &self.config.device_name
    }

    async fn next_sample(&mut self) -> Result<Sample> {
        let sample = match self.config.mode {
            SimulationMode::Replay => {
                let frame = self.next_frame();
                Sample::from_frame(&frame, DataOrigin::Simulation)
            }
            SimulationMode::Generated => {
                let hour = OffsetDateTime::now_utc().hour();
                self.generate(hour)
            }
        };
        Ok(sample)
    }

    async fn send_command(&mut self, command: &ControlCommand) -> Result<()> {
        if let Some(thresholds) = command.thresholds {
            if thresholds.warning >= thresholds.critical {
                return Err(Error::invalid_config(format!(
                    "warning threshold {} must be below critical threshold {}",
                    thresholds.warning, thresholds.critical
                )));
            }
            self.config.thresholds = thresholds;
        }
        if let Some(auto_mode) = command.auto_mode {
            self.auto_mode = auto_mode;
        }
        if let Some(fan) = command.fan {
            self.fan_status = fan.enable;
        }
        if let Some(buzzer) = command.buzzer {
            self.buzzer_active = buzzer.enable;
        }
        info!(
            "Simulator applied command: fan={} buzzer={} auto={}",
            self.fan_status, self.buzzer_active, self.auto_mode
        );
        Ok(())
    }
}
