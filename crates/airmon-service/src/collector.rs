//! Background data collector.
//!
//! Samples come from the configured [`DataSource`] through a
//! [`SampleStream`], are classified by an [`Ingestor`] and written to the
//! local cache as pending rows. The sync loop uploads them later.

use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use airmon_core::{
    Classifier, DataSource, DeviceLink, Ingestor, LinkConfig, SampleStream, Simulator,
    SimulatorConfig, StreamOptions,
};
use airmon_types::SensorReading;

use crate::config::Config;
use crate::state::{AppState, ReadingEvent};

/// Open the source the configuration asks for.
///
/// Simulation mode ignores `device_address`.
pub async fn open_source(config: &Config) -> Result<Box<dyn DataSource>, CollectorError> {
    if config.app.simulation_mode {
        let mut sim_config = SimulatorConfig::default()
            .mode(config.device.simulation)
            .thresholds(config.app.thresholds());
        sim_config.device_name = config.app.device_name.clone();
        if let Some(seed) = config.device.seed {
            sim_config = sim_config.seed(seed);
        }
        info!("Using simulator ({:?} mode)", config.device.simulation);
        return Ok(Box::new(Simulator::new(sim_config)));
    }

    let address = config
        .app
        .device_address
        .as_deref()
        .ok_or(CollectorError::NoDeviceAddress)?;
    let link = DeviceLink::connect(address, LinkConfig::default())
        .await
        .map_err(CollectorError::Connect)?;
    Ok(Box::new(link))
}

/// Ingestor labelled and classified according to `config`.
pub fn build_ingestor(config: &Config) -> Ingestor {
    let ingestor = Ingestor::new(
        config.device.id.clone(),
        Classifier::new(config.classifier_config()),
    );
    match &config.device.location {
        Some(location) => ingestor.with_location(location.clone()),
        None => ingestor,
    }
}

/// Background collector feeding the local cache.
pub struct Collector {
    state: Arc<AppState>,
}

impl Collector {
    /// Create a new collector.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Open the configured source and collect until `cancel` fires.
    ///
    /// Returns the number of readings stored.
    pub async fn start(&self, cancel: CancellationToken) -> Result<u64, CollectorError> {
        let config = self.state.config.read().await.clone();
        let source = open_source(&config).await?;
        self.run(source, cancel).await
    }

    /// Collect from `source` until `cancel` fires or the source gives up.
    pub async fn run<S>(&self, source: S, cancel: CancellationToken) -> Result<u64, CollectorError>
    where
        S: DataSource + 'static,
    {
        let config = self.state.config.read().await.clone();
        let ingestor = build_ingestor(&config);
        let options = StreamOptions {
            poll_interval: config.poll_interval(),
            include_errors: true,
            max_consecutive_failures: config.device.max_consecutive_failures,
            ..StreamOptions::default()
        };
        options.validate().map_err(CollectorError::Source)?;

        info!(
            "Starting collector for {} (interval: {}ms)",
            ingestor.device_id(),
            config.app.data_refresh_interval_ms
        );

        let mut stream = SampleStream::spawn(source, options);
        self.state.collector.set_running(true);

        let mut collected = 0u64;
        let mut consecutive_failures = 0u32;
        let result = loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Collector cancelled");
                    break Ok(collected);
                }
                item = stream.next() => item,
            };

            let Some(item) = item else {
                break Err(CollectorError::SourceStopped {
                    failures: consecutive_failures,
                });
            };

            match item {
                Ok(sample) => {
                    consecutive_failures = 0;
                    let reading = ingestor.ingest(&sample);
                    match self.store_reading(&reading).await {
                        Ok(()) => {
                            collected += 1;
                            self.state.collector.record_success().await;
                            debug!(
                                "Collected reading from {}: {} ppm ({})",
                                reading.device_id, reading.ppm, reading.alert_level
                            );
                            let _ = self.state.readings_tx.send(ReadingEvent::new(reading));
                        }
                        Err(e) => {
                            error!("Failed to store reading {}: {}", reading.id, e);
                            self.state.collector.record_failure(e.to_string()).await;
                        }
                    }
                }
                Err(e) => {
                    consecutive_failures += 1;
                    if consecutive_failures <= 3 {
                        warn!("Failed to sample: {} (attempt {})", e, consecutive_failures);
                    } else if consecutive_failures == 4 {
                        error!(
                            "Failed to sample after {} attempts, will continue trying silently",
                            consecutive_failures
                        );
                    }
                    self.state.collector.record_failure(e.to_string()).await;
                }
            }
        };

        stream.close();
        self.state.collector.set_running(false);
        info!("Collector stopped after {} readings", collected);
        result
    }

    async fn store_reading(&self, reading: &SensorReading) -> Result<(), CollectorError> {
        let store = self.state.store.lock().await;
        if !store.insert_reading(reading).map_err(CollectorError::Store)? {
            warn!("Reading {} was already stored", reading.id);
        }
        Ok(())
    }
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("No device address configured and simulation mode is off")]
    NoDeviceAddress,
    #[error("Failed to connect: {0}")]
    Connect(airmon_core::Error),
    #[error("Data source error: {0}")]
    Source(airmon_core::Error),
    #[error("Data source stopped after {failures} consecutive failures")]
    SourceStopped { failures: u32 },
    #[error("Failed to store: {0}")]
    Store(airmon_store::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use airmon_core::Sample;
    use airmon_store::Store;
    use airmon_types::{AlertLevel, ControlCommand, DataOrigin};
    use time::OffsetDateTime;

    /// Yields the given ppm values, then fails forever.
    struct Scripted {
        values: Vec<u32>,
    }

    #[async_trait]
    impl DataSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn next_sample(&mut self) -> airmon_core::Result<Sample> {
            if self.values.is_empty() {
                return Err(airmon_core::Error::NotConnected);
            }
            Ok(Sample {
                timestamp: OffsetDateTime::now_utc(),
                ppm: self.values.remove(0),
                gases: None,
                temperature: 24.0,
                humidity: 50.0,
                pressure: None,
                origin: DataOrigin::Mq135,
                system: None,
            })
        }

        async fn send_command(&mut self, _command: &ControlCommand) -> airmon_core::Result<()> {
            Ok(())
        }
    }

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.app.data_refresh_interval_ms = 100;
        config.device.id = "collector-test".to_string();
        config.device.location = Some("Lab".to_string());
        config.device.max_consecutive_failures = Some(1);
        config
    }

    #[tokio::test]
    async fn test_collector_stores_and_broadcasts() {
        let state = AppState::new(Store::open_in_memory().unwrap(), fast_config());
        let mut rx = state.readings_tx.subscribe();
        let collector = Collector::new(Arc::clone(&state));

        let source = Scripted {
            values: vec![145, 321, 700],
        };
        let result = tokio::time::timeout(
            Duration::from_secs(10),
            collector.run(source, CancellationToken::new()),
        )
        .await
        .unwrap();
        assert!(matches!(result, Err(CollectorError::SourceStopped { failures: 1 })));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.reading.ppm, 145);
        assert_eq!(first.reading.location.as_deref(), Some("Lab"));

        let store = state.store.lock().await;
        assert_eq!(store.count_readings(Some("collector-test")).unwrap(), 3);
        let latest = store.latest_reading(None).unwrap().unwrap();
        assert_eq!(latest.reading.alert_level, AlertLevel::Critical);
        assert!(!latest.sync.is_uploaded);
        drop(store);

        let stats = state.collector.stats().await;
        assert_eq!(stats.success_count, 3);
        assert_eq!(stats.failure_count, 1);
        assert!(!state.collector.is_running());
    }

    #[tokio::test]
    async fn test_collector_cancel() {
        let mut config = fast_config();
        config.device.max_consecutive_failures = None;
        let state = AppState::new(Store::open_in_memory().unwrap(), config);
        let collector = Collector::new(Arc::clone(&state));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = collector.run(Scripted { values: vec![] }, cancel).await;
        assert_eq!(result.unwrap(), 0);
        assert!(!state.collector.is_running());
    }

    #[tokio::test]
    async fn test_start_with_simulator() {
        let mut config = fast_config();
        config.device.seed = Some(7);
        let state = AppState::new(Store::open_in_memory().unwrap(), config);
        let mut rx = state.readings_tx.subscribe();
        let collector = Collector::new(Arc::clone(&state));

        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move { collector.start(task_cancel).await });

        let event = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.reading.is_simulated);
        assert_eq!(event.device_id, "collector-test");

        cancel.cancel();
        let collected = handle.await.unwrap().unwrap();
        assert!(collected >= 1);
    }

    #[tokio::test]
    async fn test_open_source_requires_address() {
        let mut config = Config::default();
        config.app.simulation_mode = false;
        let result = open_source(&config).await;
        assert!(matches!(result, Err(CollectorError::NoDeviceAddress)));
    }

    #[test]
    fn test_build_ingestor_uses_config_thresholds() {
        let mut config = Config::default();
        config.app.warning_threshold = 100;
        config.app.critical_threshold = 150;
        let ingestor = build_ingestor(&config);
        assert_eq!(ingestor.device_id(), crate::config::DEFAULT_DEVICE_ID);
        assert_eq!(ingestor.classifier().evaluate_ppm(151), AlertLevel::Critical);
    }
}
