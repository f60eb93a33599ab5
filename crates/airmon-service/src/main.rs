//! AirMonitor Service - Background collector and sync.
//!
//! Run with: `cargo run -p airmon-service`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use time::{Duration as TimeDuration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use airmon_service::{
    AppState, Collector, Config, Reconciler, cleanup, open_source, remote_from_config,
    run_sync_loop,
};
use airmon_store::{ReadingQuery, Store};
use airmon_types::{ControlCommand, GasType, Thresholds, Toggle};

/// AirMonitor Service - Background collector and sync.
#[derive(Parser, Debug)]
#[command(name = "airmon-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Collect and sync in the foreground (default behavior).
    Run {
        /// Do not start the sync loop.
        #[arg(long)]
        no_sync: bool,
    },

    /// Upload pending readings once.
    Sync {
        /// Afterwards restore up to N recent remote readings into the cache.
        #[arg(long, value_name = "N")]
        pull: Option<usize>,
    },

    /// Apply retention now.
    Cleanup {
        /// Keep this many days instead of the configured retention.
        #[arg(long)]
        days: Option<u32>,
    },

    /// Summarize cached readings.
    Stats {
        /// Window size in hours.
        #[arg(long, default_value_t = 24)]
        hours: i64,
    },

    /// Export cached readings as CSV.
    Export {
        /// Output file.
        #[arg(short, long)]
        output: PathBuf,

        /// Only this device.
        #[arg(long)]
        device: Option<String>,

        /// Only the last N hours.
        #[arg(long)]
        hours: Option<i64>,

        /// Also upload the file to the remote store.
        #[arg(long)]
        upload: bool,
    },

    /// Send a control command to the board.
    Control {
        #[arg(long)]
        fan: Option<Switch>,

        #[arg(long)]
        buzzer: Option<Switch>,

        #[arg(long)]
        auto: Option<Switch>,

        /// New warning threshold in PPM (requires --critical).
        #[arg(long, requires = "critical")]
        warning: Option<u32>,

        /// New critical threshold in PPM (requires --warning).
        #[arg(long, requires = "warning")]
        critical: Option<u32>,

        /// Board address (overrides config).
        #[arg(long)]
        address: Option<String>,
    },

    /// Exchange the settings document with the remote store.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Upload the `[user_settings]` section.
    Push,
    /// Download the remote settings and print them as TOML.
    Pull,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose)?;

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }
    config.validate()?;

    match args.command {
        Some(Command::Run { no_sync }) => run(config, no_sync).await,
        None => run(config, false).await,
        Some(Command::Sync { pull }) => sync_once(config, pull).await,
        Some(Command::Cleanup { days }) => cleanup_once(config, days),
        Some(Command::Stats { hours }) => stats(config, hours),
        Some(Command::Export {
            output,
            device,
            hours,
            upload,
        }) => export(config, output, device, hours, upload).await,
        Some(Command::Control {
            fan,
            buzzer,
            auto,
            warning,
            critical,
            address,
        }) => {
            let thresholds = warning
                .zip(critical)
                .map(|(warning, critical)| Thresholds { warning, critical });
            let command = ControlCommand {
                fan: fan.map(|s| Toggle { enable: s.enabled() }),
                buzzer: buzzer.map(|s| Toggle { enable: s.enabled() }),
                auto_mode: auto.map(Switch::enabled),
                thresholds,
                ..ControlCommand::default()
            };
            control(config, command, address).await
        }
        Some(Command::Settings { action }) => settings(config, action).await,
    }
}

fn init_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("airmon_service={level}").parse()?)
                .add_directive(format!("airmon_core={level}").parse()?)
                .add_directive(format!("airmon_store={level}").parse()?),
        )
        .init();
    Ok(())
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    info!("Opening database at {:?}", config.storage.path);
    Store::open(&config.storage.path)
        .with_context(|| format!("Failed to open database {}", config.storage.path.display()))
}

fn reconciler(config: &Config) -> anyhow::Result<Option<Reconciler>> {
    Ok(remote_from_config(&config.remote)?.map(|remote| {
        Reconciler::new(remote, config.remote.user_id.clone()).with_batch_size(config.sync.batch_size)
    }))
}

fn require_reconciler(config: &Config) -> anyhow::Result<Reconciler> {
    match reconciler(config)? {
        Some(reconciler) => Ok(reconciler),
        None => bail!("No remote store configured (set [remote] base_url)"),
    }
}

async fn run(config: Config, no_sync: bool) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let reconciler = if no_sync { None } else { reconciler(&config)? };
    let state = AppState::new(store, config);
    let cancel = CancellationToken::new();

    let sync_handle = if no_sync {
        info!("Sync loop disabled");
        None
    } else {
        Some(tokio::spawn(run_sync_loop(
            Arc::clone(&state),
            reconciler,
            cancel.clone(),
        )))
    };

    let collector = Collector::new(Arc::clone(&state));
    let collector_cancel = cancel.clone();
    let mut collector_handle =
        tokio::spawn(async move { collector.start(collector_cancel).await });

    // The collector only returns early when its source gives up.
    let collected = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Shutting down");
            cancel.cancel();
            collector_handle.await?
        }
        joined = &mut collector_handle => {
            cancel.cancel();
            joined?
        }
    };

    if let Some(handle) = sync_handle {
        handle.await?;
    }
    let collected = collected?;
    info!("Stored {} readings this session", collected);
    Ok(())
}

async fn sync_once(config: Config, pull: Option<usize>) -> anyhow::Result<()> {
    let reconciler = require_reconciler(&config)?;
    let store = tokio::sync::Mutex::new(open_store(&config)?);

    let report = reconciler.reconcile(&store).await?;
    println!(
        "Uploaded {} of {} pending readings ({} failed)",
        report.uploaded, report.attempted, report.failed
    );
    for (id, error) in &report.errors {
        println!("  {}: {}", id, error);
    }

    if let Some(limit) = pull {
        let pulled = reconciler.pull_latest(&store, limit).await?;
        println!(
            "Restored {} of {} remote readings",
            pulled.inserted, pulled.fetched
        );
    }
    Ok(())
}

fn cleanup_once(mut config: Config, days: Option<u32>) -> anyhow::Result<()> {
    if let Some(days) = days {
        config.sync.retention_days = days;
        config.validate()?;
    }
    let store = open_store(&config)?;
    let report = cleanup(&store, &config.sync, OffsetDateTime::now_utc())?;
    println!(
        "Deleted {} readings ({} simulated)",
        report.total(),
        report.simulated
    );
    Ok(())
}

fn stats(config: Config, hours: i64) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let since = OffsetDateTime::now_utc() - TimeDuration::hours(hours);

    let averages = store.averages_since(since)?;
    let extremes = store.extremes_since(since)?;
    let critical = store.count_critical_since(since)?;
    let counts = store.sync_counts()?;

    println!("Last {} hours: {} readings", hours, averages.count);
    if let Some(latest) = store.latest_reading(None)? {
        let r = &latest.reading;
        println!(
            "  latest: {} ppm, {} ({}), {:.1} C, {:.0}% RH",
            r.ppm, r.air_quality_level, r.alert_level, r.temperature, r.humidity
        );
    }
    if let Some(max_ppm) = extremes.max_ppm {
        println!("  max ppm: {}", max_ppm);
    }
    println!("  critical readings: {}", critical);

    for gas in [GasType::CarbonDioxide, GasType::CarbonMonoxide, GasType::Oxygen] {
        let gas_stats = store.gas_statistics(gas, since, OffsetDateTime::now_utc())?;
        if let (Some(avg), Some(min), Some(max)) =
            (gas_stats.average, gas_stats.minimum, gas_stats.maximum)
        {
            println!(
                "  {}: avg {:.3}% (min {:.3}%, max {:.3}%)",
                gas.symbol(),
                avg,
                min,
                max
            );
        }
    }

    println!(
        "Sync: {} uploaded, {} pending, {} failed",
        counts.uploaded, counts.pending, counts.failed
    );
    Ok(())
}

async fn export(
    config: Config,
    output: PathBuf,
    device: Option<String>,
    hours: Option<i64>,
    upload: bool,
) -> anyhow::Result<()> {
    let store = open_store(&config)?;
    let mut query = ReadingQuery::new().oldest_first();
    if let Some(device) = &device {
        query = query.device(device);
    }
    if let Some(hours) = hours {
        query = query.since(OffsetDateTime::now_utc() - TimeDuration::hours(hours));
    }

    let rows = store.export_csv_to_path(&query, &output)?;
    println!("Exported {} readings to {}", rows, output.display());

    if upload {
        let reconciler = require_reconciler(&config)?;
        let data = std::fs::read(&output)
            .with_context(|| format!("Failed to read {}", output.display()))?;
        let name = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export.csv".to_string());
        let url = reconciler.upload_file(&name, &data).await?;
        println!("Uploaded to {}", url);
    }
    Ok(())
}

async fn control(
    mut config: Config,
    command: ControlCommand,
    address: Option<String>,
) -> anyhow::Result<()> {
    if command.is_empty() {
        bail!("Nothing to send (use --fan, --buzzer, --auto or --warning/--critical)");
    }
    if let Some(address) = address {
        config.app.device_address = Some(address);
        config.app.simulation_mode = false;
    }
    if config.app.simulation_mode {
        warn!("Simulation mode is on; the command only reaches the simulator");
    }

    let mut source = open_source(&config).await?;
    source.send_command(&command).await?;
    source.close().await?;
    println!("Command sent to {}", source.name());
    Ok(())
}

async fn settings(config: Config, action: SettingsAction) -> anyhow::Result<()> {
    let reconciler = require_reconciler(&config)?;
    match action {
        SettingsAction::Push => {
            reconciler.push_settings(&config.user_settings).await?;
            println!("Settings saved for {}", reconciler.user_id());
        }
        SettingsAction::Pull => match reconciler.pull_settings().await? {
            Some(settings) => {
                #[derive(serde::Serialize)]
                struct Section<'a> {
                    user_settings: &'a airmon_types::UserSettings,
                }
                let text = toml::to_string_pretty(&Section {
                    user_settings: &settings,
                })?;
                print!("{}", text);
            }
            None => println!("No settings stored for {}", reconciler.user_id()),
        },
    }
    Ok(())
}
