//! `sensorgate` command line
//!
//! ```text
//! sensorgate [--config sensorgate.toml] <command>
//!
//!   serve                      HTTP read API
//!   poll                       store a reading every poll interval
//!   publish                    publish the local sensor over MQTT
//!   subscribe                  store readings received over MQTT
//!   convert <dim> <from> <value> <to>
//!   range <duration>
//!   sensor add|show|remove
//!   readings <serial> <duration>
//!   readings-purge <serial>
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use sensorgate_connectors::envelope::{ConversionEnvelope, HistoryEnvelope, SensorEnvelope};
use sensorgate_connectors::logging::init_logging;
use sensorgate_connectors::{mqtt, server, Poller};
use sensorgate_core::config::SensorConfig;
use sensorgate_core::{
    Dimension, DurationResolver, FixedSensor, GatewayConfig, SensorDriver, SensorQueryService, SensorRecord,
    SensorState, SensorType, TemperatureSensor, UnitConverter, W1ThermSensor,
};
use sensorgate_store::open_store;

const DEFAULT_CONFIG: &str = "sensorgate.toml";

#[derive(Parser)]
#[command(name = "sensorgate", version, about = "IoT telemetry gateway")]
struct Cli {
    /// Configuration file; defaults apply when it is absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP read API
    Serve,
    /// Collect a reading every poll interval and store it
    Poll,
    /// Publish the local sensor reading over MQTT every poll interval
    Publish,
    /// Store readings received over MQTT
    Subscribe,
    /// Convert a value between units of one dimension
    Convert {
        dimension: Dimension,
        from_unit: String,
        #[arg(allow_hyphen_values = true)]
        from_value: String,
        to_unit: String,
    },
    /// Show the time range a duration keyword resolves to now
    Range { duration: String },
    /// Manage registered sensors
    Sensor {
        #[command(subcommand)]
        action: SensorAction,
    },
    /// Print stored readings of a sensor over a duration
    Readings { serial: String, duration: String },
    /// Delete every stored reading of a sensor
    ReadingsPurge { serial: String },
}

#[derive(Subcommand)]
enum SensorAction {
    /// Register a sensor
    Add {
        serial: String,
        #[arg(long)]
        name: String,
        #[arg(long = "type", default_value = "TEMPERATURE")]
        sensor_type: SensorType,
        #[arg(long, default_value = "UP")]
        state: SensorState,
        #[arg(long)]
        geolocation: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Print a registered sensor
    Show { serial: String },
    /// Remove a registered sensor
    Remove { serial: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.logging.level);

    match cli.command {
        Command::Serve => {
            let service = build_service(&config, true).await?;
            let app = server::router(service, &config.http.apis);
            let listener = server::bind(&config.http.bind).await?;
            server::serve(listener, app, shutdown_signal()).await?;
        }
        Command::Poll => {
            require_serial(&config.sensor)?;
            let local = config.sensor.source_url.is_none();
            let service = build_service(&config, local).await?;
            Poller::from_config(service, &config.sensor)?.run(shutdown_signal()).await;
        }
        Command::Publish => {
            require_serial(&config.sensor)?;
            let service = build_service(&config, true).await?;
            let interval = Duration::from_secs(config.sensor.poll_interval_secs);
            mqtt::run_publisher(service, &config.sensor.serial, &config.mqtt, interval, shutdown_signal()).await?;
        }
        Command::Subscribe => {
            let service = build_service(&config, false).await?;
            mqtt::run_subscriber(service, &config.mqtt, shutdown_signal()).await?;
        }
        Command::Convert { dimension, from_unit, from_value, to_unit } => {
            let result = UnitConverter::new().convert(dimension, &from_unit, &from_value, &to_unit)?;
            print_json(&ConversionEnvelope::success(result))?;
        }
        Command::Range { duration } => {
            let range = DurationResolver::new().resolve(&duration)?;
            println!("start: {}", range.start_utc());
            println!("end:   {}", range.end_utc());
        }
        Command::Sensor { action } => {
            let service = build_service(&config, false).await?;
            match action {
                SensorAction::Add {
                    serial,
                    name,
                    sensor_type,
                    state,
                    geolocation,
                    address,
                    location,
                    description,
                } => {
                    let mut record = SensorRecord::new(serial, name, sensor_type, state);
                    record.geolocation = geolocation;
                    record.address = address;
                    record.location = location;
                    record.description = description;
                    service.register_sensor(&record).await?;
                    print_json(&SensorEnvelope::success(record))?;
                }
                SensorAction::Show { serial } => {
                    print_json(&SensorEnvelope::success(service.sensor(&serial).await?))?;
                }
                SensorAction::Remove { serial } => service.remove_sensor(&serial).await?,
            }
        }
        Command::Readings { serial, duration } => {
            let service = build_service(&config, false).await?;
            let readings = service.readings(&serial, &duration).await?;
            print_json(&HistoryEnvelope::success(serial, readings))?;
        }
        Command::ReadingsPurge { serial } => {
            let service = build_service(&config, false).await?;
            service.remove_readings(&serial).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load_from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG).is_file() => {
            GatewayConfig::load_from_file(DEFAULT_CONFIG).context("loading sensorgate.toml")
        }
        None => Ok(GatewayConfig::default()),
    }
}

fn require_serial(sensor: &SensorConfig) -> Result<()> {
    ensure!(!sensor.serial.trim().is_empty(), "sensor.serial must be set in the configuration");
    Ok(())
}

async fn build_service(config: &GatewayConfig, with_sensor: bool) -> Result<SensorQueryService> {
    let store = open_store(&config.storage).await?;
    let mut service = SensorQueryService::new(store).with_reading_unit(&config.sensor.unit)?;
    if with_sensor {
        service = service.with_sensor(sensor_driver(&config.sensor)?);
    }
    Ok(service)
}

fn sensor_driver(sensor: &SensorConfig) -> Result<Arc<dyn TemperatureSensor>> {
    let driver: Arc<dyn TemperatureSensor> = match sensor.driver {
        SensorDriver::W1 => Arc::new(W1ThermSensor::new(sensor.w1_devices_dir.clone(), sensor.unit.clone())?),
        SensorDriver::Fixed => {
            warn!("using the fixed sensor driver ({} {})", sensor.fixed_value, sensor.unit);
            Arc::new(FixedSensor::new(sensor.fixed_value, sensor.unit.clone()))
        }
    };
    Ok(driver)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
