//! CLI entry point for rust_vna.
//!
//! Headless measurement runner:
//! - `measure` runs a full sweep and exports the result as a Touchstone file
//! - `read-settings` prints the instrument's current sweep parameters
//! - `drivers` lists the registered instrument drivers
//!
//! Connection and sweep parameters persist across runs in the OS config
//! directory; command-line options override and update them. Ctrl-C during a
//! sweep raises the cooperative cancellation flag instead of killing the
//! process mid-exchange.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rust_vna::driver::default_registry;
use rust_vna::measurement::SParam;
use rust_vna::settings::{Settings, SettingsStore};
use rust_vna::touchstone::TouchstoneExporter;
use rust_vna::transport::TcpConnector;
use rust_vna::worker::{MeasurementWorker, WorkerEvent};

#[derive(Parser)]
#[command(name = "rust-vna")]
#[command(about = "SCPI vector network analyzer measurement engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sweep and export the result as a Touchstone .s2p file
    Measure {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Start frequency in MHz
        #[arg(long)]
        start_mhz: Option<f64>,

        /// Stop frequency in MHz
        #[arg(long)]
        stop_mhz: Option<f64>,

        /// Number of sweep points
        #[arg(long)]
        points: Option<u32>,

        /// Averaging factor
        #[arg(long)]
        averaging: Option<u32>,

        /// Comma-separated S-parameters to measure (e.g. S11,S21)
        #[arg(long, value_delimiter = ',')]
        sparams: Option<Vec<String>>,

        /// Output directory for exported files
        #[arg(long)]
        output: Option<PathBuf>,

        /// Filename prefix for exported files
        #[arg(long)]
        prefix: Option<String>,

        /// Program the instrument's frequency range from the settings
        #[arg(long)]
        set_freq_range: bool,

        /// Enable trace averaging on the instrument
        #[arg(long)]
        averaging_on: bool,

        /// Skip writing the Touchstone file
        #[arg(long)]
        no_export: bool,
    },

    /// Read the instrument's current sweep parameters
    ReadSettings {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// List registered instrument drivers
    Drivers,
}

#[derive(clap::Args)]
struct ConnectionArgs {
    /// Instrument IP address or hostname
    #[arg(long)]
    host: Option<String>,

    /// VISA-style resource label (display only)
    #[arg(long)]
    resource: Option<String>,

    /// TCP port of the instrument's raw SCPI socket
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Measure {
            connection,
            start_mhz,
            stop_mhz,
            points,
            averaging,
            sparams,
            output,
            prefix,
            set_freq_range,
            averaging_on,
            no_export,
        } => {
            let mut settings = load_settings_with_connection(&connection)?;
            if let Some(start) = start_mhz {
                settings.start_freq_mhz = start;
            }
            if let Some(stop) = stop_mhz {
                settings.stop_freq_mhz = stop;
            }
            if let Some(points) = points {
                settings.sweep_points = points;
            }
            if let Some(averaging) = averaging {
                settings.averaging_count = averaging;
                settings.set_averaging_count = true;
            }
            if let Some(names) = sparams {
                settings.sparams = names
                    .iter()
                    .map(|name| name.parse::<SParam>())
                    .collect::<Result<Vec<_>, _>>()?;
            }
            if let Some(output) = output {
                settings.output_folder = output.display().to_string();
            }
            if let Some(prefix) = prefix {
                settings.filename_prefix = prefix;
            }
            if set_freq_range {
                settings.set_freq_range = true;
            }
            if averaging_on {
                settings.enable_averaging = true;
            }
            save_settings(&settings);
            run_measure(settings, no_export).await
        }
        Commands::ReadSettings { connection } => {
            let settings = load_settings_with_connection(&connection)?;
            save_settings(&settings);
            run_read_settings(settings).await
        }
        Commands::Drivers => {
            for descriptor in default_registry().list() {
                println!("{}", descriptor.name);
            }
            Ok(())
        }
    }
}

fn load_settings_with_connection(connection: &ConnectionArgs) -> Result<Settings> {
    let store = SettingsStore::new()?;
    let mut settings = store.load();
    if let Some(host) = &connection.host {
        settings.remember_host(host);
    }
    if let Some(resource) = &connection.resource {
        settings.remember_resource(resource);
    }
    if let Some(port) = connection.port {
        settings.scpi_port = port;
    }
    if settings.last_host.is_empty() {
        bail!("No host configured. Pass --host or run a measurement with one first.");
    }
    Ok(settings)
}

fn save_settings(settings: &Settings) {
    match SettingsStore::new() {
        Ok(store) => {
            if let Err(err) = store.save(settings) {
                tracing::warn!("failed to persist settings: {err}");
            }
        }
        Err(err) => tracing::warn!("failed to locate settings store: {err}"),
    }
}

fn new_worker() -> MeasurementWorker {
    MeasurementWorker::new(
        Arc::new(default_registry().clone()),
        Arc::new(TcpConnector::default()),
    )
}

async fn run_measure(settings: Settings, no_export: bool) -> Result<()> {
    let config = settings.to_sweep_config();
    let worker = new_worker();

    println!("Connecting to VNA at {}...", config.host);
    let mut handle = worker.start_measurement(config.clone())?;
    let cancel = handle.cancel_flag();

    let result = loop {
        tokio::select! {
            event = handle.recv() => match event {
                Some(WorkerEvent::Phase { phase, percent }) => {
                    println!("  {} ({percent:.0}%)", phase.label());
                }
                Some(WorkerEvent::Progress { message, percent }) => {
                    println!("  {message} ({percent:.0}%)");
                }
                Some(WorkerEvent::Wire { direction, text }) => {
                    tracing::debug!(?direction, "{text}");
                }
                Some(WorkerEvent::Completed(result)) => break *result,
                Some(WorkerEvent::Failed(err)) => return Err(err.into()),
                Some(WorkerEvent::Cancelled) => {
                    println!("Measurement cancelled.");
                    return Ok(());
                }
                None => bail!("Worker stopped without reporting an outcome"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Cancelling...");
                cancel.cancel();
            }
        }
    };

    println!("Connected: {}", result.idn);
    println!("Measurement complete: {} points", result.points());

    if !no_export {
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("{}_{timestamp}", config.filename_prefix);
        let destination = config.output_folder.join(filename);
        let path =
            TouchstoneExporter::new().export(&result.frequencies_hz, &result.traces, &destination)?;
        println!("S2P file saved: {}", path.display());
    }

    Ok(())
}

async fn run_read_settings(settings: Settings) -> Result<()> {
    let config = settings.to_sweep_config();
    let worker = new_worker();

    println!("Reading parameters from {}...", config.host);
    let instrument = worker.read_settings(&config).await?;

    println!(
        "Start frequency: {}",
        format_mhz(instrument.start_freq_hz)
    );
    println!("Stop frequency:  {}", format_mhz(instrument.stop_freq_hz));
    println!(
        "Sweep points:    {}",
        format_value(instrument.sweep_points)
    );
    println!(
        "Averaging:       {}",
        match instrument.averaging_enabled {
            Some(true) => "on",
            Some(false) => "off",
            None => "unknown",
        }
    );
    println!(
        "Averaging count: {}",
        format_value(instrument.averaging_count)
    );
    Ok(())
}

fn format_mhz(value: Option<f64>) -> String {
    value
        .map(|hz| format!("{:.3} MHz", hz / 1e6))
        .unwrap_or_else(|| "unknown".to_string())
}

fn format_value<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
