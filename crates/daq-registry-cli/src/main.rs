//! CLI entry point for the rust-daq device registry
//!
//! Builds a simulated beamline (motors, ion chambers, an area detector and one
//! motor that never connects), lets the registry capture it, and answers
//! lookups against it.
//!
//! # Usage
//!
//! ```bash
//! daq-registry list --json
//! daq-registry find sim_det.cam.gain
//! daq-registry find ion_chambers --label --all
//! daq-registry --log-level debug prune --timeout-ms 250
//! ```

mod beamline;
mod logging;

use anyhow::{anyhow, Context, Result};
use beamline::Beamline;
use clap::{Parser, Subcommand};
use daq_device::{Capability, DeviceRef};
use daq_registry::{Query, Registry, RegistryConfig};
use logging::{LoggingConfig, OutputFormat};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "daq-registry")]
#[command(about = "Look up devices in a simulated beamline", long_about = None)]
struct Cli {
    /// Registry configuration file (TOML)
    #[arg(long, default_value = daq_registry::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Compact)]
    log_format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List root devices and every registered component
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Resolve a name, label or dotted path
    Find {
        /// Query, e.g. `m1`, `motors` or `sim_det.cam.gain`
        query: String,

        /// Treat the query as a label only
        #[arg(long)]
        label: bool,

        /// Return every match instead of requiring exactly one
        #[arg(long)]
        all: bool,
    },

    /// Remove devices that do not connect in time
    Prune {
        /// Per-device timeout (default: `connection_timeout` from the config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
}

#[derive(Debug, Serialize)]
struct DeviceSummary {
    name: String,
    class: &'static str,
    labels: BTreeSet<String>,
    connected: bool,
    capabilities: Vec<Capability>,
}

#[derive(Debug, Serialize)]
struct Listing {
    devices: Vec<DeviceSummary>,
    components: BTreeSet<String>,
}

fn summarize(registry: &Registry, device: &DeviceRef) -> DeviceSummary {
    DeviceSummary {
        name: device.name().to_string(),
        class: device.class().name(),
        labels: registry
            .labels(device.name())
            .unwrap_or_else(|_| device.labels()),
        connected: device.is_connected(),
        capabilities: device.capabilities().to_vec(),
    }
}

fn print_device(summary: &DeviceSummary) {
    let labels: Vec<&str> = summary.labels.iter().map(String::as_str).collect();
    println!(
        "{:<20} {:<18} {:<10} [{}]",
        summary.name,
        summary.class,
        if summary.connected { "connected" } else { "offline" },
        labels.join(", ")
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = logging::parse_log_level(&cli.log_level).map_err(|e| anyhow!(e))?;
    logging::init(&LoggingConfig::new(level, cli.log_format)).map_err(|e| anyhow!(e))?;

    let config = RegistryConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::debug!(?config, "Registry configuration loaded");

    let line = Beamline::build(config)?;
    let registry = &line.registry;

    match cli.command {
        Commands::List { json } => {
            let devices: Vec<DeviceSummary> = registry
                .root_devices()
                .iter()
                .map(|d| summarize(registry, d))
                .collect();
            let listing = Listing {
                devices,
                components: registry.component_names(),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                for summary in &listing.devices {
                    print_device(summary);
                }
                println!();
                println!(
                    "{} of {} devices registered, {} components",
                    listing.devices.len(),
                    line.device_count(),
                    listing.components.len()
                );
            }
        }

        Commands::Find { query, label, all } => {
            let found = match (label, all) {
                (true, true) => registry.findall(Query::new().label(query.as_str()))?,
                (true, false) => vec![registry.find(Query::new().label(query.as_str()))?],
                (false, true) => registry.findall(query.as_str())?,
                (false, false) => vec![registry.get(&query)?],
            };
            for device in &found {
                print_device(&summarize(registry, device));
            }
            tracing::debug!(
                cam_instantiated = line.detector.is_cam_instantiated(),
                "Lookup finished"
            );
        }

        Commands::Prune { timeout_ms } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or_else(|| registry.connection_timeout());
            println!("Waiting up to {timeout:?} for devices to connect...");

            let removed = registry.pop_disconnected(timeout).await;
            if removed.is_empty() {
                println!("All devices connected");
            }
            for device in &removed {
                println!("Removed {}", device.name());
            }
            println!("{} root devices remain", registry.root_devices().len());
        }
    }

    Ok(())
}
