//! USB Insight Hub agent
//!
//! Keeps every connected Insight Hub's display showing what is plugged into
//! its ports. Runs interactively with a status view or headless as a service.

use agent::config::{self, AgentConfig};
use agent::directory::{DeviceDirectory, SnapshotDirectory, SysfsDirectory};
use agent::endpoint::{RecordingEndpointFactory, SerialEndpointFactory};
use agent::hotplug::HotplugSource;
use agent::systemd::{self, Notification};
use agent::{AgentHandle, InsightAgent, spawn_service, tui};
use anyhow::{Context, Result};
use clap::Parser;
use common::{setup_file_logging, setup_logging};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "uih-agent")]
#[command(
    author,
    version,
    about = "USB Insight Hub agent - show attached devices on the hub display"
)]
#[command(long_about = "
Watches the USB device tree, recognises USB Insight Hub units and sends each
hub's controller the devices found behind its three downstream ports.

EXAMPLES:
    # Run with the status view
    uih-agent

    # Run as systemd service (no TUI)
    uih-agent --service

    # Print the recognised hubs and the frames they would receive
    uih-agent --list

    # Capture the device directory, then replay it elsewhere
    uih-agent --dump-snapshot desk.json
    uih-agent --snapshot desk.json --list

CONFIGURATION:
    The agent looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-insight-hub/agent.toml
    3. /etc/usb-insight-hub/agent.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Run as systemd service (no TUI)
    #[arg(long)]
    service: bool,

    /// Run one rebuild, print the hubs and exit without opening serial ports
    #[arg(long)]
    list: bool,

    /// Read devices from a captured snapshot instead of sysfs
    #[arg(long, value_name = "PATH")]
    snapshot: Option<PathBuf>,

    /// Capture the device directory to a file and exit
    #[arg(long, value_name = "PATH")]
    dump_snapshot: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = AgentConfig::default();
        let path = AgentConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = if let Some(ref path) = args.config {
        config::load_config(path).context("Failed to load configuration")?
    } else {
        AgentConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.agent.log_level);
    let service_mode = args.service || config.agent.service_mode;
    let interactive = !service_mode && !args.list && args.dump_snapshot.is_none();

    if interactive {
        let path = log_file_path();
        setup_file_logging(log_level, &path).context("Failed to setup logging")?;
        eprintln!("Logging to {}", path.display());
    } else {
        setup_logging(log_level).context("Failed to setup logging")?;
    }

    info!("USB Insight Hub agent v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let directory = open_directory(&config, args.snapshot.as_deref())?;

    if let Some(path) = args.dump_snapshot {
        return dump_snapshot(directory.as_ref(), &path);
    }
    if args.list {
        return list_mode(directory, &config);
    }

    let endpoints = Arc::new(SerialEndpointFactory {
        baud_rate: config.serial.baud_rate,
        timeout: config.timing.serial_timeout(),
    });
    let agent = InsightAgent::new(directory.clone(), endpoints, config.hardware.clone());
    let (handle, service_task) = spawn_service(agent, config.timing.timing());

    let hotplug = HotplugSource::spawn(
        handle.hotplug_sender(),
        directory,
        config.timing.poll_interval(),
    )
    .context("Failed to start hot-plug thread")?;

    handle.start().await.context("Failed to start monitoring")?;

    let result = if service_mode {
        info!("Running in service mode (headless)");
        run_service(&handle).await
    } else {
        info!("Running in TUI mode (interactive)");
        tui::run(handle.clone()).await
    };

    info!("Shutting down...");
    if let Err(e) = handle.shutdown().await {
        error!("Error shutting down service loop: {:#}", e);
    }
    if let Err(e) = service_task.await {
        error!("Service loop panicked: {}", e);
    }
    hotplug.shutdown();

    result
}

fn log_file_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("usb-insight-hub")
        .join("agent.log")
}

fn open_directory(
    config: &AgentConfig,
    snapshot: Option<&Path>,
) -> Result<Arc<dyn DeviceDirectory>> {
    let snapshot = snapshot
        .map(Path::to_path_buf)
        .or_else(|| config.directory.snapshot());

    match snapshot {
        Some(path) => {
            let directory = SnapshotDirectory::load(&path)
                .with_context(|| format!("Failed to load snapshot {}", path.display()))?;
            Ok(Arc::new(directory))
        }
        None => {
            let root = config.directory.sysfs_root();
            info!("Reading devices from {}", root.display());
            Ok(Arc::new(SysfsDirectory::new(root)))
        }
    }
}

fn dump_snapshot(directory: &dyn DeviceDirectory, path: &Path) -> Result<()> {
    let snapshot = directory.snapshot();
    SnapshotDirectory::save(&snapshot, path)
        .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
    println!(
        "Captured {} devices and {} drives to {}",
        snapshot.devices.len(),
        snapshot.drives.len(),
        path.display()
    );
    Ok(())
}

/// One rebuild against in-memory endpoints; nothing is written to hardware
fn list_mode(directory: Arc<dyn DeviceDirectory>, config: &AgentConfig) -> Result<()> {
    let endpoints = RecordingEndpointFactory::new();
    let mut agent = InsightAgent::new(
        directory,
        Arc::new(endpoints),
        config.hardware.clone(),
    );
    let summary = agent.rebuild();

    println!("USB device tree ({} devices):\n", summary.devices);
    print!("{}", agent.last_tree().render());
    println!();

    if agent.hub_count() == 0 {
        println!("No USB Insight Hub found.");
        return Ok(());
    }

    println!("Found {} USB Insight Hub(s):\n", agent.hub_count());
    for hub in agent.active().iter() {
        println!(
            "  USB2 {}  USB3 {}  controller {}",
            hub.path2(),
            hub.path3().unwrap_or("-"),
            if hub.endpoint_name().is_empty() {
                "-"
            } else {
                hub.endpoint_name()
            }
        );
        for (port, devices) in hub.occupancy().iter() {
            let labels: Vec<String> = devices
                .iter()
                .map(|d| format!("{} (USB{}, {})", d.short_name, d.generation, d.category))
                .collect();
            println!("      CH{}: {}", port, labels.join(", "));
        }
        println!("      Frame: {}", hub.frame());
        println!();
    }

    Ok(())
}

/// Run headless until Ctrl+C, reporting state changes to systemd
async fn run_service(handle: &AgentHandle) -> Result<()> {
    if systemd::is_systemd() {
        info!("Running under systemd");
    }

    let watchdog = systemd::spawn_watchdog_task();
    systemd::notify(Notification::Ready).context("Failed to notify systemd ready")?;

    let status_handle = handle.clone();
    let status_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(500));
        loop {
            ticker.tick().await;
            if status_handle.is_updated() {
                status_handle.acknowledge_update();
                let state = status_handle.connection_state();
                info!("Status: {}", state);
                if let Err(e) = systemd::notify(Notification::Status(state.to_string())) {
                    warn!("Failed to send status to systemd: {:#}", e);
                }
            }
        }
    });

    info!("Press Ctrl+C to shutdown");
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down gracefully..."),
        Err(e) => error!("Error waiting for Ctrl+C: {}", e),
    }

    systemd::notify(Notification::Stopping).context("Failed to notify systemd stopping")?;
    status_task.abort();
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }
    Ok(())
}
