//! HD Radio command-line controller
//!
//! Opens a tuner over the MJS cable, a bridge board or the built-in
//! simulator, then reads commands from stdin and prints driver events.

mod args;
mod commands;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use args::{Backend, Mode, RunOptions};
use commands::Command;
use hdradio_detect::{DeviceKind, PortScanner};
use hdradio_engine::{
    BridgeTransport, DriverConfig, HdRadio, JsonFileSettings, MemorySettings, MjsTransport,
    RadioEvent, SettingsStore,
};
use hdradio_sim::{SimTransport, VirtualTuner};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "hdradio=info,hdradio_protocol=info,hdradio_detect=info,hdradio_engine=info,hdradio_sim=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args::parse(std::env::args().skip(1))? {
        Mode::Help => println!("{}", args::USAGE),
        Mode::Version => println!("hdradio {}", args::VERSION),
        Mode::List => list_devices()?,
        Mode::Run(options) => run(options).await?,
    }
    Ok(())
}

fn list_devices() -> Result<()> {
    let scanner = PortScanner::new();
    for (kind, label) in [(DeviceKind::MjsCable, "mjs"), (DeviceKind::Bridge, "bridge")] {
        let devices = scanner
            .devices(kind)
            .with_context(|| format!("failed to scan for {} devices", label))?;
        for device in devices {
            println!(
                "{:<7} {:<20} {:<16} {}",
                label,
                device.identifier(),
                device.port,
                device.adapter_name().unwrap_or("")
            );
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<DriverConfig> {
    let default_path = JsonFileSettings::config_dir().map(|dir| dir.join("driver.json"));
    let path = match (path, default_path.as_deref()) {
        (Some(path), _) => path,
        (None, Some(path)) if path.exists() => path,
        _ => return Ok(DriverConfig::default()),
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("invalid driver configuration in {}", path.display()))?;
    info!("Loaded driver configuration from {}", path.display());
    Ok(config)
}

fn load_settings(options: &RunOptions) -> Arc<dyn SettingsStore> {
    match options.settings.clone().or_else(JsonFileSettings::default_path) {
        Some(path) => Arc::new(JsonFileSettings::load(path)),
        None => {
            warn!("No settings location, settings will not be kept");
            Arc::new(MemorySettings::new())
        }
    }
}

fn print_event(event: RadioEvent) {
    println!("* {}", event);
}

async fn run(options: RunOptions) -> Result<()> {
    let config = load_config(options.config.as_deref())?;
    let settings = load_settings(&options);

    let radio = match options.backend {
        Backend::Mjs => HdRadio::new(MjsTransport::new(), settings, print_event, config),
        Backend::Bridge => HdRadio::new(BridgeTransport::new(), settings, print_event, config),
        Backend::Sim => HdRadio::new(
            SimTransport::new(VirtualTuner::new()),
            settings,
            print_event,
            config,
        ),
    };

    match &options.device {
        Some(id) => radio.open_by_id(id).await,
        None => radio.open().await,
    }
    .context("failed to open the tuner")?;

    if let Some(id) = radio.identifier().await {
        info!("Connected to {}", id);
    }
    if options.power_on {
        radio.power_on()?;
    }

    println!("{}", commands::HELP);
    let result = repl(&radio).await;
    radio.close().await;
    result
}

async fn repl(radio: &HdRadio) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        match commands::parse(&line) {
            Ok(Command::Quit) => return Ok(()),
            Ok(command) => {
                if let Err(e) = commands::execute(radio, command) {
                    println!("error: {:#}", e);
                }
            }
            Err(e) => println!("{:#}", e),
        }
        if !radio.is_open() {
            println!("tuner disconnected");
            return Ok(());
        }
    }
}
