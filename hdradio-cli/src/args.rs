//! Command-line arguments

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const USAGE: &str = "\
usage:
  hdradio list                      list attached tuners
  hdradio --version                 print the version
  hdradio [options]                 open a tuner and read commands from stdin

options:
  --backend mjs|bridge|sim          connection type (default: mjs)
  --device ID                       open this device instead of the first found
  --config FILE                     driver timing configuration (JSON)
  --settings FILE                   settings file (default: ~/.config/hdradio/radio.json)
  --no-power                        do not power on after opening";

/// How to reach the tuner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Mjs,
    Bridge,
    Sim,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mjs" => Ok(Self::Mjs),
            "bridge" | "mcu" => Ok(Self::Bridge),
            "sim" => Ok(Self::Sim),
            other => bail!("unknown backend '{}'", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub backend: Backend,
    pub device: Option<String>,
    pub config: Option<PathBuf>,
    pub settings: Option<PathBuf>,
    pub power_on: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            backend: Backend::Mjs,
            device: None,
            config: None,
            settings: None,
            power_on: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Help,
    Version,
    List,
    Run(RunOptions),
}

pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Mode> {
    let mut args = args.into_iter();
    let mut options = RunOptions::default();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .with_context(|| format!("{} needs a value", name))
        };
        match arg.as_str() {
            "list" => return Ok(Mode::List),
            "-h" | "--help" | "help" => return Ok(Mode::Help),
            "-V" | "--version" => return Ok(Mode::Version),
            "--backend" => options.backend = value("--backend")?.parse()?,
            "--device" => options.device = Some(value("--device")?),
            "--config" => options.config = Some(value("--config")?.into()),
            "--settings" => options.settings = Some(value("--settings")?.into()),
            "--no-power" => options.power_on = false,
            other => bail!("unexpected argument '{}'\n\n{}", other, USAGE),
        }
    }
    Ok(Mode::Run(options))
}
