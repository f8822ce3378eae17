//! Interactive command parsing

use anyhow::{bail, Context, Result};
use hdradio_engine::HdRadio;
use hdradio_protocol::{Band, Direction, RadioCommand, TuneInfo};

/// Absolute or relative level change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Set(i32),
    Up,
    Down,
}

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Power(bool),
    Mute(bool),
    Volume(Level),
    Bass(Level),
    Treble(Level),
    Tune(TuneInfo),
    Step(Direction),
    Seek(Direction),
    Subchannel(i32),
    SeekAll(bool),
    Get(RadioCommand),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  power on|off          switch the tuner
  mute on|off
  vol|bass|treble N|up|down
  tune fm 101.1 [sub]   tune directly (AM in kHz: tune am 1010)
  tune up|down          step one channel
  seek up|down
  sub N                 select HD subchannel
  seekall on|off        stop at every station or HD only
  get COMMAND           request a value, e.g. get hd_title
  status                print the current state
  quit";

/// Parse `fm 101.1` or `am 1010` into device units
pub fn parse_station(band: &str, frequency: &str) -> Result<(Band, i32)> {
    let band: Band = band.parse()?;
    let frequency = match band {
        Band::Fm if frequency.contains('.') => {
            let mhz: f64 = frequency
                .parse()
                .with_context(|| format!("bad frequency '{}'", frequency))?;
            (mhz * 10.0).round() as i32
        }
        _ => frequency
            .parse()
            .with_context(|| format!("bad frequency '{}'", frequency))?,
    };
    Ok((band, frequency))
}

fn on_off(word: Option<&str>) -> Result<bool> {
    match word {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        other => bail!("expected on or off, got {:?}", other.unwrap_or("")),
    }
}

fn direction(word: Option<&str>) -> Result<Direction> {
    match word {
        Some("up") => Ok(Direction::Up),
        Some("down") => Ok(Direction::Down),
        other => bail!("expected up or down, got {:?}", other.unwrap_or("")),
    }
}

fn level(word: Option<&str>) -> Result<Level> {
    match word {
        Some("up") => Ok(Level::Up),
        Some("down") => Ok(Level::Down),
        Some(n) => Ok(Level::Set(
            n.parse().with_context(|| format!("bad level '{}'", n))?,
        )),
        None => bail!("expected a level, up or down"),
    }
}

pub fn parse(line: &str) -> Result<Command> {
    let lower = line.trim().to_ascii_lowercase();
    let mut words = lower.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };

    let command = match verb {
        "power" => Command::Power(on_off(words.next())?),
        "mute" => Command::Mute(on_off(words.next())?),
        "vol" | "volume" => Command::Volume(level(words.next())?),
        "bass" => Command::Bass(level(words.next())?),
        "treble" => Command::Treble(level(words.next())?),
        "tune" => match words.next() {
            Some(w @ ("up" | "down")) => Command::Step(direction(Some(w))?),
            Some(band) => {
                let frequency = words.next().context("expected a frequency")?;
                let (band, frequency) = parse_station(band, frequency)?;
                let subchannel = match words.next() {
                    Some(s) => s
                        .parse()
                        .with_context(|| format!("bad subchannel '{}'", s))?,
                    None => 0,
                };
                Command::Tune(TuneInfo::new(band, frequency, subchannel))
            }
            None => bail!("expected a station or up/down"),
        },
        "seek" => Command::Seek(direction(words.next())?),
        "sub" => {
            let n = words.next().context("expected a subchannel")?;
            Command::Subchannel(n.parse().with_context(|| format!("bad subchannel '{}'", n))?)
        }
        "seekall" => Command::SeekAll(on_off(words.next())?),
        "get" => {
            let name = words.next().context("expected a command name")?;
            let command = RadioCommand::from_name(&name.to_ascii_uppercase())
                .with_context(|| format!("unknown command '{}'", name))?;
            Command::Get(command)
        }
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => bail!("unknown command '{}', try help", other),
    };
    Ok(command)
}

fn apply_level(
    level: Level,
    set: impl Fn(i32) -> Result<(), hdradio_engine::DriverError>,
    up: impl Fn() -> Result<bool, hdradio_engine::DriverError>,
    down: impl Fn() -> Result<bool, hdradio_engine::DriverError>,
) -> Result<()> {
    let moved = match level {
        Level::Set(n) => {
            set(n)?;
            true
        }
        Level::Up => up()?,
        Level::Down => down()?,
    };
    if !moved {
        println!("already at the limit");
    }
    Ok(())
}

/// Run one command against the driver
pub fn execute(radio: &HdRadio, command: Command) -> Result<()> {
    match command {
        Command::Power(true) => radio.power_on()?,
        Command::Power(false) => radio.power_off()?,
        Command::Mute(true) => radio.mute_on()?,
        Command::Mute(false) => radio.mute_off()?,
        Command::Volume(level) => apply_level(
            level,
            |n| radio.set_volume(n),
            || radio.volume_up(),
            || radio.volume_down(),
        )?,
        Command::Bass(level) => apply_level(
            level,
            |n| radio.set_bass(n),
            || radio.bass_up(),
            || radio.bass_down(),
        )?,
        Command::Treble(level) => apply_level(
            level,
            |n| radio.set_treble(n),
            || radio.treble_up(),
            || radio.treble_down(),
        )?,
        Command::Tune(tune) => radio.tune(tune)?,
        Command::Step(Direction::Up) => radio.tune_up()?,
        Command::Step(Direction::Down) => radio.tune_down()?,
        Command::Seek(Direction::Up) => radio.seek_up()?,
        Command::Seek(Direction::Down) => radio.seek_down()?,
        Command::Subchannel(n) => radio.set_hd_subchannel(n)?,
        Command::SeekAll(on) => radio.set_seek_all(on),
        Command::Get(command) => radio.request_update(command)?,
        Command::Status => print_status(radio),
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
    Ok(())
}

fn print_status(radio: &HdRadio) {
    let state = radio.state();
    println!("power:    {}", radio.power_status());
    println!("station:  {}", state.tune);
    println!(
        "audio:    volume {} bass {} treble {}{}",
        state.volume,
        state.bass,
        state.treble,
        if state.mute { " (muted)" } else { "" }
    );
    if state.hd_active {
        println!(
            "hd:       {} \"{}\" subchannel {}/{} signal {}",
            state.hd_callsign,
            state.hd_station_name,
            state.hd_subchannel,
            state.hd_subchannel_count,
            state.hd_signal_strength
        );
        println!("playing:  {} - {}", state.hd_artist, state.hd_title);
    } else {
        println!("signal:   {}", state.signal_strength);
    }
    if state.rds_enabled {
        println!(
            "rds:      {} [{}] {}",
            state.rds_program_service, state.rds_genre, state.rds_radio_text
        );
    }
    println!("seek all: {}", radio.seek_all());
}
