//! # Power status
//!
//! Battery percentage and power source as reported by `pmset -g batt`.
//!
//! A typical report looks like this:
//!
//! ```text
//! Now drawing from 'AC Power'
//!  -InternalBattery-0 (id=4653155)	80%; AC attached; not charging present: true
//! ```
//!
//! Parsing is tolerant: a report without a percentage yields
//! `percentage: None` rather than an error, and an unrecognised source line
//! yields [`PowerSource::Unknown`].


use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};

/// Default location of the `pmset` utility
pub const PMSET_PATH: &str = "/usr/bin/pmset";

/// Where the machine is drawing power from
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
#[non_exhaustive]
pub enum PowerSource {
    /// Connected to AC power
    AC,
    /// Running on battery power
    Battery,
    /// Power source could not be determined
    Unknown,
}

/// Charging status column of the battery line
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargingStatus {
    Charging,
    Discharging,
    Charged,
    /// AC attached but the battery is not taking charge
    NotCharging,
    FinishingCharge,
    Unknown,
}

impl fmt::Display for ChargingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChargingStatus::Charging => "charging",
            ChargingStatus::Discharging => "discharging",
            ChargingStatus::Charged => "charged",
            ChargingStatus::NotCharging => "not charging",
            ChargingStatus::FinishingCharge => "finishing charge",
            ChargingStatus::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// One snapshot of the battery and power source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PowerStatus {
    /// Battery charge percentage (0-100), `None` when unreadable
    pub percentage: Option<u8>,
    pub source: PowerSource,
    pub charging: ChargingStatus,
}

impl PowerStatus {
    pub fn on_ac(&self) -> bool {
        self.source == PowerSource::AC
    }
}

/// Supplies battery percentage and AC state to the charge controller
#[cfg_attr(test, mockall::automock)]
pub trait PowerStatusProvider: fmt::Debug + Send + Sync {
    fn power_status(&self) -> Result<PowerStatus>;

    /// The unparsed report, for diagnostics
    fn raw_report(&self) -> Result<String>;
}

/// [`PowerStatusProvider`] backed by `pmset -g batt`
#[derive(Debug, Clone)]
pub struct Pmset {
    program: PathBuf,
}

impl Default for Pmset {
    fn default() -> Self {
        Self { program: PathBuf::from(PMSET_PATH) }
    }
}

impl Pmset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a different executable instead of `/usr/bin/pmset`
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }
}

impl PowerStatusProvider for Pmset {
    fn power_status(&self) -> Result<PowerStatus> {
        let report = self.raw_report()?;
        let status = parse_pmset_output(&report);
        debug!(percentage = ?status.percentage, source = ?status.source, charging = %status.charging, "Parsed pmset report");
        Ok(status)
    }

    fn raw_report(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .args(["-g", "batt"])
            .output()
            .map_err(|e| Error::power_status(format!("failed to run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(Error::power_status(format!("{} exited with {}", self.program.display(), output.status)));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse the text of `pmset -g batt`
pub fn parse_pmset_output(output: &str) -> PowerStatus {
    let source = if output.contains("'AC Power'") {
        PowerSource::AC
    } else if output.contains("'Battery Power'") {
        PowerSource::Battery
    } else {
        PowerSource::Unknown
    };

    let battery_line = output.lines().find(|line| line.contains('%'));
    let percentage = battery_line.and_then(parse_percentage);
    let charging = battery_line.map_or(ChargingStatus::Unknown, parse_charging_status);

    PowerStatus { percentage, source, charging }
}

/// First run of digits immediately followed by `%`
fn parse_percentage(line: &str) -> Option<u8> {
    let end = line.find('%')?;
    let digits_start = line[..end].rfind(|c: char| !c.is_ascii_digit()).map_or(0, |i| i + 1);
    let value: u8 = line[digits_start..end].parse().ok()?;
    (value <= 100).then_some(value)
}

fn parse_charging_status(line: &str) -> ChargingStatus {
    let Some((_, rest)) = line.split_once("%;") else {
        return ChargingStatus::Unknown;
    };
    let status = rest.split(';').next().unwrap_or_default().trim();

    match status {
        "charging" => ChargingStatus::Charging,
        "discharging" => ChargingStatus::Discharging,
        "charged" => ChargingStatus::Charged,
        "finishing charge" => ChargingStatus::FinishingCharge,
        "AC attached" | "not charging" => ChargingStatus::NotCharging,
        _ => ChargingStatus::Unknown,
    }
}
