use std::fmt;
use std::time::Duration;

use serde::Serialize;

use super::constants::{
    DEFAULT_INTERVAL_SECS, DEFAULT_TARGET, HYSTERESIS_BAND, MAX_TARGET, MIN_TARGET, WRITE_LIMITED, WRITE_UNLIMITED,
};
use crate::error::{Error, Result};
use crate::smc::{DataType, SmcBytes, SmcKey, SMC_BYTES_LEN};

/// Logical position of the charge-inhibit switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChargeState {
    Enabled,
    Disabled,
}

impl ChargeState {
    /// Map the `write` command's percentage onto a switch position
    pub fn from_write_value(value: u8) -> Result<Self> {
        match value {
            WRITE_LIMITED => Ok(ChargeState::Disabled),
            WRITE_UNLIMITED => Ok(ChargeState::Enabled),
            other => Err(Error::invalid_argument("write value (expected 80 or 100)", other)),
        }
    }
}

impl fmt::Display for ChargeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeState::Enabled => f.write_str("enabled"),
            ChargeState::Disabled => f.write_str("disabled"),
        }
    }
}

/// One controller generation's encoding of the charge-inhibit switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargeKeyFamily {
    pub key: SmcKey,
    pub data_type: DataType,
    /// Byte 0 written to inhibit charging
    pub disable_value: u8,
    /// Byte 0 written to allow charging
    pub enable_value: u8,
}

impl ChargeKeyFamily {
    pub const fn new(key: SmcKey, data_type: DataType, disable_value: u8, enable_value: u8) -> Self {
        Self { key, data_type, disable_value, enable_value }
    }

    pub fn payload(&self, state: ChargeState) -> SmcBytes {
        let mut bytes = [0u8; SMC_BYTES_LEN];
        bytes[0] = match state {
            ChargeState::Disabled => self.disable_value,
            ChargeState::Enabled => self.enable_value,
        };
        bytes
    }

    /// Decode a read payload; any non-zero first byte means inhibited
    pub fn state_from(&self, bytes: &SmcBytes) -> ChargeState {
        if bytes[0] != 0 {
            ChargeState::Disabled
        } else {
            ChargeState::Enabled
        }
    }
}

/// Target percentage and the hysteresis band below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    target: u8,
}

impl Thresholds {
    pub fn new(target: u8) -> Result<Self> {
        if !(MIN_TARGET..=MAX_TARGET).contains(&target) {
            return Err(Error::invalid_argument(format!("target (expected {}-{})", MIN_TARGET, MAX_TARGET), target));
        }
        Ok(Self { target })
    }

    pub fn target(&self) -> u8 {
        self.target
    }

    /// Charging resumes strictly below this percentage
    pub fn lower(&self) -> u8 {
        self.target - HYSTERESIS_BAND
    }

    /// Charging stops at or above this percentage
    pub fn upper(&self) -> u8 {
        self.target
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self { target: DEFAULT_TARGET }
    }
}

/// Settings for the `maintain` loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintainConfig {
    pub thresholds: Thresholds,
    pub interval: Duration,
    /// Run a single tick and return
    pub once: bool,
    /// Re-enable charging when the loop is shut down gracefully
    pub restore_on_exit: bool,
}

impl Default for MaintainConfig {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            interval: Duration::from_secs(DEFAULT_INTERVAL_SECS),
            once: false,
            restore_on_exit: false,
        }
    }
}

impl MaintainConfig {
    pub fn new(target: u8) -> Result<Self> {
        Ok(Self { thresholds: Thresholds::new(target)?, ..Self::default() })
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Result<Self> {
        if secs == 0 {
            return Err(Error::invalid_argument("interval (seconds, at least 1)", secs));
        }
        self.interval = Duration::from_secs(secs);
        Ok(self)
    }

    pub fn with_once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn with_restore_on_exit(mut self, restore: bool) -> Self {
        self.restore_on_exit = restore;
        self
    }
}

/// What one tick decided to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Percentage could not be read; nothing was touched
    Unreadable,
    /// At or above target and charging still allowed
    Disable,
    AlreadyDisabled,
    /// Below target on battery power; report only
    OffAc,
    /// Below the lower threshold on AC and charging inhibited
    Enable,
    AlreadyEnabled,
    /// Inside the band on AC; keep whatever the switch says
    Hold,
}

impl Decision {
    /// The switch position this decision wants written, if any
    pub fn desired_state(&self) -> Option<ChargeState> {
        match self {
            Decision::Disable => Some(ChargeState::Disabled),
            Decision::Enable => Some(ChargeState::Enabled),
            _ => None,
        }
    }
}

/// Observed switch position and the key it was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChargeReading {
    pub state: ChargeState,
    pub key: SmcKey,
}

/// Result of a successful enable/disable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Applied {
    pub key: SmcKey,
    pub state: ChargeState,
    /// `false` when the switch already matched and no write was issued
    pub written: bool,
}

/// Summary of one check-and-adjust tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickOutcome {
    pub percentage: Option<u8>,
    pub on_ac: bool,
    pub state: Option<ChargeState>,
    pub decision: Decision,
    pub applied: Option<Applied>,
    /// `false` when a power query, connection or write failed
    pub success: bool,
}

impl TickOutcome {
    pub(crate) fn skipped(percentage: Option<u8>, on_ac: bool) -> Self {
        Self { percentage, on_ac, state: None, decision: Decision::Unreadable, applied: None, success: true }
    }

    pub(crate) fn failed(percentage: Option<u8>, on_ac: bool) -> Self {
        Self { success: false, ..Self::skipped(percentage, on_ac) }
    }
}
