//! # Charge controller
//!
//! Hysteresis control of the SMC charge-inhibit switch.
//!
//! Each tick reads the battery percentage and power source, reads the current
//! switch position from the SMC, and then decides:
//!
//! 1. percentage unreadable: do nothing
//! 2. percentage at or above the target: inhibit charging, on AC or not
//! 3. on battery power: report only
//! 4. on AC and strictly below `target - 5`: allow charging
//! 5. otherwise: hold
//!
//! Rule 2 deliberately applies on battery too, so the switch is already in
//! place when AC comes back during sleep.
//!
//! The switch has a different key and encoding per firmware generation. The
//! controller walks [`CHARGE_KEY_FAMILIES`] in order and uses the first one
//! that works.

pub mod constants;
pub mod types;


use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, instrument, warn};

pub use constants::*;
pub use types::*;

use crate::error::{Error, Result};
use crate::power::{Pmset, PowerStatusProvider};
use crate::smc::{Connector, DataType, IOKitConnector, Smc, SmcKey};

/// Pure hysteresis decision over one set of inputs
pub fn decide(
    thresholds: &Thresholds,
    percentage: Option<u8>,
    on_ac: bool,
    current: Option<ChargeState>,
) -> Decision {
    let Some(percentage) = percentage else {
        return Decision::Unreadable;
    };

    if percentage >= thresholds.upper() {
        return match current {
            Some(ChargeState::Disabled) => Decision::AlreadyDisabled,
            _ => Decision::Disable,
        };
    }

    if !on_ac {
        return Decision::OffAc;
    }

    if percentage < thresholds.lower() {
        return match current {
            Some(ChargeState::Enabled) => Decision::AlreadyEnabled,
            _ => Decision::Enable,
        };
    }

    Decision::Hold
}

fn no_key_families() -> Error {
    Error::invalid_argument("charge key families", "none configured")
}

/// Read the switch through the first key family that answers
pub fn read_state(smc: &mut Smc, families: &[ChargeKeyFamily]) -> Result<ChargeReading> {
    let mut last_error = None;

    for family in families {
        match smc.read_key(family.key, family.data_type) {
            Ok(bytes) => return Ok(ChargeReading { state: family.state_from(&bytes), key: family.key }),
            Err(e) => {
                debug!(key = %family.key, error = %e, "Charge key unreadable, trying next");
                keep_informative(&mut last_error, e);
            }
        }
    }

    Err(last_error.unwrap_or_else(no_key_families))
}

// A later key-not-found never hides an earlier, more specific failure
fn keep_informative(slot: &mut Option<Error>, e: Error) {
    if slot.is_none() || !matches!(e, Error::KeyNotFound { .. }) {
        *slot = Some(e);
    }
}

fn write_family(smc: &mut Smc, family: &ChargeKeyFamily, desired: ChargeState) -> Result<Applied> {
    smc.write_key(family.key, family.data_type, &family.payload(desired))?;
    Ok(Applied { key: family.key, state: desired, written: true })
}

fn apply_primary(smc: &mut Smc, family: &ChargeKeyFamily, desired: ChargeState) -> Result<Applied> {
    let bytes = smc.read_key(family.key, family.data_type)?;
    if family.state_from(&bytes) == desired {
        return Ok(Applied { key: family.key, state: desired, written: false });
    }

    write_family(smc, family, desired)
}

/// Put the switch into `desired`, falling back through the key families
///
/// The primary family is read first and left alone when it is already in the
/// desired position. Fallback families are written unconditionally. When
/// every family fails, the most specific error is returned: a key-not-found
/// from a later family does not replace an earlier failure.
pub fn apply_state(smc: &mut Smc, families: &[ChargeKeyFamily], desired: ChargeState) -> Result<Applied> {
    let mut last_error = None;

    for (i, family) in families.iter().enumerate() {
        let result = if i == 0 { apply_primary(smc, family, desired) } else { write_family(smc, family, desired) };
        match result {
            Ok(applied) => return Ok(applied),
            Err(e) => {
                warn!(key = %family.key, error = %e, "Failed to set charging {} via key", desired);
                keep_informative(&mut last_error, e);
            }
        }
    }

    Err(last_error.unwrap_or_else(no_key_families))
}

/// Drives the charge-inhibit switch from power status readings
#[derive(Debug)]
pub struct ChargeController {
    connector: Box<dyn Connector>,
    power: Box<dyn PowerStatusProvider>,
    thresholds: Thresholds,
    families: Vec<ChargeKeyFamily>,
}

impl ChargeController {
    /// Controller for the local machine: AppleSMC plus `pmset`
    pub fn new(thresholds: Thresholds) -> Self {
        Self::with_parts(Box::new(IOKitConnector), Box::new(Pmset::new()), thresholds)
    }

    pub fn with_parts(
        connector: Box<dyn Connector>,
        power: Box<dyn PowerStatusProvider>,
        thresholds: Thresholds,
    ) -> Self {
        Self { connector, power, thresholds, families: CHARGE_KEY_FAMILIES.to_vec() }
    }

    /// Replace the ordered list of candidate switches
    pub fn with_key_families(mut self, families: Vec<ChargeKeyFamily>) -> Self {
        self.families = families;
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn power(&self) -> &dyn PowerStatusProvider {
        self.power.as_ref()
    }

    /// Current switch position, read over a fresh connection
    pub fn charging_state(&self) -> Result<ChargeReading> {
        let mut smc = self.connector.connect()?;
        read_state(&mut smc, &self.families)
    }

    /// Type and size the controller reports for the first switch key it knows
    pub fn key_info(&self) -> Result<(SmcKey, DataType)> {
        let mut smc = self.connector.connect()?;
        let mut last_error = None;

        for family in &self.families {
            match smc.key_info(family.key) {
                Ok(info) => return Ok((family.key, info)),
                Err(e) => keep_informative(&mut last_error, e),
            }
        }

        Err(last_error.unwrap_or_else(no_key_families))
    }

    /// Set the switch over a fresh connection, propagating the final error
    pub fn set_charging(&self, desired: ChargeState) -> Result<Applied> {
        let mut smc = self.connector.connect()?;
        apply_state(&mut smc, &self.families, desired)
    }

    pub fn enable_charging(&self) -> bool {
        self.set_charging_logged(ChargeState::Enabled)
    }

    pub fn disable_charging(&self) -> bool {
        self.set_charging_logged(ChargeState::Disabled)
    }

    fn set_charging_logged(&self, desired: ChargeState) -> bool {
        match self.set_charging(desired) {
            Ok(applied) => {
                if applied.written {
                    info!(key = %applied.key, "Charging {}", desired);
                } else {
                    debug!(key = %applied.key, "Charging already {}", desired);
                }
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to set charging {}", desired);
                false
            }
        }
    }

    /// One read-decide-write tick over a single scoped connection
    #[instrument(level = "debug", skip(self), fields(limit = self.thresholds.target()))]
    pub fn check_and_adjust(&self) -> TickOutcome {
        let status = match self.power.power_status() {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Could not read power status");
                return TickOutcome::skipped(None, false);
            }
        };
        let on_ac = status.on_ac();

        let Some(percentage) = status.percentage else {
            warn!(on_ac, "Could not read battery percentage");
            return TickOutcome::skipped(None, on_ac);
        };

        let smc = match self.connector.connect() {
            Ok(smc) => smc,
            Err(e) => {
                error!(error = %e, "Could not open SMC connection");
                return TickOutcome::failed(Some(percentage), on_ac);
            }
        };
        let mut smc = scopeguard::guard(smc, |smc| {
            if !smc.close() {
                warn!("Failed to close SMC connection");
            }
        });

        let current = match read_state(&mut smc, &self.families) {
            Ok(reading) => Some(reading.state),
            Err(e) => {
                warn!(error = %e, "Could not read charging state");
                None
            }
        };

        let decision = decide(&self.thresholds, Some(percentage), on_ac, current);
        let mut outcome = TickOutcome {
            percentage: Some(percentage),
            on_ac,
            state: current,
            decision,
            applied: None,
            success: true,
        };

        match decision {
            Decision::Disable => {
                info!(percentage, on_ac, limit = self.thresholds.upper(), "At or above target, disabling charging");
            }
            Decision::Enable => {
                info!(percentage, lower = self.thresholds.lower(), "Below lower threshold on AC, enabling charging");
            }
            Decision::OffAc => {
                info!(percentage, state = ?current, "On battery power, no action");
            }
            Decision::Hold => {
                info!(percentage, state = ?current, "Within band, holding");
            }
            Decision::AlreadyDisabled | Decision::AlreadyEnabled => {
                debug!(percentage, on_ac, state = ?current, "Charging state already correct");
            }
            Decision::Unreadable => {}
        }

        if let Some(desired) = decision.desired_state() {
            match apply_state(&mut smc, &self.families, desired) {
                Ok(applied) => {
                    outcome.state = Some(desired);
                    outcome.applied = Some(applied);
                }
                Err(e) => {
                    error!(error = %e, "Failed to set charging {}", desired);
                    outcome.success = false;
                }
            }
        }

        outcome
    }

    /// Tick every `interval` until `shutdown` resolves; returns the tick count
    ///
    /// Shutdown is only observed between ticks.
    pub async fn run<F>(&self, interval: Duration, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticks = 0;

        loop {
            self.check_and_adjust();
            ticks += 1;

            tokio::select! {
                _ = &mut shutdown => {
                    info!(ticks, "Shutdown requested, stopping charge monitor");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        ticks
    }

    /// Run the configured maintain mode: one tick, or the loop until shutdown
    pub async fn maintain<F>(&self, config: &MaintainConfig, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        if config.once {
            self.check_and_adjust();
            return 1;
        }

        info!(
            limit = self.thresholds.upper(),
            lower = self.thresholds.lower(),
            interval_secs = config.interval.as_secs(),
            "Maintaining battery charge"
        );
        let ticks = self.run(config.interval, shutdown).await;

        if config.restore_on_exit && !self.enable_charging() {
            warn!("Could not re-enable charging on exit");
        }

        ticks
    }
}
