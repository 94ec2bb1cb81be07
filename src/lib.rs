//! darwin-bclm - Battery charge level limiter for Macs
//!
//! This crate keeps a MacBook battery inside a charge band by flipping the
//! charge-inhibit switch in the Apple System Management Controller (SMC).
//! It talks to the `AppleSMC` driver directly through IOKit.
//!
//! # Modules
//!
//! - **smc**: four-character keys, the 80-byte transaction record, and the
//!   [`Smc`](smc::Smc) connection
//! - **charge**: the hysteresis controller and its maintain loop
//! - **power**: battery percentage and AC state from `pmset -g batt`
//! - **daemon**: the launchd descriptor used by `bclm persist`
//!
//! # Examples
//!
//! ```rust,no_run
//! use darwin_bclm::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let controller = ChargeController::new(Thresholds::new(80)?);
//!     let reading = controller.charging_state()?;
//!     println!("Charging {} (via {})", reading.state, reading.key);
//!
//!     let outcome = controller.check_and_adjust();
//!     println!("{:?}", outcome.decision);
//!     Ok(())
//! }
//! ```
//!
//! # Safety
//!
//! All unsafe FFI lives behind [`smc::Smc`]. Connections are closed on drop,
//! and no connection outlives the operation that opened it.

#![doc(html_root_url = "https://docs.rs/darwin-bclm/0.1.0")]

pub mod charge;
pub mod daemon;
pub mod error;
pub mod power;
pub mod smc;
pub mod utils;

pub use error::{Error, Result};

/// Re-export common types for convenience
pub mod prelude {
    pub use crate::charge::{decide, ChargeController, ChargeState, Decision, MaintainConfig, Thresholds, TickOutcome};
    pub use crate::daemon::{LaunchDaemon, SystemLaunchctl};
    pub use crate::power::{Pmset, PowerSource, PowerStatus, PowerStatusProvider};
    pub use crate::smc::{DataType, Smc, SmcKey};
    pub use crate::{Error, Result};
}
