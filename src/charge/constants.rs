use super::types::ChargeKeyFamily;
use crate::smc::{DataType, SmcKey};

/// Charge-inhibit switch on newer firmware (4 bytes, byte 0 non-zero = inhibited)
pub const TAHOE_KEY: SmcKey = SmcKey::from_static("CHTE");
/// Charge-inhibit switch on older firmware (1 byte, 0x02 = inhibited)
pub const LEGACY_KEY: SmcKey = SmcKey::from_static("CH0B");
/// Companion of `CH0B`; never written by the controller
pub const LEGACY_KEY_SECONDARY: SmcKey = SmcKey::from_static("CH0C");

/// Candidate switches, tried in order until one accepts the operation
pub const CHARGE_KEY_FAMILIES: [ChargeKeyFamily; 2] = [
    ChargeKeyFamily::new(TAHOE_KEY, DataType::UINT32, 0x01, 0x00),
    ChargeKeyFamily::new(LEGACY_KEY, DataType::UINT8, 0x02, 0x00),
];

/// Distance between the upper (target) and lower threshold, in percentage points
pub const HYSTERESIS_BAND: u8 = 5;

pub const MIN_TARGET: u8 = 20;
pub const MAX_TARGET: u8 = 100;
pub const DEFAULT_TARGET: u8 = 80;

/// Poll cadence of the continuous loop
pub const DEFAULT_INTERVAL_SECS: u64 = 30;

// `write` accepts only these two percentages
pub const WRITE_LIMITED: u8 = 80;
pub const WRITE_UNLIMITED: u8 = 100;
