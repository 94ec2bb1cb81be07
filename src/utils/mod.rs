//! Utility functions and modules for the darwin-bclm crate.
//!
//! - `bindings`: FFI bindings for IOKit and the AppleSMC user client

pub mod bindings;

/// Whether the process runs with an effective UID of 0
///
/// SMC writes and `/Library/LaunchDaemons` both need root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
