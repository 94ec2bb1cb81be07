pub const DAEMON_LABEL: &str = "com.bclm.maintain";
pub const PLIST_PATH: &str = "/Library/LaunchDaemons/com.bclm.maintain.plist";

/// Descriptor written by older releases, replaced on install
pub const LEGACY_LABEL: &str = "com.bclm.persist";
pub const LEGACY_PLIST_PATH: &str = "/Library/LaunchDaemons/com.bclm.persist.plist";

pub const PROGRAM_PATH: &str = "/usr/local/bin/bclm";
pub const LOG_PATH: &str = "/var/log/bclm.log";
pub const LAUNCHCTL_PATH: &str = "/bin/launchctl";

/// launchd `StartInterval` for the scheduled `maintain --once` run
pub const DEFAULT_START_INTERVAL_SECS: u64 = 60;
