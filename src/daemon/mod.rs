//! # LaunchDaemon installer
//!
//! `persist` hands scheduling to launchd: a descriptor in
//! `/Library/LaunchDaemons` runs `bclm maintain <target> --once` every
//! `StartInterval` seconds, across reboots and sleep.

pub mod constants;

#[cfg(test)]
mod tests;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde::Serialize;
use tracing::{debug, info, warn};

pub use constants::*;

use crate::charge::Thresholds;
use crate::error::{Error, Result};

/// Loads and unloads launchd descriptors
#[cfg_attr(test, mockall::automock)]
pub trait Launchctl: fmt::Debug {
    fn load(&self, plist: &Path) -> Result<()>;
    fn unload(&self, plist: &Path) -> Result<()>;
}

/// [`Launchctl`] that runs `/bin/launchctl`
#[derive(Debug, Clone)]
pub struct SystemLaunchctl {
    program: PathBuf,
}

impl Default for SystemLaunchctl {
    fn default() -> Self {
        Self { program: PathBuf::from(LAUNCHCTL_PATH) }
    }
}

impl SystemLaunchctl {
    fn run(&self, action: &str, plist: &Path) -> Result<()> {
        debug!(action, plist = %plist.display(), "Running launchctl");
        let status = Command::new(&self.program)
            .args([action, "-w"])
            .arg(plist)
            .status()
            .map_err(|e| Error::daemon(format!("failed to run {}: {}", self.program.display(), e)))?;

        if !status.success() {
            return Err(Error::daemon(format!("launchctl {} {} exited with {}", action, plist.display(), status)));
        }
        Ok(())
    }
}

impl Launchctl for SystemLaunchctl {
    fn load(&self, plist: &Path) -> Result<()> {
        self.run("load", plist)
    }

    fn unload(&self, plist: &Path) -> Result<()> {
        self.run("unload", plist)
    }
}

/// Which descriptor is currently installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DaemonStatus {
    Maintain,
    Legacy,
    NotInstalled,
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaemonStatus::Maintain => write!(f, "installed ({})", DAEMON_LABEL),
            DaemonStatus::Legacy => write!(f, "legacy descriptor installed ({})", LEGACY_LABEL),
            DaemonStatus::NotInstalled => f.write_str("not installed"),
        }
    }
}

/// The launchd descriptor for the periodic charge check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchDaemon {
    pub label: String,
    pub plist_path: PathBuf,
    pub legacy_plist_path: PathBuf,
    pub program: PathBuf,
    pub log_path: PathBuf,
    pub thresholds: Thresholds,
    pub interval_secs: u64,
}

impl Default for LaunchDaemon {
    fn default() -> Self {
        Self {
            label: DAEMON_LABEL.to_string(),
            plist_path: PathBuf::from(PLIST_PATH),
            legacy_plist_path: PathBuf::from(LEGACY_PLIST_PATH),
            program: PathBuf::from(PROGRAM_PATH),
            log_path: PathBuf::from(LOG_PATH),
            thresholds: Thresholds::default(),
            interval_secs: DEFAULT_START_INTERVAL_SECS,
        }
    }
}

impl LaunchDaemon {
    pub fn new(thresholds: Thresholds) -> Self {
        Self { thresholds, ..Self::default() }
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Result<Self> {
        if secs == 0 {
            return Err(Error::invalid_argument("start interval (seconds, at least 1)", secs));
        }
        self.interval_secs = secs;
        Ok(self)
    }

    /// Use `label` for the job and its descriptor file name
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        let file_name = format!("{}.plist", self.label);
        self.plist_path.set_file_name(file_name);
        self
    }

    /// Place both descriptors in `dir` instead of `/Library/LaunchDaemons`
    ///
    /// The legacy descriptor keeps its fixed `com.bclm.persist` name.
    pub fn with_plist_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.plist_path = dir.join(format!("{}.plist", self.label));
        self.legacy_plist_path = dir.join(format!("{}.plist", LEGACY_LABEL));
        self
    }

    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_log_path(mut self, log_path: impl Into<PathBuf>) -> Self {
        self.log_path = log_path.into();
        self
    }

    /// Property list text for this descriptor
    pub fn render(&self) -> String {
        let program = xml_escape(&self.program.to_string_lossy());
        let log = xml_escape(&self.log_path.to_string_lossy());

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{label}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{program}</string>
        <string>maintain</string>
        <string>{target}</string>
        <string>--once</string>
    </array>
    <key>StartInterval</key>
    <integer>{interval}</integer>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <dict>
        <key>SuccessfulExit</key>
        <false/>
    </dict>
    <key>StandardOutPath</key>
    <string>{log}</string>
    <key>StandardErrorPath</key>
    <string>{log}</string>
</dict>
</plist>
"#,
            label = xml_escape(&self.label),
            program = program,
            target = self.thresholds.target(),
            interval = self.interval_secs,
            log = log,
        )
    }

    /// Write the descriptor and load it, replacing the legacy one
    pub fn install(&self, launchctl: &dyn Launchctl) -> Result<()> {
        if !self.program.exists() {
            return Err(Error::daemon(format!(
                "bclm not found at {} (install it there first)",
                self.program.display()
            )));
        }

        if self.legacy_plist_path.exists() {
            info!(plist = %self.legacy_plist_path.display(), "Removing legacy daemon");
            remove_descriptor(launchctl, &self.legacy_plist_path)?;
        }

        let staging = self.plist_path.with_extension("plist.tmp");
        fs::write(&staging, self.render())?;
        fs::rename(&staging, &self.plist_path)?;
        info!(
            plist = %self.plist_path.display(),
            limit = self.thresholds.target(),
            interval_secs = self.interval_secs,
            "Wrote daemon descriptor"
        );

        launchctl.load(&self.plist_path)
    }

    /// Unload and delete both descriptors if present
    pub fn uninstall(&self, launchctl: &dyn Launchctl) -> Result<()> {
        for plist in [&self.plist_path, &self.legacy_plist_path] {
            if plist.exists() {
                remove_descriptor(launchctl, plist)?;
                info!(plist = %plist.display(), "Removed daemon descriptor");
            }
        }
        Ok(())
    }

    pub fn status(&self) -> DaemonStatus {
        if self.plist_path.exists() {
            DaemonStatus::Maintain
        } else if self.legacy_plist_path.exists() {
            DaemonStatus::Legacy
        } else {
            DaemonStatus::NotInstalled
        }
    }
}

// A descriptor that fails to unload (e.g. never loaded) is still deleted
fn remove_descriptor(launchctl: &dyn Launchctl, plist: &Path) -> Result<()> {
    if let Err(e) = launchctl.unload(plist) {
        warn!(plist = %plist.display(), error = %e, "launchctl unload failed");
    }
    fs::remove_file(plist)?;
    Ok(())
}

fn xml_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}
