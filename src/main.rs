//! bclm - Battery Charge Level Max
//!
//! Usage:
//!   bclm read                       # Print whether charging is enabled
//!   sudo bclm write 80|100          # Disable (80) or enable (100) charging
//!   sudo bclm maintain [TARGET]     # Hold the battery between TARGET-5 and TARGET
//!   sudo bclm persist [TARGET]      # Install the launchd schedule
//!   sudo bclm unpersist             # Remove it and re-enable charging
//!   bclm status [--json]            # Diagnostic dump

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::warn;

use darwin_bclm::charge::{
    ChargeController, ChargeReading, ChargeState, MaintainConfig, Thresholds, DEFAULT_INTERVAL_SECS, DEFAULT_TARGET,
};
use darwin_bclm::daemon::{DaemonStatus, LaunchDaemon, SystemLaunchctl, DEFAULT_START_INTERVAL_SECS};
use darwin_bclm::power::{parse_pmset_output, PowerStatus, PowerStatusProvider};
use darwin_bclm::smc::{DataType, SmcKey};
use darwin_bclm::utils::is_root;
use darwin_bclm::{Error, Result};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Battery charge limiter for Macs, driven through the SMC
#[derive(Parser)]
#[command(name = "bclm", version = VERSION, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the current charging state (enabled/disabled)
    Read,
    /// Enable or disable charging (80 = disable, 100 = enable)
    Write {
        /// 80 to disable charging, 100 to enable it
        value: u8,
    },
    /// Keep the battery between TARGET-5 and TARGET by toggling charging
    Maintain {
        /// Target battery percentage (20-100)
        #[arg(default_value_t = DEFAULT_TARGET)]
        target: u8,

        /// Check interval in seconds
        #[arg(short, long, default_value_t = DEFAULT_INTERVAL_SECS)]
        interval: u64,

        /// Run a single check and exit (for launchd)
        #[arg(short, long)]
        once: bool,

        /// Re-enable charging when stopped with Ctrl+C or SIGTERM
        #[arg(long)]
        restore_on_exit: bool,
    },
    /// Install a LaunchDaemon that runs `maintain --once` periodically
    Persist {
        /// Target battery percentage (20-100)
        #[arg(default_value_t = DEFAULT_TARGET)]
        target: u8,

        /// launchd start interval in seconds
        #[arg(short, long, default_value_t = DEFAULT_START_INTERVAL_SECS)]
        interval: u64,
    },
    /// Remove the LaunchDaemon and re-enable charging
    Unpersist,
    /// Show charging state, battery info and daemon status
    Status {
        /// Print a JSON report instead of text
        #[arg(long)]
        json: bool,
    },
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt().with_env_filter(filter).with_target(false).init();
}

fn require_root() -> Result<()> {
    if is_root() {
        Ok(())
    } else {
        Err(Error::NotPrivileged)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn do_read() -> Result<()> {
    let reading = ChargeController::new(Thresholds::default()).charging_state()?;
    println!("{}", reading.state);
    Ok(())
}

fn do_write(value: u8) -> Result<()> {
    let desired = ChargeState::from_write_value(value)?;
    require_root()?;

    let applied = ChargeController::new(Thresholds::default()).set_charging(desired)?;
    println!("✓ Charging {} (via {})", applied.state, applied.key);
    Ok(())
}

fn do_maintain(config: MaintainConfig) -> Result<()> {
    require_root()?;

    let controller = ChargeController::new(config.thresholds);
    println!("=== Battery Maintain Mode ===");
    println!("Target: {}%", config.thresholds.target());
    println!("Charge when below: {}%", config.thresholds.lower());
    println!("Stop charging at: {}%", config.thresholds.upper());
    println!("Check interval: {} seconds", config.interval.as_secs());
    if config.once {
        println!("Mode: Single check");
    } else {
        println!("Mode: Continuous monitoring (Ctrl+C to stop)");
    }
    println!("=============================");

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(controller.maintain(&config, shutdown_signal()));
    Ok(())
}

fn do_persist(target: u8, interval: u64) -> Result<()> {
    let daemon = LaunchDaemon::new(Thresholds::new(target)?).with_interval_secs(interval)?;
    require_root()?;

    daemon.install(&SystemLaunchctl::default())?;

    let thresholds = daemon.thresholds;
    println!("✓ Battery maintain daemon installed!");
    println!("  - Checks battery every {} seconds", daemon.interval_secs);
    println!("  - Enables charging below {}%", thresholds.lower());
    println!("  - Disables charging at {}%", thresholds.upper());
    println!("  - Log file: {}", daemon.log_path.display());
    Ok(())
}

fn do_unpersist() -> Result<()> {
    require_root()?;

    LaunchDaemon::default().uninstall(&SystemLaunchctl::default())?;

    if ChargeController::new(Thresholds::default()).enable_charging() {
        println!("✓ Daemon removed and charging enabled.");
    } else {
        println!("✓ Daemon removed. Charging state unchanged.");
    }
    Ok(())
}

#[derive(Serialize)]
struct KeyInfoReport {
    key: SmcKey,
    data_type: DataType,
}

#[derive(Serialize)]
struct StatusReport {
    charging: Option<ChargeReading>,
    charging_error: Option<String>,
    key_info: Option<KeyInfoReport>,
    battery: Option<PowerStatus>,
    pmset: Option<String>,
    daemon: DaemonStatus,
}

fn collect_status() -> StatusReport {
    let controller = ChargeController::new(Thresholds::default());

    let (charging, charging_error) = match controller.charging_state() {
        Ok(reading) => (Some(reading), None),
        Err(e) => (None, Some(e.to_string())),
    };
    let key_info = controller.key_info().ok().map(|(key, data_type)| KeyInfoReport { key, data_type });

    let pmset = match controller.power().raw_report() {
        Ok(report) => Some(report),
        Err(e) => {
            warn!(error = %e, "Could not get battery info");
            None
        }
    };
    let battery = pmset.as_deref().map(parse_pmset_output);

    StatusReport { charging, charging_error, key_info, battery, pmset, daemon: LaunchDaemon::default().status() }
}

fn do_status(json: bool) -> Result<()> {
    let report = collect_status();

    if json {
        let text = serde_json::to_string_pretty(&report).map_err(std::io::Error::from)?;
        println!("{}", text);
        return Ok(());
    }

    println!("=== Battery Charge Limiter Status ===\n");
    match (&report.charging, &report.charging_error) {
        (Some(reading), _) => println!("Charging State: {} (via {})", reading.state, reading.key),
        (None, Some(e)) => println!("Could not read SMC: {} (try with sudo)", e),
        (None, None) => println!("Could not read SMC"),
    }
    if let Some(info) = &report.key_info {
        println!("Key Info: {} is {}", info.key, info.data_type);
    }

    println!("\n--- Current Battery Info ---");
    if let Some(battery) = &report.battery {
        match battery.percentage {
            Some(pct) => println!("Battery: {}% | {:?} | {}", pct, battery.source, battery.charging),
            None => println!("Battery: unknown | {:?}", battery.source),
        }
    }
    if let Some(raw) = &report.pmset {
        println!("{}", raw.trim_end());
    }

    println!();
    match report.daemon {
        DaemonStatus::Maintain => println!("Daemon: ✓ Maintain daemon active"),
        DaemonStatus::Legacy => println!("Daemon: ⚠ Old persist daemon (run 'sudo bclm persist' to upgrade)"),
        DaemonStatus::NotInstalled => println!("Daemon: Not installed (run 'sudo bclm persist' to enable)"),
    }
    Ok(())
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Read => do_read(),
        Commands::Write { value } => do_write(value),
        Commands::Maintain { target, interval, once, restore_on_exit } => {
            let config = MaintainConfig::new(target)?
                .with_interval_secs(interval)?
                .with_once(once)
                .with_restore_on_exit(restore_on_exit);
            do_maintain(config)
        }
        Commands::Persist { target, interval } => do_persist(target, interval),
        Commands::Unpersist => do_unpersist(),
        Commands::Status { json } => do_status(json),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            if let Some(hint) = e.hint() {
                eprintln!("  {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}
