/// Errors produced while talking to the SMC or managing the charge limiter
///
/// The first five variants are the SMC channel taxonomy. A successful
/// transport call can still carry a device-level failure, so `Unknown` keeps
/// both the IOKit return code and the SMC result byte.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("AppleSMC driver not found")]
    DriverNotFound,

    #[error("Failed to open connection to AppleSMC driver (kIOReturn={code:#x})")]
    FailedToOpen { code: i32 },

    #[error("SMC key '{key}' not found")]
    KeyNotFound { key: String },

    #[error("Not privileged to access the SMC")]
    NotPrivileged,

    #[error("Unknown SMC error: kIOReturn={io_return:#x}, SMCResult={smc_result}")]
    Unknown { io_return: i32, smc_result: u8 },

    #[error("Invalid SMC key: {0}")]
    InvalidKey(String),

    #[error("Invalid argument for {context}: {value}")]
    InvalidArgument { context: String, value: String },

    #[error("Power status unavailable: {0}")]
    PowerStatus(String),

    #[error("Daemon error: {0}")]
    Daemon(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn key_not_found<S: Into<String>>(key: S) -> Self {
        Error::KeyNotFound { key: key.into() }
    }

    pub(crate) fn invalid_key<S: Into<String>>(msg: S) -> Self {
        Error::InvalidKey(msg.into())
    }

    pub(crate) fn invalid_argument<C: Into<String>, V: ToString>(context: C, value: V) -> Self {
        Error::InvalidArgument { context: context.into(), value: value.to_string() }
    }

    pub(crate) fn power_status<S: Into<String>>(msg: S) -> Self {
        Error::PowerStatus(msg.into())
    }

    pub(crate) fn daemon<S: Into<String>>(msg: S) -> Self {
        Error::Daemon(msg.into())
    }

    /// A remediation line suitable for showing to a user, if one applies
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::NotPrivileged => Some("Requires root privileges (run with sudo)"),
            Error::DriverNotFound => Some("AppleSMC is only available on macOS hardware"),
            Error::KeyNotFound { .. } => Some("This controller generation does not expose that key"),
            Error::FailedToOpen { .. } => Some("Try running with sudo for full access"),
            _ => None,
        }
    }
}

/// Result type for darwin-bclm operations
pub type Result<T> = std::result::Result<T, Error>;
