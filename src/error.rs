use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Connect failures are reported with these messages when the OS error code is known.
static CONNECT_STATUS: [(i32, &str); 7] = [
    (0, "ok"),
    (1, "communication timeout"),
    (3, "checksum error"),
    (4, "unknown command"),
    (5, "invalid access level"),
    (8, "hardware error"),
    (10, "device not ready"),
];

/// Look up the message for a connect error code.
pub fn connect_status_message(code: i32) -> Option<&'static str> {
    CONNECT_STATUS
        .iter()
        .find(|(status, _)| *status == code)
        .map(|(_, message)| *message)
}

/// Failures reported by the hardware layer.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("{0}")]
    Bluetooth(#[from] bluer::Error),

    #[error("{0}")]
    Usb(#[from] rusb::Error),

    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("device not found: {0}")]
    NotFound(String),

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("device task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl DeviceError {
    /// Name of the failing layer, echoed to clients as `from`.
    pub fn origin(&self) -> &'static str {
        match self {
            DeviceError::Bluetooth(_) | DeviceError::Io(_) | DeviceError::Timeout(_) => {
                "BluetoothError"
            }
            DeviceError::Usb(_) => "USBError",
            DeviceError::NotFound(_) | DeviceError::Task(_) => "Exception",
        }
    }

    /// OS error code behind the failure, if there is one.
    pub fn code(&self) -> Option<i32> {
        match self {
            DeviceError::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Message reported to clients: the status table entry when the code is known, otherwise the
    /// error text.
    pub fn client_message(&self) -> String {
        self.code()
            .and_then(connect_status_message)
            .map_or_else(|| self.to_string(), str::to_string)
    }
}

/// A receipt that cannot be printed as submitted.
#[derive(Debug, Error, PartialEq)]
pub enum ReceiptError {
    #[error("receipt has no items")]
    Empty,

    #[error("item {index} ({name}): quantity must be at least 1")]
    InvalidQuantity { index: usize, name: String },

    #[error("item {index} ({name}): price must be a non-negative number")]
    InvalidPrice { index: usize, name: String },

    #[error("receipt total is too large")]
    Overflow,
}

/// Problems loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Reasons the server fails to start or stops serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("server I/O failed: {0}")]
    Io(#[from] io::Error),
}
