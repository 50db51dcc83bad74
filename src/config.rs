//! Configuration for the server.
//!
//! Loaded from a TOML file given on the command line. Every key has a default, so an empty file
//! (or no file at all) describes an Epson TM-T20 on USB and a 48 column receipt.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::constants::{
    DEFAULT_TAX_RATE, DISCOVERY_SECS, EPSON_VID, RECEIPT_LINE_WIDTH, RFCOMM_CHANNEL, TM_T20_EP_OUT,
    TM_T20_PID,
};
use crate::devices::UsbDeviceIdentifier;
use crate::error::ConfigError;
use crate::receipt::{ColumnWidths, ReceiptLayout};
use crate::tools::parse_bluetooth_address;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub bluetooth: BluetoothConfig,
    pub printer: PrinterConfig,
    pub receipt: ReceiptConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from(([0, 0, 0, 0], 5000)),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// How long an inquiry runs before the scan returns.
    pub discovery_secs: u64,
    pub connect_timeout_secs: u64,
    pub rfcomm_channel: u8,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig {
            discovery_secs: DISCOVERY_SECS,
            connect_timeout_secs: 10,
            rfcomm_channel: RFCOMM_CHANNEL,
        }
    }
}

impl BluetoothConfig {
    pub fn discovery(&self) -> Duration {
        Duration::from_secs(self.discovery_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Which link the receipt printer sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Usb,
    Bluetooth,
}

/// A resolved printer link.
#[derive(Debug, Clone, PartialEq)]
pub enum PrinterTransport {
    Usb {
        identifier: UsbDeviceIdentifier,
        interface: u8,
        endpoint_out: u8,
    },
    Bluetooth {
        address: bluer::Address,
        channel: u8,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PrinterConfig {
    pub transport: TransportKind,

    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub interface: u8,
    pub endpoint_out: u8,

    pub address: Option<String>,
    pub channel: u8,

    pub io_timeout_secs: u64,
    /// Connector pin pulsed to open the cash drawer (2 or 5).
    pub drawer_pin: u8,
    /// Blank lines fed before cutting so the last line clears the cutter.
    pub feed_lines: u8,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        PrinterConfig {
            transport: TransportKind::Usb,
            vendor_id: EPSON_VID,
            product_id: TM_T20_PID,
            serial_number: None,
            interface: 0,
            endpoint_out: TM_T20_EP_OUT,
            address: None,
            channel: RFCOMM_CHANNEL,
            io_timeout_secs: 5,
            drawer_pin: 2,
            feed_lines: 4,
        }
    }
}

impl PrinterConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }

    /// Resolve the configured link, checking the fields it needs.
    pub fn transport(&self) -> Result<PrinterTransport, ConfigError> {
        match self.transport {
            TransportKind::Usb => {
                let identifier = match &self.serial_number {
                    Some(sn) => UsbDeviceIdentifier::VidPidSn {
                        vid: self.vendor_id,
                        pid: self.product_id,
                        sn: sn.clone(),
                    },
                    None => UsbDeviceIdentifier::VidPid {
                        vid: self.vendor_id,
                        pid: self.product_id,
                    },
                };
                Ok(PrinterTransport::Usb {
                    identifier,
                    interface: self.interface,
                    endpoint_out: self.endpoint_out,
                })
            }
            TransportKind::Bluetooth => {
                let address = self.address.as_deref().ok_or_else(|| {
                    ConfigError::Invalid("printer.address is required for bluetooth".into())
                })?;
                let address = parse_bluetooth_address(address).ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "printer.address is not a Bluetooth address: {}",
                        address
                    ))
                })?;
                Ok(PrinterTransport::Bluetooth {
                    address,
                    channel: self.channel,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReceiptConfig {
    pub line_width: usize,
    pub tax_rate: f64,
    pub columns: ColumnWidths,
    pub header: Vec<String>,
    pub footer: Vec<String>,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        ReceiptConfig {
            line_width: RECEIPT_LINE_WIDTH,
            tax_rate: DEFAULT_TAX_RATE,
            columns: ColumnWidths::default(),
            header: Vec::new(),
            footer: Vec::new(),
        }
    }
}

impl ReceiptConfig {
    pub fn layout(&self) -> ReceiptLayout {
        ReceiptLayout {
            line_width: self.line_width,
            tax_rate: self.tax_rate,
            columns: self.columns.clone(),
            header: self.header.clone(),
            footer: self.footer.clone(),
        }
    }
}

impl Config {
    /// Read and validate the configuration at `path`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        info!("Loading configuration from {}.", path.display());

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.receipt.tax_rate) {
            return Err(ConfigError::Invalid(format!(
                "receipt.tax_rate must be in [0, 1), got {}",
                self.receipt.tax_rate
            )));
        }
        if self.receipt.line_width == 0 {
            return Err(ConfigError::Invalid("receipt.line_width must be positive".into()));
        }
        if self.receipt.columns.row_width() > self.receipt.line_width {
            return Err(ConfigError::Invalid(format!(
                "receipt.columns add up to {}, wider than receipt.line_width {}",
                self.receipt.columns.row_width(),
                self.receipt.line_width
            )));
        }
        if self.bluetooth.discovery_secs >= self.server.request_timeout_secs {
            return Err(ConfigError::Invalid(format!(
                "bluetooth.discovery_secs ({}) must be shorter than server.request_timeout_secs ({})",
                self.bluetooth.discovery_secs, self.server.request_timeout_secs
            )));
        }
        if !matches!(self.printer.drawer_pin, 2 | 5) {
            return Err(ConfigError::Invalid(format!(
                "printer.drawer_pin must be 2 or 5, got {}",
                self.printer.drawer_pin
            )));
        }
        self.printer.transport()?;
        Ok(())
    }
}
