//! Capabilities the HTTP layer needs from the hardware.
//!
//! Each trait is a seam: the server holds trait objects, the real implementations talk to BlueZ
//! and libusb, and tests substitute in-memory fakes.

use async_trait::async_trait;
use bluer::Address;

use crate::devices::{BluetoothDevice, ConnectedBluetoothDevice, UsbDevice};
use crate::error::DeviceError;

pub mod bluetooth;
pub mod printer;
pub mod usb;

#[async_trait]
pub trait BluetoothControl: Send + Sync {
    /// Run an inquiry and describe every device seen.
    async fn scan(&self) -> Result<Vec<BluetoothDevice>, DeviceError>;

    /// Devices the adapter currently holds a connection to.
    async fn connected_devices(&self) -> Result<Vec<ConnectedBluetoothDevice>, DeviceError>;

    /// Open an RFCOMM connection to `address` and close it again.
    async fn connect(&self, address: Address) -> Result<(), DeviceError>;

    /// Pair with, trust and connect to `address`.
    async fn pair(&self, address: Address) -> Result<(), DeviceError>;

    /// Drop the connection to `address` and forget its pairing.
    async fn disconnect_and_remove(&self, address: Address) -> Result<(), DeviceError>;
}

/// USB enumeration. Blocking; callers run it off the async executor.
pub trait UsbBus: Send + Sync {
    fn enumerate(&self) -> Result<Vec<UsbDevice>, DeviceError>;
}

/// A link to a printer.
///
/// `send` opens the link, writes the whole job and releases the link before returning, whether
/// the write succeeded or not.
#[async_trait]
pub trait PrinterPort: Send + Sync {
    async fn send(&self, job: Vec<u8>) -> Result<(), DeviceError>;
}
