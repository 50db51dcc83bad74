use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address, Device, Session};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BluetoothConfig;
use crate::device::{BluetoothControl, PrinterPort};
use crate::devices::{BluetoothDevice, ConnectedBluetoothDevice};
use crate::error::DeviceError;

/// Bluetooth through BlueZ over D-Bus.
///
/// A D-Bus session is opened per operation and dropped when it returns, so the server starts
/// even when `bluetoothd` is not running.
#[derive(Debug, Clone)]
pub struct BluezControl {
    discovery: Duration,
    connect_timeout: Duration,
    rfcomm_channel: u8,
}

impl BluezControl {
    pub fn new(config: &BluetoothConfig) -> Self {
        BluezControl {
            discovery: config.discovery(),
            connect_timeout: config.connect_timeout(),
            rfcomm_channel: config.rfcomm_channel,
        }
    }
}

async fn default_adapter() -> Result<(Session, Adapter), DeviceError> {
    let session = Session::new().await?;
    let adapter = session.default_adapter().await?;
    if !adapter.is_powered().await? {
        info!("Powering on adapter {}.", adapter.name());
        adapter.set_powered(true).await?;
    }
    Ok((session, adapter))
}

/// Run discovery for at most `window`, stopping early once `wanted` shows up.
async fn discover(
    adapter: &Adapter,
    window: Duration,
    wanted: Option<Address>,
) -> Result<BTreeSet<Address>, DeviceError> {
    let mut events = Box::pin(adapter.discover_devices().await?);
    let mut seen = BTreeSet::new();

    let collect = async {
        while let Some(event) = events.next().await {
            if let AdapterEvent::DeviceAdded(address) = event {
                debug!("Discovered {}.", address);
                seen.insert(address);
                if wanted == Some(address) {
                    break;
                }
            }
        }
    };
    if timeout(window, collect).await.is_err() {
        debug!("Discovery window of {:?} elapsed.", window);
    }

    Ok(seen)
}

async fn describe(device: &Device) -> Result<BluetoothDevice, DeviceError> {
    let mut services: Vec<String> = device
        .uuids()
        .await?
        .unwrap_or_default()
        .into_iter()
        .map(|uuid| uuid.to_string())
        .collect();
    services.sort();

    Ok(BluetoothDevice::new(
        device.address().to_string(),
        device.name().await?,
        device.class().await?.unwrap_or(0),
        device.is_connected().await?,
        services,
    ))
}

impl BluezControl {
    /// Look `address` up on the adapter, running discovery when BlueZ does not know it yet.
    async fn find(&self, adapter: &Adapter, address: Address) -> Result<Device, DeviceError> {
        if !adapter.device_addresses().await?.contains(&address) {
            info!("{} is not known yet, discovering.", address);
            if !discover(adapter, self.discovery, Some(address))
                .await?
                .contains(&address)
            {
                return Err(DeviceError::NotFound(address.to_string()));
            }
        }
        Ok(adapter.device(address)?)
    }
}

#[async_trait]
impl BluetoothControl for BluezControl {
    #[tracing::instrument(skip(self))]
    async fn scan(&self) -> Result<Vec<BluetoothDevice>, DeviceError> {
        let (_session, adapter) = default_adapter().await?;
        info!("Scanning for {:?}.", self.discovery);

        let mut devices = Vec::new();
        for address in discover(&adapter, self.discovery, None).await? {
            let described = match adapter.device(address) {
                Ok(device) => describe(&device).await,
                Err(e) => Err(e.into()),
            };
            match described {
                Ok(device) => devices.push(device),
                Err(e) => warn!("Skipping {}: {}", address, e),
            }
        }

        info!("Found {} Bluetooth devices.", devices.len());
        Ok(devices)
    }

    #[tracing::instrument(skip(self))]
    async fn connected_devices(&self) -> Result<Vec<ConnectedBluetoothDevice>, DeviceError> {
        let (_session, adapter) = default_adapter().await?;

        let mut connected = Vec::new();
        for address in adapter.device_addresses().await? {
            let device = adapter.device(address)?;
            if device.is_connected().await? {
                connected.push(ConnectedBluetoothDevice {
                    address: address.to_string(),
                    name: device.name().await?,
                });
            }
        }
        Ok(connected)
    }

    #[tracing::instrument(skip(self))]
    async fn connect(&self, address: Address) -> Result<(), DeviceError> {
        let target = SocketAddr::new(address, self.rfcomm_channel);
        info!("Connecting to {} on RFCOMM channel {}.", address, self.rfcomm_channel);

        let stream = timeout(self.connect_timeout, Stream::connect(target))
            .await
            .map_err(|_| DeviceError::Timeout(self.connect_timeout))??;
        drop(stream);

        info!("Connected to {}.", address);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn pair(&self, address: Address) -> Result<(), DeviceError> {
        let (_session, adapter) = default_adapter().await?;
        let device = self.find(&adapter, address).await?;
        pair_and_trust(&device, address).await
    }

    #[tracing::instrument(skip(self))]
    async fn disconnect_and_remove(&self, address: Address) -> Result<(), DeviceError> {
        let (_session, adapter) = default_adapter().await?;
        if !adapter.device_addresses().await?.contains(&address) {
            return Err(DeviceError::NotFound(address.to_string()));
        }

        let device = adapter.device(address)?;
        if device.is_connected().await? {
            device.disconnect().await?;
            info!("Disconnected {}.", address);
        }
        adapter.remove_device(address).await?;
        info!("Removed {}.", address);
        Ok(())
    }
}

/// The device calls pairing needs.
#[async_trait]
trait Pairable: Sync {
    async fn is_paired(&self) -> Result<bool, DeviceError>;
    async fn pair(&self) -> Result<(), DeviceError>;
    async fn set_trusted(&self, trusted: bool) -> Result<(), DeviceError>;
    async fn is_connected(&self) -> Result<bool, DeviceError>;
    async fn connect(&self) -> Result<(), DeviceError>;
}

#[async_trait]
impl Pairable for Device {
    async fn is_paired(&self) -> Result<bool, DeviceError> {
        Ok(Device::is_paired(self).await?)
    }

    async fn pair(&self) -> Result<(), DeviceError> {
        Ok(Device::pair(self).await?)
    }

    async fn set_trusted(&self, trusted: bool) -> Result<(), DeviceError> {
        Ok(Device::set_trusted(self, trusted).await?)
    }

    async fn is_connected(&self) -> Result<bool, DeviceError> {
        Ok(Device::is_connected(self).await?)
    }

    async fn connect(&self) -> Result<(), DeviceError> {
        Ok(Device::connect(self).await?)
    }
}

/// Pair if needed and trust the device, then try to connect its profiles.
///
/// The connect is best effort. Serial-only devices such as receipt printers have no profile
/// BlueZ can connect, and they are paired all the same.
async fn pair_and_trust<D: Pairable + ?Sized>(
    device: &D,
    address: Address,
) -> Result<(), DeviceError> {
    if device.is_paired().await? {
        info!("{} is already paired.", address);
    } else {
        device.pair().await?;
        info!("Paired with {}.", address);
    }
    device.set_trusted(true).await?;

    match device.is_connected().await {
        Ok(true) => {}
        Ok(false) => {
            if let Err(e) = device.connect().await {
                warn!("Paired with {} but could not connect its profiles: {}", address, e);
            }
        }
        Err(e) => warn!("Could not read the connection state of {}: {}", address, e),
    }
    Ok(())
}

/// A printer reached over an RFCOMM serial channel.
#[derive(Debug, Clone)]
pub struct RfcommPrinterPort {
    address: Address,
    channel: u8,
    timeout: Duration,
}

impl RfcommPrinterPort {
    pub fn new(address: Address, channel: u8, timeout: Duration) -> Self {
        RfcommPrinterPort {
            address,
            channel,
            timeout,
        }
    }
}

#[async_trait]
impl PrinterPort for RfcommPrinterPort {
    async fn send(&self, job: Vec<u8>) -> Result<(), DeviceError> {
        let target = SocketAddr::new(self.address, self.channel);
        let mut stream = timeout(self.timeout, Stream::connect(target))
            .await
            .map_err(|_| DeviceError::Timeout(self.timeout))??;

        timeout(self.timeout, stream.write_all(&job))
            .await
            .map_err(|_| DeviceError::Timeout(self.timeout))??;
        stream.shutdown().await?;

        debug!("Wrote {} bytes to {}.", job.len(), self.address);
        Ok(())
    }
}
