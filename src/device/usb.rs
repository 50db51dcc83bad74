use std::time::Duration;

use async_trait::async_trait;
use rusb::{Device, DeviceDescriptor, DeviceHandle, Language, UsbContext};
use tracing::{debug, error, info, warn};

use crate::device::{PrinterPort, UsbBus};
use crate::devices::{classify_usb_device, UsbDevice, UsbDeviceIdentifier};
use crate::error::DeviceError;

/// Descriptor strings of a USB device. Each is missing when the device has none or could not be
/// opened to read it.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UsbStrings {
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    pub serial_number: Option<String>,
}

/// A USB device opened to read its descriptor strings.
struct OpenedUsbDevice<T: UsbContext> {
    handle: DeviceHandle<T>,
    language: Language,
    timeout: Duration,
}

impl<T: UsbContext> OpenedUsbDevice<T> {
    fn open(device: &Device<T>, timeout: Duration) -> rusb::Result<Self> {
        let handle = device.open()?;
        let language = handle
            .read_languages(timeout)?
            .into_iter()
            .next()
            .ok_or(rusb::Error::NotFound)?;

        Ok(OpenedUsbDevice {
            handle,
            language,
            timeout,
        })
    }

    fn strings(&self, desc: &DeviceDescriptor) -> UsbStrings {
        UsbStrings {
            manufacturer: self
                .handle
                .read_manufacturer_string(self.language, desc, self.timeout)
                .ok(),
            product: self
                .handle
                .read_product_string(self.language, desc, self.timeout)
                .ok(),
            serial_number: self
                .handle
                .read_serial_number_string(self.language, desc, self.timeout)
                .ok(),
        }
    }
}

/// Build the record reported for one enumerated device.
///
/// `triples` holds the device class triple followed by every interface triple. The reported
/// class is the triple that decided the device type. Scanners and unknown devices report the
/// first triple with a non-zero class instead.
pub fn usb_device_record(
    bus: u8,
    address: u8,
    vid: u16,
    pid: u16,
    triples: &[(u8, u8, u8)],
    strings: UsbStrings,
) -> UsbDevice {
    let (device_type, matched) = classify_usb_device(vid, triples);
    let (class, subclass, protocol) = matched
        .or_else(|| triples.iter().copied().find(|&(class, _, _)| class != 0))
        .or_else(|| triples.first().copied())
        .unwrap_or((0, 0, 0));

    UsbDevice {
        id: format!("{:03}:{:03}", bus, address),
        vendor_id: format!("{:04x}", vid),
        product_id: format!("{:04x}", pid),
        name: strings.product,
        vendor: strings.manufacturer,
        serial_number: strings.serial_number,
        class,
        subclass,
        protocol,
        device_type,
        is_connected: true,
    }
}

fn class_triples<T: UsbContext>(device: &Device<T>, desc: &DeviceDescriptor) -> Vec<(u8, u8, u8)> {
    let mut triples = vec![(desc.class_code(), desc.sub_class_code(), desc.protocol_code())];

    match device.active_config_descriptor() {
        Ok(config) => {
            for interface in config.interfaces() {
                for setting in interface.descriptors() {
                    triples.push((
                        setting.class_code(),
                        setting.sub_class_code(),
                        setting.protocol_code(),
                    ));
                }
            }
        }
        Err(e) => debug!("No active configuration for a device: {}", e),
    }

    triples
}

/// libusb-backed enumeration.
#[derive(Debug, Clone)]
pub struct LibUsbBus<T: UsbContext> {
    context: T,
    timeout: Duration,
}

impl<T: UsbContext> LibUsbBus<T> {
    pub fn new(context: T, timeout: Duration) -> Self {
        LibUsbBus { context, timeout }
    }
}

impl<T: UsbContext> UsbBus for LibUsbBus<T> {
    #[tracing::instrument(skip(self))]
    fn enumerate(&self) -> Result<Vec<UsbDevice>, DeviceError> {
        let devices = self.context.devices()?;
        let mut found = Vec::with_capacity(devices.len());

        for device in devices.iter() {
            let desc = match device.device_descriptor() {
                Ok(d) => d,
                Err(e) => {
                    info!("Skipping a device because we failed to get the device descriptor.");
                    error!("Failed to get device descriptor: {}", e);
                    continue;
                }
            };

            let strings = match OpenedUsbDevice::open(&device, self.timeout) {
                Ok(opened) => opened.strings(&desc),
                Err(e) => {
                    debug!(
                        "Could not open {:04x}:{:04x} to read its strings: {}",
                        desc.vendor_id(),
                        desc.product_id(),
                        e
                    );
                    UsbStrings::default()
                }
            };

            found.push(usb_device_record(
                device.bus_number(),
                device.address(),
                desc.vendor_id(),
                desc.product_id(),
                &class_triples(&device, &desc),
                strings,
            ));
        }

        info!("Enumerated {} USB devices.", found.len());
        Ok(found)
    }
}

/// Open a USB device and get back a device handle.
pub fn open_usb_device<T: UsbContext>(
    context: &T,
    identifier: &UsbDeviceIdentifier,
) -> Result<DeviceHandle<T>, DeviceError> {
    info!("Looking to open an USB device matching {}...", identifier);
    let mut at_least_one_was_found = false;

    for device in context.devices()?.iter() {
        let device_desc = match device.device_descriptor() {
            Ok(d) => d,
            Err(e) => {
                info!("Skipping a device because we failed to get the device descriptor.");
                error!("Failed to get device descriptor: {}", e);
                continue;
            }
        };

        if device_desc.vendor_id() != identifier.vid() || device_desc.product_id() != identifier.pid()
        {
            continue;
        }

        info!("Found a matching device. Opening it now.");
        at_least_one_was_found = true;

        let handle = match device.open() {
            Ok(handle) => handle,
            Err(e) => {
                info!("Skipping the device because we failed to open it.");
                error!("Failed to open the device: {}", e);
                continue;
            }
        };

        if let Some(sn) = identifier.serial_number() {
            match handle.read_serial_number_string_ascii(&device_desc) {
                Ok(found) if found == sn => {}
                Ok(found) => {
                    debug!("Skipping device with serial number {}.", found);
                    continue;
                }
                Err(e) => {
                    error!("Failed to read the serial number: {}", e);
                    continue;
                }
            }
        }

        return Ok(handle);
    }

    if at_least_one_was_found {
        info!("Couldn't open any of the matching devices found.");
    } else {
        info!("Didn't find any matching devices to open.");
    }

    Err(DeviceError::NotFound(identifier.to_string()))
}

/// An interface claimed for writing. Released again on drop.
struct ClaimedInterface<T: UsbContext> {
    handle: DeviceHandle<T>,
    interface: u8,
}

impl<T: UsbContext> ClaimedInterface<T> {
    fn claim(handle: DeviceHandle<T>, interface: u8) -> Result<Self, DeviceError> {
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }
        handle.claim_interface(interface)?;
        Ok(ClaimedInterface { handle, interface })
    }

    fn write_all(&self, endpoint: u8, mut bytes: &[u8], timeout: Duration) -> Result<(), DeviceError> {
        while !bytes.is_empty() {
            let written = self.handle.write_bulk(endpoint, bytes, timeout)?;
            if written == 0 {
                return Err(DeviceError::Usb(rusb::Error::Io));
            }
            bytes = &bytes[written..];
        }
        Ok(())
    }
}

impl<T: UsbContext> Drop for ClaimedInterface<T> {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        }
    }
}

/// A printer on a USB bulk OUT endpoint.
#[derive(Debug, Clone)]
pub struct UsbPrinterPort<T: UsbContext> {
    context: T,
    identifier: UsbDeviceIdentifier,
    interface: u8,
    endpoint_out: u8,
    timeout: Duration,
}

impl<T: UsbContext> UsbPrinterPort<T> {
    pub fn new(
        context: T,
        identifier: UsbDeviceIdentifier,
        interface: u8,
        endpoint_out: u8,
        timeout: Duration,
    ) -> Self {
        UsbPrinterPort {
            context,
            identifier,
            interface,
            endpoint_out,
            timeout,
        }
    }

    fn write_job(&self, job: &[u8]) -> Result<(), DeviceError> {
        let handle = open_usb_device(&self.context, &self.identifier)?;
        let claimed = ClaimedInterface::claim(handle, self.interface)?;
        claimed.write_all(self.endpoint_out, job, self.timeout)?;
        debug!("Wrote {} bytes to {}.", job.len(), self.identifier);
        Ok(())
    }
}

#[async_trait]
impl<T: UsbContext + 'static> PrinterPort for UsbPrinterPort<T> {
    async fn send(&self, job: Vec<u8>) -> Result<(), DeviceError> {
        let port = self.clone();
        tokio::task::spawn_blocking(move || port.write_job(&job)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{classify_usb, UsbDeviceType};

    #[test]
    fn record_uses_device_class_when_set() {
        let record = usb_device_record(
            1,
            4,
            0x04b8,
            0x0e20,
            &[(7, 1, 2)],
            UsbStrings {
                manufacturer: Some("EPSON".into()),
                product: Some("TM-T20".into()),
                serial_number: None,
            },
        );
        assert_eq!(record.id, "001:004");
        assert_eq!(record.vendor_id, "04b8");
        assert_eq!(record.product_id, "0e20");
        assert_eq!(record.name.as_deref(), Some("TM-T20"));
        assert_eq!(record.vendor.as_deref(), Some("EPSON"));
        assert_eq!((record.class, record.subclass, record.protocol), (7, 1, 2));
        assert_eq!(record.device_type, UsbDeviceType::Printer);
        assert!(record.is_connected);
    }

    #[test]
    fn record_falls_back_to_interface_class() {
        let record = usb_device_record(
            2,
            9,
            0x046d,
            0xc077,
            &[(0, 0, 0), (3, 1, 2)],
            UsbStrings::default(),
        );
        assert_eq!((record.class, record.subclass, record.protocol), (3, 1, 2));
        assert_eq!(record.device_type, UsbDeviceType::Mouse);
        assert_eq!(record.name, None);
    }

    #[test]
    fn scanner_vendor_is_reported_as_scanner() {
        let record = usb_device_record(
            1,
            2,
            0x067e,
            0x0809,
            &[(0, 0, 0), (3, 1, 1)],
            UsbStrings::default(),
        );
        assert_eq!(record.device_type, UsbDeviceType::BarcodeScanner);
        assert_eq!((record.class, record.subclass, record.protocol), (3, 1, 1));
    }

    #[test]
    fn reported_class_is_the_one_that_decided_the_type() {
        let record = usb_device_record(
            1,
            3,
            0x1234,
            0x0001,
            &[(0, 0, 0), (0xFF, 0, 0), (3, 1, 1)],
            UsbStrings::default(),
        );
        assert_eq!(record.device_type, UsbDeviceType::Keyboard);
        assert_eq!((record.class, record.subclass, record.protocol), (3, 1, 1));
        assert_eq!(
            classify_usb(record.class, record.subclass, record.protocol),
            record.device_type
        );
    }

    #[test]
    fn unknown_device_reports_first_non_zero_class() {
        let record = usb_device_record(
            1,
            5,
            0x1234,
            0x0002,
            &[(0, 0, 0), (0xFF, 0x42, 1), (0x08, 6, 0x50)],
            UsbStrings::default(),
        );
        assert_eq!(record.device_type, UsbDeviceType::Unknown);
        assert_eq!((record.class, record.subclass, record.protocol), (0xFF, 0x42, 1));
    }
}
