use derive_more::Display;
use serde::Serialize;

use crate::constants::BARCODE_SCANNER_VIDS;

/// Identifier for USB devices supported by this application.
#[derive(Debug, Display, Eq, PartialEq, Clone)]
pub enum UsbDeviceIdentifier {
    /// A device matching a vendor ID (vid) and a product ID (pid).
    #[display(fmt = "VidPid {{ vid: {:04x?}, pid: {:04x?} }}", vid, pid)]
    VidPid { vid: u16, pid: u16 },

    /// A device matching a vendor ID (vid), a product ID (pid) and a (usually) unique product
    /// serial number (sn).
    #[display(
        fmt = "VidPidSn {{ vid: {:04x?}, pid: {:04x?}, sn: {} }}",
        vid,
        pid,
        sn
    )]
    VidPidSn { vid: u16, pid: u16, sn: String },
}

impl UsbDeviceIdentifier {
    pub fn vid(&self) -> u16 {
        match self {
            UsbDeviceIdentifier::VidPid { vid, .. } | UsbDeviceIdentifier::VidPidSn { vid, .. } => {
                *vid
            }
        }
    }

    pub fn pid(&self) -> u16 {
        match self {
            UsbDeviceIdentifier::VidPid { pid, .. } | UsbDeviceIdentifier::VidPidSn { pid, .. } => {
                *pid
            }
        }
    }

    /// The serial number a matching device must report, if any.
    pub fn serial_number(&self) -> Option<&str> {
        match self {
            UsbDeviceIdentifier::VidPid { .. } => None,
            UsbDeviceIdentifier::VidPidSn { sn, .. } => Some(sn),
        }
    }
}

/// Label derived from a Bluetooth class-of-device code.
#[derive(Debug, Display, Eq, PartialEq, Clone, Copy, Serialize)]
pub enum BluetoothDeviceType {
    #[display(fmt = "Computer")]
    Computer,
    #[display(fmt = "Tablet")]
    Tablet,
    #[display(fmt = "Phone")]
    Phone,
    #[display(fmt = "Network Access Point")]
    #[serde(rename = "Network Access Point")]
    NetworkAccessPoint,
    #[display(fmt = "Audio/Video")]
    #[serde(rename = "Audio/Video")]
    AudioVideo,
    #[display(fmt = "Peripheral")]
    Peripheral,
    #[display(fmt = "BLE Device")]
    #[serde(rename = "BLE Device")]
    BleDevice,
    #[display(fmt = "Imaging")]
    Imaging,
    #[display(fmt = "Wearable")]
    Wearable,
    #[display(fmt = "Toy")]
    Toy,
    #[display(fmt = "Health")]
    Health,
    #[display(fmt = "Uncategorized")]
    Uncategorized,
    #[display(fmt = "Unknown")]
    Unknown,
}

const MAJOR_CLASS_COMPUTER: u32 = 0x01;
const MAJOR_CLASS_PERIPHERAL: u32 = 0x05;
const COMPUTER_MINOR_TABLET: u32 = 0x07;

static BLUETOOTH_MAJOR_CLASSES: [(u32, BluetoothDeviceType); 10] = [
    (0x01, BluetoothDeviceType::Computer),
    (0x02, BluetoothDeviceType::Phone),
    (0x03, BluetoothDeviceType::NetworkAccessPoint),
    (0x04, BluetoothDeviceType::AudioVideo),
    (0x05, BluetoothDeviceType::Peripheral),
    (0x06, BluetoothDeviceType::Imaging),
    (0x07, BluetoothDeviceType::Wearable),
    (0x08, BluetoothDeviceType::Toy),
    (0x09, BluetoothDeviceType::Health),
    (0x1F, BluetoothDeviceType::Uncategorized),
];

/// Map a class-of-device code to a device type.
///
/// The major class is taken from bits 8..16. Peripherals with bit 2 set are reported as BLE
/// devices, and computers whose minor class is "tablet" as tablets.
pub fn classify_bluetooth(device_class: u32) -> BluetoothDeviceType {
    let major_class = (device_class >> 8) & 0xFF;

    match major_class {
        MAJOR_CLASS_PERIPHERAL if (device_class >> 2) & 0x01 == 1 => BluetoothDeviceType::BleDevice,
        MAJOR_CLASS_COMPUTER if (device_class >> 2) & 0x3F == COMPUTER_MINOR_TABLET => {
            BluetoothDeviceType::Tablet
        }
        _ => BLUETOOTH_MAJOR_CLASSES
            .iter()
            .find(|(major, _)| *major == major_class)
            .map_or(BluetoothDeviceType::Unknown, |(_, device_type)| *device_type),
    }
}

/// Label derived from a USB class/subclass/protocol triple.
#[derive(Debug, Display, Eq, PartialEq, Clone, Copy, Serialize)]
pub enum UsbDeviceType {
    #[display(fmt = "Printer")]
    Printer,
    #[display(fmt = "Keyboard")]
    Keyboard,
    #[display(fmt = "Mouse")]
    Mouse,
    #[display(fmt = "Barcode Scanner")]
    #[serde(rename = "Barcode Scanner")]
    BarcodeScanner,
    #[display(fmt = "Unknown")]
    Unknown,
}

const USB_CLASS_PRINTER: u8 = 0x07;
const USB_CLASS_HID: u8 = 0x03;
const HID_SUBCLASS_BOOT: u8 = 0x01;
const HID_PROTOCOL_KEYBOARD: u8 = 0x01;
const HID_PROTOCOL_MOUSE: u8 = 0x02;

/// Map a USB class triple to a device type.
pub fn classify_usb(class: u8, subclass: u8, protocol: u8) -> UsbDeviceType {
    match (class, subclass, protocol) {
        (USB_CLASS_PRINTER, _, _) => UsbDeviceType::Printer,
        (USB_CLASS_HID, HID_SUBCLASS_BOOT, HID_PROTOCOL_KEYBOARD) => UsbDeviceType::Keyboard,
        (USB_CLASS_HID, HID_SUBCLASS_BOOT, HID_PROTOCOL_MOUSE) => UsbDeviceType::Mouse,
        _ => UsbDeviceType::Unknown,
    }
}

/// Classify a whole USB device.
///
/// Scanners from known vendors win over whatever HID class they pretend to be. Otherwise the
/// device triple is tried first, then each interface triple in order. The triple that decided
/// the type is returned with it; there is none for scanners and unknown devices.
pub fn classify_usb_device(
    vid: u16,
    triples: &[(u8, u8, u8)],
) -> (UsbDeviceType, Option<(u8, u8, u8)>) {
    if BARCODE_SCANNER_VIDS.contains(&vid) {
        return (UsbDeviceType::BarcodeScanner, None);
    }

    triples
        .iter()
        .map(|&(class, subclass, protocol)| {
            (
                classify_usb(class, subclass, protocol),
                Some((class, subclass, protocol)),
            )
        })
        .find(|(device_type, _)| *device_type != UsbDeviceType::Unknown)
        .unwrap_or((UsbDeviceType::Unknown, None))
}

/// A Bluetooth device seen during discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BluetoothDevice {
    pub address: String,
    pub name: Option<String>,
    pub class: u32,
    #[serde(rename = "type")]
    pub device_type: BluetoothDeviceType,
    pub is_connected: bool,
    pub services: Vec<String>,
}

impl BluetoothDevice {
    pub fn new(
        address: String,
        name: Option<String>,
        class: u32,
        is_connected: bool,
        services: Vec<String>,
    ) -> Self {
        BluetoothDevice {
            address,
            name,
            class,
            device_type: classify_bluetooth(class),
            is_connected,
            services,
        }
    }
}

/// A Bluetooth device the adapter currently holds a connection to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedBluetoothDevice {
    pub address: String,
    pub name: Option<String>,
}

/// A device found on the USB bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsbDevice {
    /// `bus:address`, unique while the device stays plugged in.
    pub id: String,
    pub vendor_id: String,
    pub product_id: String,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub serial_number: Option<String>,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
    #[serde(rename = "type")]
    pub device_type: UsbDeviceType,
    pub is_connected: bool,
}
