/// Intermec's Vendor ID.
pub static INTERMEC_VID: u16 = 0x067e;

/// Honeywell's (Hand Held Products) Vendor ID.
pub static HONEYWELL_VID: u16 = 0x0c2e;

/// Zebra's (formerly Symbol Technologies) Vendor ID.
pub static ZEBRA_VID: u16 = 0x05e0;

/// Datalogic's Vendor ID.
pub static DATALOGIC_VID: u16 = 0x05f9;

/// Vendors whose devices are reported as barcode scanners no matter which HID class they present.
pub static BARCODE_SCANNER_VIDS: [u16; 4] = [INTERMEC_VID, HONEYWELL_VID, ZEBRA_VID, DATALOGIC_VID];

/// Epson's Vendor ID.
pub static EPSON_VID: u16 = 0x04b8;

/// Epson TM-T20 series Product ID.
pub static TM_T20_PID: u16 = 0x0e20;

/// Bulk OUT endpoint of the TM-T20 printer interface.
pub static TM_T20_EP_OUT: u8 = 0x01;

/// Characters per line on 80mm paper with font A.
pub static RECEIPT_LINE_WIDTH: usize = 48;

/// VAT rate applied when splitting the receipt total.
pub static DEFAULT_TAX_RATE: f64 = 0.19;

/// Seconds spent in Bluetooth inquiry.
pub static DISCOVERY_SECS: u64 = 8;

/// RFCOMM channel used when connecting to a device.
pub static RFCOMM_CHANNEL: u8 = 1;
