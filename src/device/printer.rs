use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{PrinterConfig, PrinterTransport};
use crate::device::bluetooth::RfcommPrinterPort;
use crate::device::usb::UsbPrinterPort;
use crate::device::PrinterPort;
use crate::error::{ConfigError, DeviceError};
use crate::escpos::CommandBuffer;
use crate::receipt::{PricedReceipt, ReceiptLayout};

/// The receipt printer and the cash drawer wired to it.
///
/// Jobs are serialised: a second receipt waits until the first has been written and the port
/// released.
pub struct Printer {
    port: Arc<dyn PrinterPort>,
    layout: ReceiptLayout,
    drawer_pin: u8,
    feed_lines: u8,
    busy: Mutex<()>,
}

impl Printer {
    pub fn new(
        port: Arc<dyn PrinterPort>,
        layout: ReceiptLayout,
        drawer_pin: u8,
        feed_lines: u8,
    ) -> Self {
        Printer {
            port,
            layout,
            drawer_pin,
            feed_lines,
            busy: Mutex::new(()),
        }
    }

    /// Build the printer from configuration.
    pub fn from_config(config: &PrinterConfig, layout: ReceiptLayout) -> Result<Self, ConfigError> {
        let port: Arc<dyn PrinterPort> = match config.transport()? {
            PrinterTransport::Usb {
                identifier,
                interface,
                endpoint_out,
            } => {
                info!("Using USB printer {}.", identifier);
                Arc::new(UsbPrinterPort::new(
                    rusb::GlobalContext::default(),
                    identifier,
                    interface,
                    endpoint_out,
                    config.io_timeout(),
                ))
            }
            PrinterTransport::Bluetooth { address, channel } => {
                info!("Using Bluetooth printer {} on channel {}.", address, channel);
                Arc::new(RfcommPrinterPort::new(address, channel, config.io_timeout()))
            }
        };

        Ok(Printer::new(port, layout, config.drawer_pin, config.feed_lines))
    }

    pub fn layout(&self) -> &ReceiptLayout {
        &self.layout
    }

    /// The bytes of a receipt job: the rendered text, a feed past the cutter and a full cut.
    pub fn receipt_job(&self, receipt: &PricedReceipt) -> Vec<u8> {
        let header_lines = self.layout.header.len();
        let mut job = CommandBuffer::new();

        for (i, line) in self.layout.render_lines(receipt).iter().enumerate() {
            if i == 0 && header_lines > 0 {
                job.emphasis(true);
            }
            if i == header_lines && header_lines > 0 {
                job.emphasis(false);
            }
            job.line(line);
        }

        job.feed(self.feed_lines).cut(false).build()
    }

    #[tracing::instrument(skip(self, receipt), fields(items = receipt.lines.len()))]
    pub async fn render_and_cut(&self, receipt: &PricedReceipt) -> Result<(), DeviceError> {
        let job = self.receipt_job(receipt);
        let _busy = self.busy.lock().await;
        debug!("Sending a {} byte receipt job.", job.len());
        self.port.send(job).await?;
        info!("Printed receipt totalling {}.", receipt.totals.total);
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn kick_drawer(&self) -> Result<(), DeviceError> {
        let job = CommandBuffer::new().kick_drawer(self.drawer_pin).build();
        let _busy = self.busy.lock().await;
        self.port.send(job).await?;
        info!("Kicked the cash drawer on pin {}.", self.drawer_pin);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::receipt::{ColumnWidths, Receipt, ReceiptItem};
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Records every job instead of printing it.
    #[derive(Default)]
    pub(crate) struct RecordingPort {
        pub jobs: StdMutex<Vec<Vec<u8>>>,
        pub fail: bool,
    }

    #[async_trait]
    impl PrinterPort for RecordingPort {
        async fn send(&self, job: Vec<u8>) -> Result<(), DeviceError> {
            if self.fail {
                return Err(DeviceError::NotFound("VidPid { vid: 04b8, pid: 0e20 }".into()));
            }
            self.jobs.lock().unwrap().push(job);
            Ok(())
        }
    }

    pub(crate) fn layout() -> ReceiptLayout {
        ReceiptLayout {
            line_width: 48,
            tax_rate: 0.19,
            columns: ColumnWidths::default(),
            header: vec!["Corner Shop".into()],
            footer: vec![],
        }
    }

    fn receipt() -> PricedReceipt {
        Receipt {
            items: vec![ReceiptItem {
                name: "Coffee".into(),
                product_id: "1001".into(),
                quantity: 2,
                price: 2.5,
            }],
        }
        .price(0.19)
        .unwrap()
    }

    fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack.windows(needle.len()).position(|w| w == needle)
    }

    #[tokio::test]
    async fn receipt_job_is_init_text_feed_cut() {
        let port = Arc::new(RecordingPort::default());
        let printer = Printer::new(port.clone(), layout(), 2, 4);

        printer.render_and_cut(&receipt()).await.unwrap();

        let jobs = port.jobs.lock().unwrap();
        assert_eq!(jobs.len(), 1);
        let job = &jobs[0];
        assert!(job.starts_with(&[0x1B, b'@', 0x1B, b'E', 1]));
        let text = find(job, b"Coffee            1001       2     2.50     5.00\n").unwrap();
        let total = find(job, b"TOTAL").unwrap();
        assert!(text < total);
        assert!(job.ends_with(&[0x1B, b'd', 4, 0x1D, b'V', 0]));
    }

    #[tokio::test]
    async fn receipt_job_is_deterministic() {
        let printer = Printer::new(Arc::new(RecordingPort::default()), layout(), 2, 4);
        assert_eq!(printer.receipt_job(&receipt()), printer.receipt_job(&receipt()));
    }

    #[tokio::test]
    async fn kick_drawer_pulses_configured_pin() {
        let port = Arc::new(RecordingPort::default());
        let printer = Printer::new(port.clone(), layout(), 5, 4);

        printer.kick_drawer().await.unwrap();

        let jobs = port.jobs.lock().unwrap();
        assert_eq!(jobs[0], vec![0x1B, b'@', 0x1B, b'p', 0x01, 0x19, 0xFA]);
    }

    #[tokio::test]
    async fn port_errors_are_returned() {
        let port = Arc::new(RecordingPort {
            fail: true,
            ..Default::default()
        });
        let printer = Printer::new(port, layout(), 2, 4);
        assert!(matches!(
            printer.kick_drawer().await,
            Err(DeviceError::NotFound(_))
        ));
    }
}
