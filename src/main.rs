use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use crate::config::Config;
use crate::device::bluetooth::BluezControl;
use crate::device::printer::Printer;
use crate::device::usb::LibUsbBus;
use crate::error::ServerError;
use crate::server::{AppState, PosDeviceServer};

// ESC/POS receipt printers, cash drawers and barcode scanners are the usual peripherals of a
// point of sale terminal. This server exposes them to the till software over HTTP:
//
// - Bluetooth discovery, RFCOMM connect, pairing and removal go through BlueZ on D-Bus.
// - USB devices are enumerated with libusb and classified by their class triple, or by vendor
//   for barcode scanners, which usually enumerate as HID keyboards.
// - The receipt printer is driven with a handful of ESC/POS commands over a USB bulk endpoint
//   or an RFCOMM channel, and the cash drawer is kicked through the printer's drawer port.

pub mod config;
pub mod constants;
pub mod device;
pub mod devices;
pub mod error;
pub mod escpos;
pub mod receipt;
pub mod server;
pub mod tools;

/// HTTP bridge to point of sale hardware.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the configuration.
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,
}

/// Timeout for the control transfers that read USB descriptor strings.
const USB_STRING_TIMEOUT: Duration = Duration::from_millis(500);

#[tracing::instrument(skip(args))]
async fn run(args: Args) -> Result<(), ServerError> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => {
            info!("No configuration file given, using defaults.");
            Config::default()
        }
    };
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }

    let state = AppState {
        bluetooth: Arc::new(BluezControl::new(&config.bluetooth)),
        usb: Arc::new(LibUsbBus::new(
            rusb::GlobalContext::default(),
            USB_STRING_TIMEOUT,
        )),
        printer: Arc::new(Printer::from_config(
            &config.printer,
            config.receipt.layout(),
        )?),
    };

    PosDeviceServer::new(
        config.server.bind,
        Duration::from_secs(config.server.request_timeout_secs),
        state,
    )
    .start()
    .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    tools::initialize_logging(args.json_logs);
    info!("Starting Server POS.");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
