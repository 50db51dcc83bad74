use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bluer::Address;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::device::printer::Printer;
use crate::device::{BluetoothControl, UsbBus};
use crate::error::DeviceError;
use crate::receipt::PrintReceiptRequest;
use crate::tools::parse_bluetooth_address;

/// Hardware handles shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub bluetooth: Arc<dyn BluetoothControl>,
    pub usb: Arc<dyn UsbBus>,
    pub printer: Arc<Printer>,
}

/// Serves the device routes over HTTP.
pub struct PosDeviceServer {
    bind: SocketAddr,
    request_timeout: Duration,
    state: AppState,
}

impl PosDeviceServer {
    #[tracing::instrument(skip(state))]
    pub fn new(bind: SocketAddr, request_timeout: Duration, state: AppState) -> Self {
        info!("Creating new POS Device Server on {}", bind);

        PosDeviceServer {
            bind,
            request_timeout,
            state,
        }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), self.request_timeout)
    }

    /// Bind and serve until Ctrl-C.
    pub async fn start(self) -> std::io::Result<()> {
        info!("Starting server.");

        let listener = TcpListener::bind(self.bind).await?;
        info!("Listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down.");
}

/// All routes, mounted under `/v1`.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let v1 = Router::new()
        .route("/health", get(health))
        .route("/bluetooth/devices", get(bluetooth_devices))
        .route("/bluetooth/connected-devices", get(connected_devices))
        .route("/bluetooth/connect", post(connect_device))
        .route("/bluetooth/pair", post(pair_device))
        .route(
            "/bluetooth/disconnect-and-remove",
            post(disconnect_and_remove_device),
        )
        .route("/usb/devices", get(usb_devices))
        .route("/printer/print-receipt", post(print_receipt))
        .route("/printer/kick-cashdrawer", get(kick_cash_drawer))
        .with_state(state);

    Router::new()
        .nest("/v1", v1)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

const OK_MESSAGE: &str = "ok!";
const INVALID_ADDRESS: &str = "Invalid Bluetooth address";

#[derive(Debug, Serialize)]
struct ListResponse<T> {
    data: Vec<T>,
    status_code: u16,
    message: &'static str,
}

impl<T> ListResponse<T> {
    fn ok(data: Vec<T>) -> Json<Self> {
        Json(ListResponse {
            data,
            status_code: StatusCode::OK.as_u16(),
            message: OK_MESSAGE,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ConnectRequest {
    address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceAddressRequest {
    device_address: Option<String>,
}

/// Failures of the JSON routes.
#[derive(Debug)]
enum ApiError {
    InvalidAddress,
    BadRequest(String),
    Bluetooth {
        address: Option<String>,
        error: DeviceError,
    },
    Usb(DeviceError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidAddress => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "message": INVALID_ADDRESS })),
            )
                .into_response(),
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "message": message }))).into_response()
            }
            ApiError::Bluetooth { address, error } => {
                warn!("Bluetooth operation failed: {}", error);
                let mut body = json!({
                    "message": error.client_message(),
                    "from": error.origin(),
                });
                if let Some(address) = address {
                    body["address"] = Value::from(address);
                }
                if let Some(code) = error.code() {
                    body["error_code"] = Value::from(code);
                }
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
            ApiError::Usb(error) => {
                let message = match error {
                    DeviceError::Usb(_) => format!("USBError: {}", error),
                    _ => format!(
                        "An error occurred while retrieving USB devices: {}",
                        error
                    ),
                };
                error!("{}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": message })),
                )
                    .into_response()
            }
        }
    }
}

fn validated_address(candidate: Option<&str>) -> Result<Address, ApiError> {
    match candidate.and_then(parse_bluetooth_address) {
        Some(address) => Ok(address),
        None => {
            info!("Rejected Bluetooth address {:?}.", candidate);
            Err(ApiError::InvalidAddress)
        }
    }
}

fn rejected(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

async fn bluetooth_devices(State(state): State<AppState>) -> Result<Response, ApiError> {
    let devices = state
        .bluetooth
        .scan()
        .await
        .map_err(|error| ApiError::Bluetooth {
            address: None,
            error,
        })?;
    Ok(ListResponse::ok(devices).into_response())
}

async fn connected_devices(State(state): State<AppState>) -> Result<Response, ApiError> {
    let devices = state
        .bluetooth
        .connected_devices()
        .await
        .map_err(|error| ApiError::Bluetooth {
            address: None,
            error,
        })?;
    Ok(ListResponse::ok(devices).into_response())
}

async fn connect_device(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(rejected)?;
    let address = validated_address(request.address.as_deref())?;

    state
        .bluetooth
        .connect(address)
        .await
        .map_err(|error| ApiError::Bluetooth {
            address: Some(address.to_string()),
            error,
        })?;

    Ok(Json(json!({
        "message": "Bluetooth device connected successfully",
        "address": address.to_string(),
    })))
}

async fn pair_device(
    State(state): State<AppState>,
    payload: Result<Json<DeviceAddressRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(rejected)?;
    let address = validated_address(request.device_address.as_deref())?;

    state
        .bluetooth
        .pair(address)
        .await
        .map_err(|error| ApiError::Bluetooth {
            address: Some(address.to_string()),
            error,
        })?;

    Ok(Json(json!({
        "message": "Device paired successfully",
        "address": address.to_string(),
    })))
}

async fn disconnect_and_remove_device(
    State(state): State<AppState>,
    payload: Result<Json<DeviceAddressRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = payload.map_err(rejected)?;
    let address = validated_address(request.device_address.as_deref())?;

    state
        .bluetooth
        .disconnect_and_remove(address)
        .await
        .map_err(|error| ApiError::Bluetooth {
            address: Some(address.to_string()),
            error,
        })?;

    Ok(Json(json!({
        "message": "Device disconnected and removed successfully",
        "address": address.to_string(),
    })))
}

async fn usb_devices(State(state): State<AppState>) -> Result<Response, ApiError> {
    let usb = state.usb.clone();
    let devices = tokio::task::spawn_blocking(move || usb.enumerate())
        .await
        .map_err(|e| ApiError::Usb(e.into()))?
        .map_err(ApiError::Usb)?;
    Ok(ListResponse::ok(devices).into_response())
}

async fn print_receipt(
    State(state): State<AppState>,
    payload: Result<Json<PrintReceiptRequest>, JsonRejection>,
) -> (StatusCode, String) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Invalid receipt data: {}", rejection.body_text()),
            )
        }
    };

    let receipt = match request
        .receipt_data
        .price(state.printer.layout().tax_rate)
    {
        Ok(receipt) => receipt,
        Err(e) => return (StatusCode::BAD_REQUEST, format!("Invalid receipt data: {}", e)),
    };

    match state.printer.render_and_cut(&receipt).await {
        Ok(()) => (StatusCode::OK, "Receipt printed successfully".to_string()),
        Err(e) => {
            error!("Failed to print receipt: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to print receipt: {}", e),
            )
        }
    }
}

async fn kick_cash_drawer(State(state): State<AppState>) -> (StatusCode, String) {
    match state.printer.kick_drawer().await {
        Ok(()) => (StatusCode::OK, "Cash drawer kicked successfully!".to_string()),
        Err(e) => {
            error!("Failed to kick the cash drawer: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to kick the cash drawer: {}", e),
            )
        }
    }
}
