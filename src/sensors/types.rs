//! Trainer types, events and errors.

use crate::sensors::ftms::{ControlOpcode, ControlResultCode, TelemetrySample};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which driver variant the bridge should construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainerKind {
    /// Synthetic telemetry, no transport
    Simulated,
    /// Real FTMS trainer over Bluetooth LE
    Ble,
}

impl std::fmt::Display for TrainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainerKind::Simulated => write!(f, "Simulated Trainer"),
            TrainerKind::Ble => write!(f, "BLE Trainer"),
        }
    }
}

/// A trainer found during BLE scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredTrainer {
    /// BLE device address/identifier
    pub device_id: String,
    /// User-friendly name (from BLE advertisement)
    pub name: String,
    /// Signal strength (RSSI)
    pub signal_strength: Option<i16>,
}

/// Fault reported on the event channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainerFault {
    /// Transport or setup failure; the driver is left disconnected
    #[error("Transport error: {0}")]
    Transport(String),

    /// The machine answered a control command with a non-success result
    #[error("Control command {opcode} rejected: {result}")]
    ControlRejected {
        opcode: ControlOpcode,
        result: ControlResultCode,
    },
}

/// Events from the trainer bridge.
#[derive(Debug, Clone)]
pub enum TrainerEvent {
    /// A decoded (possibly partial) indoor bike data frame
    Telemetry(TelemetrySample),
    /// Something went wrong
    Error(TrainerFault),
}

/// Errors that can occur in the trainer drivers.
#[derive(Debug, Error)]
pub enum SensorError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start BLE scanning
    #[error("Failed to start scanning: {0}")]
    ScanFailed(String),

    /// No FTMS trainer advertised before the discovery timeout
    #[error("Trainer not found: {0}")]
    SensorNotFound(String),

    /// Connection to trainer failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timed out
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Failed to subscribe to trainer notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// The trainer does not expose a required characteristic
    #[error("Missing characteristic: {0}")]
    MissingCharacteristic(uuid::Uuid),

    /// RequestControl was not acknowledged in time
    #[error("Control request timed out")]
    ControlTimeout,

    /// RequestControl was answered with a non-success result
    #[error("Control request rejected: {0}")]
    ControlRejected(ControlResultCode),

    /// A command other than RequestControl was sent before control was granted
    #[error("Control of the trainer has not been granted")]
    ControlNotGranted,

    /// No driver connected
    #[error("Trainer not connected")]
    NotConnected,

    /// Failed to write to trainer characteristic
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}

impl From<btleplug::Error> for SensorError {
    fn from(e: btleplug::Error) -> Self {
        SensorError::BleError(e.to_string())
    }
}
