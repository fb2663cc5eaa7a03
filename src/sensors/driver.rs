//! Trainer driver capability.

use crate::sensors::ble::BleTrainer;
use crate::sensors::ftms::ControlCommand;
use crate::sensors::simulated::SimulatedTrainer;
use crate::sensors::types::{SensorError, TrainerEvent};
use std::future::Future;
use tokio::sync::mpsc::UnboundedSender;

/// Sending half of the trainer event channel.
pub type EventSender = UnboundedSender<TrainerEvent>;

/// A connection to a trainer.
///
/// Implementations decode telemetry through [`crate::sensors::ftms`] and
/// publish [`TrainerEvent`]s on the channel they were constructed with.
pub trait TrainerDriver: Send {
    /// Establish the transport, subscribe to notifications and request control.
    ///
    /// On failure the driver is left disconnected and can be connected again.
    fn connect(&mut self) -> impl Future<Output = Result<(), SensorError>> + Send;

    /// Tear down the connection. Calling this while disconnected is a no-op.
    fn disconnect(&mut self) -> impl Future<Output = Result<(), SensorError>> + Send;

    /// Encode and write a control command.
    ///
    /// Fails with [`SensorError::ControlNotGranted`] for anything but
    /// `RequestControl` until the machine has granted control.
    fn send_control(
        &self,
        command: ControlCommand,
    ) -> impl Future<Output = Result<(), SensorError>> + Send;

    fn is_connected(&self) -> bool;

    fn has_control(&self) -> bool;

    /// Human readable name of the connected machine.
    fn name(&self) -> &str;
}

/// The driver variants, selected when the bridge connects.
pub enum Trainer {
    Simulated(SimulatedTrainer),
    Ble(BleTrainer),
}

impl TrainerDriver for Trainer {
    async fn connect(&mut self) -> Result<(), SensorError> {
        match self {
            Trainer::Simulated(t) => t.connect().await,
            Trainer::Ble(t) => t.connect().await,
        }
    }

    async fn disconnect(&mut self) -> Result<(), SensorError> {
        match self {
            Trainer::Simulated(t) => t.disconnect().await,
            Trainer::Ble(t) => t.disconnect().await,
        }
    }

    async fn send_control(&self, command: ControlCommand) -> Result<(), SensorError> {
        match self {
            Trainer::Simulated(t) => t.send_control(command).await,
            Trainer::Ble(t) => t.send_control(command).await,
        }
    }

    fn is_connected(&self) -> bool {
        match self {
            Trainer::Simulated(t) => t.is_connected(),
            Trainer::Ble(t) => t.is_connected(),
        }
    }

    fn has_control(&self) -> bool {
        match self {
            Trainer::Simulated(t) => t.has_control(),
            Trainer::Ble(t) => t.has_control(),
        }
    }

    fn name(&self) -> &str {
        match self {
            Trainer::Simulated(t) => t.name(),
            Trainer::Ble(t) => t.name(),
        }
    }
}
