//! Trainer bridge.
//!
//! One handle per process owns the active driver and the event channel. The
//! handle is cheap to clone; clones share the same driver.

use crate::sensors::ble::BleTrainer;
use crate::sensors::driver::{EventSender, Trainer, TrainerDriver};
use crate::sensors::ftms::ControlCommand;
use crate::sensors::simulated::SimulatedTrainer;
use crate::sensors::types::{SensorError, TrainerEvent, TrainerFault, TrainerKind};
use crate::storage::config::{SensorSettings, SimulatorSettings};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::Mutex;

/// Owns at most one connected trainer.
#[derive(Clone)]
pub struct TrainerBridge {
    trainer: Arc<Mutex<Option<Trainer>>>,
    events: EventSender,
    sensors: SensorSettings,
    simulator: SimulatorSettings,
}

impl TrainerBridge {
    /// Create a bridge and the receiving end of its event channel.
    pub fn new(
        sensors: SensorSettings,
        simulator: SimulatorSettings,
    ) -> (Self, UnboundedReceiver<TrainerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bridge = Self {
            trainer: Arc::new(Mutex::new(None)),
            events: tx,
            sensors,
            simulator,
        };
        (bridge, rx)
    }

    /// Send an event if the receiver is still listening.
    fn send_event(&self, event: TrainerEvent) {
        let _ = self.events.send(event);
    }

    /// Connect a trainer of the given kind, replacing any current one.
    pub async fn connect(&self, kind: TrainerKind) -> Result<(), SensorError> {
        let mut slot = self.trainer.lock().await;

        if let Some(mut previous) = slot.take() {
            tracing::info!("Replacing connected trainer: {}", previous.name());
            if let Err(e) = previous.disconnect().await {
                tracing::warn!("Failed to disconnect previous trainer: {}", e);
            }
        }

        let mut trainer = match kind {
            TrainerKind::Simulated => Trainer::Simulated(SimulatedTrainer::new(
                self.simulator.clone(),
                self.events.clone(),
            )),
            TrainerKind::Ble => {
                Trainer::Ble(BleTrainer::new(self.sensors.clone(), self.events.clone()))
            }
        };

        if let Err(e) = trainer.connect().await {
            self.send_event(TrainerEvent::Error(TrainerFault::Transport(e.to_string())));
            return Err(e);
        }

        tracing::info!("{} connected: {}", kind, trainer.name());
        *slot = Some(trainer);
        Ok(())
    }

    /// Disconnect the current trainer, if any.
    pub async fn disconnect(&self) -> Result<(), SensorError> {
        let mut slot = self.trainer.lock().await;
        match slot.take() {
            Some(mut trainer) => trainer.disconnect().await,
            None => Ok(()),
        }
    }

    /// Send a control command to the connected trainer.
    pub async fn send_control(&self, command: ControlCommand) -> Result<(), SensorError> {
        let slot = self.trainer.lock().await;
        let trainer = slot.as_ref().ok_or(SensorError::NotConnected)?;

        trainer.send_control(command).await.map_err(|e| {
            tracing::error!("Failed to send {}: {}", command.opcode(), e);
            self.send_event(TrainerEvent::Error(TrainerFault::Transport(e.to_string())));
            e
        })
    }

    pub async fn is_connected(&self) -> bool {
        match self.trainer.lock().await.as_ref() {
            Some(trainer) => trainer.is_connected(),
            None => false,
        }
    }

    pub async fn has_control(&self) -> bool {
        match self.trainer.lock().await.as_ref() {
            Some(trainer) => trainer.has_control(),
            None => false,
        }
    }

    /// Name of the connected trainer.
    pub async fn trainer_name(&self) -> Option<String> {
        self.trainer
            .lock()
            .await
            .as_ref()
            .map(|trainer| trainer.name().to_string())
    }
}
