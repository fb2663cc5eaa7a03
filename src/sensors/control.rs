//! Debounced control commands.
//!
//! Sliders and repeated CLI adjustments produce bursts of target changes.
//! Only the last value of a burst reaches the trainer: each new command for
//! the same opcode cancels the pending send and restarts the quiet period.

use crate::sensors::bridge::TrainerBridge;
use crate::sensors::ftms::{ControlCommand, ControlOpcode};
use crate::sensors::types::SensorError;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Anything control commands can be sent to.
pub trait ControlSink: Clone + Send + Sync + 'static {
    fn send_control(
        &self,
        command: ControlCommand,
    ) -> impl Future<Output = Result<(), SensorError>> + Send;
}

impl ControlSink for TrainerBridge {
    async fn send_control(&self, command: ControlCommand) -> Result<(), SensorError> {
        TrainerBridge::send_control(self, command).await
    }
}

/// Last-value-wins scheduler for control commands.
pub struct ControlDebouncer<S: ControlSink = TrainerBridge> {
    sink: S,
    quiet: Duration,
    pending: HashMap<ControlOpcode, JoinHandle<()>>,
}

impl<S: ControlSink> ControlDebouncer<S> {
    pub fn new(sink: S, quiet: Duration) -> Self {
        Self {
            sink,
            quiet,
            pending: HashMap::new(),
        }
    }

    /// Schedule `command`, replacing any pending command with the same opcode.
    pub fn submit(&mut self, command: ControlCommand) {
        let opcode = command.opcode();
        if let Some(previous) = self.pending.remove(&opcode) {
            if !previous.is_finished() {
                tracing::debug!("Superseding pending {}", opcode);
            }
            previous.abort();
        }

        let sink = self.sink.clone();
        let quiet = self.quiet;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            match sink.send_control(command).await {
                Ok(()) => tracing::debug!("Sent {:?}", command),
                Err(e) => tracing::warn!("Debounced {} failed: {}", opcode, e),
            }
        });
        self.pending.insert(opcode, handle);
    }

    /// Schedule an ERG target.
    pub fn set_target_power(&mut self, watts: i16) {
        self.submit(ControlCommand::SetTargetPower(watts));
    }

    /// Schedule a resistance level.
    pub fn set_resistance(&mut self, level: i16) {
        self.submit(ControlCommand::SetTargetResistanceLevel(level));
    }

    /// Whether a command is still waiting for its quiet period.
    pub fn has_pending(&self) -> bool {
        self.pending.values().any(|handle| !handle.is_finished())
    }

    /// Drop every pending command without sending it.
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
    }

    /// Wait until every scheduled command has been sent (or failed).
    pub async fn flush(&mut self) {
        for (_, handle) in self.pending.drain() {
            let _ = handle.await;
        }
    }
}

impl<S: ControlSink> Drop for ControlDebouncer<S> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
