//! Simulated trainer.
//!
//! Produces synthetic Indoor Bike Data frames on a fixed period and feeds them
//! through the same decoder as real hardware. Target power and resistance
//! commands change what the next frames report.

use crate::sensors::driver::{EventSender, TrainerDriver};
use crate::sensors::ftms::{
    decode_indoor_bike_data, encode_indoor_bike_data, ControlCommand, TelemetrySample,
};
use crate::sensors::types::{SensorError, TrainerEvent};
use crate::storage::config::SimulatorSettings;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Deterministic power variation, cycled per frame.
const POWER_WOBBLE: [i16; 8] = [0, 3, -2, 4, -3, 1, -1, 2];

/// Watts added per resistance level above zero.
const WATTS_PER_RESISTANCE_LEVEL: f64 = 2.0;

/// What the rider asked the trainer to do.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct SimulatorTargets {
    /// ERG target in watts
    target_power: Option<i16>,
    resistance_level: Option<i16>,
    paused: bool,
}

/// Trainer that needs no transport.
pub struct SimulatedTrainer {
    settings: SimulatorSettings,
    events: EventSender,
    targets: Arc<Mutex<SimulatorTargets>>,
    control_granted: AtomicBool,
    task: Option<JoinHandle<()>>,
}

impl SimulatedTrainer {
    pub fn new(settings: SimulatorSettings, events: EventSender) -> Self {
        Self {
            settings,
            events,
            targets: Arc::new(Mutex::new(SimulatorTargets::default())),
            control_granted: AtomicBool::new(false),
            task: None,
        }
    }

    /// Apply a command to the simulated machine state.
    async fn apply(&self, command: ControlCommand) {
        let mut targets = self.targets.lock().await;
        match command {
            ControlCommand::SetTargetPower(watts) => {
                targets.target_power = Some(watts);
            }
            ControlCommand::SetTargetResistanceLevel(level) => {
                // Resistance mode replaces ERG
                targets.resistance_level = Some(level);
                targets.target_power = None;
            }
            ControlCommand::Reset => *targets = SimulatorTargets::default(),
            ControlCommand::StartOrResume => targets.paused = false,
            ControlCommand::StopOrPause(_) => targets.paused = true,
            other => {
                tracing::debug!("Simulated trainer ignores {}", other.opcode());
            }
        }
    }
}

impl TrainerDriver for SimulatedTrainer {
    async fn connect(&mut self) -> Result<(), SensorError> {
        if self.task.is_some() {
            return Ok(());
        }

        tracing::info!(
            "Connecting simulated trainer ({} ms period)",
            self.settings.period_ms
        );

        *self.targets.lock().await = SimulatorTargets::default();
        self.task = Some(tokio::spawn(run_simulation(
            self.settings.clone(),
            self.targets.clone(),
            self.events.clone(),
        )));

        // No machine to ask, control is granted immediately
        self.send_control(ControlCommand::RequestControl).await?;

        tracing::info!("Connected to simulated trainer");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), SensorError> {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!("Disconnected simulated trainer");
        }
        self.control_granted.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send_control(&self, command: ControlCommand) -> Result<(), SensorError> {
        if self.task.is_none() {
            return Err(SensorError::NotConnected);
        }

        if command == ControlCommand::RequestControl {
            self.control_granted.store(true, Ordering::SeqCst);
            return Ok(());
        }
        if !self.has_control() {
            return Err(SensorError::ControlNotGranted);
        }

        tracing::debug!("Simulated trainer received {:?}", command);
        self.apply(command).await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.task.is_some()
    }

    fn has_control(&self) -> bool {
        self.control_granted.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "Simulated Trainer"
    }
}

impl Drop for SimulatedTrainer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_simulation(
    settings: SimulatorSettings,
    targets: Arc<Mutex<SimulatorTargets>>,
    events: EventSender,
) {
    let mut ticker = tokio::time::interval(settings.period());
    let mut frame: u64 = 0;
    let mut distance_m = 0.0;

    loop {
        ticker.tick().await;

        let current = *targets.lock().await;
        let sample = synthesize(&settings, &current, frame, distance_m);
        distance_m += sample.speed_kmh.unwrap_or(0.0) / 3.6 * settings.period_ms as f64 / 1000.0;
        frame += 1;

        let decoded = decode_indoor_bike_data(&encode_indoor_bike_data(&sample));
        if events.send(TrainerEvent::Telemetry(decoded)).is_err() {
            tracing::debug!("Event receiver dropped, stopping simulation");
            break;
        }
    }
}

/// Build the sample for one frame.
///
/// In ERG mode the target is held exactly; otherwise power follows the
/// resistance level with a small deterministic wobble.
fn synthesize(
    settings: &SimulatorSettings,
    targets: &SimulatorTargets,
    frame: u64,
    distance_m: f64,
) -> TelemetrySample {
    let elapsed_s = (frame * settings.period_ms / 1000).min(u16::MAX as u64) as u16;

    if targets.paused {
        return TelemetrySample {
            speed_kmh: Some(0.0),
            cadence_rpm: Some(0.0),
            power_watts: Some(0),
            heart_rate_bpm: Some(settings.base_heart_rate_bpm),
            total_distance_m: Some(distance_m as u32),
            elapsed_time_s: Some(elapsed_s),
            resistance_level: targets.resistance_level,
            ..Default::default()
        };
    }

    let wobble = POWER_WOBBLE[(frame % POWER_WOBBLE.len() as u64) as usize];
    let power = match targets.target_power {
        Some(target) => target,
        None => {
            let level = targets.resistance_level.unwrap_or(0) as f64;
            let base = settings.base_power_watts as f64 + level * WATTS_PER_RESISTANCE_LEVEL;
            (base.round() as i16).saturating_add(wobble).max(0)
        }
    };

    let delta = power as f64 - settings.base_power_watts as f64;
    let speed = (settings.base_speed_kmh + delta / 20.0).max(0.0);
    let cadence = (settings.base_cadence_rpm + wobble as f64 / 2.0).max(0.0);
    let heart_rate = (settings.base_heart_rate_bpm as f64 + delta / 10.0).clamp(40.0, 220.0);

    TelemetrySample {
        speed_kmh: Some(speed),
        cadence_rpm: Some(cadence),
        total_distance_m: Some(distance_m as u32),
        resistance_level: targets.resistance_level,
        power_watts: Some(power),
        heart_rate_bpm: Some(heart_rate.round() as u8),
        elapsed_time_s: Some(elapsed_s),
        ..Default::default()
    }
}
