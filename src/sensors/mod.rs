//! Trainer communication: FTMS codec, drivers and the bridge that owns them.

pub mod ble;
pub mod bridge;
pub mod control;
pub mod driver;
pub mod ftms;
pub mod simulated;
pub mod types;

pub use bridge::TrainerBridge;
pub use control::{ControlDebouncer, ControlSink};
pub use driver::{Trainer, TrainerDriver};
pub use ftms::{ControlCommand, ControlOpcode, ControlResponse, ControlResultCode, TelemetrySample};
pub use types::{DiscoveredTrainer, SensorError, TrainerEvent, TrainerFault, TrainerKind};
