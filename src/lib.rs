//! SpinBridge - smart trainer bridge
//!
//! Connects to an FTMS smart trainer (or a simulated one), decodes its
//! telemetry, sends control commands, records a per-second session and merges
//! it into an existing TCX activity.

pub mod recording;
pub mod sensors;
pub mod storage;

// Re-export commonly used types
pub use recording::runner::SessionHandle;
pub use recording::session::SessionEngine;
pub use sensors::bridge::TrainerBridge;
pub use storage::config::AppConfig;
