//! Recording types for session capture and export.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not recording
    #[default]
    NotStarted,
    /// Actively recording
    Running,
    /// Recording paused
    Paused,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::NotStarted => write!(f, "Not started"),
            SessionStatus::Running => write!(f, "Running"),
            SessionStatus::Paused => write!(f, "Paused"),
        }
    }
}

/// A single recorded point, at most one per wall-clock second.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ActivityPoint {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Power in watts
    pub power: Option<f64>,
    /// Speed in km/h
    pub speed: Option<f64>,
    /// Heart rate in BPM
    pub heart_rate: Option<f64>,
}

impl ActivityPoint {
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            ..Default::default()
        }
    }
}

/// Per-second mean of one or more activity points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregatedPoint {
    /// Start of the second, in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    pub power: Option<f64>,
    /// Speed in km/h
    pub speed: Option<f64>,
    pub heart_rate: Option<f64>,
    /// Number of points folded into this bucket (always at least 1)
    pub sample_count: u32,
}

impl From<AggregatedPoint> for ActivityPoint {
    fn from(point: AggregatedPoint) -> Self {
        Self {
            timestamp_ms: point.timestamp_ms,
            power: point.power,
            speed: point.speed,
            heart_rate: point.heart_rate,
        }
    }
}

/// Summary statistics of a recorded session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Active (running) time in milliseconds
    pub duration_ms: u64,
    /// Number of committed points
    pub point_count: usize,
    /// Average power in watts (rounded)
    pub avg_power: Option<u32>,
    /// Maximum power in watts (rounded)
    pub max_power: Option<u32>,
    /// Average speed in km/h
    pub avg_speed: Option<f64>,
    /// Maximum speed in km/h
    pub max_speed: Option<f64>,
    /// Average heart rate in BPM (rounded)
    pub avg_heart_rate: Option<u32>,
}

/// How [`format_duration`](crate::recording::session::format_duration) renders hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationFormat {
    /// `MM:SS`, switching to `HH:MM:SS` from one hour on
    #[default]
    Auto,
    /// Always `HH:MM:SS`
    WithHours,
}

/// Read-only view of the session published by the runner.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub duration_ms: u64,
    pub point_count: usize,
    pub last_point: Option<ActivityPoint>,
}

/// Commands accepted by the session runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

impl std::fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionCommand::Start => write!(f, "start"),
            SessionCommand::Pause => write!(f, "pause"),
            SessionCommand::Resume => write!(f, "resume"),
            SessionCommand::Stop => write!(f, "stop"),
            SessionCommand::Reset => write!(f, "reset"),
        }
    }
}

/// Errors from the session runner.
#[derive(Debug, Error)]
pub enum RecorderError {
    /// The runner task has already shut down
    #[error("Session runner is not running")]
    RunnerStopped,

    /// The runner task panicked or was cancelled
    #[error("Session runner failed: {0}")]
    TaskFailed(String),
}

/// Errors during TCX parse, merge and export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The document is not well-formed XML
    #[error("Failed to parse document: {0}")]
    Parse(String),

    /// Well-formed XML, but not a TrainingCenterDatabase
    #[error("Not a TCX document: {0}")]
    NotTcx(String),

    /// The document exceeds the configured size limit
    #[error("Document is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    /// XML generation error
    #[error("XML error: {0}")]
    XmlError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ExportError {
    fn from(e: quick_xml::Error) -> Self {
        ExportError::Parse(e.to_string())
    }
}
