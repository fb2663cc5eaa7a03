//! Recording module for session capture and TCX export.

pub mod aggregate;
pub mod exporter_tcx;
pub mod runner;
pub mod session;
pub mod types;

pub use aggregate::aggregate_to_seconds;
pub use exporter_tcx::{generate_tcx, merge_or_generate, merge_tcx, parse_tcx, MergeOptions, TcxOutcome};
pub use runner::{spawn_session, RecordedSession, SessionHandle};
pub use session::{format_duration, SessionEngine};
pub use types::{
    ActivityPoint, AggregatedPoint, DurationFormat, ExportError, RecorderError, SessionCommand,
    SessionSnapshot, SessionStatus, SessionSummary,
};
