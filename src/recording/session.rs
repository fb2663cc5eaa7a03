//! Session state machine.
//!
//! Reduces an irregular telemetry stream to one averaged [`ActivityPoint`] per
//! wall-clock second while tracking active duration.

use crate::recording::aggregate::{second_start, SecondBucket};
use crate::recording::types::{ActivityPoint, DurationFormat, SessionStatus, SessionSummary};
use crate::sensors::ftms::TelemetrySample;

/// Duration added by each [`SessionEngine::tick`].
pub const TICK_MS: u64 = 1000;

/// Records a session from decoded telemetry.
#[derive(Debug, Default)]
pub struct SessionEngine {
    /// Current state
    status: SessionStatus,
    /// Active time in milliseconds
    duration_ms: u64,
    /// Committed points, ascending by timestamp
    points: Vec<ActivityPoint>,
    /// Samples of the second currently being collected
    pending: Option<SecondBucket>,
}

impl SessionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a fresh session. Only valid from `NotStarted`.
    pub fn start(&mut self) -> bool {
        if self.status != SessionStatus::NotStarted {
            tracing::debug!(status = %self.status, "Ignoring start");
            return false;
        }

        self.points.clear();
        self.pending = None;
        self.duration_ms = 0;
        self.status = SessionStatus::Running;

        tracing::info!("Started session");
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.status != SessionStatus::Running {
            tracing::debug!(status = %self.status, "Ignoring pause");
            return false;
        }

        self.status = SessionStatus::Paused;
        tracing::info!("Paused session");
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.status != SessionStatus::Paused {
            tracing::debug!(status = %self.status, "Ignoring resume");
            return false;
        }

        self.status = SessionStatus::Running;
        tracing::info!("Resumed session");
        true
    }

    /// End the session, keeping its points. The pending second is committed.
    pub fn stop(&mut self) -> bool {
        if self.status == SessionStatus::NotStarted {
            tracing::debug!("Ignoring stop, no session in progress");
            return false;
        }

        self.commit_pending();
        self.status = SessionStatus::NotStarted;

        tracing::info!(
            points = self.points.len(),
            duration_ms = self.duration_ms,
            "Stopped session"
        );
        true
    }

    /// Discard everything and return to `NotStarted`.
    pub fn reset(&mut self) {
        self.points.clear();
        self.pending = None;
        self.duration_ms = 0;
        self.status = SessionStatus::NotStarted;
        tracing::info!("Reset session");
    }

    /// Feed one timestamped sample.
    ///
    /// Ignored unless running. A sample for a later second commits the pending
    /// second's mean first; a sample for an earlier second is folded into the
    /// pending one so committed timestamps stay strictly ascending.
    pub fn add_sample(&mut self, point: &ActivityPoint) {
        if self.status != SessionStatus::Running {
            return;
        }

        let second = second_start(point.timestamp_ms);
        match &mut self.pending {
            Some(bucket) if second <= bucket.second_ms() => bucket.push(point),
            _ => {
                self.commit_pending();
                let mut bucket = SecondBucket::new(point.timestamp_ms);
                bucket.push(point);
                self.pending = Some(bucket);
            }
        }
    }

    /// Feed a decoded telemetry sample received at `now_ms`.
    ///
    /// Samples without power, speed or heart rate carry nothing to record.
    pub fn add_telemetry(&mut self, sample: &TelemetrySample, now_ms: i64) {
        let point = ActivityPoint {
            timestamp_ms: now_ms,
            power: sample.power_watts.map(f64::from),
            speed: sample.speed_kmh,
            heart_rate: sample.heart_rate_bpm.map(f64::from),
        };

        if point.power.is_none() && point.speed.is_none() && point.heart_rate.is_none() {
            tracing::trace!("Telemetry sample has no recordable fields");
            return;
        }

        self.add_sample(&point);
    }

    /// Advance the active duration by one second if running.
    pub fn tick(&mut self) {
        if self.status == SessionStatus::Running {
            self.duration_ms += TICK_MS;
        }
    }

    fn commit_pending(&mut self) {
        if let Some(bucket) = self.pending.take() {
            if !bucket.is_empty() {
                self.points.push(bucket.to_point());
            }
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Committed points. The second still being collected is not included.
    pub fn points(&self) -> &[ActivityPoint] {
        &self.points
    }

    /// Take the committed points, leaving the session empty.
    pub fn take_points(&mut self) -> Vec<ActivityPoint> {
        std::mem::take(&mut self.points)
    }

    /// Summary statistics over the committed points.
    pub fn summary(&self) -> SessionSummary {
        summarize(&self.points, self.duration_ms)
    }
}

/// Summary statistics over a set of points.
pub fn summarize(points: &[ActivityPoint], duration_ms: u64) -> SessionSummary {
    let powers: Vec<f64> = points.iter().filter_map(|p| p.power).collect();
    let speeds: Vec<f64> = points.iter().filter_map(|p| p.speed).collect();
    let heart_rates: Vec<f64> = points.iter().filter_map(|p| p.heart_rate).collect();

    SessionSummary {
        duration_ms,
        point_count: points.len(),
        avg_power: mean(&powers).map(round_u32),
        max_power: max(&powers).map(round_u32),
        avg_speed: mean(&speeds),
        max_speed: max(&speeds),
        avg_heart_rate: mean(&heart_rates).map(round_u32),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

fn round_u32(value: f64) -> u32 {
    value.round().max(0.0) as u32
}

/// Render a duration as `MM:SS` or `HH:MM:SS`.
pub fn format_duration(duration_ms: u64, format: DurationFormat) -> String {
    let total_secs = duration_ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 || format == DurationFormat::WithHours {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}
