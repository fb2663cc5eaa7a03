//! Per-second bucketing of activity points.
//!
//! Both the live session and the TCX merge reduce irregular samples to one
//! mean value per wall-clock second through [`SecondBucket`].

use crate::recording::types::{ActivityPoint, AggregatedPoint};
use std::collections::BTreeMap;

/// Start of the second containing `timestamp_ms`.
///
/// Floors toward negative infinity so pre-epoch timestamps bucket correctly.
pub fn second_start(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(1000) * 1000
}

/// Incremental arithmetic mean of one field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningMean {
    mean: f64,
    count: u32,
}

impl RunningMean {
    pub fn push(&mut self, value: f64) {
        let n = self.count as f64;
        self.mean = (self.mean * n + value) / (n + 1.0);
        self.count += 1;
    }

    /// Push only when a value was observed.
    pub fn push_opt(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.push(value);
        }
    }

    /// The mean, or `None` if nothing was observed.
    pub fn value(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Accumulates the points of a single second.
#[derive(Debug, Clone, PartialEq)]
pub struct SecondBucket {
    second_ms: i64,
    power: RunningMean,
    speed: RunningMean,
    heart_rate: RunningMean,
    samples: u32,
}

impl SecondBucket {
    /// Empty bucket for the second containing `timestamp_ms`.
    pub fn new(timestamp_ms: i64) -> Self {
        Self {
            second_ms: second_start(timestamp_ms),
            power: RunningMean::default(),
            speed: RunningMean::default(),
            heart_rate: RunningMean::default(),
            samples: 0,
        }
    }

    pub fn second_ms(&self) -> i64 {
        self.second_ms
    }

    pub fn sample_count(&self) -> u32 {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.samples == 0
    }

    /// Fold a point into the bucket. Fields the point lacks are not counted.
    pub fn push(&mut self, point: &ActivityPoint) {
        self.power.push_opt(point.power);
        self.speed.push_opt(point.speed);
        self.heart_rate.push_opt(point.heart_rate);
        self.samples += 1;
    }

    pub fn to_aggregated(&self) -> AggregatedPoint {
        AggregatedPoint {
            timestamp_ms: self.second_ms,
            power: self.power.value(),
            speed: self.speed.value(),
            heart_rate: self.heart_rate.value(),
            sample_count: self.samples,
        }
    }

    pub fn to_point(&self) -> ActivityPoint {
        self.to_aggregated().into()
    }
}

/// Reduce points to one mean per second, sorted ascending.
///
/// Input order does not matter. Feeding the output back in (as activity
/// points) yields the same timestamps and values.
pub fn aggregate_to_seconds(points: &[ActivityPoint]) -> Vec<AggregatedPoint> {
    let mut buckets: BTreeMap<i64, SecondBucket> = BTreeMap::new();

    for point in points {
        buckets
            .entry(second_start(point.timestamp_ms))
            .or_insert_with(|| SecondBucket::new(point.timestamp_ms))
            .push(point);
    }

    buckets.values().map(SecondBucket::to_aggregated).collect()
}
