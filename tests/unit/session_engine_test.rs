//! Unit tests for the session state machine.

use spinbridge::recording::session::{format_duration, summarize, SessionEngine, TICK_MS};
use spinbridge::recording::types::{ActivityPoint, DurationFormat, SessionStatus};
use spinbridge::sensors::ftms::TelemetrySample;

fn power_at(ts: i64, watts: f64) -> ActivityPoint {
    ActivityPoint {
        timestamp_ms: ts,
        power: Some(watts),
        ..Default::default()
    }
}

fn running_engine() -> SessionEngine {
    let mut engine = SessionEngine::new();
    assert!(engine.start());
    engine
}

#[test]
fn test_five_samples_in_one_second_become_one_point() {
    let mut engine = running_engine();
    for (i, watts) in [100.0, 110.0, 120.0, 130.0, 140.0].into_iter().enumerate() {
        engine.add_sample(&power_at(60_000 + i as i64 * 150, watts));
    }

    // Still pending until the next second starts
    assert!(engine.points().is_empty());

    engine.add_sample(&power_at(61_020, 200.0));

    assert_eq!(engine.points().len(), 1);
    let first = engine.points()[0];
    assert_eq!(first.timestamp_ms, 60_000);
    assert!((first.power.unwrap() - 120.0).abs() < 1e-9);
}

#[test]
fn test_stop_commits_pending_second() {
    let mut engine = running_engine();
    engine.add_sample(&power_at(1_000, 150.0));
    engine.add_sample(&power_at(2_000, 160.0));

    assert_eq!(engine.points().len(), 1);
    assert!(engine.stop());

    assert_eq!(engine.status(), SessionStatus::NotStarted);
    let timestamps: Vec<i64> = engine.points().iter().map(|p| p.timestamp_ms).collect();
    assert_eq!(timestamps, vec![1_000, 2_000]);
}

#[test]
fn test_committed_timestamps_strictly_ascending() {
    let mut engine = running_engine();
    engine.add_sample(&power_at(5_100, 100.0));
    engine.add_sample(&power_at(6_100, 100.0));
    // Late sample for an earlier second
    engine.add_sample(&power_at(5_900, 300.0));
    engine.add_sample(&power_at(7_050, 100.0));
    engine.add_sample(&power_at(9_500, 100.0));
    engine.stop();

    let points = engine.points();
    assert!(points.windows(2).all(|w| w[0].timestamp_ms < w[1].timestamp_ms));
    assert!(points.iter().all(|p| p.timestamp_ms % 1000 == 0));
    // The late sample was folded into the second being collected
    assert!((points[1].power.unwrap() - 200.0).abs() < 1e-9);
}

#[test]
fn test_samples_ignored_unless_running() {
    let mut engine = SessionEngine::new();
    engine.add_sample(&power_at(1_000, 100.0));
    engine.start();
    engine.add_sample(&power_at(2_000, 100.0));
    engine.pause();
    engine.add_sample(&power_at(3_000, 100.0));
    engine.resume();
    engine.add_sample(&power_at(4_000, 100.0));
    engine.stop();

    let timestamps: Vec<i64> = engine.points().iter().map(|p| p.timestamp_ms).collect();
    assert_eq!(timestamps, vec![2_000, 4_000]);
}

#[test]
fn test_lifecycle_transitions() {
    let mut engine = SessionEngine::new();
    assert_eq!(engine.status(), SessionStatus::NotStarted);

    assert!(!engine.pause());
    assert!(!engine.resume());
    assert!(!engine.stop());

    assert!(engine.start());
    assert!(!engine.start());
    assert!(!engine.resume());
    assert!(engine.pause());
    assert!(!engine.pause());
    assert_eq!(engine.status(), SessionStatus::Paused);
    assert!(engine.resume());
    assert_eq!(engine.status(), SessionStatus::Running);
    assert!(engine.stop());
    assert_eq!(engine.status(), SessionStatus::NotStarted);
}

#[test]
fn test_tick_counts_only_while_running() {
    let mut engine = SessionEngine::new();
    engine.tick();
    assert_eq!(engine.duration_ms(), 0);

    engine.start();
    engine.tick();
    engine.tick();
    engine.pause();
    engine.tick();
    engine.resume();
    engine.tick();

    assert_eq!(engine.duration_ms(), 3 * TICK_MS);
}

#[test]
fn test_start_after_stop_begins_fresh() {
    let mut engine = running_engine();
    engine.tick();
    engine.add_sample(&power_at(1_000, 100.0));
    engine.stop();
    assert_eq!(engine.points().len(), 1);

    assert!(engine.start());
    assert!(engine.points().is_empty());
    assert_eq!(engine.duration_ms(), 0);
}

#[test]
fn test_reset_discards_everything() {
    let mut engine = running_engine();
    engine.tick();
    engine.add_sample(&power_at(1_000, 100.0));
    engine.add_sample(&power_at(2_000, 100.0));
    engine.reset();

    assert_eq!(engine.status(), SessionStatus::NotStarted);
    assert_eq!(engine.duration_ms(), 0);
    assert!(engine.points().is_empty());

    // Nothing pending survives a reset
    engine.stop();
    assert!(engine.points().is_empty());
}

#[test]
fn test_add_telemetry_maps_fields() {
    let mut engine = running_engine();
    let sample = TelemetrySample {
        speed_kmh: Some(30.0),
        power_watts: Some(250),
        heart_rate_bpm: Some(150),
        cadence_rpm: Some(90.0),
        ..Default::default()
    };

    engine.add_telemetry(&sample, 10_400);
    engine.stop();

    let point = engine.points()[0];
    assert_eq!(point.timestamp_ms, 10_000);
    assert_eq!(point.power, Some(250.0));
    assert_eq!(point.speed, Some(30.0));
    assert_eq!(point.heart_rate, Some(150.0));
}

#[test]
fn test_add_telemetry_skips_empty_samples() {
    let mut engine = running_engine();
    let cadence_only = TelemetrySample {
        cadence_rpm: Some(80.0),
        ..Default::default()
    };

    engine.add_telemetry(&cadence_only, 1_000);
    engine.stop();

    assert!(engine.points().is_empty());
}

#[test]
fn test_take_points() {
    let mut engine = running_engine();
    engine.add_sample(&power_at(1_000, 100.0));
    engine.stop();

    let points = engine.take_points();
    assert_eq!(points.len(), 1);
    assert!(engine.points().is_empty());
}

#[test]
fn test_summary() {
    let points = vec![
        ActivityPoint {
            timestamp_ms: 0,
            power: Some(200.0),
            speed: Some(30.0),
            heart_rate: Some(140.0),
        },
        ActivityPoint {
            timestamp_ms: 1_000,
            power: Some(251.0),
            speed: Some(34.0),
            heart_rate: None,
        },
        ActivityPoint::new(2_000),
    ];

    let summary = summarize(&points, 3_000);

    assert_eq!(summary.duration_ms, 3_000);
    assert_eq!(summary.point_count, 3);
    assert_eq!(summary.avg_power, Some(226));
    assert_eq!(summary.max_power, Some(251));
    assert!((summary.avg_speed.unwrap() - 32.0).abs() < 1e-9);
    assert!((summary.max_speed.unwrap() - 34.0).abs() < 1e-9);
    assert_eq!(summary.avg_heart_rate, Some(140));
}

#[test]
fn test_summary_of_nothing() {
    let summary = summarize(&[], 0);
    assert_eq!(summary.point_count, 0);
    assert!(summary.avg_power.is_none());
    assert!(summary.max_speed.is_none());
}

#[test]
fn test_format_duration() {
    assert_eq!(format_duration(0, DurationFormat::Auto), "00:00");
    assert_eq!(format_duration(65_999, DurationFormat::Auto), "01:05");
    assert_eq!(format_duration(65_000, DurationFormat::WithHours), "00:01:05");
    assert_eq!(format_duration(3_725_000, DurationFormat::Auto), "01:02:05");
}
