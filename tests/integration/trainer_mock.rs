//! Integration test with mock trainer frames.
//!
//! Real BLE notifications need hardware. These tests push hand-built Indoor
//! Bike Data frames through the decoder and into a recording session, the same
//! path a connected trainer's notifications take.

use spinbridge::recording::exporter_tcx::{generate_tcx, parse_tcx};
use spinbridge::recording::session::SessionEngine;
use spinbridge::sensors::ftms::decode_indoor_bike_data;

/// Mock trainer frame generator for testing.
pub struct MockTrainerData {
    /// Current power value
    pub power: i16,
    /// Current cadence (0.5 RPM units)
    pub cadence: u16,
    /// Current speed (in 0.01 km/h)
    pub speed: u16,
    /// Current heart rate
    pub heart_rate: u8,
}

impl Default for MockTrainerData {
    fn default() -> Self {
        Self {
            power: 200,
            cadence: 180, // 90 RPM (0.5 resolution)
            speed: 3000,  // 30.0 km/h
            heart_rate: 145,
        }
    }
}

impl MockTrainerData {
    /// Generate an Indoor Bike Data frame.
    pub fn indoor_bike_data(&self) -> Vec<u8> {
        // Flags: 0x0244 (instantaneous cadence + power + heart rate)
        let mut data = vec![0x44, 0x02];

        // Instantaneous speed (always present when more_data=0)
        data.extend_from_slice(&self.speed.to_le_bytes());

        // Instantaneous cadence
        data.extend_from_slice(&self.cadence.to_le_bytes());

        // Instantaneous power
        data.extend_from_slice(&self.power.to_le_bytes());

        // Heart rate
        data.push(self.heart_rate);

        data
    }

    /// Simulate a power change.
    pub fn set_power(&mut self, power: i16) {
        self.power = power;
    }
}

#[test]
fn test_mock_frame_decodes() {
    let mock = MockTrainerData::default();
    let sample = decode_indoor_bike_data(&mock.indoor_bike_data());

    assert!(!sample.truncated);
    assert_eq!(sample.power_watts, Some(200));
    assert!((sample.cadence_rpm.unwrap() - 90.0).abs() < 0.01);
    assert!((sample.speed_kmh.unwrap() - 30.0).abs() < 0.01);
    assert_eq!(sample.heart_rate_bpm, Some(145));
}

#[test]
fn test_mock_stream_records_per_second() {
    let mut mock = MockTrainerData::default();
    let mut engine = SessionEngine::new();
    engine.start();

    // Four notifications per second for three seconds, power ramping each second
    let t0 = 1_704_103_200_000;
    for second in 0..3 {
        mock.set_power(200 + second as i16 * 50);
        for quarter in 0..4 {
            let sample = decode_indoor_bike_data(&mock.indoor_bike_data());
            engine.add_telemetry(&sample, t0 + second * 1000 + quarter * 250);
        }
    }
    engine.stop();

    let points = engine.points();
    assert_eq!(points.len(), 3);
    let powers: Vec<f64> = points.iter().filter_map(|p| p.power).collect();
    assert_eq!(powers, vec![200.0, 250.0, 300.0]);
    assert!(points.iter().all(|p| p.heart_rate == Some(145.0)));
}

#[test]
fn test_truncated_frames_still_record() {
    let mock = MockTrainerData::default();
    let mut frame = mock.indoor_bike_data();
    // Drop the heart rate byte
    frame.pop();

    let mut engine = SessionEngine::new();
    engine.start();
    let sample = decode_indoor_bike_data(&frame);
    assert!(sample.truncated);
    engine.add_telemetry(&sample, 5_000);
    engine.stop();

    let point = engine.points()[0];
    assert_eq!(point.power, Some(200.0));
    assert!(point.heart_rate.is_none());
}

#[test]
fn test_recorded_stream_exports() {
    let mock = MockTrainerData::default();
    let mut engine = SessionEngine::new();
    engine.start();

    let t0 = 1_704_103_200_000;
    for i in 0..10 {
        let sample = decode_indoor_bike_data(&mock.indoor_bike_data());
        engine.add_telemetry(&sample, t0 + i * 500);
    }
    engine.stop();

    let doc = generate_tcx(engine.points()).unwrap();
    let parsed = parse_tcx(&doc).unwrap();

    assert_eq!(parsed.len(), 5);
    assert!(parsed.iter().all(|p| p.power == Some(200.0)));
}
