//! Unit tests for TCX merge, parse and generation.

use chrono::{TimeZone, Utc};
use spinbridge::recording::exporter_tcx::{
    generate_tcx, generate_tcx_filename, merge_or_generate, merge_tcx, merge_tcx_with,
    parse_tcx, MergeOptions, TcxOutcome, GENERATED_PREFIX, MERGED_PREFIX,
};
use spinbridge::recording::types::{ActivityPoint, ExportError};

/// 2024-01-01T10:00:00Z
const T0: i64 = 1_704_103_200_000;

const GARMIN_ACTIVITY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2" xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2">
  <Activities>
    <Activity Sport="Biking">
      <Id>2024-01-01T10:00:00Z</Id>
      <Lap StartTime="2024-01-01T10:00:00Z">
        <TotalTimeSeconds>4</TotalTimeSeconds>
        <!-- keep me -->
        <Track>
          <Trackpoint>
            <Time>2024-01-01T10:00:00Z</Time>
            <DistanceMeters>0.0</DistanceMeters>
            <HeartRateBpm><Value>130</Value></HeartRateBpm>
            <Extensions>
              <ns3:TPX>
                <ns3:Speed>5.00</ns3:Speed>
                <ns3:Watts>90</ns3:Watts>
              </ns3:TPX>
            </Extensions>
          </Trackpoint>
          <Trackpoint>
            <Time>2024-01-01T10:00:01.050Z</Time>
            <DistanceMeters>5.0</DistanceMeters>
          </Trackpoint>
          <Trackpoint>
            <Time>2024-01-01T10:00:02Z</Time>
            <DistanceMeters>12.5</DistanceMeters>
            <Extensions><ns3:TPX><ns3:Speed>6.00</ns3:Speed></ns3:TPX></Extensions>
          </Trackpoint>
          <Trackpoint>
            <Time>2024-01-01T10:00:03.500Z</Time>
            <DistanceMeters>18.0</DistanceMeters>
            <Extensions><ns3:TPX><ns3:Watts>77</ns3:Watts></ns3:TPX></Extensions>
          </Trackpoint>
        </Track>
      </Lap>
    </Activity>
  </Activities>
</TrainingCenterDatabase>
"#;

/// Four recorded seconds at 36 km/h (10.00 m/s) and 200..230 W.
fn recorded_points() -> Vec<ActivityPoint> {
    (0..4)
        .map(|i| ActivityPoint {
            timestamp_ms: T0 + i * 1000,
            power: Some(200.0 + i as f64 * 10.0),
            speed: Some(36.0),
            heart_rate: None,
        })
        .collect()
}

fn wrap_track(root_attrs: &str, trackpoints: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase xmlns="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2"{}>
  <Activities><Activity Sport="Biking"><Lap StartTime="2024-01-01T10:00:00Z"><Track>{}</Track></Lap></Activity></Activities>
</TrainingCenterDatabase>"#,
        root_attrs, trackpoints
    )
}

#[test]
fn test_merge_keeps_every_trackpoint() {
    let merged = merge_tcx(GARMIN_ACTIVITY, &recorded_points()).unwrap();

    assert_eq!(
        merged.matches("<Trackpoint>").count(),
        GARMIN_ACTIVITY.matches("<Trackpoint>").count()
    );

    let points = parse_tcx(&merged).unwrap();
    assert_eq!(points.len(), 4);
    let watts: Vec<Option<f64>> = points.iter().map(|p| p.power).collect();
    assert_eq!(watts, vec![Some(200.0), Some(210.0), Some(220.0), Some(77.0)]);
}

#[test]
fn test_merge_replaces_existing_values() {
    let merged = merge_tcx(GARMIN_ACTIVITY, &recorded_points()).unwrap();

    assert!(merged.contains("<ns3:Speed>10.00</ns3:Speed>"));
    assert!(merged.contains("<ns3:Watts>200</ns3:Watts>"));
    assert!(!merged.contains("<ns3:Watts>90</ns3:Watts>"));
    assert!(!merged.contains("<ns3:Speed>5.00</ns3:Speed>"));
}

#[test]
fn test_merge_creates_missing_extensions() {
    let merged = merge_tcx(GARMIN_ACTIVITY, &recorded_points()).unwrap();

    // Second trackpoint had no Extensions at all
    assert!(merged.contains(
        "<Extensions><ns3:TPX><ns3:Speed>10.00</ns3:Speed><ns3:Watts>210</ns3:Watts></ns3:TPX></Extensions></Trackpoint>"
    ));
    // Third trackpoint had Speed but no Watts
    assert!(merged.contains(
        "<ns3:TPX><ns3:Speed>10.00</ns3:Speed><ns3:Watts>220</ns3:Watts></ns3:TPX>"
    ));
}

#[test]
fn test_merge_leaves_unmatched_trackpoints_alone() {
    let merged = merge_tcx(GARMIN_ACTIVITY, &recorded_points()).unwrap();

    // 10:00:03.500 is 500 ms away from the nearest recorded second
    assert!(merged.contains("<ns3:TPX><ns3:Watts>77</ns3:Watts></ns3:TPX>"));
}

#[test]
fn test_merge_preserves_other_content() {
    let merged = merge_tcx(GARMIN_ACTIVITY, &recorded_points()).unwrap();

    assert!(merged.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(merged.contains("<!-- keep me -->"));
    assert!(merged.contains("<DistanceMeters>12.5</DistanceMeters>"));
    assert!(merged.contains("<HeartRateBpm><Value>130</Value></HeartRateBpm>"));
    assert!(merged.contains("<TotalTimeSeconds>4</TotalTimeSeconds>"));
    assert!(merged.contains(r#"<Lap StartTime="2024-01-01T10:00:00Z">"#));
}

#[test]
fn test_merge_without_points_is_passthrough() {
    let merged = merge_tcx(GARMIN_ACTIVITY, &[]).unwrap();
    assert_eq!(merged, GARMIN_ACTIVITY);
}

#[test]
fn test_merge_declares_namespace_when_missing() {
    let doc = wrap_track(
        "",
        "<Trackpoint><Time>2024-01-01T10:00:00Z</Time></Trackpoint>",
    );

    let merged = merge_tcx(&doc, &recorded_points()).unwrap();

    assert!(merged.contains(r#"xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2""#));
    assert!(merged.contains("<ns3:Watts>200</ns3:Watts>"));
}

#[test]
fn test_merge_reuses_declared_prefix() {
    let doc = wrap_track(
        r#" xmlns:tpx="http://www.garmin.com/xmlschemas/ActivityExtension/v2""#,
        "<Trackpoint><Time>2024-01-01T10:00:00Z</Time></Trackpoint>",
    );

    let merged = merge_tcx(&doc, &recorded_points()).unwrap();

    assert!(merged.contains("<tpx:TPX><tpx:Speed>10.00</tpx:Speed><tpx:Watts>200</tpx:Watts></tpx:TPX>"));
    assert!(!merged.contains("xmlns:ns3"));
}

#[test]
fn test_merge_into_default_namespace_tpx() {
    let doc = wrap_track(
        "",
        r#"<Trackpoint><Time>2024-01-01T10:00:00Z</Time><Extensions><TPX xmlns="http://www.garmin.com/xmlschemas/ActivityExtension/v2"><Watts>100</Watts></TPX></Extensions></Trackpoint>"#,
    );

    let merged = merge_tcx(&doc, &recorded_points()).unwrap();

    assert!(merged.contains(
        r#"<TPX xmlns="http://www.garmin.com/xmlschemas/ActivityExtension/v2"><Watts>200</Watts><Speed>10.00</Speed></TPX>"#
    ));
}

#[test]
fn test_merge_creates_extensions_in_prefixed_tcx_namespace() {
    let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<tcx:TrainingCenterDatabase xmlns:tcx="http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2" xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2">
  <tcx:Activities><tcx:Activity Sport="Biking"><tcx:Lap StartTime="2024-01-01T10:00:00Z"><tcx:Track><tcx:Trackpoint><tcx:Time>2024-01-01T10:00:00Z</tcx:Time></tcx:Trackpoint></tcx:Track></tcx:Lap></tcx:Activity></tcx:Activities>
</tcx:TrainingCenterDatabase>"#;

    let merged = merge_tcx(doc, &recorded_points()).unwrap();

    assert!(merged.contains(
        "<tcx:Extensions><ns3:TPX><ns3:Speed>10.00</ns3:Speed><ns3:Watts>200</ns3:Watts></ns3:TPX></tcx:Extensions></tcx:Trackpoint>"
    ));
    assert!(!merged.contains("<Extensions>"));
}

#[test]
fn test_merge_expands_empty_extensions() {
    let doc = wrap_track(
        r#" xmlns:ns3="http://www.garmin.com/xmlschemas/ActivityExtension/v2""#,
        "<Trackpoint><Time>2024-01-01T10:00:01Z</Time><Extensions/></Trackpoint>",
    );

    let merged = merge_tcx(&doc, &recorded_points()).unwrap();

    assert!(merged.contains(
        "<Extensions><ns3:TPX><ns3:Speed>10.00</ns3:Speed><ns3:Watts>210</ns3:Watts></ns3:TPX></Extensions>"
    ));
}

#[test]
fn test_merge_tolerance_is_configurable() {
    let options = MergeOptions {
        tolerance_ms: 600,
        ..Default::default()
    };

    let merged = merge_tcx_with(GARMIN_ACTIVITY, &recorded_points(), &options).unwrap();
    let points = parse_tcx(&merged).unwrap();

    // 10:00:03.500 is now close enough to the 10:00:03 bucket
    assert_eq!(points[3].power, Some(230.0));
}

#[test]
fn test_merge_rejects_oversized_document() {
    let options = MergeOptions {
        max_document_bytes: 100,
        ..Default::default()
    };

    let result = merge_tcx_with(GARMIN_ACTIVITY, &recorded_points(), &options);

    assert!(matches!(result, Err(ExportError::TooLarge { limit: 100, .. })));
}

#[test]
fn test_merge_rejects_non_tcx() {
    let result = merge_tcx("<gpx><trk></trk></gpx>", &recorded_points());
    assert!(matches!(result, Err(ExportError::NotTcx(_))));
}

#[test]
fn test_merge_rejects_malformed_xml() {
    let mismatched = "<TrainingCenterDatabase><Activities></Lap></TrainingCenterDatabase>";
    assert!(matches!(
        merge_tcx(mismatched, &recorded_points()),
        Err(ExportError::Parse(_))
    ));

    let unclosed = "<TrainingCenterDatabase><Activities>";
    assert!(matches!(
        merge_tcx(unclosed, &recorded_points()),
        Err(ExportError::Parse(_))
    ));
}

#[test]
fn test_merge_or_generate_merges() {
    let outcome = merge_or_generate(
        Some(GARMIN_ACTIVITY),
        &recorded_points(),
        &MergeOptions::default(),
    )
    .unwrap();

    assert!(matches!(outcome, TcxOutcome::Merged(_)));
    assert_eq!(outcome.file_prefix(), MERGED_PREFIX);
    assert!(outcome.document().contains("<!-- keep me -->"));
}

#[test]
fn test_merge_or_generate_falls_back() {
    let outcome = merge_or_generate(
        Some("<TrainingCenterDatabase><Activities>"),
        &recorded_points(),
        &MergeOptions::default(),
    )
    .unwrap();

    match &outcome {
        TcxOutcome::Generated { merge_error, .. } => {
            assert!(matches!(merge_error, Some(ExportError::Parse(_))))
        }
        TcxOutcome::Merged(_) => panic!("expected a generated document"),
    }
    assert_eq!(outcome.file_prefix(), GENERATED_PREFIX);
    assert_eq!(parse_tcx(outcome.document()).unwrap().len(), 4);
}

#[test]
fn test_merge_or_generate_without_existing() {
    let outcome =
        merge_or_generate(None, &recorded_points(), &MergeOptions::default()).unwrap();

    assert!(matches!(
        outcome,
        TcxOutcome::Generated {
            merge_error: None,
            ..
        }
    ));
}

#[test]
fn test_generate_round_trip() {
    let points = vec![
        ActivityPoint {
            timestamp_ms: T0,
            power: Some(201.4),
            speed: Some(30.0),
            heart_rate: Some(141.0),
        },
        ActivityPoint {
            timestamp_ms: T0 + 1000,
            power: Some(250.0),
            speed: Some(32.4),
            heart_rate: None,
        },
        ActivityPoint {
            timestamp_ms: T0 + 2000,
            power: None,
            speed: None,
            heart_rate: Some(150.0),
        },
    ];

    let doc = generate_tcx(&points).unwrap();
    let parsed = parse_tcx(&doc).unwrap();

    assert_eq!(parsed.len(), 3);
    for (original, read) in points.iter().zip(&parsed) {
        assert_eq!(read.timestamp_ms, original.timestamp_ms);
        assert_eq!(read.power, original.power.map(f64::round));
        assert_eq!(read.heart_rate, original.heart_rate);
        match (original.speed, read.speed) {
            (Some(a), Some(b)) => assert!((a - b).abs() < 0.02, "{} vs {}", a, b),
            (None, None) => {}
            other => panic!("speed mismatch: {:?}", other),
        }
    }
}

#[test]
fn test_generate_document_structure() {
    let doc = generate_tcx(&recorded_points()).unwrap();

    assert!(doc.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    assert!(doc.contains(r#"<Activity Sport="Biking">"#));
    assert!(doc.contains("<Id>2024-01-01T10:00:00.000Z</Id>"));
    assert!(doc.contains("<TotalTimeSeconds>4</TotalTimeSeconds>"));
    assert!(doc.contains("<DistanceMeters>40.0</DistanceMeters>"));
    assert!(doc.contains("<ns3:AvgWatts>215</ns3:AvgWatts>"));
    assert!(doc.contains("<ns3:MaxWatts>230</ns3:MaxWatts>"));
    assert_eq!(doc.matches("<Trackpoint>").count(), 4);
}

#[test]
fn test_generate_empty_is_valid() {
    let doc = generate_tcx(&[]).unwrap();

    assert!(doc.contains("<Track>"));
    assert!(!doc.contains("<Trackpoint>"));
    assert!(parse_tcx(&doc).unwrap().is_empty());
}

#[test]
fn test_generated_document_accepts_merge() {
    let doc = generate_tcx(&recorded_points()).unwrap();
    let louder: Vec<ActivityPoint> = recorded_points()
        .into_iter()
        .map(|p| ActivityPoint {
            power: p.power.map(|w| w + 100.0),
            ..p
        })
        .collect();

    let merged = merge_tcx(&doc, &louder).unwrap();
    let watts: Vec<Option<f64>> = parse_tcx(&merged).unwrap().iter().map(|p| p.power).collect();

    assert_eq!(watts, vec![Some(300.0), Some(310.0), Some(320.0), Some(330.0)]);
}

#[test]
fn test_tcx_filename() {
    let at = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    assert_eq!(
        generate_tcx_filename(GENERATED_PREFIX, at),
        "bike-activity-20240101_100000.tcx"
    );
    assert_eq!(
        generate_tcx_filename(MERGED_PREFIX, at),
        "merged-activity-20240101_100000.tcx"
    );
}
