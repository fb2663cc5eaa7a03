//! TCX parse, merge and export.
//!
//! Merging streams the existing document through a quick-xml reader/writer
//! pair. Every event outside matched trackpoints is written back untouched;
//! inside a matched trackpoint only the ActivityExtension `Speed` and `Watts`
//! values are replaced or created.

use crate::recording::aggregate::aggregate_to_seconds;
use crate::recording::session::summarize;
use crate::recording::types::{ActivityPoint, AggregatedPoint, ExportError};
use chrono::{DateTime, SecondsFormat, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;
use std::path::Path;

/// TCX XML namespaces
const NS_TCX: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2";
const NS_TPX: &str = "http://www.garmin.com/xmlschemas/ActivityExtension/v2";
const NS_XSI: &str = "http://www.w3.org/2001/XMLSchema-instance";
const SCHEMA_LOCATION: &str = "http://www.garmin.com/xmlschemas/TrainingCenterDatabase/v2 http://www.garmin.com/xmlschemas/TrainingCenterDatabasev2.xsd";

const ROOT_ELEMENT: &str = "TrainingCenterDatabase";

/// Prefix bound to the ActivityExtension namespace when the document has none.
const DEFAULT_TPX_PREFIX: &str = "ns3";

/// File name prefix for freshly generated activities.
pub const GENERATED_PREFIX: &str = "bike-activity";
/// File name prefix for merged activities.
pub const MERGED_PREFIX: &str = "merged-activity";

/// Limits applied when merging into an existing document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Maximum distance between a trackpoint time and a recorded second
    pub tolerance_ms: i64,
    /// Documents larger than this are rejected before parsing
    pub max_document_bytes: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            tolerance_ms: 100,
            max_document_bytes: 50 * 1024 * 1024,
        }
    }
}

/// Result of [`merge_or_generate`].
#[derive(Debug)]
pub enum TcxOutcome {
    /// The recorded points were merged into the existing document
    Merged(String),
    /// A new document was generated, either because there was nothing to
    /// merge into or because merging failed
    Generated {
        document: String,
        merge_error: Option<ExportError>,
    },
}

impl TcxOutcome {
    pub fn document(&self) -> &str {
        match self {
            TcxOutcome::Merged(document) => document,
            TcxOutcome::Generated { document, .. } => document,
        }
    }

    /// File name prefix matching the outcome.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            TcxOutcome::Merged(_) => MERGED_PREFIX,
            TcxOutcome::Generated { .. } => GENERATED_PREFIX,
        }
    }
}

/// Merge into `existing` if given, otherwise generate. A failed merge falls
/// back to generation so recorded points are never lost.
pub fn merge_or_generate(
    existing: Option<&str>,
    points: &[ActivityPoint],
    options: &MergeOptions,
) -> Result<TcxOutcome, ExportError> {
    let merge_error = match existing {
        None => None,
        Some(doc) => match merge_tcx_with(doc, points, options) {
            Ok(merged) => return Ok(TcxOutcome::Merged(merged)),
            Err(e) => {
                tracing::warn!("Merge failed, generating a new activity instead: {}", e);
                Some(e)
            }
        },
    };

    Ok(TcxOutcome::Generated {
        document: generate_tcx(points)?,
        merge_error,
    })
}

/// Merge recorded points into an existing TCX document with default options.
pub fn merge_tcx(existing: &str, points: &[ActivityPoint]) -> Result<String, ExportError> {
    merge_tcx_with(existing, points, &MergeOptions::default())
}

/// Merge recorded points into an existing TCX document.
///
/// Each trackpoint whose `Time` lies within `tolerance_ms` of a recorded
/// second gets that second's mean speed (m/s, two decimals) and power
/// (rounded watts) in its `Extensions/TPX` block.
pub fn merge_tcx_with(
    existing: &str,
    points: &[ActivityPoint],
    options: &MergeOptions,
) -> Result<String, ExportError> {
    if existing.len() > options.max_document_bytes {
        return Err(ExportError::TooLarge {
            size: existing.len(),
            limit: options.max_document_bytes,
        });
    }

    let buckets = aggregate_to_seconds(points);
    let mut reader = Reader::from_str(existing);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(existing.len() + 1024)));

    let mut stack: Vec<String> = Vec::new();
    let mut doc_prefix: Option<String> = None;
    let mut trackpoint: Option<(usize, Vec<Event<'static>>)> = None;
    let mut total = 0usize;
    let mut updated = 0usize;

    loop {
        let event = next_event(&mut reader)?;

        if let Event::Eof = event {
            break;
        }

        // Root element: validate and make sure the extension namespace is bound
        if doc_prefix.is_none() {
            if let Event::Start(e) | Event::Empty(e) = &event {
                let (root, prefix) = prepare_root(e)?;
                doc_prefix = Some(prefix);
                if let Event::Start(_) = event {
                    stack.push(local_name(&root));
                    write(&mut writer, Event::Start(root))?;
                } else {
                    write(&mut writer, Event::Empty(root))?;
                }
                continue;
            }
        }

        match event {
            Event::Start(e) => {
                let name = local_name(&e);
                stack.push(name.clone());
                if let Some((_, buffer)) = trackpoint.as_mut() {
                    buffer.push(Event::Start(e.into_owned()));
                } else if name == "Trackpoint" {
                    trackpoint = Some((stack.len(), vec![Event::Start(e.into_owned())]));
                } else {
                    write(&mut writer, Event::Start(e))?;
                }
            }
            Event::End(e) => {
                let depth = stack.len();
                stack.pop();
                match trackpoint.take() {
                    Some((tp_depth, mut buffer)) if tp_depth == depth => {
                        buffer.push(Event::End(e.into_owned()));
                        total += 1;
                        let prefix = doc_prefix.as_deref().unwrap_or(DEFAULT_TPX_PREFIX);
                        let (events, matched) =
                            patch_trackpoint(buffer, &buckets, options.tolerance_ms, prefix)?;
                        if matched {
                            updated += 1;
                        }
                        for event in events {
                            write(&mut writer, event)?;
                        }
                    }
                    Some((tp_depth, mut buffer)) => {
                        buffer.push(Event::End(e.into_owned()));
                        trackpoint = Some((tp_depth, buffer));
                    }
                    None => write(&mut writer, Event::End(e))?,
                }
            }
            other => {
                if let Some((_, buffer)) = trackpoint.as_mut() {
                    buffer.push(other.into_owned());
                } else {
                    write(&mut writer, other)?;
                }
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(ExportError::Parse(format!(
            "unexpected end of document inside <{}>",
            open
        )));
    }
    if doc_prefix.is_none() {
        return Err(ExportError::NotTcx("document has no root element".to_string()));
    }

    tracing::info!(
        "Merged {} recorded seconds into {} of {} trackpoints",
        buckets.len(),
        updated,
        total
    );

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(|e| ExportError::XmlError(e.to_string()))
}

/// Check the root element and return it (possibly with an added namespace
/// declaration) together with the ActivityExtension prefix to use.
fn prepare_root(root: &BytesStart<'_>) -> Result<(BytesStart<'static>, String), ExportError> {
    let name = local_name(root);
    if name != ROOT_ELEMENT {
        return Err(ExportError::NotTcx(format!("root element is <{}>", name)));
    }

    let mut root = root.clone().into_owned();
    if let Some(prefix) = declared_tpx_prefix(&root) {
        return Ok((root, prefix));
    }

    let prefix = if has_attribute(&root, "xmlns:ns3") {
        "tpx"
    } else {
        DEFAULT_TPX_PREFIX
    };
    root.push_attribute((format!("xmlns:{}", prefix).as_str(), NS_TPX));
    tracing::debug!("Declared ActivityExtension namespace as {}", prefix);

    Ok((root, prefix.to_string()))
}

/// Prefix already bound to the ActivityExtension namespace on `element`.
fn declared_tpx_prefix(element: &BytesStart<'_>) -> Option<String> {
    element.attributes().flatten().find_map(|attr| {
        let value = attr.unescape_value().ok()?;
        if value != NS_TPX {
            return None;
        }
        attr.key
            .as_ref()
            .strip_prefix(b"xmlns:".as_slice())
            .map(|p| String::from_utf8_lossy(p).into_owned())
    })
}

fn has_attribute(element: &BytesStart<'_>, name: &str) -> bool {
    matches!(element.try_get_attribute(name), Ok(Some(_)))
}

/// Rewrite one buffered trackpoint. Returns the events to write and whether
/// a recorded second matched.
fn patch_trackpoint(
    events: Vec<Event<'static>>,
    buckets: &[AggregatedPoint],
    tolerance_ms: i64,
    doc_prefix: &str,
) -> Result<(Vec<Event<'static>>, bool), ExportError> {
    let Some(time_ms) = trackpoint_time(&events)? else {
        return Ok((events, false));
    };
    let Some(bucket) = find_bucket(buckets, time_ms, tolerance_ms) else {
        return Ok((events, false));
    };

    let speed = bucket.speed.map(|kmh| format!("{:.2}", kmh / 3.6));
    let watts = bucket.power.map(|w| (w.round() as i64).to_string());
    if speed.is_none() && watts.is_none() {
        return Ok((events, true));
    }

    let mut patch = TrackpointPatch::new(speed, watts, doc_prefix, events.len());
    patch.apply(events);
    Ok((patch.out, true))
}

/// Epoch milliseconds of the trackpoint's own `Time` child, if any.
fn trackpoint_time(events: &[Event<'static>]) -> Result<Option<i64>, ExportError> {
    let mut stack: Vec<String> = Vec::new();

    for event in events {
        match event {
            Event::Start(e) => stack.push(local_name(e)),
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) if at(&stack, &["Trackpoint", "Time"]) => {
                let text = text
                    .unescape()
                    .map_err(|e| ExportError::Parse(e.to_string()))?;
                return Ok(parse_time_ms(&text));
            }
            _ => {}
        }
    }

    Ok(None)
}

fn parse_time_ms(text: &str) -> Option<i64> {
    match DateTime::parse_from_rfc3339(text.trim()) {
        Ok(time) => Some(time.timestamp_millis()),
        Err(e) => {
            tracing::debug!("Skipping trackpoint with unreadable time {:?}: {}", text, e);
            None
        }
    }
}

/// Closest recorded second within the tolerance.
fn find_bucket(
    buckets: &[AggregatedPoint],
    time_ms: i64,
    tolerance_ms: i64,
) -> Option<&AggregatedPoint> {
    let idx = buckets.partition_point(|b| b.timestamp_ms < time_ms);
    [idx.checked_sub(1), Some(idx)]
        .into_iter()
        .flatten()
        .filter_map(|i| buckets.get(i))
        .filter(|b| (b.timestamp_ms - time_ms).abs() <= tolerance_ms)
        .min_by_key(|b| (b.timestamp_ms - time_ms).abs())
}

/// Rewrites the extension values of a single trackpoint.
struct TrackpointPatch<'p> {
    speed: Option<String>,
    watts: Option<String>,
    doc_prefix: &'p str,
    out: Vec<Event<'static>>,
    saw_extensions: bool,
    saw_tpx: bool,
    wrote_speed: bool,
    wrote_watts: bool,
}

impl<'p> TrackpointPatch<'p> {
    fn new(speed: Option<String>, watts: Option<String>, doc_prefix: &'p str, len: usize) -> Self {
        Self {
            speed,
            watts,
            doc_prefix,
            out: Vec::with_capacity(len + 12),
            saw_extensions: false,
            saw_tpx: false,
            wrote_speed: false,
            wrote_watts: false,
        }
    }

    fn apply(&mut self, events: Vec<Event<'static>>) {
        const EXTENSIONS: [&str; 2] = ["Trackpoint", "Extensions"];
        const TPX: [&str; 3] = ["Trackpoint", "Extensions", "TPX"];

        let mut stack: Vec<String> = Vec::new();
        // While set, content of a replaced value element is dropped until the
        // stack unwinds back to this depth.
        let mut skip_depth: Option<usize> = None;

        for event in events {
            if let Some(depth) = skip_depth {
                match &event {
                    Event::Start(e) => {
                        stack.push(local_name(e));
                        continue;
                    }
                    Event::End(_) if stack.len() == depth => skip_depth = None,
                    Event::End(_) => {
                        stack.pop();
                        continue;
                    }
                    _ => continue,
                }
            }

            match event {
                Event::Start(e) => {
                    let name = local_name(&e);
                    let in_tpx = at(&stack, &TPX);
                    stack.push(name);

                    if in_tpx {
                        if let Some(value) = self.take_value(stack_top(&stack)) {
                            self.out.push(Event::Start(e));
                            self.out.push(text_event(&value));
                            skip_depth = Some(stack.len());
                            continue;
                        }
                    }
                    if at(&stack, &EXTENSIONS) {
                        self.saw_extensions = true;
                    } else if at(&stack, &TPX) {
                        self.saw_tpx = true;
                    }
                    self.out.push(Event::Start(e));
                }
                Event::Empty(e) => {
                    let name = local_name(&e);
                    if at(&stack, &TPX) {
                        if let Some(value) = self.take_value(&name) {
                            let end = e.to_end().into_owned();
                            self.out.push(Event::Start(e));
                            self.out.push(text_event(&value));
                            self.out.push(Event::End(end));
                            continue;
                        }
                    } else if at(&stack, &EXTENSIONS) && name == "TPX" {
                        self.saw_tpx = true;
                        let prefix = prefix_of(&e);
                        let end = e.to_end().into_owned();
                        self.out.push(Event::Start(e));
                        self.push_missing_values(&prefix);
                        self.out.push(Event::End(end));
                        continue;
                    } else if at(&stack, &["Trackpoint"]) && name == "Extensions" {
                        self.saw_extensions = true;
                        self.saw_tpx = true;
                        let end = e.to_end().into_owned();
                        self.out.push(Event::Start(e));
                        self.push_tpx(self.doc_prefix);
                        self.out.push(Event::End(end));
                        continue;
                    }
                    self.out.push(Event::Empty(e));
                }
                Event::End(e) => {
                    if at(&stack, &TPX) {
                        let prefix = qualified_prefix(e.name().as_ref());
                        self.push_missing_values(&prefix);
                    } else if at(&stack, &EXTENSIONS) && !self.saw_tpx {
                        self.saw_tpx = true;
                        self.push_tpx(self.doc_prefix);
                    } else if at(&stack, &["Trackpoint"]) && !self.saw_extensions {
                        // Extensions belongs to the TCX namespace, like its Trackpoint
                        self.saw_extensions = true;
                        let name = qualify(&qualified_prefix(e.name().as_ref()), "Extensions");
                        self.out.push(Event::Start(BytesStart::new(name.clone())));
                        self.push_tpx(self.doc_prefix);
                        self.out.push(Event::End(BytesEnd::new(name)));
                    }
                    stack.pop();
                    self.out.push(Event::End(e));
                }
                other => self.out.push(other),
            }
        }
    }

    /// The new value for a TPX child, marking it written.
    fn take_value(&mut self, local: &str) -> Option<String> {
        match local {
            "Speed" if !self.wrote_speed => {
                self.wrote_speed = self.speed.is_some();
                self.speed.clone()
            }
            "Watts" if !self.wrote_watts => {
                self.wrote_watts = self.watts.is_some();
                self.watts.clone()
            }
            _ => None,
        }
    }

    fn push_missing_values(&mut self, prefix: &str) {
        if !self.wrote_speed {
            if let Some(speed) = self.speed.clone() {
                self.push_value_element(&qualify(prefix, "Speed"), &speed);
                self.wrote_speed = true;
            }
        }
        if !self.wrote_watts {
            if let Some(watts) = self.watts.clone() {
                self.push_value_element(&qualify(prefix, "Watts"), &watts);
                self.wrote_watts = true;
            }
        }
    }

    fn push_tpx(&mut self, prefix: &str) {
        let name = qualify(prefix, "TPX");
        self.out.push(Event::Start(BytesStart::new(name.clone())));
        self.push_missing_values(prefix);
        self.out.push(Event::End(BytesEnd::new(name)));
    }

    fn push_value_element(&mut self, name: &str, value: &str) {
        self.out.push(Event::Start(BytesStart::new(name.to_string())));
        self.out.push(text_event(value));
        self.out.push(Event::End(BytesEnd::new(name.to_string())));
    }
}

fn text_event(value: &str) -> Event<'static> {
    Event::Text(BytesText::new(value).into_owned())
}

fn stack_top(stack: &[String]) -> &str {
    stack.last().map(String::as_str).unwrap_or_default()
}

/// Whether the local-name stack is exactly `path`.
fn at(stack: &[String], path: &[&str]) -> bool {
    stack.len() == path.len() && stack.iter().zip(path).all(|(a, b)| a == b)
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn prefix_of(element: &BytesStart<'_>) -> String {
    qualified_prefix(element.name().as_ref())
}

fn qualified_prefix(name: &[u8]) -> String {
    match name.iter().position(|b| *b == b':') {
        Some(colon) => String::from_utf8_lossy(&name[..colon]).into_owned(),
        None => String::new(),
    }
}

fn qualify(prefix: &str, local: &str) -> String {
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

fn next_event<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>, ExportError> {
    reader.read_event().map_err(|e| {
        ExportError::Parse(format!("{} at byte {}", e, reader.buffer_position()))
    })
}

fn write<W: std::io::Write>(writer: &mut Writer<W>, event: Event<'_>) -> Result<(), ExportError> {
    writer
        .write_event(event)
        .map_err(|e| ExportError::XmlError(e.to_string()))
}

/// Read the trackpoints of a TCX document back into activity points.
///
/// Speed is converted from m/s back to km/h. Trackpoints without a readable
/// `Time` are skipped.
pub fn parse_tcx(document: &str) -> Result<Vec<ActivityPoint>, ExportError> {
    let mut reader = Reader::from_str(document);
    let mut stack: Vec<String> = Vec::new();
    let mut seen_root = false;
    let mut current: Option<ActivityPoint> = None;
    let mut has_time = false;
    let mut points = Vec::new();

    loop {
        match next_event(&mut reader)? {
            Event::Eof => break,
            Event::Start(e) => {
                let name = local_name(&e);
                if !seen_root {
                    if name != ROOT_ELEMENT {
                        return Err(ExportError::NotTcx(format!("root element is <{}>", name)));
                    }
                    seen_root = true;
                }
                if name == "Trackpoint" {
                    current = Some(ActivityPoint::default());
                    has_time = false;
                }
                stack.push(name);
            }
            Event::Empty(e) if !seen_root => {
                let name = local_name(&e);
                if name != ROOT_ELEMENT {
                    return Err(ExportError::NotTcx(format!("root element is <{}>", name)));
                }
                seen_root = true;
            }
            Event::End(_) => {
                if let (Some("Trackpoint"), Some(point)) = (stack.last().map(String::as_str), current)
                {
                    if has_time {
                        points.push(point);
                    }
                    current = None;
                }
                stack.pop();
            }
            Event::Text(text) => {
                let Some(point) = current.as_mut() else {
                    continue;
                };
                let text = text
                    .unescape()
                    .map_err(|e| ExportError::Parse(e.to_string()))?;
                let text = text.trim();
                let path: Vec<&str> = stack.iter().rev().take(3).map(String::as_str).collect();

                match path.as_slice() {
                    ["Time", "Trackpoint", ..] => {
                        if let Some(ms) = parse_time_ms(text) {
                            point.timestamp_ms = ms;
                            has_time = true;
                        }
                    }
                    ["Value", "HeartRateBpm", "Trackpoint"] => {
                        point.heart_rate = text.parse().ok();
                    }
                    ["Speed", "TPX", ..] => {
                        point.speed = text.parse::<f64>().ok().map(|ms| ms * 3.6);
                    }
                    ["Watts", "TPX", ..] => {
                        point.power = text.parse().ok();
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(ExportError::Parse(format!(
            "unexpected end of document inside <{}>",
            open
        )));
    }
    if !seen_root {
        return Err(ExportError::NotTcx("document has no root element".to_string()));
    }

    Ok(points)
}

/// Generate a fresh TCX document from recorded points.
///
/// Points are reduced to one trackpoint per second. With no points the
/// document still validates: the lap starts now and the track is empty.
pub fn generate_tcx(points: &[ActivityPoint]) -> Result<String, ExportError> {
    let buckets = aggregate_to_seconds(points);
    let start_time = match buckets.first() {
        Some(first) => timestamp(first.timestamp_ms)?,
        None => Utc::now(),
    };

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    // XML declaration
    write(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    // Root element
    let mut root = BytesStart::new(ROOT_ELEMENT);
    root.push_attribute(("xmlns", NS_TCX));
    root.push_attribute(("xmlns:ns3", NS_TPX));
    root.push_attribute(("xmlns:xsi", NS_XSI));
    root.push_attribute(("xsi:schemaLocation", SCHEMA_LOCATION));
    write(&mut writer, Event::Start(root))?;

    write(&mut writer, Event::Start(BytesStart::new("Activities")))?;

    let mut activity = BytesStart::new("Activity");
    activity.push_attribute(("Sport", "Biking"));
    write(&mut writer, Event::Start(activity))?;

    // Activity Id (start time)
    write_element(&mut writer, "Id", &format_time(start_time))?;

    write_lap(&mut writer, start_time, &buckets)?;

    write(&mut writer, Event::End(BytesEnd::new("Activity")))?;
    write(&mut writer, Event::End(BytesEnd::new("Activities")))?;
    write(&mut writer, Event::End(BytesEnd::new(ROOT_ELEMENT)))?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(|e| ExportError::XmlError(e.to_string()))
}

/// Write a single lap element.
fn write_lap<W: std::io::Write>(
    writer: &mut Writer<W>,
    start_time: DateTime<Utc>,
    buckets: &[AggregatedPoint],
) -> Result<(), ExportError> {
    let mut lap = BytesStart::new("Lap");
    lap.push_attribute(("StartTime", format_time(start_time).as_str()));
    write(writer, Event::Start(lap))?;

    let total_seconds = match (buckets.first(), buckets.last()) {
        (Some(first), Some(last)) => (last.timestamp_ms - first.timestamp_ms) / 1000 + 1,
        _ => 0,
    };
    // Each trackpoint stands for one second of riding
    let distance_m: f64 = buckets.iter().filter_map(|b| b.speed).map(|kmh| kmh / 3.6).sum();
    let points: Vec<ActivityPoint> = buckets.iter().map(|b| ActivityPoint::from(*b)).collect();
    let summary = summarize(&points, total_seconds.max(0) as u64 * 1000);

    write_element(writer, "TotalTimeSeconds", &total_seconds.to_string())?;
    write_element(writer, "DistanceMeters", &format!("{:.1}", distance_m))?;
    if let Some(max_speed) = summary.max_speed {
        write_element(writer, "MaximumSpeed", &format!("{:.2}", max_speed / 3.6))?;
    }
    write_element(writer, "Calories", "0")?;
    if let Some(avg_hr) = summary.avg_heart_rate {
        write_heart_rate_element(writer, "AverageHeartRateBpm", avg_hr)?;
    }
    write_element(writer, "Intensity", "Active")?;
    write_element(writer, "TriggerMethod", "Manual")?;

    write(writer, Event::Start(BytesStart::new("Track")))?;
    for bucket in buckets {
        write_trackpoint(writer, bucket)?;
    }
    write(writer, Event::End(BytesEnd::new("Track")))?;

    // Lap power summary
    if summary.avg_power.is_some() || summary.max_power.is_some() {
        write(writer, Event::Start(BytesStart::new("Extensions")))?;
        write(writer, Event::Start(BytesStart::new("ns3:LX")))?;
        if let Some(avg_power) = summary.avg_power {
            write_element(writer, "ns3:AvgWatts", &avg_power.to_string())?;
        }
        if let Some(max_power) = summary.max_power {
            write_element(writer, "ns3:MaxWatts", &max_power.to_string())?;
        }
        write(writer, Event::End(BytesEnd::new("ns3:LX")))?;
        write(writer, Event::End(BytesEnd::new("Extensions")))?;
    }

    write(writer, Event::End(BytesEnd::new("Lap")))
}

/// Write a single trackpoint.
fn write_trackpoint<W: std::io::Write>(
    writer: &mut Writer<W>,
    bucket: &AggregatedPoint,
) -> Result<(), ExportError> {
    write(writer, Event::Start(BytesStart::new("Trackpoint")))?;

    write_element(writer, "Time", &format_time(timestamp(bucket.timestamp_ms)?))?;

    if let Some(hr) = bucket.heart_rate {
        write_heart_rate_element(writer, "HeartRateBpm", hr.round().max(0.0) as u32)?;
    }

    if bucket.speed.is_some() || bucket.power.is_some() {
        write(writer, Event::Start(BytesStart::new("Extensions")))?;
        write(writer, Event::Start(BytesStart::new("ns3:TPX")))?;

        // Speed in m/s (convert from km/h)
        if let Some(speed_kmh) = bucket.speed {
            write_element(writer, "ns3:Speed", &format!("{:.2}", speed_kmh / 3.6))?;
        }
        if let Some(power) = bucket.power {
            write_element(writer, "ns3:Watts", &(power.round() as i64).to_string())?;
        }

        write(writer, Event::End(BytesEnd::new("ns3:TPX")))?;
        write(writer, Event::End(BytesEnd::new("Extensions")))?;
    }

    write(writer, Event::End(BytesEnd::new("Trackpoint")))
}

/// Write a simple element with text content.
fn write_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> Result<(), ExportError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write(writer, Event::Text(BytesText::new(value)))?;
    write(writer, Event::End(BytesEnd::new(name)))
}

/// Write a heart rate element with Value sub-element.
fn write_heart_rate_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: u32,
) -> Result<(), ExportError> {
    write(writer, Event::Start(BytesStart::new(name)))?;
    write_element(writer, "Value", &value.to_string())?;
    write(writer, Event::End(BytesEnd::new(name)))
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>, ExportError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| ExportError::XmlError(format!("timestamp out of range: {}", ms)))
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write a TCX document to a file, creating parent directories.
pub fn export_tcx_to_file(document: &str, path: &Path) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, document)?;
    tracing::info!("Wrote {}", path.display());
    Ok(())
}

/// Generate a filename such as `bike-activity-20240101_100000.tcx`.
pub fn generate_tcx_filename(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}.tcx", prefix, at.format("%Y%m%d_%H%M%S"))
}
