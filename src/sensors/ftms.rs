//! FTMS (Fitness Machine Service) protocol codec.
//!
//! Decodes Indoor Bike Data (0x2AD2) notifications into [`TelemetrySample`]s,
//! encodes Fitness Machine Control Point (0x2AD9) commands and decodes the
//! control point's response indications. Everything here is pure and stateless.

use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// FTMS Service UUID (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Indoor Bike Data Characteristic UUID (0x2AD2)
pub const INDOOR_BIKE_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2ad2_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Control Point UUID (0x2AD9)
pub const FTMS_CONTROL_POINT_UUID: Uuid =
    Uuid::from_u128(0x0000_2ad9_0000_1000_8000_0080_5f9b_34fb);

/// First byte of every control point response indication.
pub const CONTROL_RESPONSE_CODE: u8 = 0x80;

/// Decoded Indoor Bike Data notification.
///
/// Every measurement is optional: a field is `Some` only when its presence bit
/// was set in the frame *and* the frame actually carried its bytes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySample {
    /// Instantaneous speed in km/h
    pub speed_kmh: Option<f64>,
    /// Average speed in km/h
    pub avg_speed_kmh: Option<f64>,
    /// Instantaneous cadence in RPM (0.5 resolution)
    pub cadence_rpm: Option<f64>,
    /// Average cadence in RPM (0.5 resolution)
    pub avg_cadence_rpm: Option<f64>,
    /// Total distance in meters
    pub total_distance_m: Option<u32>,
    /// Resistance level (unitless)
    pub resistance_level: Option<i16>,
    /// Instantaneous power in watts
    pub power_watts: Option<i16>,
    /// Average power in watts
    pub avg_power_watts: Option<i16>,
    /// Total expended energy in kcal
    pub energy_kcal: Option<u16>,
    /// Energy per hour in kcal
    pub energy_per_hour_kcal: Option<u16>,
    /// Energy per minute in kcal
    pub energy_per_minute_kcal: Option<u8>,
    /// Heart rate in BPM
    pub heart_rate_bpm: Option<u8>,
    /// Metabolic equivalent (0.1 resolution)
    pub metabolic_equivalent: Option<f64>,
    /// Elapsed time in seconds
    pub elapsed_time_s: Option<u16>,
    /// Remaining time in seconds
    pub remaining_time_s: Option<u16>,
    /// The frame this sample was decoded from
    pub raw: Vec<u8>,
    /// Set when the frame ended before all flagged fields were read
    pub truncated: bool,
}

impl TelemetrySample {
    /// Raw frame bytes as a lowercase hex string, prefixed with the characteristic alias.
    pub fn raw_hex(&self) -> String {
        format!("2ad2:{}", to_hex(&self.raw))
    }
}

/// Indoor Bike Data flags (first 2 bytes).
#[derive(Debug, Clone, Copy, Default)]
struct IndoorBikeDataFlags {
    /// More data (bit 0). When clear, instantaneous speed is present.
    more_data: bool,
    /// Average speed present (bit 1)
    avg_speed_present: bool,
    /// Instantaneous cadence present (bit 2)
    inst_cadence_present: bool,
    /// Average cadence present (bit 3)
    avg_cadence_present: bool,
    /// Total distance present (bit 4)
    total_distance_present: bool,
    /// Resistance level present (bit 5)
    resistance_level_present: bool,
    /// Instantaneous power present (bit 6)
    inst_power_present: bool,
    /// Average power present (bit 7)
    avg_power_present: bool,
    /// Expended energy present (bit 8)
    expended_energy_present: bool,
    /// Heart rate present (bit 9)
    heart_rate_present: bool,
    /// Metabolic equivalent present (bit 10)
    metabolic_equivalent_present: bool,
    /// Elapsed time present (bit 11)
    elapsed_time_present: bool,
    /// Remaining time present (bit 12)
    remaining_time_present: bool,
}

impl IndoorBikeDataFlags {
    fn from_bits(flags: u16) -> Self {
        Self {
            more_data: (flags & 0x0001) != 0,
            avg_speed_present: (flags & 0x0002) != 0,
            inst_cadence_present: (flags & 0x0004) != 0,
            avg_cadence_present: (flags & 0x0008) != 0,
            total_distance_present: (flags & 0x0010) != 0,
            resistance_level_present: (flags & 0x0020) != 0,
            inst_power_present: (flags & 0x0040) != 0,
            avg_power_present: (flags & 0x0080) != 0,
            expended_energy_present: (flags & 0x0100) != 0,
            heart_rate_present: (flags & 0x0200) != 0,
            metabolic_equivalent_present: (flags & 0x0400) != 0,
            elapsed_time_present: (flags & 0x0800) != 0,
            remaining_time_present: (flags & 0x1000) != 0,
        }
    }

    fn to_bits(self) -> u16 {
        [
            self.more_data,
            self.avg_speed_present,
            self.inst_cadence_present,
            self.avg_cadence_present,
            self.total_distance_present,
            self.resistance_level_present,
            self.inst_power_present,
            self.avg_power_present,
            self.expended_energy_present,
            self.heart_rate_present,
            self.metabolic_equivalent_present,
            self.elapsed_time_present,
            self.remaining_time_present,
        ]
        .iter()
        .enumerate()
        .fold(0u16, |acc, (bit, set)| if *set { acc | (1 << bit) } else { acc })
    }
}

/// Bounds-checked little-endian reader over a notification payload.
struct FrameReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> FrameReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.offset.checked_add(N)?;
        let bytes: [u8; N] = self.data.get(self.offset..end)?.try_into().ok()?;
        self.offset = end;
        Some(bytes)
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    fn i16(&mut self) -> Option<i16> {
        self.take::<2>().map(i16::from_le_bytes)
    }

    /// 24-bit unsigned value sent as one low byte followed by a uint16 high word.
    fn u24(&mut self) -> Option<u32> {
        let low = self.u8()? as u32;
        let high = self.u16()? as u32;
        Some((high << 8) | low)
    }
}

/// Parse an Indoor Bike Data notification.
///
/// The data format is:
/// - Bytes 0-1: Flags (indicates which fields are present)
/// - Remaining bytes: Data fields in ascending flag-bit order
///
/// This never fails. A frame that ends early yields the fields read up to that
/// point with `truncated` set; the raw bytes are always kept for diagnostics.
pub fn decode_indoor_bike_data(data: &[u8]) -> TelemetrySample {
    let mut sample = TelemetrySample {
        raw: data.to_vec(),
        ..Default::default()
    };
    let mut reader = FrameReader::new(data);

    let decoded = reader
        .u16()
        .map(IndoorBikeDataFlags::from_bits)
        .and_then(|flags| decode_fields(flags, &mut reader, &mut sample));

    if decoded.is_none() {
        sample.truncated = true;
        tracing::debug!(
            frame = %sample.raw_hex(),
            offset = reader.offset,
            "Indoor bike data frame ended early, keeping partial sample"
        );
    }

    sample
}

fn decode_fields(
    flags: IndoorBikeDataFlags,
    reader: &mut FrameReader<'_>,
    sample: &mut TelemetrySample,
) -> Option<()> {
    // Instantaneous speed (present if More Data flag is 0), 0.01 km/h units
    if !flags.more_data {
        sample.speed_kmh = Some(reader.u16()? as f64 / 100.0);
    }
    if flags.avg_speed_present {
        sample.avg_speed_kmh = Some(reader.u16()? as f64 / 100.0);
    }
    // Cadence is in 0.5 RPM units
    if flags.inst_cadence_present {
        sample.cadence_rpm = Some(reader.u16()? as f64 / 2.0);
    }
    if flags.avg_cadence_present {
        sample.avg_cadence_rpm = Some(reader.u16()? as f64 / 2.0);
    }
    if flags.total_distance_present {
        sample.total_distance_m = Some(reader.u24()?);
    }
    if flags.resistance_level_present {
        sample.resistance_level = Some(reader.i16()?);
    }
    if flags.inst_power_present {
        sample.power_watts = Some(reader.i16()?);
    }
    if flags.avg_power_present {
        sample.avg_power_watts = Some(reader.i16()?);
    }
    // Expended energy (3 fields: total, per hour, per minute)
    if flags.expended_energy_present {
        sample.energy_kcal = Some(reader.u16()?);
        sample.energy_per_hour_kcal = Some(reader.u16()?);
        sample.energy_per_minute_kcal = Some(reader.u8()?);
    }
    if flags.heart_rate_present {
        sample.heart_rate_bpm = Some(reader.u8()?);
    }
    if flags.metabolic_equivalent_present {
        sample.metabolic_equivalent = Some(reader.u8()? as f64 / 10.0);
    }
    if flags.elapsed_time_present {
        sample.elapsed_time_s = Some(reader.u16()?);
    }
    if flags.remaining_time_present {
        sample.remaining_time_s = Some(reader.u16()?);
    }
    Some(())
}

/// Build an Indoor Bike Data notification from a sample.
///
/// Inverse of [`decode_indoor_bike_data`]. Scaled values are rounded to the
/// wire resolution. If any of the three energy fields is set, all three are
/// written and missing ones are sent as zero.
pub fn encode_indoor_bike_data(sample: &TelemetrySample) -> Vec<u8> {
    let has_energy = sample.energy_kcal.is_some()
        || sample.energy_per_hour_kcal.is_some()
        || sample.energy_per_minute_kcal.is_some();

    let flags = IndoorBikeDataFlags {
        more_data: sample.speed_kmh.is_none(),
        avg_speed_present: sample.avg_speed_kmh.is_some(),
        inst_cadence_present: sample.cadence_rpm.is_some(),
        avg_cadence_present: sample.avg_cadence_rpm.is_some(),
        total_distance_present: sample.total_distance_m.is_some(),
        resistance_level_present: sample.resistance_level.is_some(),
        inst_power_present: sample.power_watts.is_some(),
        avg_power_present: sample.avg_power_watts.is_some(),
        expended_energy_present: has_energy,
        heart_rate_present: sample.heart_rate_bpm.is_some(),
        metabolic_equivalent_present: sample.metabolic_equivalent.is_some(),
        elapsed_time_present: sample.elapsed_time_s.is_some(),
        remaining_time_present: sample.remaining_time_s.is_some(),
    };

    let mut frame = flags.to_bits().to_le_bytes().to_vec();

    if let Some(speed) = sample.speed_kmh {
        frame.extend_from_slice(&scale_u16(speed, 100.0).to_le_bytes());
    }
    if let Some(speed) = sample.avg_speed_kmh {
        frame.extend_from_slice(&scale_u16(speed, 100.0).to_le_bytes());
    }
    if let Some(cadence) = sample.cadence_rpm {
        frame.extend_from_slice(&scale_u16(cadence, 2.0).to_le_bytes());
    }
    if let Some(cadence) = sample.avg_cadence_rpm {
        frame.extend_from_slice(&scale_u16(cadence, 2.0).to_le_bytes());
    }
    if let Some(distance) = sample.total_distance_m {
        let distance = distance.min(0x00FF_FFFF);
        frame.push((distance & 0xFF) as u8);
        frame.extend_from_slice(&((distance >> 8) as u16).to_le_bytes());
    }
    if let Some(level) = sample.resistance_level {
        frame.extend_from_slice(&level.to_le_bytes());
    }
    if let Some(power) = sample.power_watts {
        frame.extend_from_slice(&power.to_le_bytes());
    }
    if let Some(power) = sample.avg_power_watts {
        frame.extend_from_slice(&power.to_le_bytes());
    }
    if has_energy {
        frame.extend_from_slice(&sample.energy_kcal.unwrap_or(0).to_le_bytes());
        frame.extend_from_slice(&sample.energy_per_hour_kcal.unwrap_or(0).to_le_bytes());
        frame.push(sample.energy_per_minute_kcal.unwrap_or(0));
    }
    if let Some(hr) = sample.heart_rate_bpm {
        frame.push(hr);
    }
    if let Some(met) = sample.metabolic_equivalent {
        frame.push((met * 10.0).round().clamp(0.0, u8::MAX as f64) as u8);
    }
    if let Some(time) = sample.elapsed_time_s {
        frame.extend_from_slice(&time.to_le_bytes());
    }
    if let Some(time) = sample.remaining_time_s {
        frame.extend_from_slice(&time.to_le_bytes());
    }

    frame
}

fn scale_u16(value: f64, factor: f64) -> u16 {
    (value * factor).round().clamp(0.0, u16::MAX as f64) as u16
}

/// FTMS Control Point opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum ControlOpcode {
    /// Request control of the fitness machine
    RequestControl = 0x00,
    /// Reset the fitness machine
    Reset = 0x01,
    /// Set target speed
    SetTargetSpeed = 0x02,
    /// Set target inclination
    SetTargetInclination = 0x03,
    /// Set target resistance level
    SetTargetResistanceLevel = 0x04,
    /// Set target power
    SetTargetPower = 0x05,
    /// Set target heart rate
    SetTargetHeartRate = 0x06,
    /// Start or resume training
    StartOrResume = 0x07,
    /// Stop or pause training
    StopOrPause = 0x08,
    SetTargetedExpendedEnergy = 0x09,
    SetTargetedNumberOfSteps = 0x0A,
    SetTargetedNumberOfStrides = 0x0B,
    SetTargetedDistance = 0x0C,
    SetTargetedTrainingTime = 0x0D,
    SetTargetedTimeInTwoHeartRateZones = 0x0E,
    SetTargetedTimeInThreeHeartRateZones = 0x0F,
    SetTargetedTimeInFiveHeartRateZones = 0x10,
    /// Set indoor bike simulation parameters
    SetIndoorBikeSimulationParameters = 0x11,
    SetWheelCircumference = 0x12,
    /// Spin down control
    SetSpinDownControl = 0x13,
    /// Set targeted cadence
    SetTargetedCadence = 0x14,
}

impl ControlOpcode {
    /// Every opcode in wire order.
    pub const ALL: [ControlOpcode; 21] = [
        ControlOpcode::RequestControl,
        ControlOpcode::Reset,
        ControlOpcode::SetTargetSpeed,
        ControlOpcode::SetTargetInclination,
        ControlOpcode::SetTargetResistanceLevel,
        ControlOpcode::SetTargetPower,
        ControlOpcode::SetTargetHeartRate,
        ControlOpcode::StartOrResume,
        ControlOpcode::StopOrPause,
        ControlOpcode::SetTargetedExpendedEnergy,
        ControlOpcode::SetTargetedNumberOfSteps,
        ControlOpcode::SetTargetedNumberOfStrides,
        ControlOpcode::SetTargetedDistance,
        ControlOpcode::SetTargetedTrainingTime,
        ControlOpcode::SetTargetedTimeInTwoHeartRateZones,
        ControlOpcode::SetTargetedTimeInThreeHeartRateZones,
        ControlOpcode::SetTargetedTimeInFiveHeartRateZones,
        ControlOpcode::SetIndoorBikeSimulationParameters,
        ControlOpcode::SetWheelCircumference,
        ControlOpcode::SetSpinDownControl,
        ControlOpcode::SetTargetedCadence,
    ];

    /// Look up an opcode by its wire value.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

impl fmt::Display for ControlOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (0x{:02X})", self, *self as u8)
    }
}

/// Stop/pause parameter of [`ControlCommand::StopOrPause`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StopKind {
    Stop = 0x01,
    Pause = 0x02,
}

/// Spin down control parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SpinDown {
    Start = 0x01,
    Ignore = 0x02,
}

/// Indoor bike simulation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationParameters {
    /// Wind speed in m/s (0.001 resolution)
    pub wind_speed: i16,
    /// Grade in percent (0.01 resolution)
    pub grade: i16,
    /// Coefficient of rolling resistance (0.0001 resolution)
    pub crr: u8,
    /// Wind resistance coefficient in kg/m (0.01 resolution)
    pub cw: u8,
}

/// A command written to the Fitness Machine Control Point.
///
/// Parameters carry raw wire units; see the comments on each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    RequestControl,
    Reset,
    /// 0.01 km/h
    SetTargetSpeed(u16),
    /// 0.1 %
    SetTargetInclination(i16),
    SetTargetResistanceLevel(i16),
    /// Watts
    SetTargetPower(i16),
    /// BPM
    SetTargetHeartRate(u8),
    StartOrResume,
    StopOrPause(StopKind),
    /// kcal
    SetTargetedExpendedEnergy(u16),
    SetTargetedNumberOfSteps(u16),
    SetTargetedNumberOfStrides(u16),
    /// Meters, 24-bit on the wire
    SetTargetedDistance(u32),
    /// Seconds
    SetTargetedTrainingTime(u16),
    SetTargetedTimeInTwoHeartRateZones([u16; 2]),
    SetTargetedTimeInThreeHeartRateZones([u16; 3]),
    SetTargetedTimeInFiveHeartRateZones([u16; 5]),
    SetIndoorBikeSimulationParameters(SimulationParameters),
    /// 0.1 mm
    SetWheelCircumference(u16),
    SetSpinDownControl(SpinDown),
    /// 0.5 RPM
    SetTargetedCadence(u16),
}

impl ControlCommand {
    /// The opcode this command is sent with.
    pub fn opcode(&self) -> ControlOpcode {
        match self {
            ControlCommand::RequestControl => ControlOpcode::RequestControl,
            ControlCommand::Reset => ControlOpcode::Reset,
            ControlCommand::SetTargetSpeed(_) => ControlOpcode::SetTargetSpeed,
            ControlCommand::SetTargetInclination(_) => ControlOpcode::SetTargetInclination,
            ControlCommand::SetTargetResistanceLevel(_) => ControlOpcode::SetTargetResistanceLevel,
            ControlCommand::SetTargetPower(_) => ControlOpcode::SetTargetPower,
            ControlCommand::SetTargetHeartRate(_) => ControlOpcode::SetTargetHeartRate,
            ControlCommand::StartOrResume => ControlOpcode::StartOrResume,
            ControlCommand::StopOrPause(_) => ControlOpcode::StopOrPause,
            ControlCommand::SetTargetedExpendedEnergy(_) => {
                ControlOpcode::SetTargetedExpendedEnergy
            }
            ControlCommand::SetTargetedNumberOfSteps(_) => ControlOpcode::SetTargetedNumberOfSteps,
            ControlCommand::SetTargetedNumberOfStrides(_) => {
                ControlOpcode::SetTargetedNumberOfStrides
            }
            ControlCommand::SetTargetedDistance(_) => ControlOpcode::SetTargetedDistance,
            ControlCommand::SetTargetedTrainingTime(_) => ControlOpcode::SetTargetedTrainingTime,
            ControlCommand::SetTargetedTimeInTwoHeartRateZones(_) => {
                ControlOpcode::SetTargetedTimeInTwoHeartRateZones
            }
            ControlCommand::SetTargetedTimeInThreeHeartRateZones(_) => {
                ControlOpcode::SetTargetedTimeInThreeHeartRateZones
            }
            ControlCommand::SetTargetedTimeInFiveHeartRateZones(_) => {
                ControlOpcode::SetTargetedTimeInFiveHeartRateZones
            }
            ControlCommand::SetIndoorBikeSimulationParameters(_) => {
                ControlOpcode::SetIndoorBikeSimulationParameters
            }
            ControlCommand::SetWheelCircumference(_) => ControlOpcode::SetWheelCircumference,
            ControlCommand::SetSpinDownControl(_) => ControlOpcode::SetSpinDownControl,
            ControlCommand::SetTargetedCadence(_) => ControlOpcode::SetTargetedCadence,
        }
    }
}

/// Build the control point payload for a command.
///
/// One opcode byte followed by every parameter in little-endian order.
pub fn encode_control(command: &ControlCommand) -> Vec<u8> {
    let mut cmd = vec![command.opcode() as u8];

    match *command {
        ControlCommand::RequestControl
        | ControlCommand::Reset
        | ControlCommand::StartOrResume => {}
        ControlCommand::SetTargetSpeed(v)
        | ControlCommand::SetTargetedExpendedEnergy(v)
        | ControlCommand::SetTargetedNumberOfSteps(v)
        | ControlCommand::SetTargetedNumberOfStrides(v)
        | ControlCommand::SetTargetedTrainingTime(v)
        | ControlCommand::SetWheelCircumference(v)
        | ControlCommand::SetTargetedCadence(v) => cmd.extend_from_slice(&v.to_le_bytes()),
        ControlCommand::SetTargetInclination(v)
        | ControlCommand::SetTargetResistanceLevel(v)
        | ControlCommand::SetTargetPower(v) => cmd.extend_from_slice(&v.to_le_bytes()),
        ControlCommand::SetTargetHeartRate(bpm) => cmd.push(bpm),
        ControlCommand::StopOrPause(kind) => cmd.push(kind as u8),
        ControlCommand::SetTargetedDistance(meters) => {
            cmd.extend_from_slice(&meters.min(0x00FF_FFFF).to_le_bytes()[..3]);
        }
        ControlCommand::SetTargetedTimeInTwoHeartRateZones(zones) => {
            zones.iter().for_each(|z| cmd.extend_from_slice(&z.to_le_bytes()));
        }
        ControlCommand::SetTargetedTimeInThreeHeartRateZones(zones) => {
            zones.iter().for_each(|z| cmd.extend_from_slice(&z.to_le_bytes()));
        }
        ControlCommand::SetTargetedTimeInFiveHeartRateZones(zones) => {
            zones.iter().for_each(|z| cmd.extend_from_slice(&z.to_le_bytes()));
        }
        ControlCommand::SetIndoorBikeSimulationParameters(params) => {
            cmd.extend_from_slice(&params.wind_speed.to_le_bytes());
            cmd.extend_from_slice(&params.grade.to_le_bytes());
            cmd.push(params.crr);
            cmd.push(params.cw);
        }
        ControlCommand::SetSpinDownControl(action) => cmd.push(action as u8),
    }

    cmd
}

/// Result code of a control point response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResultCode {
    Success,
    OpCodeNotSupported,
    InvalidParameter,
    OperationFailed,
    ControlNotPermitted,
    /// Reserved value not defined by FTMS
    Unknown(u8),
}

impl ControlResultCode {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x01 => ControlResultCode::Success,
            0x02 => ControlResultCode::OpCodeNotSupported,
            0x03 => ControlResultCode::InvalidParameter,
            0x04 => ControlResultCode::OperationFailed,
            0x05 => ControlResultCode::ControlNotPermitted,
            other => ControlResultCode::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ControlResultCode::Success => 0x01,
            ControlResultCode::OpCodeNotSupported => 0x02,
            ControlResultCode::InvalidParameter => 0x03,
            ControlResultCode::OperationFailed => 0x04,
            ControlResultCode::ControlNotPermitted => 0x05,
            ControlResultCode::Unknown(other) => *other,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ControlResultCode::Success)
    }
}

impl fmt::Display for ControlResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlResultCode::Success => write!(f, "Success"),
            ControlResultCode::OpCodeNotSupported => write!(f, "Op code not supported"),
            ControlResultCode::InvalidParameter => write!(f, "Invalid parameter"),
            ControlResultCode::OperationFailed => write!(f, "Operation failed"),
            ControlResultCode::ControlNotPermitted => write!(f, "Control not permitted"),
            ControlResultCode::Unknown(code) => write!(f, "Unknown result 0x{:02X}", code),
        }
    }
}

/// Decoded control point response indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlResponse {
    /// Always 0x80 on conforming machines
    pub response_code: u8,
    /// Opcode of the request being answered
    pub request_opcode: u8,
    pub result: ControlResultCode,
}

impl ControlResponse {
    /// The request opcode, if it is one this codec knows.
    pub fn opcode(&self) -> Option<ControlOpcode> {
        ControlOpcode::from_u8(self.request_opcode)
    }

    /// Whether this answers the given opcode.
    pub fn answers(&self, opcode: ControlOpcode) -> bool {
        self.request_opcode == opcode as u8
    }
}

/// Errors from control point response decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Response indication shorter than the fixed 3-byte layout
    #[error("Control point response too short: {0} bytes")]
    Truncated(usize),
}

/// Parse a control point response indication.
///
/// Layout: response code, request opcode, result code. Trailing bytes
/// (response parameters) are ignored.
pub fn decode_control_response(data: &[u8]) -> Result<ControlResponse, CodecError> {
    match data {
        [response_code, request_opcode, result, ..] => Ok(ControlResponse {
            response_code: *response_code,
            request_opcode: *request_opcode,
            result: ControlResultCode::from_u8(*result),
        }),
        _ => Err(CodecError::Truncated(data.len())),
    }
}

/// Lowercase hex rendering of a byte slice.
pub fn to_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02x}", b)).collect()
}
