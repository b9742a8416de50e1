//! The DENM value: typed setters, UPER codec and JSON projection.
//!
//! A [`DenmMessage`] mirrors the ETSI DENM PDU: a mandatory ITS PDU header
//! and management container, plus optional situation and location
//! containers. [`encode`](DenmMessage::encode) and
//! [`decode`](DenmMessage::decode) translate to and from the PER-unaligned
//! wire form; [`to_json`](DenmMessage::to_json) and
//! [`from_json`](DenmMessage::from_json) translate to and from the JSON
//! projection spoken by HTTP and WebSocket clients.

use crate::timestamp::{ItsTimestamp, TimestampError};
use crate::types::{
    AltitudeConfidence, RelevanceDistance, RelevanceTrafficDirection, Termination,
    MESSAGE_ID_DENM, PROTOCOL_VERSION,
};
use crate::uper::{BitReader, BitWriter, UperError};
use serde_json::{json, Map, Value};
use thiserror::Error;

// Constrained ranges from the ETSI DENM schema. Values are stored in the
// schema's scaled units: 1e-7 degrees, centimeters, 0.01 m/s, 0.1 degrees.
const LATITUDE_MIN: i64 = -900_000_000;
const LATITUDE_MAX: i64 = 900_000_001;
const LONGITUDE_MIN: i64 = -1_800_000_000;
const LONGITUDE_MAX: i64 = 1_800_000_001;
const ALTITUDE_MIN: i64 = -100_000;
const ALTITUDE_MAX: i64 = 800_001;
const TIMESTAMP_MAX: i64 = 4_398_046_511_103;
const VALIDITY_DURATION_MAX: i64 = 86_400;
const TRANSMISSION_INTERVAL_MIN: i64 = 1;
const TRANSMISSION_INTERVAL_MAX: i64 = 10_000;
const INFORMATION_QUALITY_MAX: i64 = 7;
/// Largest encodable speed value, in 0.01 m/s.
pub const SPEED_VALUE_MAX: u16 = 16_383;
/// Largest encodable heading value, in 0.1 degrees.
pub const HEADING_VALUE_MAX: u16 = 3_601;
const CONFIDENCE_MIN: i64 = 1;
const CONFIDENCE_MAX: i64 = 127;
const TRACES_MAX: i64 = 7;
const PATH_POINTS_MAX: i64 = 40;
const DELTA_LATITUDE_MIN: i64 = -131_071;
const DELTA_LATITUDE_MAX: i64 = 131_072;
const DELTA_ALTITUDE_MIN: i64 = -12_700;
const DELTA_ALTITUDE_MAX: i64 = 12_800;

const DEFAULT_VALIDITY_DURATION_S: u32 = 600;
const DEFAULT_TRANSMISSION_INTERVAL_MS: u16 = 1000;
const DEFAULT_INFORMATION_QUALITY: u8 = 1;
const DEFAULT_CONFIDENCE: u8 = 95;

/// Errors produced by the DENM builder and codecs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DenmError {
    /// A field value is outside its constrained range.
    #[error("field out of range: {field}")]
    InvalidField {
        /// Dotted path of the offending field.
        field: &'static str,
    },
    /// A timestamp was rejected (pre-epoch or unformattable).
    #[error(transparent)]
    Timestamp(#[from] TimestampError),
    /// A decoded payload is not a DENM PDU.
    #[error("wrong message type: expected DENM, got {found}")]
    WrongMessageType {
        /// The message id found in the header.
        found: u8,
    },
    /// The payload could not be decoded as UPER.
    #[error("UPER decode failed: {0}")]
    DecodeFailed(#[from] UperError),
    /// The JSON form lacks a mandatory field.
    #[error("missing required field: {field}")]
    MissingRequired {
        /// Dotted path of the missing field.
        field: &'static str,
    },
}

/// ITS PDU header common to all ITS messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItsPduHeader {
    /// Schema protocol version.
    pub protocol_version: u8,
    /// Message type id; always [`MESSAGE_ID_DENM`] here.
    pub message_id: u8,
    /// Originating station id.
    pub station_id: u32,
}

/// Identifies one DENM event: originating station plus sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActionId {
    /// Station that originated the event.
    pub originating_station_id: u32,
    /// Per-station event sequence number.
    pub sequence_number: u16,
}

/// Altitude with its confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Altitude {
    /// Altitude in centimeters.
    pub value: i32,
    /// 95 % confidence band of the altitude.
    pub confidence: AltitudeConfidence,
}

/// Geographic position of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferencePosition {
    /// Latitude in 1e-7 degrees.
    pub latitude: i32,
    /// Longitude in 1e-7 degrees.
    pub longitude: i32,
    /// Altitude of the position.
    pub altitude: Altitude,
}

/// Mandatory DENM management container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementContainer {
    /// Event action id.
    pub action_id: ActionId,
    /// Time the event was detected.
    pub detection_time: ItsTimestamp,
    /// Time this message revision was produced.
    pub reference_time: ItsTimestamp,
    /// Termination marker for cancelled or negated events.
    pub termination: Option<Termination>,
    /// Position of the event.
    pub event_position: ReferencePosition,
    /// Geographic relevance band.
    pub relevance_distance: Option<RelevanceDistance>,
    /// Directional relevance.
    pub relevance_traffic_direction: Option<RelevanceTrafficDirection>,
    /// How long the event stays valid, in seconds.
    pub validity_duration: Option<u32>,
    /// Repetition interval, in milliseconds.
    pub transmission_interval: Option<u16>,
    /// Type of the originating station.
    pub station_type: u8,
}

/// Cause and sub-cause of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventType {
    /// DENM cause code (see [`crate::types::cause_code`]).
    pub cause_code: u8,
    /// Cause-specific sub-code.
    pub sub_cause_code: u8,
}

/// Optional DENM situation container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SituationContainer {
    /// Quality of the information, 0 (lowest) to 7.
    pub information_quality: u8,
    /// Event classification.
    pub event_type: EventType,
}

impl Default for SituationContainer {
    fn default() -> Self {
        Self {
            information_quality: DEFAULT_INFORMATION_QUALITY,
            event_type: EventType::default(),
        }
    }
}

/// Speed observation with confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Speed {
    /// Speed in 0.01 m/s, 0..=16383.
    pub value: u16,
    /// Confidence, 1..=100 after clamping.
    pub confidence: u8,
}

/// Heading observation with confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heading {
    /// Heading in 0.1 degrees, 0..=3601.
    pub value: u16,
    /// Confidence, 1..=100 after clamping.
    pub confidence: u8,
}

/// One point of a path history, relative to the event position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathPoint {
    /// Latitude offset in 1e-7 degrees.
    pub delta_latitude: i32,
    /// Longitude offset in 1e-7 degrees.
    pub delta_longitude: i32,
    /// Altitude offset in centimeters.
    pub delta_altitude: i32,
}

/// One trace: the path the event approached along.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trace {
    /// Path points, newest first.
    pub path_points: Vec<PathPoint>,
}

/// Optional DENM location container.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LocationContainer {
    /// Speed of the event, if known.
    pub event_speed: Option<Speed>,
    /// Heading of the event, if known.
    pub event_heading: Option<Heading>,
    /// Traces toward the event position; may be empty.
    pub traces: Vec<Trace>,
}

/// A Decentralized Environmental Notification Message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenmMessage {
    /// ITS PDU header.
    pub header: ItsPduHeader,
    /// Management container.
    pub management: ManagementContainer,
    /// Situation container, if present.
    pub situation: Option<SituationContainer>,
    /// Location container, if present.
    pub location: Option<LocationContainer>,
}

impl Default for DenmMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl DenmMessage {
    /// Creates a DENM with the standard defaults: protocol version 2,
    /// detection and reference time "now", relevance within 50 m for all
    /// traffic directions, 600 s validity, 1000 ms transmission interval.
    #[must_use]
    pub fn new() -> Self {
        let now = ItsTimestamp::now();
        Self {
            header: ItsPduHeader {
                protocol_version: PROTOCOL_VERSION,
                message_id: MESSAGE_ID_DENM,
                station_id: 0,
            },
            management: ManagementContainer {
                action_id: ActionId::default(),
                detection_time: now,
                reference_time: now,
                termination: None,
                event_position: ReferencePosition::default(),
                relevance_distance: Some(RelevanceDistance::LessThan50m),
                relevance_traffic_direction: Some(RelevanceTrafficDirection::AllTrafficDirections),
                validity_duration: Some(DEFAULT_VALIDITY_DURATION_S),
                transmission_interval: Some(DEFAULT_TRANSMISSION_INTERVAL_MS),
                station_type: 0,
            },
            situation: None,
            location: None,
        }
    }

    // ── Setters ─────────────────────────────────────────────────────

    /// Sets the originating station id in the header.
    pub fn set_station_id(&mut self, id: u32) {
        self.header.station_id = id;
    }

    /// Sets the event action id.
    pub fn set_action_id(&mut self, originating_station_id: u32, sequence_number: u16) {
        self.management.action_id = ActionId {
            originating_station_id,
            sequence_number,
        };
    }

    /// Sets the detection time from a unix wall-clock time in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::BeforeEpoch`] for times before 2004.
    pub fn set_detection_time(&mut self, unix_secs: i64) -> Result<(), DenmError> {
        self.management.detection_time = ItsTimestamp::from_unix(unix_secs)?;
        Ok(())
    }

    /// Sets the reference time from a unix wall-clock time in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::BeforeEpoch`] for times before 2004.
    pub fn set_reference_time(&mut self, unix_secs: i64) -> Result<(), DenmError> {
        self.management.reference_time = ItsTimestamp::from_unix(unix_secs)?;
        Ok(())
    }

    /// Sets the event position from degrees and meters.
    ///
    /// Values are scaled to the wire units here; out-of-range positions are
    /// rejected at encode time.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_event_position(&mut self, latitude_deg: f64, longitude_deg: f64, altitude_m: f64) {
        let pos = &mut self.management.event_position;
        pos.latitude = (latitude_deg * 1e7) as i32;
        pos.longitude = (longitude_deg * 1e7) as i32;
        pos.altitude.value = (altitude_m * 100.0) as i32;
    }

    /// Sets the altitude confidence band of the event position.
    pub fn set_altitude_confidence(&mut self, confidence: AltitudeConfidence) {
        self.management.event_position.altitude.confidence = confidence;
    }

    /// Sets the geographic relevance band.
    pub fn set_relevance_distance(&mut self, distance: RelevanceDistance) {
        self.management.relevance_distance = Some(distance);
    }

    /// Sets the directional relevance.
    pub fn set_relevance_traffic_direction(&mut self, direction: RelevanceTrafficDirection) {
        self.management.relevance_traffic_direction = Some(direction);
    }

    /// Sets the validity duration in seconds.
    pub fn set_validity_duration(&mut self, seconds: u32) {
        self.management.validity_duration = Some(seconds);
    }

    /// Sets the transmission interval in milliseconds.
    pub fn set_transmission_interval(&mut self, millis: u16) {
        self.management.transmission_interval = Some(millis);
    }

    /// Sets the originating station type.
    pub fn set_station_type(&mut self, station_type: u8) {
        self.management.station_type = station_type;
    }

    /// Marks the event as terminated.
    pub fn set_termination(&mut self, termination: Termination) {
        self.management.termination = Some(termination);
    }

    /// Sets the information quality, creating the situation container if
    /// absent.
    pub fn set_information_quality(&mut self, quality: u8) {
        self.situation_mut().information_quality = quality;
    }

    /// Sets the cause code, creating the situation container if absent.
    pub fn set_cause_code(&mut self, cause_code: u8) {
        self.situation_mut().event_type.cause_code = cause_code;
    }

    /// Sets the sub-cause code, creating the situation container if absent.
    pub fn set_sub_cause_code(&mut self, sub_cause_code: u8) {
        self.situation_mut().event_type.sub_cause_code = sub_cause_code;
    }

    /// Sets the event speed in m/s, creating the location container if
    /// absent. The value clamps to the encodable range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn set_event_speed(&mut self, meters_per_second: f64) {
        let value = (meters_per_second * 100.0).clamp(0.0, f64::from(SPEED_VALUE_MAX)) as u16;
        let speed = self.location_mut().event_speed.get_or_insert(Speed {
            value: 0,
            confidence: DEFAULT_CONFIDENCE,
        });
        speed.value = value;
    }

    /// Sets the speed confidence, clamped to 1..=100.
    pub fn set_event_speed_confidence(&mut self, confidence: u8) {
        let speed = self.location_mut().event_speed.get_or_insert(Speed {
            value: 0,
            confidence: DEFAULT_CONFIDENCE,
        });
        speed.confidence = confidence.clamp(1, 100);
    }

    /// Sets the event heading in degrees, creating the location container
    /// if absent. The value clamps to the encodable range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn set_event_heading(&mut self, degrees: f64) {
        let value = (degrees * 10.0).clamp(0.0, f64::from(HEADING_VALUE_MAX)) as u16;
        let heading = self.location_mut().event_heading.get_or_insert(Heading {
            value: 0,
            confidence: DEFAULT_CONFIDENCE,
        });
        heading.value = value;
    }

    /// Sets the heading confidence, clamped to 1..=100.
    pub fn set_event_heading_confidence(&mut self, confidence: u8) {
        let heading = self.location_mut().event_heading.get_or_insert(Heading {
            value: 0,
            confidence: DEFAULT_CONFIDENCE,
        });
        heading.confidence = confidence.clamp(1, 100);
    }

    /// Appends a trace, creating the location container if absent.
    pub fn add_trace(&mut self, trace: Trace) {
        self.location_mut().traces.push(trace);
    }

    fn situation_mut(&mut self) -> &mut SituationContainer {
        self.situation.get_or_insert_with(SituationContainer::default)
    }

    fn location_mut(&mut self) -> &mut LocationContainer {
        self.location.get_or_insert_with(LocationContainer::default)
    }

    // ── Getters ─────────────────────────────────────────────────────

    /// The event action id.
    #[must_use]
    pub const fn action_id(&self) -> ActionId {
        self.management.action_id
    }

    /// The cause code, if a situation container is present.
    #[must_use]
    pub fn cause_code(&self) -> Option<u8> {
        self.situation.map(|s| s.event_type.cause_code)
    }

    /// The detection time rendered as `YYYY-MM-DD HH:MM:SS UTC`.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::OutOfRange`] for unrepresentable values.
    pub fn detection_time_formatted(&self) -> Result<String, DenmError> {
        Ok(self.management.detection_time.format()?)
    }

    /// The reference time rendered as `YYYY-MM-DD HH:MM:SS UTC`.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::OutOfRange`] for unrepresentable values.
    pub fn reference_time_formatted(&self) -> Result<String, DenmError> {
        Ok(self.management.reference_time.format()?)
    }

    /// The event speed in m/s, if present.
    #[must_use]
    pub fn event_speed_mps(&self) -> Option<f64> {
        self.location
            .as_ref()
            .and_then(|l| l.event_speed)
            .map(|s| f64::from(s.value) / 100.0)
    }

    /// The event heading in degrees, if present.
    #[must_use]
    pub fn event_heading_degrees(&self) -> Option<f64> {
        self.location
            .as_ref()
            .and_then(|l| l.event_heading)
            .map(|h| f64::from(h.value) / 10.0)
    }

    // ── UPER codec ──────────────────────────────────────────────────

    /// Checks every field against its constrained range.
    fn validate(&self) -> Result<(), DenmError> {
        fn check(value: i64, lo: i64, hi: i64, field: &'static str) -> Result<(), DenmError> {
            if value < lo || value > hi {
                return Err(DenmError::InvalidField { field });
            }
            Ok(())
        }

        let m = &self.management;
        let pos = &m.event_position;
        check(
            i64::from(pos.latitude),
            LATITUDE_MIN,
            LATITUDE_MAX,
            "management.eventPosition.latitude",
        )?;
        check(
            i64::from(pos.longitude),
            LONGITUDE_MIN,
            LONGITUDE_MAX,
            "management.eventPosition.longitude",
        )?;
        check(
            i64::from(pos.altitude.value),
            ALTITUDE_MIN,
            ALTITUDE_MAX,
            "management.eventPosition.altitude",
        )?;
        if let Some(d) = m.validity_duration {
            check(
                i64::from(d),
                0,
                VALIDITY_DURATION_MAX,
                "management.validityDuration",
            )?;
        }
        if let Some(i) = m.transmission_interval {
            check(
                i64::from(i),
                TRANSMISSION_INTERVAL_MIN,
                TRANSMISSION_INTERVAL_MAX,
                "management.transmissionInterval",
            )?;
        }
        if let Some(s) = &self.situation {
            check(
                i64::from(s.information_quality),
                0,
                INFORMATION_QUALITY_MAX,
                "situation.informationQuality",
            )?;
        }
        if let Some(l) = &self.location {
            if let Some(speed) = l.event_speed {
                check(
                    i64::from(speed.value),
                    0,
                    i64::from(SPEED_VALUE_MAX),
                    "location.eventSpeed",
                )?;
                check(
                    i64::from(speed.confidence),
                    CONFIDENCE_MIN,
                    CONFIDENCE_MAX,
                    "location.speedConfidence",
                )?;
            }
            if let Some(heading) = l.event_heading {
                check(
                    i64::from(heading.value),
                    0,
                    i64::from(HEADING_VALUE_MAX),
                    "location.eventHeading",
                )?;
                check(
                    i64::from(heading.confidence),
                    CONFIDENCE_MIN,
                    CONFIDENCE_MAX,
                    "location.headingConfidence",
                )?;
            }
            check(l.traces.len() as i64, 0, TRACES_MAX, "location.traces")?;
            for trace in &l.traces {
                check(
                    trace.path_points.len() as i64,
                    0,
                    PATH_POINTS_MAX,
                    "location.traces.pathPoints",
                )?;
                for point in &trace.path_points {
                    check(
                        i64::from(point.delta_latitude),
                        DELTA_LATITUDE_MIN,
                        DELTA_LATITUDE_MAX,
                        "location.traces.deltaLatitude",
                    )?;
                    check(
                        i64::from(point.delta_longitude),
                        DELTA_LATITUDE_MIN,
                        DELTA_LATITUDE_MAX,
                        "location.traces.deltaLongitude",
                    )?;
                    check(
                        i64::from(point.delta_altitude),
                        DELTA_ALTITUDE_MIN,
                        DELTA_ALTITUDE_MAX,
                        "location.traces.deltaAltitude",
                    )?;
                }
            }
        }
        Ok(())
    }

    /// UPER-encodes the message.
    ///
    /// # Errors
    ///
    /// Returns [`DenmError::InvalidField`] when any field is outside its
    /// constrained range.
    pub fn encode(&self) -> Result<Vec<u8>, DenmError> {
        self.validate()?;

        let mut w = BitWriter::new();
        w.write_constrained(i64::from(self.header.protocol_version), 0, 255);
        w.write_constrained(i64::from(self.header.message_id), 0, 255);
        w.write_constrained(i64::from(self.header.station_id), 0, i64::from(u32::MAX));

        w.write_bit(self.situation.is_some());
        w.write_bit(self.location.is_some());

        let m = &self.management;
        w.write_bit(m.termination.is_some());
        w.write_bit(m.relevance_distance.is_some());
        w.write_bit(m.relevance_traffic_direction.is_some());
        w.write_bit(m.validity_duration.is_some());
        w.write_bit(m.transmission_interval.is_some());

        w.write_constrained(
            i64::from(m.action_id.originating_station_id),
            0,
            i64::from(u32::MAX),
        );
        w.write_constrained(i64::from(m.action_id.sequence_number), 0, 65_535);
        #[allow(clippy::cast_possible_wrap)]
        {
            w.write_constrained(m.detection_time.millis() as i64, 0, TIMESTAMP_MAX);
            w.write_constrained(m.reference_time.millis() as i64, 0, TIMESTAMP_MAX);
        }
        if let Some(t) = m.termination {
            w.write_constrained(i64::from(t as u8), 0, 1);
        }

        let pos = &m.event_position;
        w.write_constrained(i64::from(pos.latitude), LATITUDE_MIN, LATITUDE_MAX);
        w.write_constrained(i64::from(pos.longitude), LONGITUDE_MIN, LONGITUDE_MAX);
        w.write_constrained(i64::from(pos.altitude.value), ALTITUDE_MIN, ALTITUDE_MAX);
        w.write_constrained(i64::from(pos.altitude.confidence as u8), 0, 15);

        if let Some(d) = m.relevance_distance {
            w.write_constrained(i64::from(d as u8), 0, 7);
        }
        if let Some(d) = m.relevance_traffic_direction {
            w.write_constrained(i64::from(d as u8), 0, 3);
        }
        if let Some(d) = m.validity_duration {
            w.write_constrained(i64::from(d), 0, VALIDITY_DURATION_MAX);
        }
        if let Some(i) = m.transmission_interval {
            w.write_constrained(
                i64::from(i),
                TRANSMISSION_INTERVAL_MIN,
                TRANSMISSION_INTERVAL_MAX,
            );
        }
        w.write_constrained(i64::from(m.station_type), 0, 255);

        if let Some(s) = &self.situation {
            w.write_constrained(i64::from(s.information_quality), 0, INFORMATION_QUALITY_MAX);
            w.write_constrained(i64::from(s.event_type.cause_code), 0, 255);
            w.write_constrained(i64::from(s.event_type.sub_cause_code), 0, 255);
        }

        if let Some(l) = &self.location {
            w.write_bit(l.event_speed.is_some());
            w.write_bit(l.event_heading.is_some());
            if let Some(speed) = l.event_speed {
                w.write_constrained(i64::from(speed.value), 0, i64::from(SPEED_VALUE_MAX));
                w.write_constrained(i64::from(speed.confidence), CONFIDENCE_MIN, CONFIDENCE_MAX);
            }
            if let Some(heading) = l.event_heading {
                w.write_constrained(i64::from(heading.value), 0, i64::from(HEADING_VALUE_MAX));
                w.write_constrained(
                    i64::from(heading.confidence),
                    CONFIDENCE_MIN,
                    CONFIDENCE_MAX,
                );
            }
            w.write_constrained(l.traces.len() as i64, 0, TRACES_MAX);
            for trace in &l.traces {
                w.write_constrained(trace.path_points.len() as i64, 0, PATH_POINTS_MAX);
                for point in &trace.path_points {
                    w.write_constrained(
                        i64::from(point.delta_latitude),
                        DELTA_LATITUDE_MIN,
                        DELTA_LATITUDE_MAX,
                    );
                    w.write_constrained(
                        i64::from(point.delta_longitude),
                        DELTA_LATITUDE_MIN,
                        DELTA_LATITUDE_MAX,
                    );
                    w.write_constrained(
                        i64::from(point.delta_altitude),
                        DELTA_ALTITUDE_MIN,
                        DELTA_ALTITUDE_MAX,
                    );
                }
            }
        }

        Ok(w.into_bytes())
    }

    /// Decodes a UPER payload into a DENM.
    ///
    /// # Errors
    ///
    /// Returns [`DenmError::WrongMessageType`] when the header carries a
    /// non-DENM message id and [`DenmError::DecodeFailed`] on any other
    /// PER error.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::too_many_lines
    )]
    pub fn decode(data: &[u8]) -> Result<Self, DenmError> {
        let mut r = BitReader::new(data);

        let protocol_version = r.read_constrained(0, 255)? as u8;
        let message_id = r.read_constrained(0, 255)? as u8;
        if message_id != MESSAGE_ID_DENM {
            return Err(DenmError::WrongMessageType { found: message_id });
        }
        let station_id = r.read_constrained(0, i64::from(u32::MAX))? as u32;

        let has_situation = r.read_bit()?;
        let has_location = r.read_bit()?;

        let has_termination = r.read_bit()?;
        let has_relevance_distance = r.read_bit()?;
        let has_traffic_direction = r.read_bit()?;
        let has_validity = r.read_bit()?;
        let has_interval = r.read_bit()?;

        let originating_station_id = r.read_constrained(0, i64::from(u32::MAX))? as u32;
        let sequence_number = r.read_constrained(0, 65_535)? as u16;
        let detection_time = ItsTimestamp::from_millis(r.read_constrained(0, TIMESTAMP_MAX)? as u64);
        let reference_time = ItsTimestamp::from_millis(r.read_constrained(0, TIMESTAMP_MAX)? as u64);
        let termination = if has_termination {
            Termination::from_value(r.read_constrained(0, 1)? as u8)
        } else {
            None
        };

        let latitude = r.read_constrained(LATITUDE_MIN, LATITUDE_MAX)? as i32;
        let longitude = r.read_constrained(LONGITUDE_MIN, LONGITUDE_MAX)? as i32;
        let altitude_value = r.read_constrained(ALTITUDE_MIN, ALTITUDE_MAX)? as i32;
        let altitude_confidence = AltitudeConfidence::from_value(r.read_constrained(0, 15)? as u8)
            .unwrap_or_default();

        let relevance_distance = if has_relevance_distance {
            RelevanceDistance::from_value(r.read_constrained(0, 7)? as u8)
        } else {
            None
        };
        let relevance_traffic_direction = if has_traffic_direction {
            RelevanceTrafficDirection::from_value(r.read_constrained(0, 3)? as u8)
        } else {
            None
        };
        let validity_duration = if has_validity {
            Some(r.read_constrained(0, VALIDITY_DURATION_MAX)? as u32)
        } else {
            None
        };
        let transmission_interval = if has_interval {
            Some(
                r.read_constrained(TRANSMISSION_INTERVAL_MIN, TRANSMISSION_INTERVAL_MAX)? as u16,
            )
        } else {
            None
        };
        let station_type = r.read_constrained(0, 255)? as u8;

        let situation = if has_situation {
            Some(SituationContainer {
                information_quality: r.read_constrained(0, INFORMATION_QUALITY_MAX)? as u8,
                event_type: EventType {
                    cause_code: r.read_constrained(0, 255)? as u8,
                    sub_cause_code: r.read_constrained(0, 255)? as u8,
                },
            })
        } else {
            None
        };

        let location = if has_location {
            let has_speed = r.read_bit()?;
            let has_heading = r.read_bit()?;
            let event_speed = if has_speed {
                Some(Speed {
                    value: r.read_constrained(0, i64::from(SPEED_VALUE_MAX))? as u16,
                    confidence: r.read_constrained(CONFIDENCE_MIN, CONFIDENCE_MAX)? as u8,
                })
            } else {
                None
            };
            let event_heading = if has_heading {
                Some(Heading {
                    value: r.read_constrained(0, i64::from(HEADING_VALUE_MAX))? as u16,
                    confidence: r.read_constrained(CONFIDENCE_MIN, CONFIDENCE_MAX)? as u8,
                })
            } else {
                None
            };
            let trace_count = r.read_constrained(0, TRACES_MAX)?;
            let mut traces = Vec::with_capacity(trace_count as usize);
            for _ in 0..trace_count {
                let point_count = r.read_constrained(0, PATH_POINTS_MAX)?;
                let mut path_points = Vec::with_capacity(point_count as usize);
                for _ in 0..point_count {
                    path_points.push(PathPoint {
                        delta_latitude: r
                            .read_constrained(DELTA_LATITUDE_MIN, DELTA_LATITUDE_MAX)?
                            as i32,
                        delta_longitude: r
                            .read_constrained(DELTA_LATITUDE_MIN, DELTA_LATITUDE_MAX)?
                            as i32,
                        delta_altitude: r
                            .read_constrained(DELTA_ALTITUDE_MIN, DELTA_ALTITUDE_MAX)?
                            as i32,
                    });
                }
                traces.push(Trace { path_points });
            }
            Some(LocationContainer {
                event_speed,
                event_heading,
                traces,
            })
        } else {
            None
        };

        Ok(Self {
            header: ItsPduHeader {
                protocol_version,
                message_id,
                station_id,
            },
            management: ManagementContainer {
                action_id: ActionId {
                    originating_station_id,
                    sequence_number,
                },
                detection_time,
                reference_time,
                termination,
                event_position: ReferencePosition {
                    latitude,
                    longitude,
                    altitude: Altitude {
                        value: altitude_value,
                        confidence: altitude_confidence,
                    },
                },
                relevance_distance,
                relevance_traffic_direction,
                validity_duration,
                transmission_interval,
                station_type,
            },
            situation,
            location,
        })
    }

    // ── JSON projection ─────────────────────────────────────────────

    /// Projects the message into its JSON form: human units, formatted
    /// timestamps, lowerCamelCase DENM field names.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::OutOfRange`] when a timestamp cannot be
    /// formatted.
    pub fn to_json(&self) -> Result<Value, DenmError> {
        let m = &self.management;
        let pos = &m.event_position;

        let mut management = json!({
            "actionId": m.action_id.originating_station_id,
            "sequenceNumber": m.action_id.sequence_number,
            "detectionTime": m.detection_time.format()?,
            "referenceTime": m.reference_time.format()?,
            "stationType": m.station_type,
            "eventPosition": {
                "latitude": f64::from(pos.latitude) / 1e7,
                "longitude": f64::from(pos.longitude) / 1e7,
                "altitude": f64::from(pos.altitude.value) / 100.0,
            },
        });
        if let Some(d) = m.relevance_distance {
            management["relevanceDistance"] = json!(d as u8);
        }
        if let Some(d) = m.relevance_traffic_direction {
            management["relevanceTrafficDirection"] = json!(d as u8);
        }
        if let Some(d) = m.validity_duration {
            management["validityDuration"] = json!(d);
        }
        if let Some(i) = m.transmission_interval {
            management["transmissionInterval"] = json!(i);
        }

        let mut root = json!({
            "header": {
                "protocolVersion": self.header.protocol_version,
                "messageId": self.header.message_id,
                "stationId": self.header.station_id,
            },
            "management": management,
        });

        if let Some(s) = &self.situation {
            root["situation"] = json!({
                "informationQuality": s.information_quality,
                "causeCode": s.event_type.cause_code,
                "subCauseCode": s.event_type.sub_cause_code,
            });
        }
        if let Some(l) = &self.location {
            let mut location = Map::new();
            if let Some(speed) = l.event_speed {
                location.insert("eventSpeed".into(), json!(f64::from(speed.value) / 100.0));
                location.insert("speedConfidence".into(), json!(speed.confidence));
            }
            if let Some(heading) = l.event_heading {
                location.insert(
                    "eventHeading".into(),
                    json!(f64::from(heading.value) / 10.0),
                );
                location.insert("headingConfidence".into(), json!(heading.confidence));
            }
            root["location"] = Value::Object(location);
        }

        Ok(root)
    }

    /// Builds a DENM from its JSON form, applying the standard defaults for
    /// absent fields.
    ///
    /// # Errors
    ///
    /// Returns [`DenmError::MissingRequired`] when `header.stationId` is
    /// absent, [`DenmError::InvalidField`] for non-representable values and
    /// [`TimestampError`] variants for bad timestamps.
    #[allow(clippy::too_many_lines)]
    pub fn from_json(j: &Value) -> Result<Self, DenmError> {
        fn int_field<T: TryFrom<u64>>(
            obj: &Value,
            key: &str,
            field: &'static str,
        ) -> Result<Option<T>, DenmError> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => v
                    .as_u64()
                    .and_then(|n| T::try_from(n).ok())
                    .map(Some)
                    .ok_or(DenmError::InvalidField { field }),
            }
        }
        fn float_field(
            obj: &Value,
            key: &str,
            field: &'static str,
        ) -> Result<Option<f64>, DenmError> {
            match obj.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(v) => v
                    .as_f64()
                    .map(Some)
                    .ok_or(DenmError::InvalidField { field }),
            }
        }

        let mut msg = Self::new();

        let header = j.get("header").ok_or(DenmError::MissingRequired {
            field: "header",
        })?;
        msg.header.station_id = int_field(header, "stationId", "header.stationId")?
            .ok_or(DenmError::MissingRequired {
                field: "header.stationId",
            })?;
        if let Some(v) = int_field(header, "protocolVersion", "header.protocolVersion")? {
            msg.header.protocol_version = v;
        }

        if let Some(management) = j.get("management") {
            if let Some(v) = int_field(management, "actionId", "management.actionId")? {
                msg.management.action_id.originating_station_id = v;
            }
            if let Some(v) = int_field(management, "sequenceNumber", "management.sequenceNumber")? {
                msg.management.action_id.sequence_number = v;
            }
            if let Some(s) = management.get("detectionTime").and_then(Value::as_str) {
                msg.management.detection_time = ItsTimestamp::parse(s)?;
            }
            if let Some(s) = management.get("referenceTime").and_then(Value::as_str) {
                msg.management.reference_time = ItsTimestamp::parse(s)?;
            }
            if let Some(v) = int_field(management, "stationType", "management.stationType")? {
                msg.management.station_type = v;
            }
            if let Some(pos) = management.get("eventPosition") {
                let latitude = float_field(pos, "latitude", "management.eventPosition.latitude")?
                    .unwrap_or_default();
                let longitude =
                    float_field(pos, "longitude", "management.eventPosition.longitude")?
                        .unwrap_or_default();
                let altitude = float_field(pos, "altitude", "management.eventPosition.altitude")?
                    .unwrap_or_default();
                msg.set_event_position(latitude, longitude, altitude);
            }
            if let Some(v) = int_field::<u8>(
                management,
                "relevanceDistance",
                "management.relevanceDistance",
            )? {
                msg.management.relevance_distance = Some(
                    RelevanceDistance::from_value(v).ok_or(DenmError::InvalidField {
                        field: "management.relevanceDistance",
                    })?,
                );
            }
            if let Some(v) = int_field::<u8>(
                management,
                "relevanceTrafficDirection",
                "management.relevanceTrafficDirection",
            )? {
                msg.management.relevance_traffic_direction = Some(
                    RelevanceTrafficDirection::from_value(v).ok_or(DenmError::InvalidField {
                        field: "management.relevanceTrafficDirection",
                    })?,
                );
            }
            if let Some(v) =
                int_field(management, "validityDuration", "management.validityDuration")?
            {
                msg.management.validity_duration = Some(v);
            }
            if let Some(v) = int_field(
                management,
                "transmissionInterval",
                "management.transmissionInterval",
            )? {
                msg.management.transmission_interval = Some(v);
            }
        }

        if let Some(situation) = j.get("situation") {
            if let Some(v) = int_field(
                situation,
                "informationQuality",
                "situation.informationQuality",
            )? {
                msg.set_information_quality(v);
            } else {
                // Presence of the container alone materializes it.
                let _ = msg.situation_mut();
            }
            if let Some(v) = int_field(situation, "causeCode", "situation.causeCode")? {
                msg.set_cause_code(v);
            }
            if let Some(v) = int_field(situation, "subCauseCode", "situation.subCauseCode")? {
                msg.set_sub_cause_code(v);
            }
        }

        if let Some(location) = j.get("location") {
            let _ = msg.location_mut();
            if let Some(v) = float_field(location, "eventSpeed", "location.eventSpeed")? {
                msg.set_event_speed(v);
            }
            if let Some(v) = int_field(location, "speedConfidence", "location.speedConfidence")? {
                msg.set_event_speed_confidence(v);
            }
            if let Some(v) = float_field(location, "eventHeading", "location.eventHeading")? {
                msg.set_event_heading(v);
            }
            if let Some(v) =
                int_field(location, "headingConfidence", "location.headingConfidence")?
            {
                msg.set_event_heading_confidence(v);
            }
        }

        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::UTC_2004;
    use crate::types::cause_code;
    use chrono::Utc;

    /// An accident DENM with every container populated the way a roadside
    /// station would report it.
    fn accident_fixture() -> DenmMessage {
        let now = Utc::now().timestamp();
        let mut denm = DenmMessage::new();
        denm.set_station_id(1_234_567);
        denm.set_action_id(1_234_567, 20);
        denm.set_detection_time(now).unwrap();
        denm.set_reference_time(now).unwrap();
        denm.set_event_position(57.779_017, 12.774_981, 190.0);
        denm.set_relevance_distance(RelevanceDistance::LessThan50m);
        denm.set_relevance_traffic_direction(RelevanceTrafficDirection::AllTrafficDirections);
        denm.set_validity_duration(600);
        denm.set_station_type(3);
        denm.set_information_quality(0);
        denm.set_cause_code(cause_code::ACCIDENT);
        denm.set_sub_cause_code(0);
        denm
    }

    #[test]
    fn defaults_match_standard() {
        let denm = DenmMessage::new();
        assert_eq!(denm.header.protocol_version, 2);
        assert_eq!(denm.header.message_id, MESSAGE_ID_DENM);
        assert_eq!(denm.header.station_id, 0);
        assert_eq!(denm.management.action_id, ActionId::default());
        assert_eq!(denm.management.station_type, 0);
        assert_eq!(
            denm.management.relevance_distance,
            Some(RelevanceDistance::LessThan50m)
        );
        assert_eq!(
            denm.management.relevance_traffic_direction,
            Some(RelevanceTrafficDirection::AllTrafficDirections)
        );
        assert_eq!(denm.management.validity_duration, Some(600));
        assert_eq!(denm.management.transmission_interval, Some(1000));
        assert!(denm.situation.is_none());
        assert!(denm.location.is_none());
    }

    #[test]
    fn setters_populate_fixture_fields() {
        let denm = accident_fixture();
        assert_eq!(denm.header.station_id, 1_234_567);
        assert_eq!(denm.management.action_id.sequence_number, 20);
        assert_eq!(denm.management.station_type, 3);
        let s = denm.situation.unwrap();
        assert_eq!(s.information_quality, 0);
        assert_eq!(s.event_type.cause_code, cause_code::ACCIDENT);
        assert_eq!(s.event_type.sub_cause_code, 0);
    }

    #[test]
    fn event_position_scales_to_tenth_microdegrees() {
        let denm = accident_fixture();
        let pos = denm.management.event_position;
        assert!((f64::from(pos.latitude) / 1e7 - 57.779_017).abs() < 1e-6);
        assert!((f64::from(pos.longitude) / 1e7 - 12.774_981).abs() < 1e-6);
        assert!((f64::from(pos.altitude.value) / 100.0 - 190.0).abs() < 0.01);
    }

    #[test]
    fn timestamps_count_millis_since_2004() {
        let now = Utc::now().timestamp();
        let mut denm = DenmMessage::new();
        denm.set_detection_time(now).unwrap();
        denm.set_reference_time(now).unwrap();
        let expected = (now - UTC_2004) as u64 * 1000;
        assert_eq!(denm.management.detection_time.millis(), expected);
        assert_eq!(
            denm.management.detection_time,
            denm.management.reference_time
        );
    }

    #[test]
    fn pre_epoch_timestamps_are_rejected() {
        let mut denm = DenmMessage::new();
        // Dec 31, 2003 23:59:59 UTC
        let invalid = UTC_2004 - 1;
        assert_eq!(
            denm.set_detection_time(invalid),
            Err(DenmError::Timestamp(TimestampError::BeforeEpoch))
        );
        assert_eq!(
            denm.set_reference_time(invalid),
            Err(DenmError::Timestamp(TimestampError::BeforeEpoch))
        );
    }

    #[test]
    fn encode_decode_round_trip() {
        let denm = accident_fixture();
        let encoded = denm.encode().unwrap();
        let decoded = DenmMessage::decode(&encoded).unwrap();
        assert_eq!(decoded, denm);
    }

    #[test]
    fn round_trip_preserves_absent_containers() {
        let mut denm = DenmMessage::new();
        denm.set_station_id(7);
        let decoded = DenmMessage::decode(&denm.encode().unwrap()).unwrap();
        assert!(decoded.situation.is_none());
        assert!(decoded.location.is_none());
    }

    #[test]
    fn round_trip_preserves_location_and_traces() {
        let mut denm = accident_fixture();
        denm.set_event_speed(13.89);
        denm.set_event_speed_confidence(95);
        denm.set_event_heading(45.0);
        denm.set_event_heading_confidence(90);
        denm.add_trace(Trace {
            path_points: vec![PathPoint {
                delta_latitude: -1200,
                delta_longitude: 480,
                delta_altitude: 10,
            }],
        });
        denm.add_trace(Trace::default());
        let decoded = DenmMessage::decode(&denm.encode().unwrap()).unwrap();
        assert_eq!(decoded, denm);
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = DenmMessage::decode(&[0x00, 0x01, 0x02, 0x03]);
        assert!(matches!(result, Err(DenmError::DecodeFailed(_))), "{result:?}");
    }

    #[test]
    fn decode_rejects_empty() {
        assert!(matches!(
            DenmMessage::decode(&[]),
            Err(DenmError::DecodeFailed(_))
        ));
    }

    #[test]
    fn decode_rejects_non_denm_message_id() {
        let denm = accident_fixture();
        let mut encoded = denm.encode().unwrap();
        // The message id occupies the second byte of the header.
        encoded[1] = 2;
        assert_eq!(
            DenmMessage::decode(&encoded),
            Err(DenmError::WrongMessageType { found: 2 })
        );
    }

    #[test]
    fn encode_rejects_out_of_range_latitude() {
        let mut denm = accident_fixture();
        denm.set_event_position(91.0, 0.0, 0.0);
        assert_eq!(
            denm.encode(),
            Err(DenmError::InvalidField {
                field: "management.eventPosition.latitude"
            })
        );
    }

    #[test]
    fn encode_rejects_out_of_range_information_quality() {
        let mut denm = accident_fixture();
        denm.set_information_quality(8);
        assert_eq!(
            denm.encode(),
            Err(DenmError::InvalidField {
                field: "situation.informationQuality"
            })
        );
    }

    #[test]
    fn encode_rejects_out_of_range_validity() {
        let mut denm = accident_fixture();
        denm.set_validity_duration(86_401);
        assert!(matches!(
            denm.encode(),
            Err(DenmError::InvalidField { field: "management.validityDuration" })
        ));
    }

    #[test]
    fn speed_and_heading_clamp() {
        let mut denm = DenmMessage::new();
        denm.set_event_speed(1e9);
        denm.set_event_heading(1e9);
        denm.set_event_speed_confidence(200);
        denm.set_event_heading_confidence(0);
        let l = denm.location.as_ref().unwrap();
        assert_eq!(l.event_speed.unwrap().value, SPEED_VALUE_MAX);
        assert_eq!(l.event_heading.unwrap().value, HEADING_VALUE_MAX);
        assert_eq!(l.event_speed.unwrap().confidence, 100);
        assert_eq!(l.event_heading.unwrap().confidence, 1);
    }

    #[test]
    fn speed_and_heading_human_units() {
        let mut denm = DenmMessage::new();
        denm.set_event_speed(13.89);
        denm.set_event_heading(45.0);
        assert!((denm.event_speed_mps().unwrap() - 13.89).abs() < 0.01);
        assert!((denm.event_heading_degrees().unwrap() - 45.0).abs() < 0.1);
    }

    #[test]
    fn json_round_trip() {
        let mut denm = accident_fixture();
        denm.set_event_speed(13.89);
        denm.set_event_heading(45.0);
        let j = denm.to_json().unwrap();
        let parsed = DenmMessage::from_json(&j).unwrap();
        assert_eq!(parsed, denm);
    }

    #[test]
    fn json_projection_shape() {
        let denm = accident_fixture();
        let j = denm.to_json().unwrap();
        assert_eq!(j["header"]["stationId"], 1_234_567);
        assert_eq!(j["header"]["messageId"], 1);
        assert_eq!(j["management"]["sequenceNumber"], 20);
        assert_eq!(j["situation"]["causeCode"], u64::from(cause_code::ACCIDENT));
        assert!(j["management"]["detectionTime"]
            .as_str()
            .unwrap()
            .ends_with("UTC"));
        assert!((j["management"]["eventPosition"]["latitude"].as_f64().unwrap() - 57.779_017).abs() < 1e-6);
        assert!(j.get("location").is_none());
    }

    #[test]
    fn from_json_requires_station_id() {
        let j = json!({ "header": {} });
        assert_eq!(
            DenmMessage::from_json(&j),
            Err(DenmError::MissingRequired {
                field: "header.stationId"
            })
        );
        assert_eq!(
            DenmMessage::from_json(&json!({})),
            Err(DenmError::MissingRequired { field: "header" })
        );
    }

    #[test]
    fn from_json_applies_defaults() {
        let j = json!({ "header": { "stationId": 42 } });
        let denm = DenmMessage::from_json(&j).unwrap();
        assert_eq!(denm.header.station_id, 42);
        assert_eq!(denm.management.validity_duration, Some(600));
        assert!(denm.situation.is_none());
    }

    #[test]
    fn from_json_materializes_empty_containers() {
        let j = json!({
            "header": { "stationId": 1 },
            "situation": {},
            "location": {},
        });
        let denm = DenmMessage::from_json(&j).unwrap();
        let s = denm.situation.unwrap();
        assert_eq!(s.information_quality, DEFAULT_INFORMATION_QUALITY);
        let l = denm.location.unwrap();
        assert!(l.event_speed.is_none());
        assert!(l.traces.is_empty());
    }

    #[test]
    fn from_json_rejects_bad_relevance_distance() {
        let j = json!({
            "header": { "stationId": 1 },
            "management": { "relevanceDistance": 9 },
        });
        assert_eq!(
            DenmMessage::from_json(&j),
            Err(DenmError::InvalidField {
                field: "management.relevanceDistance"
            })
        );
    }

    #[test]
    fn from_json_rejects_pre_epoch_detection_time() {
        let j = json!({
            "header": { "stationId": 1 },
            "management": { "detectionTime": "2003-12-31 23:59:59 UTC" },
        });
        assert_eq!(
            DenmMessage::from_json(&j),
            Err(DenmError::Timestamp(TimestampError::BeforeEpoch))
        );
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    prop_compose! {
        fn arb_denm()(
            station_id in any::<u32>(),
            sequence in any::<u16>(),
            millis in 0u64..946_080_000_000,
            lat in -900_000_000i32..=900_000_001,
            lon in -1_800_000_000i32..=1_800_000_001,
            alt in -100_000i32..=800_001,
            station_type in any::<u8>(),
            with_situation in any::<bool>(),
            quality in 0u8..=7,
            cause in any::<u8>(),
            with_speed in any::<bool>(),
            speed in 0u16..=SPEED_VALUE_MAX,
            confidence in 1u8..=100,
        ) -> DenmMessage {
            let mut denm = DenmMessage::new();
            denm.set_station_id(station_id);
            denm.set_action_id(station_id, sequence);
            denm.management.detection_time = ItsTimestamp::from_millis(millis);
            denm.management.reference_time = ItsTimestamp::from_millis(millis);
            denm.management.event_position.latitude = lat;
            denm.management.event_position.longitude = lon;
            denm.management.event_position.altitude.value = alt;
            denm.set_station_type(station_type);
            if with_situation {
                denm.set_information_quality(quality);
                denm.set_cause_code(cause);
            }
            if with_speed {
                denm.location_mut().event_speed = Some(Speed { value: speed, confidence });
            }
            denm
        }
    }

    proptest! {
        #[test]
        fn encode_decode_round_trip(denm in arb_denm()) {
            let encoded = denm.encode().unwrap();
            let decoded = DenmMessage::decode(&encoded).unwrap();
            prop_assert_eq!(decoded, denm);
        }

        #[test]
        fn decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..64)) {
            let _ = DenmMessage::decode(&data);
        }
    }
}
