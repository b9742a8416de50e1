//! ITS timestamps: milliseconds since the ITS epoch (2004-01-01T00:00:00Z).

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// The ITS epoch as a unix timestamp (2004-01-01 00:00:00 UTC).
pub const UTC_2004: i64 = 1_072_915_200;

/// Largest representable ITS timestamp in milliseconds (30 years of
/// milliseconds, the bound used by the wire schema's sanity check).
pub const MAX_ITS_MILLIS: u64 = 946_080_000_000;

/// Format used for timestamps in the JSON projection.
const FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Errors produced when constructing or formatting an ITS timestamp.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimestampError {
    /// The wall-clock time predates the ITS epoch.
    #[error("timestamp before ITS epoch (2004-01-01)")]
    BeforeEpoch,
    /// The millisecond value is outside the representable range.
    #[error("ITS timestamp out of range: {0}")]
    OutOfRange(u64),
    /// The textual form could not be parsed.
    #[error("unparseable timestamp: {0}")]
    Unparseable(String),
}

/// Milliseconds elapsed since the ITS epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ItsTimestamp(u64);

impl ItsTimestamp {
    /// Creates a timestamp from raw milliseconds since the ITS epoch.
    ///
    /// Range checking happens at [`format`](Self::format) time, mirroring
    /// the wire schema which admits the full 42-bit value space.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Creates a timestamp from a unix wall-clock time in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::BeforeEpoch`] for any time before
    /// 2004-01-01T00:00:00Z.
    pub fn from_unix(unix_secs: i64) -> Result<Self, TimestampError> {
        if unix_secs < UTC_2004 {
            return Err(TimestampError::BeforeEpoch);
        }
        #[allow(clippy::cast_sign_loss)]
        Ok(Self::from_millis((unix_secs - UTC_2004) as u64 * 1000))
    }

    /// The current wall-clock time as an ITS timestamp.
    #[must_use]
    pub fn now() -> Self {
        // Utc::now() is always past the 2004 epoch on a sane clock; fall
        // back to the epoch itself rather than panic if it is not.
        Self::from_unix(Utc::now().timestamp()).unwrap_or_default()
    }

    /// Raw milliseconds since the ITS epoch.
    #[must_use]
    pub const fn millis(self) -> u64 {
        self.0
    }

    /// The corresponding unix wall-clock time in seconds.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn unix_secs(self) -> i64 {
        UTC_2004 + (self.0 / 1000) as i64
    }

    /// Renders the timestamp as `YYYY-MM-DD HH:MM:SS UTC`.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::OutOfRange`] if the stored value exceeds
    /// the representable range.
    pub fn format(self) -> Result<String, TimestampError> {
        if self.0 > MAX_ITS_MILLIS {
            return Err(TimestampError::OutOfRange(self.0));
        }
        let utc: DateTime<Utc> = Utc
            .timestamp_opt(self.unix_secs(), 0)
            .single()
            .ok_or(TimestampError::OutOfRange(self.0))?;
        Ok(utc.format(FORMAT).to_string())
    }

    /// Parses the `YYYY-MM-DD HH:MM:SS UTC` form back into a timestamp.
    ///
    /// Sub-second precision is not carried by the textual form; the result
    /// has 1 s resolution.
    ///
    /// # Errors
    ///
    /// Returns [`TimestampError::Unparseable`] for malformed input and
    /// [`TimestampError::BeforeEpoch`] for pre-epoch times.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        let naive = NaiveDateTime::parse_from_str(s, FORMAT)
            .map_err(|_| TimestampError::Unparseable(s.to_string()))?;
        Self::from_unix(naive.and_utc().timestamp())
    }
}
