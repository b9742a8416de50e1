//! The interchange envelope: metadata the broker requires alongside each
//! published DENM, carried as AMQP application properties.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Default `messageType` application property.
pub const MESSAGE_TYPE_DENM: &str = "DENM";

/// Default envelope `protocolVersion` when neither the request nor the
/// configuration supplies one.
pub const DEFAULT_PROTOCOL_VERSION: &str = "DENM:1.2.2";

/// Errors produced while reading an envelope from loose JSON.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The JSON body does not have the envelope shape.
    #[error("malformed envelope: {0}")]
    Malformed(String),
    /// A mandatory envelope field is absent.
    #[error("missing required envelope field: {0}")]
    MissingField(&'static str),
    /// `originatingCountry` is not a two-letter code.
    #[error("originatingCountry must be a two-letter code, got {0:?}")]
    InvalidCountry(String),
}

/// An HTTP submission: interchange metadata plus the nested DENM record.
///
/// `publisherId`, `originatingCountry`, `latitude`, `longitude` and `data`
/// are mandatory; everything else is optional and defaulted downstream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterchangeEnvelope {
    /// Message type property; defaults to [`MESSAGE_TYPE_DENM`].
    #[serde(default)]
    pub message_type: Option<String>,
    /// Interchange protocol version property.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Identity of the publishing party, e.g. `NO00001`.
    pub publisher_id: String,
    /// Publication stream id; defaults to `<publisherId>/DENM`.
    #[serde(default)]
    pub publication_id: Option<String>,
    /// Two-letter country code of the publisher.
    pub originating_country: String,
    /// Event latitude in degrees; used for the quad-tree property.
    pub latitude: f64,
    /// Event longitude in degrees; used for the quad-tree property.
    pub longitude: f64,
    /// Pre-computed quad-tree key, already comma-wrapped.
    #[serde(default)]
    pub quad_tree: Option<String>,
    /// Shard index, when the publication is sharded.
    #[serde(default)]
    pub shard_id: Option<i64>,
    /// Total shard count, when the publication is sharded.
    #[serde(default)]
    pub shard_count: Option<i64>,
    /// Free-form publication timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Relation to another publication.
    #[serde(default)]
    pub relation: Option<String>,
    /// The DENM record in its JSON projection.
    pub data: Value,
}

impl InterchangeEnvelope {
    /// Reads an envelope from a parsed JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::MissingField`] for absent mandatory fields,
    /// [`EnvelopeError::InvalidCountry`] for a malformed country code and
    /// [`EnvelopeError::Malformed`] for shape mismatches.
    pub fn from_json(j: &Value) -> Result<Self, EnvelopeError> {
        // Distinguish the absent-field case for a precise error before
        // falling back to serde's own message.
        let obj = j
            .as_object()
            .ok_or_else(|| EnvelopeError::Malformed("not an object".to_string()))?;
        for field in ["publisherId", "originatingCountry", "latitude", "longitude", "data"] {
            if !obj.contains_key(field) {
                return Err(EnvelopeError::MissingField(field));
            }
        }

        let envelope: Self = serde_json::from_value(j.clone())
            .map_err(|e| EnvelopeError::Malformed(e.to_string()))?;
        if envelope.originating_country.len() != 2
            || !envelope
                .originating_country
                .chars()
                .all(|c| c.is_ascii_alphabetic())
        {
            return Err(EnvelopeError::InvalidCountry(
                envelope.originating_country.clone(),
            ));
        }
        Ok(envelope)
    }

    /// The message type property, defaulted.
    #[must_use]
    pub fn message_type(&self) -> &str {
        self.message_type.as_deref().unwrap_or(MESSAGE_TYPE_DENM)
    }

    /// The publication id property, defaulted from the publisher id.
    #[must_use]
    pub fn publication_id(&self) -> String {
        self.publication_id
            .clone()
            .unwrap_or_else(|| format!("{}/DENM", self.publisher_id))
    }

    /// The protocol version property, preferring the envelope's own value
    /// over the supplied configuration default.
    #[must_use]
    pub fn protocol_version<'a>(&'a self, default: &'a str) -> &'a str {
        self.protocol_version.as_deref().unwrap_or(default)
    }
}
