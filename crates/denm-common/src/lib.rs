//! Common types and codecs shared across the DENM gateway stack.
//!
//! This crate provides:
//! - The in-memory DENM value and its UPER/JSON codecs ([`denm`])
//! - ITS timestamp handling ([`timestamp`])
//! - Bit-level PER-unaligned primitives ([`uper`])
//! - Quad-tree geo indexing ([`geo`])
//! - The interchange AMQP envelope record ([`envelope`])
//! - Protocol enumerations and constants ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod denm;
pub mod envelope;
pub mod geo;
pub mod timestamp;
pub mod types;
pub mod uper;

pub use denm::{DenmError, DenmMessage};
pub use envelope::InterchangeEnvelope;
pub use timestamp::{ItsTimestamp, TimestampError, UTC_2004};
