//! Thread-safe AMQP link adapters over a callback-driven protocol engine.
//!
//! The engine (fe2o3-amqp) is event-driven and owns the links; application
//! code wants plain submit/receive calls with backpressure. [`link`] holds
//! the engine-agnostic adapters, [`engine`] the production transports,
//! [`backoff`] the reconnect delay schedule.

/// Reconnect delay schedule.
pub mod backoff;
/// fe2o3-amqp transports and connection bootstrap.
pub mod engine;
/// Engine-agnostic link adapters.
pub mod link;

pub use engine::AmqpEngine;
pub use link::{
    AmqpMessage, InboundBody, LinkError, LinkStatus, PropertyValue, ReceiverCloser, ReceiverLink,
    SenderLink, CREDIT_WINDOW,
};
