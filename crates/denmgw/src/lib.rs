//! DENM gateway — HTTP/WebSocket surface bridged to an AMQP 1.0 interchange.
#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// AMQP link adapters and the protocol-engine bridge.
pub mod amqp;
/// In-process publish/subscribe bus.
pub mod bus;
/// CLI argument parsing and gateway configuration.
pub mod config;
/// Error types for gateway operations.
pub mod error;
/// HTTP ingress and WebSocket egress.
pub mod http;
/// Broker-facing translation between bus events and AMQP messages.
pub mod interchange;
/// Prometheus metrics collection and HTTP endpoint.
pub mod metrics;
mod tls;

pub use bus::EventBus;
pub use error::GatewayError;
