use crate::amqp::LinkError;
use denm_common::denm::DenmError;
use denm_common::envelope::EnvelopeError;
use thiserror::Error;

/// Errors that can occur while moving a DENM through the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The interchange envelope was malformed or incomplete.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),
    /// The DENM record could not be built or encoded.
    #[error("DENM error: {0}")]
    Denm(#[from] DenmError),
    /// The AMQP link rejected the submission.
    #[error("link error: {0}")]
    Link(#[from] LinkError),
}
