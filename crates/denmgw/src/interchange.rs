//! Translates `denm.outgoing` bus events into enveloped AMQP messages and
//! inbound AMQP deliveries into `denm.incoming` bus events.

use crate::amqp::{
    AmqpMessage, InboundBody, LinkError, PropertyValue, ReceiverCloser, ReceiverLink, SenderLink,
};
use crate::bus::{EventBus, TOPIC_DENM_INCOMING, TOPIC_DENM_OUTGOING};
use crate::error::GatewayError;
use crate::metrics::{record_denm_discarded, record_denm_published, record_denm_received};
use denm_common::denm::DenmMessage;
use denm_common::envelope::{EnvelopeError, InterchangeEnvelope};
use denm_common::geo::quad_tree;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before retrying after a receiver fault while still running.
const RECEIVE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Broker-facing settings for the interchange paths.
#[derive(Debug, Clone)]
pub struct InterchangeConfig {
    /// Interchange username, stamped on outbound messages.
    pub username: String,
    /// Target address for outbound messages.
    pub send_address: String,
    /// Default envelope `protocolVersion` property.
    pub protocol_version: String,
}

/// Outbound message time to live: one hour.
const OUTBOUND_TTL_MS: u32 = 3_600_000;
/// Outbound message priority.
const OUTBOUND_PRIORITY: u8 = 1;

/// Builds and submits outbound AMQP messages for accepted envelopes.
pub struct OutboundPublisher {
    sender: Arc<SenderLink>,
    config: InterchangeConfig,
}

impl OutboundPublisher {
    /// Creates a publisher over an open sender link.
    #[must_use]
    pub fn new(sender: Arc<SenderLink>, config: InterchangeConfig) -> Self {
        Self { sender, config }
    }

    /// Parses the envelope, encodes the nested DENM and submits the
    /// enveloped message. Failures propagate to the publisher of the bus
    /// event; there is no retry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] for malformed envelopes, out-of-range DENM
    /// fields and link faults.
    pub async fn publish(&self, j: &Value) -> Result<(), GatewayError> {
        let started = Instant::now();
        let envelope = InterchangeEnvelope::from_json(j)?;
        let denm = DenmMessage::from_json(&envelope.data)?;
        let body = denm.encode()?;
        let message = self.build_message(&envelope, &denm, body)?;

        self.sender.send(message).await?;
        record_denm_published(started.elapsed());
        debug!(
            publisher_id = %envelope.publisher_id,
            "DENM submitted to interchange"
        );
        Ok(())
    }

    fn build_message(
        &self,
        envelope: &InterchangeEnvelope,
        denm: &DenmMessage,
        body: Vec<u8>,
    ) -> Result<AmqpMessage, GatewayError> {
        // The broker filters on causeCode; a DENM without a situation
        // container cannot be published.
        let cause_code = denm.cause_code().ok_or(GatewayError::Envelope(
            EnvelopeError::MissingField("data.situation.causeCode"),
        ))?;
        let quad_tree_property = envelope.quad_tree.clone().unwrap_or_else(|| {
            let key = quad_tree(envelope.latitude, envelope.longitude);
            debug!(%key, "calculated quad tree");
            format!(",{key},")
        });

        let mut properties = vec![
            (
                "messageType".to_string(),
                PropertyValue::Str(envelope.message_type().to_string()),
            ),
            (
                "protocolVersion".to_string(),
                PropertyValue::Str(
                    envelope
                        .protocol_version(&self.config.protocol_version)
                        .to_string(),
                ),
            ),
            (
                "publisherId".to_string(),
                PropertyValue::Str(envelope.publisher_id.clone()),
            ),
            (
                "publicationId".to_string(),
                PropertyValue::Str(envelope.publication_id()),
            ),
            (
                "originatingCountry".to_string(),
                PropertyValue::Str(envelope.originating_country.clone()),
            ),
            (
                "causeCode".to_string(),
                PropertyValue::Int(i64::from(cause_code)),
            ),
            ("quadTree".to_string(), PropertyValue::Str(quad_tree_property)),
        ];
        if let Some(shard_id) = envelope.shard_id {
            properties.push(("shardId".to_string(), PropertyValue::Int(shard_id)));
        }
        if let Some(shard_count) = envelope.shard_count {
            properties.push(("shardCount".to_string(), PropertyValue::Int(shard_count)));
        }
        if let Some(timestamp) = &envelope.timestamp {
            properties.push((
                "timestamp".to_string(),
                PropertyValue::Str(timestamp.clone()),
            ));
        }
        if let Some(relation) = &envelope.relation {
            properties.push(("relation".to_string(), PropertyValue::Str(relation.clone())));
        }

        Ok(AmqpMessage {
            body,
            durable: true,
            ttl_ms: OUTBOUND_TTL_MS,
            priority: OUTBOUND_PRIORITY,
            user: self.config.username.clone(),
            to: self.config.send_address.clone(),
            properties,
        })
    }
}

/// Owns the link pair and the receiver loop.
pub struct InterchangeService {
    running: Arc<AtomicBool>,
    sender: Option<Arc<SenderLink>>,
    receiver_closer: Option<ReceiverCloser>,
    receiver_task: Option<JoinHandle<()>>,
}

impl InterchangeService {
    /// Wires the open links to the bus: subscribes the outbound publisher
    /// to `denm.outgoing` and starts the receiver loop feeding
    /// `denm.incoming`. Either direction may be absent.
    #[must_use]
    pub fn start(
        bus: &Arc<EventBus>,
        config: InterchangeConfig,
        sender: Option<SenderLink>,
        receiver: Option<ReceiverLink>,
    ) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let sender = sender.map(Arc::new);

        if let Some(sender) = &sender {
            let publisher = Arc::new(OutboundPublisher::new(Arc::clone(sender), config));
            bus.subscribe(TOPIC_DENM_OUTGOING, move |payload| {
                let publisher = Arc::clone(&publisher);
                Box::pin(async move {
                    publisher.publish(&payload).await.map_err(|e| {
                        error!(error = %e, "failed to send DENM");
                        record_denm_discarded("outbound");
                        anyhow::Error::from(e)
                    })
                })
            });
        }

        let (receiver_closer, receiver_task) = match receiver {
            Some(receiver) => {
                let closer = receiver.closer();
                let task = tokio::spawn(receiver_loop(
                    receiver,
                    Arc::clone(bus),
                    Arc::clone(&running),
                ));
                (Some(closer), Some(task))
            }
            None => (None, None),
        };

        Self {
            running,
            sender,
            receiver_closer,
            receiver_task,
        }
    }

    /// Flips the running flag, closes both links and joins the receiver
    /// loop. `receive()` observing the closed link is the loop's exit.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(sender) = &self.sender {
            sender.close().await;
        }
        if let Some(closer) = &self.receiver_closer {
            closer.close().await;
        }
        if let Some(task) = self.receiver_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "receiver loop join failed");
            }
        }
        info!("interchange service stopped");
    }
}

async fn receiver_loop(mut receiver: ReceiverLink, bus: Arc<EventBus>, running: Arc<AtomicBool>) {
    while running.load(Ordering::SeqCst) {
        match receiver.receive().await {
            Ok(InboundBody::Binary(data)) => {
                debug!(bytes = data.len(), "received DENM message");
                match DenmMessage::decode(&data).and_then(|denm| denm.to_json()) {
                    Ok(projection) => {
                        record_denm_received();
                        if let Err(e) = bus.publish(TOPIC_DENM_INCOMING, projection).await {
                            warn!(error = %e, "incoming DENM subscriber failed");
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "discarding undecodable delivery");
                        record_denm_discarded("decode");
                    }
                }
            }
            Ok(InboundBody::Other(kind)) => {
                error!(kind, "received non-binary message");
                record_denm_discarded("non_binary");
            }
            Err(LinkError::Closed) => {
                info!("receiver closed, exiting loop");
                break;
            }
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    error!(error = %e, "AMQP receiver error");
                    tokio::time::sleep(RECEIVE_RETRY_DELAY).await;
                } else {
                    break;
                }
            }
        }
    }
}
