//! Process-wide publish/subscribe over named topics carrying JSON payloads.
//!
//! The bus is an explicit handle created at startup and shared by `Arc`;
//! there is no global singleton. Subscribers for a topic run sequentially
//! in subscription order and the first error aborts the remaining
//! subscribers and propagates to the publisher. Callbacks must be brief and
//! non-blocking; heavy work belongs on a channel to another task.

use futures_util::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Topic carrying envelopes accepted from HTTP, bound for the broker.
pub const TOPIC_DENM_OUTGOING: &str = "denm.outgoing";
/// Topic carrying decoded DENM projections received from the broker.
pub const TOPIC_DENM_INCOMING: &str = "denm.incoming";

type Subscriber = Arc<dyn Fn(Arc<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Topic name → ordered subscriber list.
#[derive(Default)]
pub struct EventBus {
    topics: Mutex<HashMap<String, Vec<Subscriber>>>,
}

impl EventBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a subscriber to a topic.
    pub fn subscribe<F>(&self, topic: &str, subscriber: F)
    where
        F: Fn(Arc<Value>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    {
        let mut topics = self.topics.lock().expect("bus mutex poisoned");
        topics
            .entry(topic.to_string())
            .or_default()
            .push(Arc::new(subscriber));
    }

    /// Publishes a payload to every subscriber of a topic, in subscription
    /// order, on the caller's task.
    ///
    /// # Errors
    ///
    /// Returns the first subscriber error; later subscribers are skipped.
    pub async fn publish(&self, topic: &str, payload: Value) -> anyhow::Result<()> {
        // Snapshot under the lock, invoke outside it: a subscriber may not
        // hold the table mutex across its own await points.
        let subscribers: Vec<Subscriber> = {
            let topics = self.topics.lock().expect("bus mutex poisoned");
            topics.get(topic).cloned().unwrap_or_default()
        };
        let payload = Arc::new(payload);
        for subscriber in subscribers {
            subscriber(Arc::clone(&payload)).await?;
        }
        Ok(())
    }

    /// Number of subscribers currently registered for a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .expect("bus mutex poisoned")
            .get(topic)
            .map_or(0, Vec::len)
    }
}
