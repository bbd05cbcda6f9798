//! In-process publish/subscribe bus
//!
//! Topic patterns map to broadcast channels. Publishing to a topic delivers to
//! every channel whose pattern matches it, so subscribers can use MQTT-style
//! wildcards:
//!
//! - `+` matches exactly one level (`plugins/+/out`)
//! - `#` matches the parent level and any number of levels below it
//!   (`plugins/#`); it is only valid as the last level

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Topic plugin output is published on
pub const HONI_PLUG_TOPIC: &str = "honiPlug";

/// Default per-topic buffer size
const DEFAULT_CAPACITY: usize = 256;

/// Errors from bus operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("bus is closed")]
    Closed,

    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}

/// A plugin-attributed message travelling from a publisher to output channels
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputMessage {
    /// Name of the plugin that published the message
    pub plugin_name: String,
    /// Opaque payload supplied by the plugin
    pub body: serde_json::Value,
}

/// Publish/subscribe broker
pub struct EventBus<M: Clone + Send + Sync + 'static> {
    /// Topic pattern -> broadcast channel
    channels: DashMap<String, broadcast::Sender<M>>,

    capacity: usize,
    closed: AtomicBool,
}

impl<M: Clone + Send + Sync + 'static> EventBus<M> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus whose topics buffer up to `capacity` messages per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a shared bus
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Publish a message to a topic
    ///
    /// Returns the number of subscribers the message reached. Zero
    /// subscribers is not an error.
    pub fn publish(&self, topic: &str, msg: M) -> Result<usize, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        if topic.is_empty() || topic.contains('+') || topic.contains('#') {
            return Err(BusError::InvalidTopic(topic.to_string()));
        }

        let mut notified = 0;

        for entry in self.channels.iter() {
            if topic_matches(topic, entry.key()) {
                // send only fails when nobody is listening
                if let Ok(n) = entry.value().send(msg.clone()) {
                    notified += n;
                }
            }
        }

        trace!(topic, notified, "Published message");

        Ok(notified)
    }

    /// Subscribe to a topic pattern
    ///
    /// Dropping the receiver unsubscribes. After [`EventBus::close`] the
    /// returned receiver reports the channel as closed immediately.
    pub fn subscribe(&self, topic_pattern: &str) -> broadcast::Receiver<M> {
        if self.closed.load(Ordering::Acquire) {
            let (tx, rx) = broadcast::channel(1);
            drop(tx);
            return rx;
        }

        let capacity = self.capacity;
        let receiver = self
            .channels
            .entry(topic_pattern.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe();

        debug!(pattern = topic_pattern, "New subscription");

        receiver
    }

    /// Number of live receivers subscribed with exactly this pattern
    pub fn receiver_count(&self, topic_pattern: &str) -> usize {
        self.channels
            .get(topic_pattern)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Close the bus
    ///
    /// All senders are dropped so subscribers observe the end of their
    /// stream, and further publishes fail with [`BusError::Closed`].
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.channels.clear();
        debug!("Bus closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<M: Clone + Send + Sync + 'static> Default for EventBus<M> {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if a topic matches a pattern (MQTT-style wildcards)
///
/// ```text
/// topic "plugins/weather/out"
///   "plugins/weather/out" -> exact
///   "plugins/+/out"       -> + is a single level
///   "plugins/#"           -> # is any number of levels
/// topic "plugins"
///   "plugins/#"           -> # also matches the parent
/// ```
pub fn topic_matches(topic: &str, pattern: &str) -> bool {
    let mut levels = topic.split('/');
    let mut filters = pattern.split('/').peekable();

    while let Some(filter) = filters.next() {
        if filter == "#" {
            return filters.peek().is_none();
        }

        match levels.next() {
            Some(level) if filter == "+" || filter == level => {}
            _ => return false,
        }
    }

    levels.next().is_none()
}
