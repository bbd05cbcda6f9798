//! Streaming Channels
//!
//! A channel is a named feed a client opens on its streaming connection. Each
//! channel kind has a [`ChannelService`] that declares its access rules and
//! creates instances bound to one connection.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use honiplug_runtime::{EventBus, HONI_PLUG_TOPIC, OutputMessage};

use super::protocol::{ChannelEvent, ServerMessage};

// ─────────────────────────────────────────────────────────────────────────────
// Channel Traits
// ─────────────────────────────────────────────────────────────────────────────

/// One open channel on one connection
pub trait Channel: Send {
    /// Channel kind
    fn name(&self) -> &'static str;

    /// Instance id chosen by the client
    fn id(&self) -> &str;

    /// Start delivering events
    fn init(&mut self);

    /// Stop delivering events; must be idempotent and safe without `init`
    fn dispose(&mut self);
}

/// Factory and access rules for one channel kind
pub trait ChannelService: Send + Sync {
    fn name(&self) -> &'static str;

    /// A connection may hold at most one instance of a shared channel
    fn should_share(&self) -> bool;

    /// Only authenticated connections may open the channel
    fn require_credential(&self) -> bool;

    fn create(&self, id: String, sink: ChannelSink) -> Box<dyn Channel>;
}

/// Outbound half of a connection as seen by one channel instance
#[derive(Debug, Clone)]
pub struct ChannelSink {
    channel_id: String,
    tx: mpsc::Sender<ServerMessage>,
}

impl ChannelSink {
    pub fn new(channel_id: impl Into<String>, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            channel_id: channel_id.into(),
            tx,
        }
    }

    /// Send an event framed with this channel's id
    ///
    /// Returns `false` once the connection has gone away.
    pub async fn send(&self, event: ChannelEvent) -> bool {
        self.tx
            .send(ServerMessage::channel(self.channel_id.clone(), event))
            .await
            .is_ok()
    }
}

/// Channel kinds available to streaming connections, by name
#[derive(Default, Clone)]
pub struct ChannelCatalog {
    services: HashMap<&'static str, Arc<dyn ChannelService>>,
}

impl ChannelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: Arc<dyn ChannelService>) -> Self {
        self.services.insert(service.name(), service);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ChannelService>> {
        self.services.get(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HoniPlug Channel
// ─────────────────────────────────────────────────────────────────────────────

pub const HONI_PLUG_CHANNEL: &str = "honiPlug";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Initialized,
    Subscribed,
    Disposed,
}

/// Forwards every plugin output message to the client, unfiltered
pub struct HoniPlugChannel {
    id: String,
    sink: ChannelSink,
    bus: Arc<EventBus<OutputMessage>>,
    state: ChannelState,
    forward: Option<JoinHandle<()>>,
}

impl HoniPlugChannel {
    pub fn new(id: String, sink: ChannelSink, bus: Arc<EventBus<OutputMessage>>) -> Self {
        Self {
            id,
            sink,
            bus,
            state: ChannelState::Initialized,
            forward: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }
}

impl Channel for HoniPlugChannel {
    fn name(&self) -> &'static str {
        HONI_PLUG_CHANNEL
    }

    fn id(&self) -> &str {
        &self.id
    }

    fn init(&mut self) {
        if self.state != ChannelState::Initialized {
            return;
        }

        let mut rx = self.bus.subscribe(HONI_PLUG_TOPIC);
        let sink = self.sink.clone();
        let id = self.id.clone();

        self.forward = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(msg) => {
                        let event = ChannelEvent::HoniPlug {
                            plugin: msg.plugin_name,
                            content: msg.body,
                        };
                        if !sink.send(event).await {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %id, skipped, "Client fell behind, dropped plugin output");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!(channel = %id, "Plugin output forwarding stopped");
        }));

        self.state = ChannelState::Subscribed;
    }

    fn dispose(&mut self) {
        if let Some(task) = self.forward.take() {
            task.abort();
        }
        self.state = ChannelState::Disposed;
    }
}

impl Drop for HoniPlugChannel {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Creates [`HoniPlugChannel`] instances
pub struct HoniPlugChannelService {
    bus: Arc<EventBus<OutputMessage>>,
}

impl HoniPlugChannelService {
    pub fn new(bus: Arc<EventBus<OutputMessage>>) -> Self {
        Self { bus }
    }
}

impl ChannelService for HoniPlugChannelService {
    fn name(&self) -> &'static str {
        HONI_PLUG_CHANNEL
    }

    fn should_share(&self) -> bool {
        true
    }

    fn require_credential(&self) -> bool {
        true
    }

    fn create(&self, id: String, sink: ChannelSink) -> Box<dyn Channel> {
        Box::new(HoniPlugChannel::new(id, sink, self.bus.clone()))
    }
}
