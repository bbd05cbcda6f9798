//! Capability injection
//!
//! Each plugin receives a [`PluginApis`] bundle whose publisher is bound to
//! the plugin's own name. A plugin has no way to publish under another
//! plugin's identity.

use std::sync::Arc;

use tracing::trace;

use crate::bus::{BusError, EventBus, HONI_PLUG_TOPIC, OutputMessage};
use crate::plugin::PluginMeta;

// ─────────────────────────────────────────────────────────────────────────────
// Publisher
// ─────────────────────────────────────────────────────────────────────────────

/// Publish capability scoped to one plugin
#[derive(Clone)]
pub struct PluginPublisher {
    plugin_name: Arc<str>,
    bus: Arc<EventBus<OutputMessage>>,
}

impl PluginPublisher {
    /// Name every message from this publisher is attributed to
    pub fn plugin_name(&self) -> &str {
        &self.plugin_name
    }

    /// Publish a payload on the plugin output topic
    ///
    /// Returns the number of output channels that received it.
    pub fn publish(&self, body: serde_json::Value) -> Result<usize, BusError> {
        let msg = OutputMessage {
            plugin_name: self.plugin_name.to_string(),
            body,
        };
        let notified = self.bus.publish(HONI_PLUG_TOPIC, msg)?;
        trace!(plugin = %self.plugin_name, notified, "Plugin published");
        Ok(notified)
    }
}

impl std::fmt::Debug for PluginPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginPublisher")
            .field("plugin_name", &self.plugin_name)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Capability Bundle
// ─────────────────────────────────────────────────────────────────────────────

/// Host APIs handed to a plugin before `on_init`
#[derive(Debug, Clone)]
pub struct PluginApis {
    /// Real-time output publisher
    pub ws_publisher: PluginPublisher,
}

/// Builds capability bundles bound to a shared bus
#[derive(Clone)]
pub struct CapabilityInjector {
    bus: Arc<EventBus<OutputMessage>>,
}

impl CapabilityInjector {
    pub fn new(bus: Arc<EventBus<OutputMessage>>) -> Self {
        Self { bus }
    }

    /// Build the bundle for one plugin
    pub fn apis_for(&self, meta: &PluginMeta) -> PluginApis {
        PluginApis {
            ws_publisher: PluginPublisher {
                plugin_name: Arc::from(meta.name.as_str()),
                bus: self.bus.clone(),
            },
        }
    }
}
