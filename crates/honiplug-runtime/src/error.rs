//! Plugin failure taxonomy
//!
//! The individual modules have their own error enums. [`PluginError`] is the
//! classification used when a failure is logged or recorded against a plugin.

use crate::bus::BusError;
use crate::loader::LoadError;
use crate::plugin::HookError;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    /// Enumeration, reading or evaluating the plugin directory failed
    #[error("failed to load plugins: {0}")]
    LoadFailure(String),

    /// `on_init` raised or panicked
    #[error("failed to initialize {plugin}: {source}")]
    InitFailure { plugin: String, source: HookError },

    /// An event hook raised or panicked
    #[error("plugin {plugin} failed handling {event}: {source}")]
    DispatchFailure {
        plugin: String,
        event: &'static str,
        source: HookError,
    },

    /// The bus rejected a publish
    #[error("plugin {plugin} could not publish: {source}")]
    BusPublishFailure { plugin: String, source: BusError },

    /// Another plugin already claimed this name
    #[error("duplicate plugin name: {0}")]
    DuplicateName(String),
}

impl PluginError {
    /// Name of the plugin the failure is attributed to, if any
    pub fn plugin(&self) -> Option<&str> {
        match self {
            PluginError::LoadFailure(_) => None,
            PluginError::InitFailure { plugin, .. }
            | PluginError::DispatchFailure { plugin, .. }
            | PluginError::BusPublishFailure { plugin, .. } => Some(plugin),
            PluginError::DuplicateName(name) => Some(name),
        }
    }

    /// Classify a hook failure, pulling bus errors out as their own kind
    pub(crate) fn from_hook(plugin: &str, event: &'static str, err: HookError) -> Self {
        match err {
            HookError::Publish(source) => PluginError::BusPublishFailure {
                plugin: plugin.to_string(),
                source,
            },
            source if event == "onInit" => PluginError::InitFailure {
                plugin: plugin.to_string(),
                source,
            },
            source => PluginError::DispatchFailure {
                plugin: plugin.to_string(),
                event,
                source,
            },
        }
    }
}

impl From<LoadError> for PluginError {
    fn from(err: LoadError) -> Self {
        PluginError::LoadFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hook_classification() {
        let init = PluginError::from_hook("a", "onInit", HookError::raised("x"));
        assert!(matches!(init, PluginError::InitFailure { .. }));

        let dispatch = PluginError::from_hook("a", "onUserContent", HookError::raised("x"));
        assert!(matches!(
            dispatch,
            PluginError::DispatchFailure { event: "onUserContent", .. }
        ));

        let bus = PluginError::from_hook("a", "onInit", HookError::Publish(BusError::Closed));
        assert!(matches!(bus, PluginError::BusPublishFailure { .. }));
        assert_eq!(bus.plugin(), Some("a"));
    }

    #[test]
    fn test_display() {
        let err = PluginError::DuplicateName("weather".into());
        assert_eq!(err.to_string(), "duplicate plugin name: weather");
        assert_eq!(PluginError::LoadFailure("io".into()).plugin(), None);
    }
}
