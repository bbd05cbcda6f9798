//! Event Dispatcher
//!
//! Fans host events out to every plugin in the current registry snapshot.
//! A plugin that raises or panics is logged and skipped for that event only;
//! it stays registered and keeps receiving later events.

use std::sync::Arc;

use tracing::{debug, error};

use crate::error::PluginError;
use crate::plugin::{HookError, UserContent, guard_hook};
use crate::registry::{LivePlugin, PluginRegistry};

#[derive(Clone)]
pub struct EventDispatcher {
    registry: Arc<PluginRegistry>,
}

impl EventDispatcher {
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver a user content change to every ready plugin, in registry order
    pub fn dispatch(&self, content: &UserContent) {
        debug!(kind = ?content.kind, action = ?content.action, id = %content.id, "Dispatching user content");
        self.fan_out("onUserContent", |plugin| {
            plugin.plugin().on_user_content(content)
        });
    }

    /// Tell every ready plugin the streaming endpoint is accepting connections
    pub fn notify_websocket_ready(&self) {
        self.fan_out("onWebSocketReady", |plugin| {
            plugin.plugin().on_websocket_ready()
        });
    }

    fn fan_out<F>(&self, event: &'static str, hook: F)
    where
        F: Fn(&LivePlugin) -> Result<(), HookError>,
    {
        // Hold one generation for the whole fan-out
        let snapshot = self.registry.snapshot();

        for plugin in snapshot.plugins() {
            if let Err(e) = guard_hook(|| hook(plugin)) {
                let err = PluginError::from_hook(plugin.name(), event, e);
                error!(plugin = %plugin.name(), event, error = %err, "Plugin hook failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityInjector;
    use crate::bus::EventBus;
    use crate::loader::{LoaderConfig, PluginLoader};
    use crate::plugin::ContentAction;
    use crate::supervisor::PluginSupervisor;
    use crate::testing::{MockEvaluator, write_plugin};
    use tempfile::TempDir;

    async fn configured(dir: &std::path::Path, eval: Arc<MockEvaluator>) -> PluginSupervisor {
        let sup = PluginSupervisor::new(
            PluginLoader::new(LoaderConfig::new(dir), eval),
            CapabilityInjector::new(EventBus::shared()),
        );
        assert!(sup.configure().await);
        sup
    }

    #[tokio::test]
    async fn test_dispatch_continues_past_failures() {
        let dir = TempDir::new().unwrap();
        write_plugin(dir.path(), "a.js", "name=A");
        write_plugin(dir.path(), "b.js", "name=B\ncontent=fail");
        write_plugin(dir.path(), "c.js", "name=C\ncontent=panic");
        write_plugin(dir.path(), "d.js", "name=D");

        let eval = MockEvaluator::shared();
        let sup = configured(dir.path(), eval.clone()).await;
        let dispatcher = EventDispatcher::new(sup.registry());
        eval.clear_events();

        let note = UserContent::note(ContentAction::Created, "n1", serde_json::json!({}));
        dispatcher.dispatch(&note);
        dispatcher.dispatch(&note);

        assert_eq!(
            eval.events(),
            vec![
                "A:content:n1",
                "B:content:n1",
                "C:content:n1",
                "D:content:n1",
                "A:content:n1",
                "B:content:n1",
                "C:content:n1",
                "D:content:n1",
            ]
        );
        assert_eq!(sup.registry().snapshot().len(), 4);
    }

    #[tokio::test]
    async fn test_failed_init_never_receives_events() {
        let dir = TempDir::new().unwrap();
        write_plugin(dir.path(), "a.js", "name=A");
        write_plugin(dir.path(), "b.js", "name=B\ninit=fail");

        let eval = MockEvaluator::shared();
        let sup = configured(dir.path(), eval.clone()).await;
        eval.clear_events();

        let dispatcher = EventDispatcher::new(sup.registry());
        dispatcher.dispatch(&UserContent::drive(
            ContentAction::Deleted,
            "f1",
            serde_json::Value::Null,
        ));
        dispatcher.notify_websocket_ready();

        assert_eq!(eval.events(), vec!["A:content:f1", "A:ready"]);
    }

    #[test]
    fn test_dispatch_with_empty_registry() {
        let dispatcher = EventDispatcher::new(Arc::new(PluginRegistry::new()));
        dispatcher.dispatch(&UserContent::note(
            ContentAction::Updated,
            "x",
            serde_json::Value::Null,
        ));
        dispatcher.notify_websocket_ready();
    }
}
