//! QuickJS-backed plugin instance

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rquickjs::{Context, Function, Runtime, Value as JsValue};
use tracing::{debug, warn};

use honiplug_runtime::{
    BusError, EvalError, HoniPlug, HookError, PluginApis, PluginMeta, ScriptSource, UserContent,
};

use crate::config::JsConfig;
use crate::globals::{install_publisher, register_honi_globals};
use crate::runtime::{error_message, json_to_js, new_engine, script_options};

const ON_INIT: &str = "onInit";
const ON_WEBSOCKET_READY: &str = "onWebSocketReady";
const ON_USER_CONTENT: &str = "onUserContent";

/// Reads `meta.name` whether `meta` was declared with `var`, `let` or `const`
const META_NAME: &str =
    "(typeof meta === 'object' && meta !== null && typeof meta.name === 'string') ? meta.name : undefined";

/// Looks up a hook the same way, returning undefined if it is not a function
fn hook_lookup(name: &str) -> String {
    format!("typeof {name} === 'function' ? {name} : undefined")
}

/// A plugin script running in its own QuickJS runtime
pub struct JsPlugin {
    meta: PluginMeta,
    path: PathBuf,
    max_pending_jobs: usize,

    /// Bus error raised by the last `honi.publish` call, if any
    publish_fault: Arc<Mutex<Option<BusError>>>,
    /// Held for a whole hook call so the fault belongs to that call
    hook_lock: Mutex<()>,
    /// Set when capabilities could not be installed
    bind_error: Option<String>,

    context: Context,
    runtime: Runtime,
}

impl JsPlugin {
    /// Evaluate a script and check it satisfies the plugin contract
    pub fn from_source(source: &ScriptSource, config: &JsConfig) -> Result<Self, EvalError> {
        let path = source.path.clone();
        let label = source
            .stem()
            .map(str::to_string)
            .unwrap_or_else(|| path.display().to_string());

        let (runtime, context) =
            new_engine(config).map_err(|e| EvalError::Engine(e.to_string()))?;

        let name = context.with(|ctx| -> Result<String, EvalError> {
            register_honi_globals(&ctx, &label).map_err(|e| EvalError::Engine(e.to_string()))?;

            ctx.eval_with_options::<(), _>(source.text.as_str(), script_options())
                .map_err(|e| EvalError::Script {
                    path: path.clone(),
                    message: error_message(&ctx, e),
                })?;

            let name: Option<String> = ctx.eval(META_NAME).map_err(|e| EvalError::Script {
                path: path.clone(),
                message: error_message(&ctx, e),
            })?;

            let name = name
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| EvalError::Contract {
                    path: path.clone(),
                    reason: "meta.name must be a non-empty string".to_string(),
                })?;

            let on_init: Option<Function> =
                ctx.eval(hook_lookup(ON_INIT)).map_err(|e| EvalError::Script {
                    path: path.clone(),
                    message: error_message(&ctx, e),
                })?;
            if on_init.is_none() {
                return Err(EvalError::Contract {
                    path: path.clone(),
                    reason: format!("{ON_INIT} must be a function"),
                });
            }

            Ok(name)
        })?;

        let plugin = Self {
            meta: PluginMeta::new(name),
            path,
            max_pending_jobs: config.max_pending_jobs,
            publish_fault: Arc::new(Mutex::new(None)),
            hook_lock: Mutex::new(()),
            bind_error: None,
            context,
            runtime,
        };

        // Top-level promises run now so their failures surface at load time
        plugin.drain_jobs();

        Ok(plugin)
    }

    /// Source file the plugin was loaded from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call a global hook if the script defines it
    fn call_hook(&self, hook: &str, arg: Option<&serde_json::Value>) -> Result<(), HookError> {
        let _serial = self.hook_lock.lock();
        self.publish_fault.lock().take();

        let result = self.context.with(|ctx| -> Result<(), String> {
            let func: Option<Function> = ctx
                .eval(hook_lookup(hook))
                .map_err(|e| error_message(&ctx, e))?;

            let Some(func) = func else {
                return Ok(());
            };

            let called = match arg {
                Some(json) => {
                    let value = json_to_js(&ctx, json).map_err(|e| error_message(&ctx, e))?;
                    func.call::<_, JsValue>((value,))
                }
                None => func.call::<_, JsValue>(()),
            };

            called.map(|_| ()).map_err(|e| error_message(&ctx, e))
        });

        self.drain_jobs();

        let fault = self.publish_fault.lock().take();
        match (result, fault) {
            (Ok(()), _) => Ok(()),
            (Err(_), Some(bus_error)) => Err(HookError::Publish(bus_error)),
            (Err(message), None) => Err(HookError::raised(format!("{hook}: {message}"))),
        }
    }

    /// Run queued promise jobs without waiting on their results
    fn drain_jobs(&self) {
        let mut ran = 0;
        while self.runtime.is_job_pending() {
            if ran >= self.max_pending_jobs {
                warn!(plugin = %self.meta.name, ran, "Pending job limit reached, leaving the rest queued");
                break;
            }
            ran += 1;

            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    warn!(plugin = %self.meta.name, "Pending job raised an exception");
                }
            }
        }
        if ran > 0 {
            debug!(plugin = %self.meta.name, ran, "Drained pending jobs");
        }
    }
}

impl HoniPlug for JsPlugin {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn bind_apis(&mut self, apis: PluginApis) {
        let fault = self.publish_fault.clone();
        let bound = self.context.with(|ctx| {
            install_publisher(&ctx, apis.ws_publisher, fault).map_err(|e| error_message(&ctx, e))
        });

        if let Err(e) = bound {
            warn!(plugin = %self.meta.name, error = %e, "Failed to install capabilities");
            self.bind_error = Some(e);
        }
    }

    fn on_init(&self) -> Result<(), HookError> {
        if let Some(e) = &self.bind_error {
            return Err(HookError::raised(format!("capabilities unavailable: {e}")));
        }
        self.call_hook(ON_INIT, None)
    }

    fn on_websocket_ready(&self) -> Result<(), HookError> {
        self.call_hook(ON_WEBSOCKET_READY, None)
    }

    fn on_user_content(&self, content: &UserContent) -> Result<(), HookError> {
        let json = serde_json::to_value(content).map_err(|e| HookError::raised(e.to_string()))?;
        self.call_hook(ON_USER_CONTENT, Some(&json))
    }
}

impl std::fmt::Debug for JsPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsPlugin")
            .field("meta", &self.meta)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use honiplug_runtime::{CapabilityInjector, ContentAction, EventBus, HONI_PLUG_TOPIC};

    fn load(text: &str) -> Result<JsPlugin, EvalError> {
        JsPlugin::from_source(&ScriptSource::new("test.js", text), &JsConfig::default())
    }

    fn bound(text: &str) -> (JsPlugin, Arc<EventBus<honiplug_runtime::OutputMessage>>) {
        let bus = EventBus::shared();
        let mut plugin = load(text).unwrap();
        let apis = CapabilityInjector::new(bus.clone()).apis_for(plugin.meta());
        plugin.bind_apis(apis);
        (plugin, bus)
    }

    #[test]
    fn test_meta_from_const() {
        let plugin = load("const meta = { name: 'weather' }; function onInit() {}").unwrap();
        assert_eq!(plugin.meta().name, "weather");
    }

    #[test]
    fn test_missing_meta_is_contract_error() {
        let err = load("function onInit() {}").unwrap_err();
        assert!(matches!(err, EvalError::Contract { .. }));
    }

    #[test]
    fn test_missing_on_init_is_contract_error() {
        let err = load("var meta = { name: 'x' };").unwrap_err();
        assert!(matches!(err, EvalError::Contract { reason, .. } if reason.contains("onInit")));
    }

    #[test]
    fn test_syntax_error() {
        let err = load("const meta = {").unwrap_err();
        assert!(matches!(err, EvalError::Script { .. }));
    }

    #[test]
    fn test_init_publishes_with_own_name() {
        let (plugin, bus) = bound(
            r#"
            const meta = { name: "clock" };
            function onInit() { honi.publish({ tick: 1 }); }
            "#,
        );
        let mut rx = bus.subscribe(HONI_PLUG_TOPIC);

        plugin.on_init().unwrap();

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.plugin_name, "clock");
        assert_eq!(msg.body, serde_json::json!({"tick": 1}));
    }

    #[test]
    fn test_throwing_init_is_hook_error() {
        let (plugin, _bus) = bound(
            r#"
            const meta = { name: "bad" };
            function onInit() { throw new Error("nope"); }
            "#,
        );

        let err = plugin.on_init().unwrap_err();
        assert_eq!(err.to_string(), "onInit: nope");
    }

    #[test]
    fn test_publish_on_closed_bus_is_publish_error() {
        let (plugin, bus) = bound(
            r#"
            const meta = { name: "late" };
            function onInit() { honi.publish("x"); }
            "#,
        );
        bus.close();

        assert!(matches!(
            plugin.on_init(),
            Err(HookError::Publish(BusError::Closed))
        ));
    }

    #[test]
    fn test_user_content_and_optional_hooks() {
        let (plugin, bus) = bound(
            r#"
            const meta = { name: "echo" };
            function onInit() {}
            function onUserContent(content) {
                honi.publish({ type: content.type, action: content.action, id: content.id });
            }
            "#,
        );
        let mut rx = bus.subscribe(HONI_PLUG_TOPIC);

        plugin.on_init().unwrap();
        plugin.on_websocket_ready().unwrap();
        plugin
            .on_user_content(&UserContent::note(
                ContentAction::Created,
                "n1",
                serde_json::json!({ "text": "hi" }),
            ))
            .unwrap();

        let msg = rx.try_recv().unwrap();
        assert_eq!(
            msg.body,
            serde_json::json!({ "type": "Note", "action": "created", "id": "n1" })
        );
    }

    #[test]
    fn test_promise_jobs_are_drained() {
        let (plugin, bus) = bound(
            r#"
            const meta = { name: "async" };
            async function onInit() {
                await null;
                honi.publish("after await");
            }
            "#,
        );
        let mut rx = bus.subscribe(HONI_PLUG_TOPIC);

        plugin.on_init().unwrap();

        assert_eq!(rx.try_recv().unwrap().body, serde_json::json!("after await"));
    }

    #[test]
    fn test_frozen_honi_before_bind_fails_init() {
        let (plugin, _bus) = bound(
            r#"
            const meta = { name: "frozen" };
            Object.freeze(honi);
            function onInit() {}
            "#,
        );

        assert!(plugin.on_init().is_err());
    }

    #[test]
    fn test_concurrent_hooks_keep_their_own_fault() {
        let (plugin, bus) = bound(
            r#"
            const meta = { name: "racy" };
            function onInit() {}
            function onUserContent(content) {
                if (content.id === "publish") {
                    honi.publish("x");
                } else {
                    throw new Error("plain");
                }
            }
            "#,
        );
        bus.close();

        let publish = UserContent::note(ContentAction::Created, "publish", serde_json::Value::Null);
        let raise = UserContent::note(ContentAction::Created, "raise", serde_json::Value::Null);

        std::thread::scope(|scope| {
            for i in 0..4 {
                let (plugin, publish, raise) = (&plugin, &publish, &raise);
                scope.spawn(move || {
                    for _ in 0..50 {
                        if i % 2 == 0 {
                            assert!(matches!(
                                plugin.on_user_content(publish),
                                Err(HookError::Publish(BusError::Closed))
                            ));
                        } else {
                            assert!(matches!(
                                plugin.on_user_content(raise),
                                Err(HookError::Raised(msg)) if msg.contains("plain")
                            ));
                        }
                    }
                });
            }
        });
    }
}
