//! Test doubles for the evaluator seam
//!
//! Mock sources are `key=value` lines:
//!
//! ```text
//! name=weather
//! tag=first
//! bind=panic
//! init=fail|panic
//! content=fail|panic
//! publish={"json":"sent from on_init"}
//! ```
//!
//! A line without `=` is treated as a syntax error.

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::capability::PluginApis;
use crate::evaluator::{EvalError, ScriptEvaluator, ScriptSource};
use crate::plugin::{HoniPlug, HookError, PluginMeta, UserContent};
use crate::registry::PluginRegistry;

pub fn write_plugin(dir: &Path, file: &str, text: &str) {
    std::fs::write(dir.join(file), text).unwrap();
}

type EventLog = Arc<Mutex<Vec<String>>>;
type ThreadLog = Arc<Mutex<Vec<ThreadId>>>;

#[derive(Default)]
pub struct MockEvaluator {
    events: EventLog,
    init_threads: ThreadLog,
    registry: Option<Arc<PluginRegistry>>,
}

impl MockEvaluator {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Plugins record the registry generation they observe during init
    pub fn with_registry(registry: Arc<PluginRegistry>) -> Arc<Self> {
        Arc::new(Self {
            registry: Some(registry),
            ..Self::default()
        })
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn clear_events(&self) {
        self.events.lock().clear();
    }

    /// Threads `on_init` ran on, in call order
    pub fn init_threads(&self) -> Vec<ThreadId> {
        self.init_threads.lock().clone()
    }
}

#[async_trait]
impl ScriptEvaluator for MockEvaluator {
    async fn evaluate(&self, source: &ScriptSource) -> Result<Box<dyn HoniPlug>, EvalError> {
        let mut plugin = MockPlugin::named(source.stem().unwrap_or("anonymous"));
        plugin.events = self.events.clone();
        plugin.init_threads = self.init_threads.clone();
        plugin.registry = self.registry.clone();

        for line in source.text.lines().filter(|l| !l.trim().is_empty()) {
            let Some((key, value)) = line.split_once('=') else {
                return Err(EvalError::Script {
                    path: source.path.clone(),
                    message: format!("unexpected token: {line}"),
                });
            };
            match key.trim() {
                "name" => plugin.meta = PluginMeta::new(value.trim()),
                "tag" => plugin.tag = Some(value.trim().to_string()),
                "bind" => plugin.bind = Behavior::parse(value),
                "init" => plugin.init = Behavior::parse(value),
                "content" => plugin.content = Behavior::parse(value),
                "publish" => {
                    plugin.publish = Some(serde_json::from_str(value).map_err(|e| {
                        EvalError::Script {
                            path: source.path.clone(),
                            message: e.to_string(),
                        }
                    })?)
                }
                other => {
                    return Err(EvalError::Contract {
                        path: source.path.clone(),
                        reason: format!("unknown key {other}"),
                    });
                }
            }
        }

        Ok(Box::new(plugin))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Behavior {
    #[default]
    Succeed,
    Fail,
    Panic,
}

impl Behavior {
    fn parse(value: &str) -> Self {
        match value.trim() {
            "fail" => Behavior::Fail,
            "panic" => Behavior::Panic,
            _ => Behavior::Succeed,
        }
    }

    fn run(self, what: &str) -> Result<(), HookError> {
        match self {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(HookError::raised(format!("{what} failed"))),
            Behavior::Panic => panic!("{what} panicked"),
        }
    }
}

pub struct MockPlugin {
    meta: PluginMeta,
    tag: Option<String>,
    bind: Behavior,
    init: Behavior,
    content: Behavior,
    publish: Option<serde_json::Value>,
    apis: Option<PluginApis>,
    events: EventLog,
    init_threads: ThreadLog,
    registry: Option<Arc<PluginRegistry>>,
}

impl MockPlugin {
    pub fn named(name: &str) -> Self {
        Self {
            meta: PluginMeta::new(name),
            tag: None,
            bind: Behavior::Succeed,
            init: Behavior::Succeed,
            content: Behavior::Succeed,
            publish: None,
            apis: None,
            events: EventLog::default(),
            init_threads: ThreadLog::default(),
            registry: None,
        }
    }

    fn record(&self, event: String) {
        let label = match &self.tag {
            Some(tag) => format!("{}:{}:{}", self.meta.name, tag, event),
            None => format!("{}:{}", self.meta.name, event),
        };
        self.events.lock().push(label);
    }
}

impl HoniPlug for MockPlugin {
    fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    fn bind_apis(&mut self, apis: PluginApis) {
        if self.bind == Behavior::Panic {
            panic!("bind panicked");
        }
        self.apis = Some(apis);
    }

    fn on_init(&self) -> Result<(), HookError> {
        self.init_threads.lock().push(thread::current().id());

        match &self.registry {
            Some(registry) => self.record(format!("init@{}", registry.generation())),
            None => self.record("init".to_string()),
        }

        if let (Some(apis), Some(body)) = (&self.apis, &self.publish) {
            apis.ws_publisher.publish(body.clone())?;
        }

        self.init.run("init")
    }

    fn on_websocket_ready(&self) -> Result<(), HookError> {
        self.record("ready".to_string());
        Ok(())
    }

    fn on_user_content(&self, content: &UserContent) -> Result<(), HookError> {
        self.record(format!("content:{}", content.id));
        self.content.run("content")
    }
}
