//! Plugin Supervisor
//!
//! Drives one configure pass: load, bind capabilities, initialize each
//! plugin in isolation and commit the survivors to the registry.
//!
//! Plugin hooks are synchronous calls into script engines, so the bind and
//! init stage runs on the blocking pool rather than on an async worker.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::capability::CapabilityInjector;
use crate::error::PluginError;
use crate::loader::{LoadReport, PluginLoader};
use crate::plugin::{HookError, PluginState, guard_hook};
use crate::registry::{LivePlugin, PluginRegistry, PluginStatus};

/// Error type for supervisor startup
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("[HoniPlug] Failed to configure plugins")]
    ConfigureFailed,
}

/// Owns the registry and is its only writer
pub struct PluginSupervisor {
    loader: PluginLoader,
    injector: CapabilityInjector,
    registry: Arc<PluginRegistry>,
    /// Serializes configure passes
    configuring: Mutex<()>,
}

impl PluginSupervisor {
    pub fn new(loader: PluginLoader, injector: CapabilityInjector) -> Self {
        Self::with_registry(loader, injector, Arc::new(PluginRegistry::new()))
    }

    pub fn with_registry(
        loader: PluginLoader,
        injector: CapabilityInjector,
        registry: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            loader,
            injector,
            registry,
            configuring: Mutex::new(()),
        }
    }

    /// Shared read-only handle to the registry
    pub fn registry(&self) -> Arc<PluginRegistry> {
        self.registry.clone()
    }

    /// Per-plugin outcome of the last committed configure pass
    pub fn statuses(&self) -> Vec<PluginStatus> {
        self.registry.snapshot().statuses().to_vec()
    }

    /// Configure plugins, failing if the batch could not be loaded
    pub async fn start(&self) -> Result<(), SupervisorError> {
        if self.configure().await {
            Ok(())
        } else {
            error!("[HoniPlug] Failed to configure plugins");
            Err(SupervisorError::ConfigureFailed)
        }
    }

    /// Run one configure pass
    ///
    /// Returns `false` only when loading fails, in which case the registry
    /// and its statuses are left as they were. Individual plugin failures
    /// are logged and recorded but still count as a successful configure.
    pub async fn configure(&self) -> bool {
        let _guard = self.configuring.lock().await;

        let report = match self.loader.load_report().await {
            Ok(report) => report,
            Err(e) => {
                let err = PluginError::from(e);
                error!(error = %err, "Failed to load plugins");
                return false;
            }
        };

        let injector = self.injector.clone();
        let (ready, statuses) =
            match tokio::task::spawn_blocking(move || initialize(report, &injector)).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(error = %e, "Plugin initialization task failed");
                    return false;
                }
            };

        let count = ready.len();
        let generation = self.registry.replace(ready, statuses);

        info!(generation, plugins = count, "Plugin registry committed");
        true
    }
}

/// Bind and initialize evaluated plugins in load order
///
/// Skipped sources are recorded after the evaluated plugins.
fn initialize(
    report: LoadReport,
    injector: &CapabilityInjector,
) -> (Vec<Arc<LivePlugin>>, Vec<PluginStatus>) {
    let LoadReport { plugins, skipped } = report;

    let mut seen = HashSet::new();
    let mut statuses = Vec::with_capacity(plugins.len() + skipped.len());
    let mut ready = Vec::with_capacity(plugins.len());

    for mut plugin in plugins {
        let name = plugin.meta().name.clone();
        let mut lifecycle = Lifecycle::evaluated(&name);

        if !seen.insert(name.clone()) {
            let err = PluginError::DuplicateName(name.clone());
            warn!(plugin = %name, "Duplicate plugin name, keeping the first one loaded");
            statuses.push(lifecycle.failed(&err));
            continue;
        }

        let apis = injector.apis_for(plugin.meta());
        let bound = guard_hook(|| {
            plugin.bind_apis(apis);
            Ok(())
        });
        if let Err(e) = bound {
            statuses.push(init_failed(lifecycle, e));
            continue;
        }
        lifecycle.advance(PluginState::CapabilityBound);

        lifecycle.advance(PluginState::Initializing);
        match guard_hook(|| plugin.on_init()) {
            Ok(()) => {
                statuses.push(lifecycle.ready());
                ready.push(Arc::new(LivePlugin::new(plugin)));
            }
            Err(e) => statuses.push(init_failed(lifecycle, e)),
        }
    }

    for script in skipped {
        statuses.push(PluginStatus::failed(
            script.label(),
            PluginState::Discovered,
            &script.error,
        ));
    }

    (ready, statuses)
}

fn init_failed(lifecycle: Lifecycle, e: HookError) -> PluginStatus {
    let err = PluginError::from_hook(&lifecycle.name, "onInit", e);
    error!(plugin = %lifecycle.name, error = %err, "[HoniPlug] Failed to initialize: {}", lifecycle.name);
    lifecycle.failed(&err)
}

/// One plugin's progress through a configure pass
struct Lifecycle {
    name: String,
    state: PluginState,
}

impl Lifecycle {
    fn evaluated(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: PluginState::Evaluated,
        }
    }

    fn advance(&mut self, next: PluginState) {
        if !self.state.can_advance_to(next) {
            warn!(plugin = %self.name, from = %self.state, to = %next, "Ignoring invalid state transition");
            return;
        }
        debug!(plugin = %self.name, from = %self.state, to = %next, "Plugin state changed");
        self.state = next;
    }

    fn ready(mut self) -> PluginStatus {
        self.advance(PluginState::Ready);
        PluginStatus::ready(self.name)
    }

    /// Record the failure against the last state reached
    fn failed(self, err: &PluginError) -> PluginStatus {
        debug!(plugin = %self.name, from = %self.state, to = %PluginState::Failed, "Plugin state changed");
        PluginStatus::failed(self.name, self.state, err)
    }
}
