//! Plugin Registry
//!
//! Holds the set of plugins that finished `on_init` successfully, along with
//! the per-plugin outcome of the pass that produced it. Both live in one
//! immutable snapshot replaced wholesale on every configure pass, so a reader
//! either sees the previous generation in full or the new one in full.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::plugin::{HoniPlug, PluginMeta, PluginState};

/// Outcome of a configure pass for one plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginStatus {
    pub name: String,
    pub state: PluginState,
    /// Last state reached before the plugin failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<PluginState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginStatus {
    pub fn ready(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: PluginState::Ready,
            failed_in: None,
            error: None,
        }
    }

    pub fn failed(name: impl Into<String>, failed_in: PluginState, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            state: PluginState::Failed,
            failed_in: Some(failed_in),
            error: Some(error.to_string()),
        }
    }
}

/// A plugin that completed initialization
pub struct LivePlugin {
    meta: PluginMeta,
    plugin: Box<dyn HoniPlug>,
}

impl LivePlugin {
    pub(crate) fn new(plugin: Box<dyn HoniPlug>) -> Self {
        Self {
            meta: plugin.meta().clone(),
            plugin,
        }
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta(&self) -> &PluginMeta {
        &self.meta
    }

    pub fn plugin(&self) -> &dyn HoniPlug {
        self.plugin.as_ref()
    }
}

impl std::fmt::Debug for LivePlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivePlugin").field("meta", &self.meta).finish()
    }
}

/// One committed generation of the registry
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    plugins: Vec<Arc<LivePlugin>>,
    statuses: Vec<PluginStatus>,
}

impl RegistrySnapshot {
    /// Zero until the first configure commits
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Plugins in load order
    pub fn plugins(&self) -> &[Arc<LivePlugin>] {
        &self.plugins
    }

    /// Outcome of every plugin the committing pass saw, failures included
    pub fn statuses(&self) -> &[PluginStatus] {
        &self.statuses
    }

    pub fn names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<LivePlugin>> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

/// Process-lifetime holder of the current snapshot
#[derive(Debug, Default)]
pub struct PluginRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot; cheap to clone and safe to hold across calls
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }

    /// Commit a new generation, returning its number
    pub(crate) fn replace(&self, plugins: Vec<Arc<LivePlugin>>, statuses: Vec<PluginStatus>) -> u64 {
        let mut current = self.current.write();
        let generation = current.generation + 1;
        *current = Arc::new(RegistrySnapshot {
            generation,
            plugins,
            statuses,
        });
        generation
    }
}
