//! QuickJS resource limits

use serde::{Deserialize, Serialize};

/// Per-plugin engine limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsConfig {
    /// Heap limit in bytes for each plugin runtime, 0 for unlimited
    pub memory_limit: usize,

    /// Native stack limit in bytes for each plugin runtime, 0 for unlimited
    pub max_stack_size: usize,

    /// Upper bound on promise jobs run after a single hook call
    pub max_pending_jobs: usize,
}

impl Default for JsConfig {
    fn default() -> Self {
        Self {
            memory_limit: 32 * 1024 * 1024,
            max_stack_size: 512 * 1024,
            max_pending_jobs: 10_000,
        }
    }
}

impl JsConfig {
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_max_stack_size(mut self, bytes: usize) -> Self {
        self.max_stack_size = bytes;
        self
    }
}
