//! Script evaluation seam

use std::path::PathBuf;

use async_trait::async_trait;

use crate::plugin::HoniPlug;

/// A plugin source file read from the plugin directory
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub path: PathBuf,
    pub text: String,
}

impl ScriptSource {
    pub fn new(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            text: text.into(),
        }
    }

    /// File name without extension
    pub fn stem(&self) -> Option<&str> {
        self.path.file_stem().and_then(|s| s.to_str())
    }
}

/// Errors produced while turning source text into a plugin instance
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvalError {
    #[error("script error in {path}: {message}")]
    Script { path: PathBuf, message: String },

    #[error("{path} does not export a plugin: {reason}")]
    Contract { path: PathBuf, reason: String },

    #[error("evaluator unavailable: {0}")]
    Engine(String),
}

/// Turns source text into a plugin instance
#[async_trait]
pub trait ScriptEvaluator: Send + Sync {
    async fn evaluate(&self, source: &ScriptSource) -> Result<Box<dyn HoniPlug>, EvalError>;
}
