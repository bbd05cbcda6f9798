//! Script evaluator for `.js` plugin sources

use async_trait::async_trait;

use honiplug_runtime::{EvalError, HoniPlug, ScriptEvaluator, ScriptSource};

use crate::config::JsConfig;
use crate::plugin::JsPlugin;

/// Evaluates each source into a [`JsPlugin`] with its own QuickJS runtime
#[derive(Debug, Clone, Default)]
pub struct JsEvaluator {
    config: JsConfig,
}

impl JsEvaluator {
    pub fn new(config: JsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &JsConfig {
        &self.config
    }
}

#[async_trait]
impl ScriptEvaluator for JsEvaluator {
    /// Top-level script code runs on the blocking pool
    async fn evaluate(&self, source: &ScriptSource) -> Result<Box<dyn HoniPlug>, EvalError> {
        let source = source.clone();
        let config = self.config.clone();

        let plugin = tokio::task::spawn_blocking(move || JsPlugin::from_source(&source, &config))
            .await
            .map_err(|e| EvalError::Engine(format!("evaluation task failed: {e}")))??;

        Ok(Box::new(plugin))
    }
}
