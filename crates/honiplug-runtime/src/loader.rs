//! Plugin Loader
//!
//! Discovers plugin sources in a directory and evaluates them into plugin
//! instances. Files are visited in file name order so the resulting list, and
//! therefore the registry order, is the same on every start.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::evaluator::{EvalError, ScriptEvaluator, ScriptSource};
use crate::plugin::{HoniPlug, PluginState};

/// Error type for plugin loading
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read plugin directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to read plugin source {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to evaluate plugin: {0}")]
    Evaluate(#[from] EvalError),
}

/// What to do when a single source fails to evaluate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadPolicy {
    /// Any evaluation failure fails the whole batch
    #[default]
    FailBatch,
    /// Log the failing file and load the rest
    SkipFile,
}

/// Loader settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    pub dir: PathBuf,
    /// File extension without the leading dot
    pub extension: String,
    pub policy: LoadPolicy,
}

impl LoaderConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: "js".to_string(),
            policy: LoadPolicy::default(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    pub fn with_policy(mut self, policy: LoadPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// A source that was discovered but skipped under [`LoadPolicy::SkipFile`]
#[derive(Debug, Clone)]
pub struct SkippedScript {
    pub path: PathBuf,
    pub error: EvalError,
}

impl SkippedScript {
    /// File name without extension, the best name available for the record
    pub fn label(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Result of a load pass
#[derive(Default)]
pub struct LoadReport {
    /// Evaluated plugins in file name order
    pub plugins: Vec<Box<dyn HoniPlug>>,
    pub skipped: Vec<SkippedScript>,
}

/// Reads plugin sources and hands them to a [`ScriptEvaluator`]
pub struct PluginLoader {
    config: LoaderConfig,
    evaluator: Arc<dyn ScriptEvaluator>,
}

impl PluginLoader {
    pub fn new(config: LoaderConfig, evaluator: Arc<dyn ScriptEvaluator>) -> Self {
        Self { config, evaluator }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Load every plugin in the configured directory
    pub async fn load(&self) -> Result<Vec<Box<dyn HoniPlug>>, LoadError> {
        self.load_report().await.map(|report| report.plugins)
    }

    /// Load every plugin, also reporting sources skipped by the policy
    pub async fn load_report(&self) -> Result<LoadReport, LoadError> {
        let dir = &self.config.dir;
        info!("Loading plugins from: {}", dir.display());

        let candidates = self.discover(dir).await.inspect_err(|e| {
            error!(error = %e, "Plugin discovery failed");
        })?;

        let mut report = LoadReport::default();

        for path in candidates {
            debug!(path = %path.display(), state = %PluginState::Discovered, "Discovered plugin source");

            let text = fs::read_to_string(&path)
                .await
                .map_err(|source| LoadError::ReadFile {
                    path: path.clone(),
                    source,
                })
                .inspect_err(|e| error!(error = %e, "Plugin source unreadable"))?;

            let source = ScriptSource::new(path, text);

            match self.evaluator.evaluate(&source).await {
                Ok(plugin) => {
                    debug!(
                        plugin = %plugin.meta().name,
                        path = %source.path.display(),
                        state = %PluginState::Evaluated,
                        "Evaluated plugin"
                    );
                    report.plugins.push(plugin);
                }
                Err(e) => match self.config.policy {
                    LoadPolicy::FailBatch => {
                        error!(error = %e, "Plugin evaluation failed");
                        return Err(e.into());
                    }
                    LoadPolicy::SkipFile => {
                        warn!(error = %e, "Skipping plugin that failed to evaluate");
                        report.skipped.push(SkippedScript {
                            path: source.path,
                            error: e,
                        });
                    }
                },
            }
        }

        info!(
            "Loaded {} plugins ({} skipped)",
            report.plugins.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// List regular files with the plugin extension, sorted by file name
    async fn discover(&self, dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
        let read_dir_err = |source: std::io::Error| LoadError::ReadDir {
            path: dir.to_path_buf(),
            source,
        };

        let mut entries = fs::read_dir(dir).await.map_err(read_dir_err)?;
        let mut candidates = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(read_dir_err)? {
            let path = entry.path();

            // Follows symlinks, so a link to a script counts as a script
            let is_file = match fs::metadata(&path).await {
                Ok(meta) => meta.is_file(),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Ignoring unreadable entry");
                    false
                }
            };

            let has_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == self.config.extension);

            if is_file && has_extension {
                candidates.push(path);
            }
        }

        candidates.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(candidates)
    }
}
