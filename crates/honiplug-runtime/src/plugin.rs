//! Plugin Contract
//!
//! Defines the interface every loaded plugin exposes to the host, whatever
//! language it was written in.
//!
//! # Lifecycle
//!
//! - `bind_apis`: capability setter, called once before initialization
//! - `on_init`: called once at startup; an error excludes the plugin
//! - `on_websocket_ready`: called once the streaming endpoint is listening
//! - `on_user_content`: called for every user content change

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::bus::BusError;
use crate::capability::PluginApis;

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Identity of a loaded plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginMeta {
    /// Plugin name, used as the attribution key for all of its output
    pub name: String,
}

impl PluginMeta {
    /// Create plugin metadata
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook Error
// ─────────────────────────────────────────────────────────────────────────────

/// An error raised from inside a plugin hook
#[derive(Debug, Clone, thiserror::Error)]
pub enum HookError {
    #[error("{0}")]
    Raised(String),

    #[error("hook panicked: {0}")]
    Panicked(String),

    #[error("publish failed: {0}")]
    Publish(#[from] BusError),
}

impl HookError {
    /// Create an error raised by plugin code
    pub fn raised(message: impl Into<String>) -> Self {
        Self::Raised(message.into())
    }
}

/// Run a hook, turning a panic into a [`HookError::Panicked`]
pub(crate) fn guard_hook<F>(hook: F) -> Result<(), HookError>
where
    F: FnOnce() -> Result<(), HookError>,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(HookError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// User Content
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of user-posted content that changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserContentType {
    /// A note was created, edited or deleted
    Note,
    /// A drive file was created, edited or deleted
    Drive,
}

/// What happened to the content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentAction {
    Created,
    Updated,
    Deleted,
}

/// A content lifecycle change in the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContent {
    #[serde(rename = "type")]
    pub kind: UserContentType,

    pub action: ContentAction,

    /// Host identifier of the content
    pub id: String,

    /// Content body as the host serialized it
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl UserContent {
    /// Create a note event
    pub fn note(action: ContentAction, id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: UserContentType::Note,
            action,
            id: id.into(),
            payload,
        }
    }

    /// Create a drive file event
    pub fn drive(action: ContentAction, id: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: UserContentType::Drive,
            action,
            id: id.into(),
            payload,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a plugin within one configure pass
///
/// ```text
/// Discovered -> Evaluated -> CapabilityBound -> Initializing -> Ready
/// ```
///
/// Any non-terminal state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginState {
    Discovered,
    Evaluated,
    CapabilityBound,
    Initializing,
    Ready,
    Failed,
}

impl PluginState {
    /// Check if the plugin can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(self, PluginState::Ready | PluginState::Failed)
    }

    /// Check whether `next` may directly follow this state
    pub fn can_advance_to(&self, next: PluginState) -> bool {
        use PluginState::*;

        match (*self, next) {
            (from, Failed) => !from.is_terminal(),
            (Discovered, Evaluated)
            | (Evaluated, CapabilityBound)
            | (CapabilityBound, Initializing)
            | (Initializing, Ready) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginState::Discovered => write!(f, "discovered"),
            PluginState::Evaluated => write!(f, "evaluated"),
            PluginState::CapabilityBound => write!(f, "capability-bound"),
            PluginState::Initializing => write!(f, "initializing"),
            PluginState::Ready => write!(f, "ready"),
            PluginState::Failed => write!(f, "failed"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HoniPlug Trait
// ─────────────────────────────────────────────────────────────────────────────

/// The contract a plugin instance must satisfy
///
/// Capabilities are injected through [`HoniPlug::bind_apis`] before
/// [`HoniPlug::on_init`] runs, so new capabilities can be added to
/// [`PluginApis`] without changing hook signatures.
pub trait HoniPlug: Send + Sync + 'static {
    /// Returns the plugin identity
    fn meta(&self) -> &PluginMeta;

    /// Receive the capability bundle scoped to this plugin
    fn bind_apis(&mut self, apis: PluginApis);

    /// Called once while the host configures plugins
    ///
    /// If this returns an error the plugin is excluded for the rest of the
    /// process lifetime.
    fn on_init(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Called once the real-time endpoint accepts connections
    fn on_websocket_ready(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Called when user content is created, updated or deleted
    fn on_user_content(&self, _content: &UserContent) -> Result<(), HookError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
