//! Streaming Protocol Messages
//!
//! Defines the frames exchanged over the `/streaming` WebSocket.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Open a channel on this connection
    Connect {
        /// Channel kind, e.g. `honiPlug`
        channel: String,
        /// Client-chosen id for this channel instance
        id: String,
        #[serde(default)]
        #[ts(optional)]
        params: Option<Value>,
    },

    /// Close a channel instance
    Disconnect { id: String },

    /// Ping for keep-alive
    Ping { id: String },
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Sent on initial connection
    Connected {
        session_id: String,
        server_version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },

    /// A channel was opened
    ChannelConnected { id: String, channel: String },

    /// An event on an open channel
    Channel { id: String, body: ChannelEvent },

    /// Error message
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        code: ErrorCode,
        message: String,
    },

    /// Pong response to ping
    Pong { id: String },
}

/// Events carried inside a [`ServerMessage::Channel`] frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type")]
pub enum ChannelEvent {
    /// Output published by a plugin
    #[serde(rename = "honiPlug")]
    HoniPlug { plugin: String, content: Value },
}

/// Error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    UnknownChannel,
    DuplicateChannelId,
    Unauthorized,
}

impl ServerMessage {
    /// Create a connected message
    pub fn connected(session_id: impl Into<String>, user_id: Option<String>) -> Self {
        Self::Connected {
            session_id: session_id.into(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            user_id,
        }
    }

    /// Create a channel event frame
    pub fn channel(id: impl Into<String>, body: ChannelEvent) -> Self {
        Self::Channel {
            id: id.into(),
            body,
        }
    }

    /// Create an error frame
    pub fn error(id: Option<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            id,
            code,
            message: message.into(),
        }
    }

    /// Create a pong message
    pub fn pong(id: impl Into<String>) -> Self {
        Self::Pong { id: id.into() }
    }
}
