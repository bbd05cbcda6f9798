//! Streaming Connection
//!
//! Per-socket bookkeeping of open channels and the access rules applied when
//! a client asks to open one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::auth::Identity;

use super::channel::{Channel, ChannelCatalog, ChannelSink};
use super::protocol::{ErrorCode, ServerMessage};

/// Why a connect request was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("channel {0} requires a credential")]
    CredentialRequired(String),

    #[error("channel id already in use: {0}")]
    DuplicateId(String),
}

impl ConnectError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectError::UnknownChannel(_) => ErrorCode::UnknownChannel,
            ConnectError::CredentialRequired(_) => ErrorCode::Unauthorized,
            ConnectError::DuplicateId(_) => ErrorCode::DuplicateChannelId,
        }
    }
}

/// What a successful connect request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connected {
    Opened,
    /// A shared channel of that kind was already open; nothing changed
    AlreadyShared,
}

pub struct StreamConnection {
    identity: Option<Identity>,
    catalog: Arc<ChannelCatalog>,
    tx: mpsc::Sender<ServerMessage>,
    /// Channel id -> instance
    channels: HashMap<String, Box<dyn Channel>>,
}

impl StreamConnection {
    pub fn new(
        identity: Option<Identity>,
        catalog: Arc<ChannelCatalog>,
        tx: mpsc::Sender<ServerMessage>,
    ) -> Self {
        Self {
            identity,
            catalog,
            tx,
            channels: HashMap::new(),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Open a channel instance
    pub fn connect(&mut self, channel: &str, id: &str) -> Result<Connected, ConnectError> {
        let service = self
            .catalog
            .get(channel)
            .ok_or_else(|| ConnectError::UnknownChannel(channel.to_string()))?;

        if service.require_credential() && self.identity.is_none() {
            return Err(ConnectError::CredentialRequired(channel.to_string()));
        }

        if service.should_share() && self.channels.values().any(|c| c.name() == service.name()) {
            debug!(channel, "Shared channel already open");
            return Ok(Connected::AlreadyShared);
        }

        if self.channels.contains_key(id) {
            return Err(ConnectError::DuplicateId(id.to_string()));
        }

        let mut instance = service.create(id.to_string(), ChannelSink::new(id, self.tx.clone()));
        instance.init();
        self.channels.insert(id.to_string(), instance);

        debug!(channel, id, "Channel opened");
        Ok(Connected::Opened)
    }

    /// Close a channel instance; unknown ids are ignored
    pub fn disconnect(&mut self, id: &str) -> bool {
        match self.channels.remove(id) {
            Some(mut channel) => {
                channel.dispose();
                debug!(channel = channel.name(), id, "Channel closed");
                true
            }
            None => false,
        }
    }

    /// Close every channel, used when the socket goes away
    pub fn dispose_all(&mut self) {
        for (_, mut channel) in self.channels.drain() {
            channel.dispose();
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
