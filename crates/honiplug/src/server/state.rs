//! Server Application State
//!
//! Shared state accessible by all HTTP and WebSocket handlers.

use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use honiplug_runtime::{EventBus, EventDispatcher, OutputMessage, PluginSupervisor, RegistrySnapshot};

use crate::admin::AdminService;
use crate::auth::{CredentialStore, Identity};

use super::channel::{ChannelCatalog, HoniPlugChannelService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    bus: Arc<EventBus<OutputMessage>>,
    supervisor: Arc<PluginSupervisor>,
    dispatcher: EventDispatcher,
    channels: Arc<ChannelCatalog>,
    credentials: CredentialStore,
    admin: AdminService,

    /// Connected streaming clients
    clients: DashMap<Uuid, ClientInfo>,
}

/// Per-client state
#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub session_id: Uuid,
    pub user_id: Option<String>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        bus: Arc<EventBus<OutputMessage>>,
        supervisor: Arc<PluginSupervisor>,
        credentials: CredentialStore,
        admin: AdminService,
    ) -> Self {
        let channels = ChannelCatalog::new().with_service(Arc::new(HoniPlugChannelService::new(bus.clone())));
        let dispatcher = EventDispatcher::new(supervisor.registry());

        Self {
            inner: Arc::new(AppStateInner {
                bus,
                supervisor,
                dispatcher,
                channels: Arc::new(channels),
                credentials,
                admin,
                clients: DashMap::new(),
            }),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus<OutputMessage>> {
        &self.inner.bus
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn channels(&self) -> &Arc<ChannelCatalog> {
        &self.inner.channels
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn admin(&self) -> &AdminService {
        &self.inner.admin
    }

    /// Current registry generation with the statuses of the pass behind it
    pub fn registry_snapshot(&self) -> Arc<RegistrySnapshot> {
        self.inner.supervisor.registry().snapshot()
    }

    /// Register a new client connection
    pub fn register_client(&self, identity: Option<&Identity>) -> Uuid {
        let session_id = Uuid::new_v4();
        let user_id = identity.map(|i| i.user_id.clone());

        tracing::info!(session = %session_id, user = ?user_id, "Client connected");
        self.inner
            .clients
            .insert(session_id, ClientInfo { session_id, user_id });

        session_id
    }

    /// Remove a client connection
    pub fn remove_client(&self, session_id: Uuid) {
        self.inner.clients.remove(&session_id);
        tracing::info!(session = %session_id, "Client disconnected");
    }

    /// Get the number of connected clients
    pub fn client_count(&self) -> usize {
        self.inner.clients.len()
    }
}
