//! HTTP Router
//!
//! Sets up the axum router with the streaming endpoint and API routes.

use axum::{
    Json, Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use honiplug_runtime::{PluginStatus, UserContent};

use crate::auth::{Credential, resolve};
use crate::error::ApiError;

use super::handler::handle_websocket;
use super::state::AppState;

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Real-time streaming, channels are opened over the socket
        .route("/streaming", get(streaming_upgrade))
        // Health check for monitoring/load balancers
        .route("/health", get(health_check))
        // Host application reports content changes here
        .route("/api/user-content", post(ingest_user_content))
        .route("/api/server/reboot", post(reboot))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct StreamQuery {
    /// Access token
    i: Option<String>,
}

/// WebSocket upgrade handler
///
/// The token may come from the `i` query parameter or a bearer header.
async fn streaming_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let token = query.i.as_deref().or(bearer);

    match resolve(state.credentials(), token) {
        Ok(identity) => ws.on_upgrade(move |socket| handle_websocket(socket, state, identity)),
        Err(e) => e.into_response(),
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    clients: usize,
    generation: u64,
    plugins: Vec<PluginStatus>,
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.registry_snapshot();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        clients: state.client_count(),
        generation: registry.generation(),
        plugins: registry.statuses().to_vec(),
    })
}

/// Fan a content change out to plugins
async fn ingest_user_content(
    State(state): State<AppState>,
    credential: Credential,
    Json(content): Json<UserContent>,
) -> Result<StatusCode, ApiError> {
    credential.admin()?;

    // Hooks run synchronously inside script engines
    let dispatcher = state.dispatcher().clone();
    tokio::task::spawn_blocking(move || dispatcher.dispatch(&content))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "User content dispatch task failed");
            ApiError::INTERNAL_ERROR
        })?;

    Ok(StatusCode::NO_CONTENT)
}

/// Reboot the server
async fn reboot(
    State(state): State<AppState>,
    credential: Credential,
) -> Result<Json<&'static str>, ApiError> {
    let caller = credential.admin()?;
    state.admin().reboot(&caller).await.map(Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tower::ServiceExt;

    use honiplug_js::JsEvaluator;
    use honiplug_runtime::{
        CapabilityInjector, EventBus, HONI_PLUG_TOPIC, LoaderConfig, OutputMessage, PluginLoader,
        PluginSupervisor,
    };

    use crate::admin::AdminService;
    use crate::auth::CredentialStore;
    use crate::config::{AdminConfig, AuthConfig, TokenConfig};
    use crate::server::{Channel, ChannelSink, HoniPlugChannel};

    const ECHO_PLUGIN: &str = r#"
        const meta = { name: "echo" };
        function onInit() {}
        function onUserContent(content) {
            honi.publish({ kind: content.type, id: content.id });
        }
    "#;

    async fn app(dir: &TempDir) -> (Router, Arc<EventBus<OutputMessage>>) {
        std::fs::write(dir.path().join("echo.js"), ECHO_PLUGIN).unwrap();

        let bus = EventBus::shared();
        let loader = PluginLoader::new(
            LoaderConfig::new(dir.path()),
            Arc::new(JsEvaluator::default()),
        );
        let supervisor = Arc::new(PluginSupervisor::new(
            loader,
            CapabilityInjector::new(bus.clone()),
        ));
        supervisor.start().await.unwrap();

        let credentials = CredentialStore::from_config(&AuthConfig {
            tokens: vec![
                TokenConfig {
                    token: "admin-token".into(),
                    user_id: "root".into(),
                    roles: vec!["admin".into()],
                },
                TokenConfig {
                    token: "user-token".into(),
                    user_id: "alice".into(),
                    roles: vec![],
                },
            ],
        });

        let state = AppState::new(
            bus.clone(),
            supervisor,
            credentials,
            AdminService::new(&AdminConfig::default()),
        );
        (create_router(state), bus)
    }

    fn post(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let (app, _bus) = app(&dir).await;

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["generation"], 1);
        assert_eq!(body["plugins"][0]["name"], "echo");
        assert_eq!(body["plugins"][0]["state"], "ready");
    }

    #[tokio::test]
    async fn test_user_content_reaches_plugins() {
        let dir = TempDir::new().unwrap();
        let (app, bus) = app(&dir).await;
        let mut rx = bus.subscribe(HONI_PLUG_TOPIC);

        let response = app
            .oneshot(post(
                "/api/user-content",
                Some("admin-token"),
                r#"{"type":"Note","action":"created","id":"n1","payload":{"text":"hi"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.plugin_name, "echo");
        assert_eq!(msg.body, serde_json::json!({"kind": "Note", "id": "n1"}));
    }

    #[tokio::test]
    async fn test_user_content_arrives_as_channel_frame() {
        let dir = TempDir::new().unwrap();
        let (app, bus) = app(&dir).await;

        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let mut channel = HoniPlugChannel::new("c1".into(), ChannelSink::new("c1", tx), bus);
        channel.init();

        let response = app
            .oneshot(post(
                "/api/user-content",
                Some("admin-token"),
                r#"{"type":"Note","action":"created","id":"n1"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            serde_json::json!({
                "type": "channel",
                "id": "c1",
                "body": {
                    "type": "honiPlug",
                    "plugin": "echo",
                    "content": {"kind": "Note", "id": "n1"}
                }
            })
        );

        channel.dispose();
    }

    #[tokio::test]
    async fn test_user_content_requires_admin() {
        let dir = TempDir::new().unwrap();
        let (app, _bus) = app(&dir).await;
        let body = r#"{"type":"Drive","action":"deleted","id":"f1"}"#;

        let response = app
            .clone()
            .oneshot(post("/api/user-content", None, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["code"], "CREDENTIAL_REQUIRED");

        let response = app
            .clone()
            .oneshot(post("/api/user-content", Some("user-token"), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .oneshot(post("/api/user-content", Some("forged"), body))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["error"]["code"], "AUTHENTICATION_FAILED");
    }

    #[tokio::test]
    async fn test_reboot_unsupported() {
        let dir = TempDir::new().unwrap();
        let (app, _bus) = app(&dir).await;

        let response = app
            .oneshot(post("/api/server/reboot", Some("admin-token"), "{}"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "UNSUPPORTED_SERVER_OPERATION");
        assert_eq!(body["error"]["id"], "113e048e-badf-4c9c-98d8-cce1b9574cd4");
    }

    #[tokio::test]
    async fn test_streaming_rejects_unknown_token() {
        let dir = TempDir::new().unwrap();
        let (app, _bus) = app(&dir).await;

        let request = Request::get("/streaming?i=forged")
            .header("connection", "upgrade")
            .header("upgrade", "websocket")
            .header("sec-websocket-version", "13")
            .header("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_ne!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    }
}
