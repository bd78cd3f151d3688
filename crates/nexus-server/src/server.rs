use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, Instrument};

use nexus_core::CompletionService;
use nexus_engine::persona::PersonaPromptAssembler;
use nexus_engine::session::SessionState;
use nexus_store::ConversationStore;

use crate::client::{self, ConnectionRegistry};
use crate::orchestrator::{ConversationOrchestrator, PipelineConfig};

const MISSING_INDEX_BODY: &str = "<h2>System Error: HMI Source Missing</h2>";

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    /// 0 picks a free port.
    pub port: u16,
    pub index_path: PathBuf,
    pub max_send_queue: usize,
    pub heartbeat_interval: Duration,
    pub client_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            index_path: PathBuf::from("index.html"),
            max_send_queue: 256,
            heartbeat_interval: Duration::from_secs(30),
            client_timeout: Duration::from_secs(90),
        }
    }
}

/// The collaborators the bridge runs on.
pub struct BridgeServices {
    pub session: Arc<SessionState>,
    pub store: Arc<dyn ConversationStore>,
    pub completion: Arc<dyn CompletionService>,
    pub persona: PersonaPromptAssembler,
    pub pipeline: PipelineConfig,
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub orchestrator: Arc<ConversationOrchestrator>,
    pub index_path: Arc<PathBuf>,
    pub heartbeat_interval: Duration,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws/{client_id}", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, spawn the server and the cleanup task, and return at once.
pub async fn start(
    config: ServerConfig,
    services: BridgeServices,
) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ConnectionRegistry::new(
        config.max_send_queue,
        config.client_timeout,
    ));

    let orchestrator = Arc::new(ConversationOrchestrator::new(
        services.session,
        services.store,
        services.completion,
        services.persona,
        Arc::clone(&registry),
        services.pipeline,
    ));

    let cleanup = client::start_cleanup_task(Arc::clone(&registry), config.heartbeat_interval);

    let state = AppState {
        registry: Arc::clone(&registry),
        orchestrator: Arc::clone(&orchestrator),
        index_path: Arc::new(config.index_path.clone()),
        heartbeat_interval: config.heartbeat_interval,
    };

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "nexus bridge listening");

    let shutdown = CancellationToken::new();
    let server = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = axum::serve(listener, build_router(state))
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
            {
                error!(error = %e, "server exited with error");
            }
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        registry,
        orchestrator,
        shutdown,
        server,
        cleanup,
    })
}

/// Handle returned by `start()`. Keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    registry: Arc<ConnectionRegistry>,
    orchestrator: Arc<ConversationOrchestrator>,
    shutdown: CancellationToken,
    server: tokio::task::JoinHandle<()>,
    cleanup: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn connections(&self) -> usize {
        self.registry.count()
    }

    pub fn session(&self) -> &SessionState {
        self.orchestrator.session()
    }

    /// Stop accepting connections and wait up to `grace` for the server to drain.
    pub async fn shutdown(self, grace: Duration) {
        self.shutdown.cancel();
        self.cleanup.abort();
        if tokio::time::timeout(grace, self.server).await.is_err() {
            info!("shutdown grace period elapsed with connections still open");
        }
    }
}

async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    match tokio::fs::read_to_string(state.index_path.as_path()).await {
        Ok(body) => (StatusCode::OK, Html(body)),
        Err(e) => {
            error!(path = %state.index_path.display(), error = %e, "front-end document not found");
            (StatusCode::NOT_FOUND, Html(MISSING_INDEX_BODY.to_string()))
        }
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(client_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, client_id, state))
}

async fn handle_socket(socket: WebSocket, client_id: String, state: AppState) {
    let (connection_id, rx) = state.registry.register(&client_id);
    let span = tracing::info_span!(
        "connection",
        client_id = %client_id,
        connection_id = %connection_id
    );

    async move {
        info!("client connected");
        client::handle_ws_connection(
            socket,
            connection_id,
            rx,
            state.registry,
            state.orchestrator,
            state.heartbeat_interval,
        )
        .await;
    }
    .instrument(span)
    .await;
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.orchestrator.session().snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.count(),
        "activeModule": snapshot.active_module,
        "modelId": snapshot.model_id,
    }))
}
