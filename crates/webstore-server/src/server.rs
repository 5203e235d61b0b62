use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use webstore_store::StoreEngine;

use crate::client::{self, ClientRegistry, Inbound};
use crate::config::ServerConfig;
use crate::dispatch;
use crate::health;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Mutex<StoreEngine>>,
    pub client_registry: Arc<ClientRegistry>,
    pub message_tx: mpsc::Sender<Inbound>,
    pub heartbeat: Duration,
    pub start_time: Instant,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Bind, spawn the frame processor and serve. Returns once the listener is
/// bound.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, std::io::Error> {
    let client_registry = Arc::new(ClientRegistry::new(config.max_send_queue));
    let mut engine = StoreEngine::new();
    engine.set_dev_mode(config.dev_mode);
    let engine = Arc::new(Mutex::new(engine));

    let (msg_tx, msg_rx) = mpsc::channel::<Inbound>(1024);
    let processor = tokio::spawn(dispatch::process_frames(
        msg_rx,
        Arc::clone(&engine),
        Arc::clone(&client_registry),
    ));

    let state = AppState {
        engine: Arc::clone(&engine),
        client_registry: Arc::clone(&client_registry),
        message_tx: msg_tx,
        heartbeat: config.heartbeat_interval,
        start_time: Instant::now(),
    };

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(host = %config.host, port = local_addr.port(), dev_mode = config.dev_mode, "webstore server started");

    let server = tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router).await {
            tracing::error!(%error, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        engine,
        clients: client_registry,
        server,
        processor,
    })
}

/// Handle returned by [`start`]. Dropping it leaves the server running;
/// [`shutdown`](Self::shutdown) stops it.
pub struct ServerHandle {
    pub port: u16,
    engine: Arc<Mutex<StoreEngine>>,
    clients: Arc<ClientRegistry>,
    server: tokio::task::JoinHandle<()>,
    processor: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    pub fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    pub fn client_count(&self) -> usize {
        self.clients.count()
    }

    pub fn watch_count(&self) -> usize {
        self.engine.lock().watch_count()
    }

    pub fn engine(&self) -> &Arc<Mutex<StoreEngine>> {
        &self.engine
    }

    pub fn shutdown(self) {
        self.server.abort();
        self.processor.abort();
    }

    /// Wait until the server task ends.
    pub async fn wait(self) {
        let _ = self.server.await;
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (client_id, rx) = state.client_registry.register();
    tracing::info!(client_id = %client_id, "client connected");

    client::handle_ws_connection(
        socket,
        client_id,
        rx,
        state.client_registry,
        state.message_tx,
        state.heartbeat,
    )
    .await;
}

async fn health_handler(State(state): State<AppState>) -> Json<health::HealthResponse> {
    let watches = state.engine.lock().watch_count();
    Json(health::health_check(
        state.start_time,
        state.client_registry.count(),
        watches,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn state() -> AppState {
        let (message_tx, _rx) = mpsc::channel(8);
        AppState {
            engine: Arc::new(Mutex::new(StoreEngine::new())),
            client_registry: Arc::new(ClientRegistry::new(8)),
            message_tx,
            heartbeat: Duration::from_secs(30),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let app = build_router(state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["watches"], 0);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build_router(state());
        let req = Request::builder().uri("/nonexistent").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let app = build_router(state());
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn start_binds_an_ephemeral_port() {
        let handle = start(ServerConfig::default()).await.unwrap();
        assert!(handle.port > 0);
        assert_eq!(handle.client_count(), 0);
        assert!(handle.ws_url().ends_with("/ws"));
        handle.shutdown();
    }
}
