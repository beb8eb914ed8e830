//! HTTP routes and the WebSocket handshake.
//!
//! After the upgrade the socket is handed to the hub; this module only
//! authenticates the request and waits for the connection to close.

use crate::auth::{Authenticator, HeaderAuthenticator};
use crate::config::Config;
use crate::metrics::{self, SocketMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use switchboard_core::Hub;
use switchboard_transport::websocket;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Shared server state.
pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Config,
    pub authenticator: Arc<dyn Authenticator>,
}

/// Build the router for `state`.
pub fn router(state: Arc<AppState>) -> Router {
    let ws_path = state.config.route("/ws");
    let health_path = state.config.route("/health-check");

    Router::new()
        .route(&ws_path, get(ws_handler))
        .route(&health_path, get(health_handler))
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config, hub: Arc<Hub>) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let authenticator = Arc::new(HeaderAuthenticator::new(&config.auth.user_header)?);
    let addr = config.bind_addr()?;
    let ws_path = config.route("/ws");

    let state = Arc::new(AppState {
        hub: Arc::clone(&hub),
        config,
        authenticator,
    });
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;

    info!("Switchboard listening on {}", addr);
    info!("WebSocket endpoint: ws://{}{}", addr, ws_path);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await?;

    Ok(())
}

async fn shutdown_signal(hub: Arc<Hub>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
    }
    info!("Shutdown signal received");
    hub.shutdown();
}

async fn health_handler() -> &'static str {
    "ok"
}

/// Authenticate, then upgrade.
async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let user_id = match state.authenticator.authenticate(&headers) {
        Ok(user_id) => user_id,
        Err(e) => {
            debug!(error = %e, "Rejecting unauthenticated upgrade");
            metrics::record_auth_failure();
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: String, state: Arc<AppState>) {
    let _metrics_guard = SocketMetricsGuard::new();

    let (reader, writer) = websocket::split(socket, state.config.limits.max_message_size);
    let connection = state.hub.connect(user_id, reader, writer);
    debug!(connection = %connection.id(), user = %connection.user_id(), "WebSocket connected");

    connection.closed().await;
    debug!(connection = %connection.id(), "WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{HubConfig, MemoryBackplane, StaticResolver};

    fn state(base_url: &str) -> Arc<AppState> {
        let config = Config {
            base_url: base_url.to_string(),
            ..Config::default()
        };
        let hub = Hub::spawn(
            HubConfig::default(),
            Arc::new(StaticResolver::default()),
            Arc::new(MemoryBackplane::new()),
        );
        let authenticator = Arc::new(HeaderAuthenticator::new(&config.auth.user_header).unwrap());

        Arc::new(AppState {
            hub,
            config,
            authenticator,
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_handler().await, "ok");
    }

    #[tokio::test]
    async fn test_router_builds_for_any_base_url() {
        for base_url in ["/api", "/api/", "chat", ""] {
            let _app = router(state(base_url));
        }
    }
}
