// ============================
// signal-backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use crate::error::AppError;
use crate::metrics::{WS_ACTIVE, WS_CONNECTION, WS_DISCONNECTION};
use crate::websocket::ConnectionHandler;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use metrics::{counter, gauge};
use signal_common::ServerMessage;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;

/// Create the signaling router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `listener` until `shutdown` resolves
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Liveness probe; fails while the room store is unreachable
async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    state.store.ping().await?;
    Ok(Json(serde_json::json!({ "message": "ok" })))
}

/// Handler for WebSocket connections
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    counter!(WS_CONNECTION).increment(1);
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    gauge!(WS_ACTIVE).increment(1.0);

    let (mut tx, mut rx) = socket.split();
    let (server_tx, mut server_rx) = mpsc::channel::<ServerMessage>(state.settings.outbound_buffer);
    let mut handler = ConnectionHandler::new(state, server_tx);
    let connection_id = handler.connection_id().to_string();
    tracing::info!(connection_id = %connection_id, "Client connected");

    // Forward ServerMessages to the socket in queue order
    let writer_id = connection_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(server_msg) = server_rx.recv().await {
            let json = match serde_json::to_string(&server_msg) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!(connection_id = %writer_id, error = %e, "Failed to serialize ServerMessage");
                    continue;
                },
            };
            if tx.send(Message::Text(json.into())).await.is_err() {
                tracing::debug!(connection_id = %writer_id, "WebSocket write failed, closing");
                break;
            }
        }
    });

    while let Some(result) = rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if handler.handle_text(text.as_str()).await.is_err() {
                    break;
                }
            },
            Ok(Message::Binary(bytes)) => {
                if handler.handle_binary(&bytes).await.is_err() {
                    break;
                }
            },
            Ok(Message::Close(_)) => {
                tracing::debug!(connection_id = %connection_id, "Client sent close frame");
                break;
            },
            // axum answers pings
            Ok(_) => {},
            Err(e) => {
                tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket read error");
                break;
            },
        }
    }

    // Cleanup: runs whether or not the client sent `destroy`
    handler.shutdown().await;
    drop(handler);
    send_task.abort();

    counter!(WS_DISCONNECTION).increment(1);
    gauge!(WS_ACTIVE).decrement(1.0);
    tracing::info!(connection_id = %connection_id, "Client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_healthz_reports_ok() {
        let app = create_router(AppState::in_memory(Settings::default()));
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let app = create_router(AppState::in_memory(Settings::default()));
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
