//! Axum WebSocket upgrade handler and HTTP routes (`/ws`, `/healthz`,
//! `/metrics`) — grounded on the pack's `axum` usage (`Toasterson-akh-medu`,
//! `web3infra-foundation-git-internal`).

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info};

use super::protocol::Envelope;
use super::state::GatewayState;

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>) {
    let client_id = uuid::Uuid::new_v4().to_string();
    let mut outbound = state.register_client(client_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    let connected = serde_json::to_string(&Envelope::event(
        "connected",
        serde_json::json!({"clientId": client_id}),
    ))
    .unwrap_or_default();
    if sink.send(WsMessage::Text(connected.into())).await.is_err() {
        state.deregister_client(&client_id).await;
        return;
    }

    let writer_client_id = client_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(envelope) = outbound.recv().await {
            let Ok(text) = serde_json::to_string(&envelope) else {
                continue;
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        debug!(client = %writer_client_id, "writer task stopped");
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            WsMessage::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => state.handle_envelope(&client_id, envelope).await,
                Err(e) => debug!(client = %client_id, error = %e, "dropping malformed envelope"),
            },
            WsMessage::Pong(_) => state.touch_pong(&client_id).await,
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    writer.abort();
    state.deregister_client(&client_id).await;
    info!(client = %client_id, "client disconnected");
}

async fn healthz(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    axum::Json(state.healthz().await)
}

async fn metrics(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    state.metrics().await
}
