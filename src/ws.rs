use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::relay::RelayHandle;

pub fn router(relay: RelayHandle) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(relay)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn health() -> &'static str {
    "ok"
}

#[axum::debug_handler]
async fn ws_handler(ws: WebSocketUpgrade, State(relay): State<RelayHandle>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, relay))
}

/// Pump one socket: frames from the relay go out through a writer task,
/// frames from the client are forwarded to the relay. Whichever side ends
/// first takes the other down, then the relay is told the connection closed.
async fn handle_socket(socket: WebSocket, relay: RelayHandle) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (outbox, mut frames) = mpsc::unbounded_channel::<String>();

    if let Err(e) = relay.connect(connection_id.clone(), outbox).await {
        warn!("Dropping connection {}: {}", connection_id, e);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let reader_relay = relay.clone();
    let reader_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let frame = match msg {
                Message::Text(text) => text,
                Message::Binary(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        debug!("Ignoring non UTF-8 binary frame from {}", reader_id);
                        continue;
                    }
                },
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) => continue,
            };

            if reader_relay.message(reader_id.clone(), frame).await.is_err() {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    if let Err(e) = relay.disconnect(connection_id.clone()).await {
        debug!("Could not report close of {}: {}", connection_id, e);
    }
}
