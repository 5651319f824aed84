use std::time::Instant;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::connection::ConnectionId;
use crate::metrics::ConnectionMetrics;
use crate::server::AppState;

use super::message::{ClientMessage, OutboundMessage};

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection.
///
/// The writer task is running and the welcome frame is queued before the
/// socket becomes reachable through the hub, so a broadcast racing the
/// connect can never stall the handler on a full queue. The socket joins the
/// hub before the registry upsert and leaves it before the registry removal.
#[tracing::instrument(
    name = "ws.connection",
    skip(socket, state),
    fields(otel.kind = "server")
)]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ConnectionId::generate();
    let connection_start = Instant::now();

    let buffer = state.settings.delivery.channel_buffer_size.max(1);
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(buffer);
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for writing queued messages to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let frame = match msg.to_ws_message() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Nothing else holds a sender yet, so the queue has room
    if let Err(e) = tx.try_send(OutboundMessage::Welcome {
        connection_id: connection_id.clone(),
    }) {
        tracing::warn!(connection_id = %connection_id, error = %e, "Failed to queue welcome");
    }

    state.hub.attach(connection_id.clone(), tx.clone());
    ConnectionMetrics::record_opened();

    // Registry failures are handled inside the engine; the socket stays open
    let outcome = state.engine.on_connect(&connection_id).await;
    tracing::info!(
        connection_id = %connection_id,
        registry = outcome.as_str(),
        "WebSocket connection established"
    );

    // Task for reading client frames
    let reply_tx = tx.clone();
    let recv_id = connection_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &reply_tx, &recv_id).await {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(connection_id = %recv_id, error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            send_task.abort();
        }
    }

    state.hub.detach(&connection_id);
    let outcome = state.engine.on_disconnect(&connection_id).await;

    let duration = connection_start.elapsed();
    ConnectionMetrics::record_closed(duration);

    tracing::info!(
        connection_id = %connection_id,
        registry = outcome.as_str(),
        duration_secs = duration.as_secs_f64(),
        "WebSocket connection closed"
    );
}

/// Process a received WebSocket frame.
/// Returns false if the connection should be closed
async fn process_message(
    msg: Message,
    reply_tx: &mpsc::Sender<OutboundMessage>,
    connection_id: &ConnectionId,
) -> bool {
    match msg {
        Message::Text(text) => {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Ping) => {
                    let _ = reply_tx.send(OutboundMessage::Pong).await;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Unrecognized client message");
                    let _ = reply_tx
                        .send(OutboundMessage::error("INVALID_MESSAGE", e.to_string()))
                        .await;
                }
            }
            true
        }
        Message::Binary(_) => {
            let _ = reply_tx
                .send(OutboundMessage::error(
                    "UNSUPPORTED_FORMAT",
                    "Binary messages are not supported",
                ))
                .await;
            true
        }
        // Axum answers pings itself
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            tracing::debug!(connection_id = %connection_id, "Received close frame");
            false
        }
    }
}
