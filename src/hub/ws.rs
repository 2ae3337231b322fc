//! WebSocket transport for the subscription protocol.
//!
//! One socket per client, multiplexing every topic the client cares
//! about. Inbound frames are `ClientCommand` JSON; outbound frames are
//! serialized `ProjectEvent`s drained from the connection's registry
//! queue. Malformed commands are logged and ignored so one bad frame
//! never tears down the connection.

use crate::AppState;
use crate::hub::protocol::ClientCommand;
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

/// `GET /ws` — upgrade to the subscription protocol.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    state.registry.register(connection_id, event_tx).await;

    let (mut sink, mut stream) = socket.split();

    // Outbound pump: registry queue -> socket.
    let writer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    warn!(%connection_id, "failed to serialize event: {}", err);
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Inbound loop: join/leave commands until the peer goes away.
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(ClientCommand::Join { topic }) => {
                    state.registry.join(connection_id, &topic).await;
                }
                Ok(ClientCommand::Leave { topic }) => {
                    state.registry.leave(connection_id, &topic).await;
                }
                Err(err) => {
                    debug!(%connection_id, "ignoring malformed command: {}", err);
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {} // ping/pong handled by axum, binary ignored
            Err(err) => {
                debug!(%connection_id, "socket error: {}", err);
                break;
            }
        }
    }

    // Transport gone: membership must not outlive the connection.
    state.registry.unregister(connection_id).await;
    writer.abort();
    debug!(%connection_id, "connection closed");
}
