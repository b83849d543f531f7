use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

use super::AppState;

/// GET /ws — upgrade and stream broadcast hub events to the client.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One observer connection: every event published after the upgrade is
/// forwarded as a JSON text frame. A slow client lags on its own receiver
/// and loses its own oldest events; the publisher never notices.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let mut events = state.manager.subscribe();
    let (mut sender, mut receiver) = socket.split();

    debug!("WebSocket observer connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!(error = %e, "Failed to serialize event frame");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket observer lagged behind the event stream");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                // Pings are answered by axum; client payloads are ignored —
                // this channel only carries server-to-client events.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "WebSocket receive error");
                    break;
                }
            },
        }
    }

    debug!("WebSocket observer disconnected");
}
