// ============================
// crates/backend-lib/src/ws_router.rs
// ============================
//! WebSocket router and connection handling.
use crate::metrics::{WS_ACTIVE, WS_CONNECTION};
use crate::relay_actor::{outbox, OutboxReceivers};
use crate::websocket::WebSocketHandler;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use boardsync_common::ConnectionId;
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use metrics::{counter, gauge};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long a single frame may wait on a peer that is not reading
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Create the WebSocket router
pub fn create_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// Handler for WebSocket connections
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.settings.max_ws_message_bytes)
        .on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: AppState) {
    counter!(WS_CONNECTION).increment(1);
    gauge!(WS_ACTIVE).increment(1.0);

    let conn = ConnectionId::new();
    let (tx, receivers) = outbox(
        state.settings.reliable_queue_depth,
        state.settings.volatile_queue_depth,
    );
    let (sink, mut stream) = socket.split();

    // Register before reading so init-room is the first frame out
    state.relay.connect(conn, tx);
    info!(conn_id = %conn, "websocket connected");

    let mut send_task = tokio::spawn(write_frames(sink, receivers));

    let handler = WebSocketHandler::new(state.relay.clone(), conn);
    loop {
        let message = tokio::select! {
            message = stream.next() => message,
            // the writer only stops once the relay dropped us or the peer stalled
            _ = &mut send_task => {
                debug!(conn_id = %conn, "writer finished, closing connection");
                break;
            },
        };
        match message {
            Some(Ok(Message::Text(text))) => handler.handle_text(text.as_str()),
            Some(Ok(Message::Binary(_))) => handler.handle_binary(),
            // axum answers pings itself
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {},
            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
        }
    }

    state.relay.disconnect(conn);
    send_task.abort();

    gauge!(WS_ACTIVE).decrement(1.0);
    info!(conn_id = %conn, "websocket disconnected");
}

/// Drain both outbound queues into the socket, reliable frames first.
///
/// Ends when the relay drops the connection's queues, the socket fails, or
/// the peer stops reading for longer than [`SEND_TIMEOUT`].
async fn write_frames(mut sink: SplitSink<WebSocket, Message>, receivers: OutboxReceivers) {
    let OutboxReceivers {
        mut reliable,
        mut volatile,
    } = receivers;

    loop {
        let frame = tokio::select! {
            biased;
            Some(frame) = reliable.recv() => frame,
            Some(frame) = volatile.recv() => frame,
            else => break,
        };
        match tokio::time::timeout(SEND_TIMEOUT, sink.send(Message::Text(frame.to_string().into()))).await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                debug!(error = %e, "websocket send failed");
                break;
            },
            Err(_) => {
                warn!("peer stopped reading, closing websocket");
                break;
            },
        }
    }

    let _ = tokio::time::timeout(SEND_TIMEOUT, sink.close()).await;
}
