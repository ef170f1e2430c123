// ==================
// crates/backend-lib/src/websocket.rs
// ==================
//! WebSocket Handler Module
//!
//! Turns the text frames of one connection into relay commands. The handler
//! is instantiated per connection and holds no membership state of its own:
//! everything it learns goes to the relay actor, and every rejection is sent
//! back to this connection alone so a misbehaving client cannot affect other
//! rooms.

use crate::relay_actor::{codes, RelayHandle};
use crate::validation::validate_room_id;
use boardsync_common::{ClientToServer, ConnectionId};
use tracing::{debug, trace};

/// WebSocket handler for processing messages
pub struct WebSocketHandler {
    relay: RelayHandle,
    conn: ConnectionId,
}

impl WebSocketHandler {
    pub fn new(relay: RelayHandle, conn: ConnectionId) -> Self {
        Self { relay, conn }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }

    /// Handle one text frame from the client
    pub fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientToServer>(text) {
            Ok(message) => {
                trace!(conn_id = %self.conn, kind = message.kind(), "frame received");
                self.handle_message(message);
            },
            Err(e) => {
                debug!(conn_id = %self.conn, error = %e, "malformed frame");
                self.relay.reject(self.conn, codes::MALFORMED_FRAME, e.to_string());
            },
        }
    }

    /// Binary frames are not part of the protocol
    pub fn handle_binary(&self) {
        self.relay.reject(
            self.conn,
            codes::UNSUPPORTED_FRAME,
            "binary frames are not supported",
        );
    }

    fn handle_message(&self, message: ClientToServer) {
        match message {
            ClientToServer::JoinRoom { room_id } => {
                if let Some(room_id) = self.checked_room(room_id) {
                    self.relay.join(self.conn, room_id);
                }
            },
            ClientToServer::ServerBroadcast { room_id, data, iv } => {
                if let Some(room_id) = self.checked_room(room_id) {
                    self.relay.broadcast(self.conn, room_id, data, iv, false);
                }
            },
            ClientToServer::ServerVolatileBroadcast { room_id, data, iv } => {
                if let Some(room_id) = self.checked_room(room_id) {
                    self.relay.broadcast(self.conn, room_id, data, iv, true);
                }
            },
            ClientToServer::UserFollow {
                user_to_follow,
                action,
            } => match user_to_follow.socket_id.parse::<ConnectionId>() {
                Ok(target) => self.relay.follow(self.conn, target, action),
                Err(_) => self.relay.reject(
                    self.conn,
                    codes::INVALID_USER,
                    format!("unknown socket id {:?}", user_to_follow.socket_id),
                ),
            },
        }
    }

    fn checked_room(&self, room_id: String) -> Option<String> {
        match validate_room_id(&room_id) {
            Ok(_) => Some(room_id),
            Err(e) => {
                self.relay.reject(self.conn, codes::INVALID_ROOM_ID, e.to_string());
                None
            },
        }
    }
}
