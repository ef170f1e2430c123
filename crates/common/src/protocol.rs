//! Realtime relay protocol.
//!
//! Every websocket text frame carries exactly one of these messages as a JSON
//! object tagged by `"type"`. Payloads of broadcast frames (`data`, `iv`) are
//! opaque to the relay: they are ciphertext produced with a room key the
//! server never sees.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier the relay assigns to every websocket connection
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh random connection id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ConnectionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Whether a `user-follow` frame starts or stops following
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum FollowAction {
    Follow,
    Unfollow,
}

/// The connection a follower wants to watch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserToFollow {
    /// Connection id of the followed user
    pub socket_id: String,
    /// Display name, informational only
    #[serde(default)]
    pub username: String,
}

/// Messages sent from client to relay
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientToServer {
    /// Join a collaboration room, leaving the previous one
    /// # Fields
    /// * `room_id` - Room to join
    JoinRoom { room_id: String },
    /// Relay an encrypted update to every other room member
    /// # Fields
    /// * `room_id` - Target room (sender must be a member)
    /// * `data` - Opaque ciphertext
    /// * `iv` - Initialization vector used to produce `data`
    ServerBroadcast {
        room_id: String,
        data: String,
        iv: String,
    },
    /// Same as `ServerBroadcast`, but may be dropped for slow consumers
    ServerVolatileBroadcast {
        room_id: String,
        data: String,
        iv: String,
    },
    /// Start or stop following another connection
    UserFollow {
        user_to_follow: UserToFollow,
        action: FollowAction,
    },
}

impl ClientToServer {
    /// Wire name of the message, used for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientToServer::JoinRoom { .. } => "join-room",
            ClientToServer::ServerBroadcast { .. } => "server-broadcast",
            ClientToServer::ServerVolatileBroadcast { .. } => "server-volatile-broadcast",
            ClientToServer::UserFollow { .. } => "user-follow",
        }
    }
}

/// Messages sent from relay to client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerToClient {
    /// First frame on every connection, carries the connection's own id
    InitRoom { socket_id: ConnectionId },
    /// The joining connection is the only member of the room
    FirstInRoom,
    /// Sent to existing members when someone joins
    NewUser { socket_id: ConnectionId },
    /// Membership snapshot of a collaboration room, in join order
    RoomUserChange { socket_ids: Vec<ConnectionId> },
    /// Relayed encrypted update
    ClientBroadcast { data: String, iv: String },
    /// Current followers of the receiving connection
    UserFollowRoomChange { followed_by: Vec<ConnectionId> },
    /// Nobody follows the receiving connection anymore
    BroadcastUnfollow,
    /// A frame from this connection was rejected
    Error { code: String, message: String },
}
