// ============================
// crates/backend-lib/src/relay_actor.rs
// ============================
//! Realtime relay: the room membership table and its fan-out.
//!
//! One actor task owns every membership structure. Connection handlers hold a
//! [`RelayHandle`] and only send commands, so each join, leave or follow is
//! applied and fanned out completely before the next command is looked at.
use crate::metrics::{RELAY_BROADCAST, RELAY_EVICTED, RELAY_JOINED, RELAY_VOLATILE_DROPPED};
use boardsync_common::{ConnectionId, FollowAction, ServerToClient};
use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

/// A serialized server frame, shared by every recipient of a fan-out
pub type Frame = Arc<str>;

/// Error codes carried by `error` frames
pub mod codes {
    pub const MALFORMED_FRAME: &str = "malformed-frame";
    pub const INVALID_ROOM_ID: &str = "invalid-room-id";
    pub const INVALID_USER: &str = "invalid-user";
    pub const NOT_IN_ROOM: &str = "not-in-room";
    pub const UNSUPPORTED_FRAME: &str = "unsupported-frame";
}

/// Sending half of a connection's two outbound queues
#[derive(Debug, Clone)]
pub struct Outbox {
    reliable: mpsc::Sender<Frame>,
    volatile: mpsc::Sender<Frame>,
}

/// Receiving half, drained by the connection's writer task.
///
/// Both queues close once the relay forgets the connection.
#[derive(Debug)]
pub struct OutboxReceivers {
    pub reliable: mpsc::Receiver<Frame>,
    pub volatile: mpsc::Receiver<Frame>,
}

/// Create the queues for one connection.
///
/// A full volatile queue drops the frame; a full reliable queue drops the
/// connection.
pub fn outbox(reliable_depth: usize, volatile_depth: usize) -> (Outbox, OutboxReceivers) {
    let (reliable_tx, reliable_rx) = mpsc::channel(reliable_depth.max(1));
    let (volatile_tx, volatile_rx) = mpsc::channel(volatile_depth.max(1));
    (
        Outbox {
            reliable: reliable_tx,
            volatile: volatile_tx,
        },
        OutboxReceivers {
            reliable: reliable_rx,
            volatile: volatile_rx,
        },
    )
}

impl Outbox {
    /// `false` when the consumer has fallen a full queue behind
    fn send_reliable(&self, frame: Frame) -> bool {
        // a closed queue means the writer is gone; Disconnect follows
        !matches!(self.reliable.try_send(frame), Err(mpsc::error::TrySendError::Full(_)))
    }

    fn send_volatile(&self, frame: Frame) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.volatile.try_send(frame) {
            counter!(RELAY_VOLATILE_DROPPED).increment(1);
        }
    }
}

/// Commands accepted by the relay actor
#[derive(Debug)]
pub enum RelayCommand {
    Connect {
        conn: ConnectionId,
        outbox: Outbox,
    },
    Join {
        conn: ConnectionId,
        room_id: String,
    },
    Broadcast {
        conn: ConnectionId,
        room_id: String,
        data: String,
        iv: String,
        volatile: bool,
    },
    Follow {
        conn: ConnectionId,
        target: ConnectionId,
        action: FollowAction,
    },
    /// Report a rejected frame back to its sender only
    Reject {
        conn: ConnectionId,
        code: &'static str,
        message: String,
    },
    Disconnect {
        conn: ConnectionId,
    },
    Snapshot {
        reply: oneshot::Sender<RelaySnapshot>,
    },
}

/// Point-in-time view of the membership table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelaySnapshot {
    pub connections: usize,
    /// Collaboration rooms and their members in join order
    pub rooms: BTreeMap<String, Vec<ConnectionId>>,
    /// Followed connection and its followers
    pub follow_rooms: BTreeMap<ConnectionId, Vec<ConnectionId>>,
}

/// Handle that other components keep
#[derive(Clone, Debug)]
pub struct RelayHandle {
    cmd_tx: mpsc::UnboundedSender<RelayCommand>,
}

impl RelayHandle {
    fn send(&self, cmd: RelayCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            error!("relay actor stopped, command dropped");
        }
    }

    pub fn connect(&self, conn: ConnectionId, outbox: Outbox) {
        self.send(RelayCommand::Connect { conn, outbox });
    }

    pub fn join(&self, conn: ConnectionId, room_id: String) {
        self.send(RelayCommand::Join { conn, room_id });
    }

    pub fn broadcast(&self, conn: ConnectionId, room_id: String, data: String, iv: String, volatile: bool) {
        self.send(RelayCommand::Broadcast {
            conn,
            room_id,
            data,
            iv,
            volatile,
        });
    }

    pub fn follow(&self, conn: ConnectionId, target: ConnectionId, action: FollowAction) {
        self.send(RelayCommand::Follow { conn, target, action });
    }

    pub fn reject(&self, conn: ConnectionId, code: &'static str, message: impl Into<String>) {
        self.send(RelayCommand::Reject {
            conn,
            code,
            message: message.into(),
        });
    }

    pub fn disconnect(&self, conn: ConnectionId) {
        self.send(RelayCommand::Disconnect { conn });
    }

    /// `None` when the actor has stopped
    pub async fn snapshot(&self) -> Option<RelaySnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(RelayCommand::Snapshot { reply });
        rx.await.ok()
    }
}

/// Per-connection record, created on connect and dropped on disconnect
struct Session {
    outbox: Outbox,
    room: Option<String>,
}

#[derive(Default)]
pub struct RelayActor {
    sessions: HashMap<ConnectionId, Session>,
    rooms: HashMap<String, Vec<ConnectionId>>,
    /// target -> followers, in follow order
    follow_rooms: HashMap<ConnectionId, Vec<ConnectionId>>,
    /// Connections whose reliable queue overflowed during the current command
    lagging: Vec<ConnectionId>,
}

fn encode(message: &ServerToClient) -> Option<Frame> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            error!(error = %e, "failed to serialize relay frame");
            None
        },
    }
}

impl RelayActor {
    pub fn new() -> Self {
        Self::default()
    }

    fn send_to(&mut self, conn: &ConnectionId, message: &ServerToClient) {
        if let (Some(session), Some(frame)) = (self.sessions.get(conn), encode(message)) {
            if !session.outbox.send_reliable(frame) {
                self.lagging.push(*conn);
            }
        }
    }

    fn send_to_all<'a>(&mut self, recipients: impl IntoIterator<Item = &'a ConnectionId>, message: &ServerToClient) {
        let Some(frame) = encode(message) else { return };
        for conn in recipients {
            if let Some(session) = self.sessions.get(conn) {
                if !session.outbox.send_reliable(frame.clone()) {
                    self.lagging.push(*conn);
                }
            }
        }
    }

    /// Drop every connection that could not keep up; leaving may notify
    /// others who are lagging too
    fn evict_lagging(&mut self) {
        while let Some(conn) = self.lagging.pop() {
            if self.sessions.contains_key(&conn) {
                warn!(conn_id = %conn, "outbound queue full, dropping connection");
                counter!(RELAY_EVICTED).increment(1);
                self.disconnect(conn);
            }
        }
    }

    fn handle(&mut self, cmd: RelayCommand) {
        match cmd {
            RelayCommand::Connect { conn, outbox } => self.connect(conn, outbox),
            RelayCommand::Join { conn, room_id } => self.join(conn, room_id),
            RelayCommand::Broadcast {
                conn,
                room_id,
                data,
                iv,
                volatile,
            } => self.broadcast(conn, &room_id, data, iv, volatile),
            RelayCommand::Follow { conn, target, action } => self.follow(conn, target, action),
            RelayCommand::Reject { conn, code, message } => self.send_to(
                &conn,
                &ServerToClient::Error {
                    code: code.to_string(),
                    message,
                },
            ),
            RelayCommand::Disconnect { conn } => self.disconnect(conn),
            RelayCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            },
        }
        self.evict_lagging();
    }

    fn connect(&mut self, conn: ConnectionId, outbox: Outbox) {
        self.sessions.insert(conn, Session { outbox, room: None });
        self.send_to(&conn, &ServerToClient::InitRoom { socket_id: conn });
        debug!(conn_id = %conn, "connection registered");
    }

    /// Remove `conn` from its collaboration room and tell whoever is left
    fn leave_room(&mut self, conn: ConnectionId, room_id: &str) {
        let Some(members) = self.rooms.get_mut(room_id) else { return };
        members.retain(|member| *member != conn);
        if members.is_empty() {
            self.rooms.remove(room_id);
            debug!(room_id, "room emptied");
            return;
        }
        let remaining = members.clone();
        self.send_to_all(
            &remaining,
            &ServerToClient::RoomUserChange {
                socket_ids: remaining.clone(),
            },
        );
    }

    fn join(&mut self, conn: ConnectionId, room_id: String) {
        let previous = match self.sessions.get_mut(&conn) {
            Some(session) => session.room.replace(room_id.clone()),
            None => return,
        };
        if let Some(previous) = previous.filter(|previous| *previous != room_id) {
            self.leave_room(conn, &previous);
        }

        let members = self.rooms.entry(room_id.clone()).or_default();
        if !members.contains(&conn) {
            members.push(conn);
        }
        let members = members.clone();
        counter!(RELAY_JOINED).increment(1);
        debug!(conn_id = %conn, room_id = %room_id, members = members.len(), "joined room");

        if members.len() <= 1 {
            self.send_to(&conn, &ServerToClient::FirstInRoom);
        } else {
            self.send_to_all(
                members.iter().filter(|member| **member != conn),
                &ServerToClient::NewUser { socket_id: conn },
            );
        }
        self.send_to_all(
            &members,
            &ServerToClient::RoomUserChange {
                socket_ids: members.clone(),
            },
        );
    }

    fn broadcast(&mut self, conn: ConnectionId, room_id: &str, data: String, iv: String, volatile: bool) {
        let joined = self
            .sessions
            .get(&conn)
            .is_some_and(|session| session.room.as_deref() == Some(room_id));
        if !joined {
            self.send_to(
                &conn,
                &ServerToClient::Error {
                    code: codes::NOT_IN_ROOM.to_string(),
                    message: format!("join {room_id} before broadcasting to it"),
                },
            );
            return;
        }

        let Some(members) = self.rooms.get(room_id) else { return };
        let Some(frame) = encode(&ServerToClient::ClientBroadcast { data, iv }) else {
            return;
        };
        let mut delivered = 0usize;
        for member in members.iter().filter(|member| **member != conn) {
            if let Some(session) = self.sessions.get(member) {
                if volatile {
                    session.outbox.send_volatile(frame.clone());
                } else if !session.outbox.send_reliable(frame.clone()) {
                    self.lagging.push(*member);
                    continue;
                }
                delivered += 1;
            }
        }
        if !volatile {
            counter!(RELAY_BROADCAST).increment(1);
        }
        trace!(conn_id = %conn, room_id, delivered, volatile, "broadcast relayed");
    }

    fn notify_followed(&mut self, target: ConnectionId) {
        let followed_by = self.follow_rooms.get(&target).cloned().unwrap_or_default();
        self.send_to(&target, &ServerToClient::UserFollowRoomChange { followed_by });
    }

    fn follow(&mut self, conn: ConnectionId, target: ConnectionId, action: FollowAction) {
        if !self.sessions.contains_key(&conn) {
            return;
        }
        match action {
            FollowAction::Follow => {
                let followers = self.follow_rooms.entry(target).or_default();
                if !followers.contains(&conn) {
                    followers.push(conn);
                }
            },
            FollowAction::Unfollow => {
                if let Some(followers) = self.follow_rooms.get_mut(&target) {
                    followers.retain(|follower| *follower != conn);
                    if followers.is_empty() {
                        self.follow_rooms.remove(&target);
                    }
                }
            },
        }
        debug!(conn_id = %conn, target = %target, ?action, "follow change");
        self.notify_followed(target);
    }

    fn disconnect(&mut self, conn: ConnectionId) {
        let Some(session) = self.sessions.remove(&conn) else { return };
        if let Some(room_id) = session.room {
            self.leave_room(conn, &room_id);
        }

        // Nobody can follow a connection that is gone
        self.follow_rooms.remove(&conn);

        let followed: Vec<ConnectionId> = self
            .follow_rooms
            .iter()
            .filter(|(_, followers)| followers.contains(&conn))
            .map(|(target, _)| *target)
            .collect();
        for target in followed {
            let emptied = match self.follow_rooms.get_mut(&target) {
                Some(followers) => {
                    followers.retain(|follower| *follower != conn);
                    followers.is_empty()
                },
                None => continue,
            };
            if emptied {
                self.follow_rooms.remove(&target);
                self.send_to(&target, &ServerToClient::BroadcastUnfollow);
            } else {
                self.notify_followed(target);
            }
        }
        debug!(conn_id = %conn, "connection removed");
    }

    fn snapshot(&self) -> RelaySnapshot {
        RelaySnapshot {
            connections: self.sessions.len(),
            rooms: self
                .rooms
                .iter()
                .map(|(room, members)| (room.clone(), members.clone()))
                .collect(),
            follow_rooms: self
                .follow_rooms
                .iter()
                .map(|(target, followers)| (*target, followers.clone()))
                .collect(),
        }
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<RelayCommand>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd);
        }
        debug!("relay actor stopped");
    }
}

/// Spawn the relay actor and return its handle
pub fn spawn_relay() -> RelayHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(RelayActor::new().run(cmd_rx));
    RelayHandle { cmd_tx }
}
