// ================
// crates/common/src/lib.rs
// ================
//! Common types shared by the `boardsync` server and its clients.
//!
//! - [`protocol`]: realtime relay frames exchanged over the websocket.
//! - [`api`]: REST request and response bodies.
//! - [`reconcile`]: the pure element-set merge used before persisting a scene.

pub mod api;
pub mod protocol;
pub mod reconcile;

pub use protocol::{ClientToServer, ConnectionId, FollowAction, ServerToClient, UserToFollow};
pub use reconcile::{reconcile, retain_syncable, scene_version, Element, LocalAppState};
