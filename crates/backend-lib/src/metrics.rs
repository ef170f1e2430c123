// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const WS_CONNECTION: &str = "ws.connection";
pub const WS_ACTIVE: &str = "ws.active";
pub const RELAY_JOINED: &str = "relay.joined";
pub const RELAY_BROADCAST: &str = "relay.broadcast";
pub const RELAY_VOLATILE_DROPPED: &str = "relay.volatile_dropped";
pub const RELAY_EVICTED: &str = "relay.evicted";
pub const SCENE_SAVED: &str = "scene.saved";
pub const PERMALINK_CREATED: &str = "permalink.created";
pub const PERMALINK_RESOLVED: &str = "permalink.resolved";
pub const TEACHER_PROVISIONED: &str = "teacher.provisioned";
pub const ACCESS_FORBIDDEN: &str = "access.forbidden";
