// ============================
// crates/client/src/lib.rs
// ============================
//! Client side of boardsync: scene encryption, REST access and the
//! persistence gateway that keeps a room's stored scene consistent across
//! collaborators.

pub mod api;
pub mod cipher;
pub mod error;
pub mod gateway;

pub use api::{HttpApiClient, SceneApi};
pub use cipher::{generate_room_key, SceneCipher, Sealed};
pub use error::ClientError;
pub use gateway::{CollabSession, LoadedScene, RetryPolicy, SavedScene, SyncState};
