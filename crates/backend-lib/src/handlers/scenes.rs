// ============================
// crates/backend-lib/src/handlers/scenes.rs
// ============================
//! Encrypted scene snapshots, one per room.
use super::Payload;
use crate::{
    error::AppError,
    metrics::SCENE_SAVED,
    storage::SceneStore,
    validation::{validate_room_id, validate_scene},
    AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use boardsync_common::api::{Ack, SaveSceneRequest, SceneDocument};
use metrics::counter;
use tracing::debug;

pub async fn get_scene(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<SceneDocument>, AppError> {
    validate_room_id(&room_id)?;
    let record = state.storage.get_scene(&room_id).await?;
    Ok(Json(record.into()))
}

/// Upsert the room's snapshot; the last write to arrive wins
pub async fn save_scene(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Payload(body): Payload<SaveSceneRequest>,
) -> Result<Json<Ack>, AppError> {
    validate_room_id(&room_id)?;
    validate_scene(body.scene_version, &body.iv)?;

    state
        .storage
        .put_scene(&room_id, body.scene_version, &body.iv, &body.ciphertext)
        .await?;

    counter!(SCENE_SAVED).increment(1);
    debug!(room_id = %room_id, scene_version = body.scene_version, "scene saved");
    Ok(Json(Ack::OK))
}
