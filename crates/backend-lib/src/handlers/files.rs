// ============================
// crates/backend-lib/src/handlers/files.rs
// ============================
//! Room file attachments. Bytes are stored as received.
use crate::{
    error::AppError,
    storage::FileStore,
    validation::{validate_file_id, validate_room_id},
    AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
    Json,
};
use boardsync_common::api::Ack;
use tracing::debug;

pub async fn put_file(
    State(state): State<AppState>,
    Path((room_id, file_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Ack>, AppError> {
    validate_room_id(&room_id)?;
    validate_file_id(&file_id)?;

    let size = body.len();
    state.storage.put_file(&room_id, &file_id, body.to_vec()).await?;
    debug!(room_id = %room_id, file_id = %file_id, size, "room file stored");
    Ok(Json(Ack::OK))
}

pub async fn get_file(
    State(state): State<AppState>,
    Path((room_id, file_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    validate_room_id(&room_id)?;
    validate_file_id(&file_id)?;

    let data = state.storage.get_file(&room_id, &file_id).await?;
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}
