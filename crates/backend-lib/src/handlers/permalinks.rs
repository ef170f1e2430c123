// ============================
// crates/backend-lib/src/handlers/permalinks.rs
// ============================
//! Permalink create/resolve and the teacher-scoped listing.
use super::{Payload, TeacherCredential};
use crate::{auth::TeacherGrant, error::AppError, validation::non_blank, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use boardsync_common::api::{
    Ack, CreatePermalinkRequest, Items, PermalinkCreated, PermalinkSummary, ResolvedPermalink,
};

pub async fn create_permalink(
    State(state): State<AppState>,
    Payload(body): Payload<CreatePermalinkRequest>,
) -> Result<Json<PermalinkCreated>, AppError> {
    let permalink = state.permalinks.create(body).await?;
    Ok(Json(PermalinkCreated { permalink }))
}

pub async fn resolve_permalink(
    State(state): State<AppState>,
    Path(permalink): Path<String>,
) -> Result<Json<ResolvedPermalink>, AppError> {
    Ok(Json(state.permalinks.resolve(&permalink).await?))
}

async fn teacher_grant(state: &AppState, teacher_id: Option<String>, token: Option<String>) -> Result<TeacherGrant, AppError> {
    let teacher_id = non_blank(teacher_id)
        .ok_or_else(|| AppError::InvalidPayload("teacher_id is required".to_string()))?;
    state
        .guard
        .authorize_teacher(&teacher_id, token.as_deref(), true)
        .await
}

async fn list_for(state: &AppState, grant: TeacherGrant) -> Result<Json<Items<PermalinkSummary>>, AppError> {
    let items = state
        .permalinks
        .list_for_teacher(&grant)
        .await?
        .into_iter()
        .map(PermalinkSummary::from)
        .collect();
    Ok(Json(Items { items }))
}

/// `GET /api/permalinks?teacher_id=&token=`
pub async fn list_permalinks(
    State(state): State<AppState>,
    credential: TeacherCredential,
) -> Result<Json<Items<PermalinkSummary>>, AppError> {
    let grant = teacher_grant(&state, credential.teacher_id, credential.token).await?;
    list_for(&state, grant).await
}

/// `GET /api/teachers/{teacher_id}/permalinks?token=`
pub async fn list_teacher_permalinks(
    State(state): State<AppState>,
    Path(teacher_id): Path<String>,
    credential: TeacherCredential,
) -> Result<Json<Items<PermalinkSummary>>, AppError> {
    let grant = teacher_grant(&state, Some(teacher_id), credential.token).await?;
    list_for(&state, grant).await
}

/// `DELETE /api/permalinks/{permalink}?teacher_id=&token=`
pub async fn delete_permalink(
    State(state): State<AppState>,
    Path(permalink): Path<String>,
    credential: TeacherCredential,
) -> Result<Json<Ack>, AppError> {
    let grant = teacher_grant(&state, credential.teacher_id, credential.token).await?;
    state.permalinks.deactivate(&permalink, &grant).await?;
    Ok(Json(Ack::OK))
}

/// `DELETE /api/teachers/{teacher_id}/permalinks/{permalink}?token=`
pub async fn delete_teacher_permalink(
    State(state): State<AppState>,
    Path((teacher_id, permalink)): Path<(String, String)>,
    credential: TeacherCredential,
) -> Result<Json<Ack>, AppError> {
    let grant = teacher_grant(&state, Some(teacher_id), credential.token).await?;
    state.permalinks.deactivate(&permalink, &grant).await?;
    Ok(Json(Ack::OK))
}
