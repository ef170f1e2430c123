// ============================
// crates/backend-lib/src/handlers/admin.rs
// ============================
//! Admin-only teacher provisioning.
use super::{AdminCredential, Payload};
use crate::{error::AppError, AppState};
use axum::{
    extract::{Path, State},
    Json,
};
use boardsync_common::api::{
    Ack, Items, ProvisionTeacherRequest, ProvisionedTeacher, TeacherSummary, TeacherUploadRequest,
    TeacherUploadResponse,
};

pub async fn provision_teacher(
    State(state): State<AppState>,
    AdminCredential(credential): AdminCredential,
    Payload(body): Payload<ProvisionTeacherRequest>,
) -> Result<Json<ProvisionedTeacher>, AppError> {
    let grant = state.guard.authorize_admin(credential.as_deref())?;
    let record = state.teachers.provision(&grant, body.name, body.email).await?;
    Ok(Json(ProvisionedTeacher {
        teacher_id: record.teacher_id,
        token: record.token,
    }))
}

pub async fn upload_teachers(
    State(state): State<AppState>,
    AdminCredential(credential): AdminCredential,
    Payload(body): Payload<TeacherUploadRequest>,
) -> Result<Json<TeacherUploadResponse>, AppError> {
    let grant = state.guard.authorize_admin(credential.as_deref())?;
    Ok(Json(state.teachers.provision_batch(&grant, &body.csv).await?))
}

pub async fn list_teachers(
    State(state): State<AppState>,
    AdminCredential(credential): AdminCredential,
) -> Result<Json<Items<TeacherSummary>>, AppError> {
    let grant = state.guard.authorize_admin(credential.as_deref())?;
    let items = state
        .teachers
        .list(&grant)
        .await?
        .into_iter()
        .map(TeacherSummary::from)
        .collect();
    Ok(Json(Items { items }))
}

pub async fn deactivate_teacher(
    State(state): State<AppState>,
    AdminCredential(credential): AdminCredential,
    Path(teacher_id): Path<String>,
) -> Result<Json<Ack>, AppError> {
    let grant = state.guard.authorize_admin(credential.as_deref())?;
    state.teachers.deactivate(&grant, &teacher_id).await?;
    Ok(Json(Ack::OK))
}
