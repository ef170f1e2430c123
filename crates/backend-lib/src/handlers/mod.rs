// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! REST handlers and the extractors they share.
use crate::{config::Settings, error::AppError, AppState};
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, FromRequestParts, Query, Request},
    http::{header, request::Parts, HeaderMap},
    routing::{get, post},
    Json, RequestPartsExt, Router,
};
use serde::Deserialize;

pub mod admin;
pub mod files;
pub mod health;
pub mod permalinks;
pub mod scenes;

/// Header carrying the admin credential
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// JSON body whose rejections are reported as `InvalidPayload`
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Payload(value)),
            Err(rejection) => Err(AppError::InvalidPayload(rejection.body_text())),
        }
    }
}

/// The `x-admin-token` header, if any
#[derive(Debug, Clone)]
pub struct AdminCredential(pub Option<String>);

impl<S> FromRequestParts<S> for AdminCredential
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Ok(AdminCredential(token))
    }
}

#[derive(Debug, Default, Deserialize)]
struct TeacherQuery {
    teacher_id: Option<String>,
    token: Option<String>,
}

/// Teacher id and token from the query string, token also from `Authorization: Bearer`
#[derive(Debug, Clone, Default)]
pub struct TeacherCredential {
    pub teacher_id: Option<String>,
    pub token: Option<String>,
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

impl<S> FromRequestParts<S> for TeacherCredential
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = parts
            .extract::<Query<TeacherQuery>>()
            .await
            .map_err(|rejection| AppError::InvalidPayload(rejection.body_text()))?;

        let token = query
            .token
            .filter(|t| !t.is_empty())
            .or_else(|| bearer_token(&parts.headers));

        Ok(TeacherCredential {
            teacher_id: query.teacher_id,
            token,
        })
    }
}

/// Every `/api` route, body limits taken from `settings`
pub fn api_router(settings: &Settings) -> Router<AppState> {
    let files = Router::new()
        .route(
            "/files/{room_id}/{file_id}",
            get(files::get_file).put(files::put_file),
        )
        .layer(DefaultBodyLimit::max(settings.max_file_bytes));

    let api = Router::new()
        .route("/health", get(health::health))
        .route(
            "/scenes/{room_id}",
            get(scenes::get_scene).post(scenes::save_scene),
        )
        .route(
            "/permalinks",
            post(permalinks::create_permalink).get(permalinks::list_permalinks),
        )
        .route(
            "/permalinks/{permalink}",
            get(permalinks::resolve_permalink).delete(permalinks::delete_permalink),
        )
        .route(
            "/teachers/{teacher_id}/permalinks",
            get(permalinks::list_teacher_permalinks),
        )
        .route(
            "/teachers/{teacher_id}/permalinks/{permalink}",
            axum::routing::delete(permalinks::delete_teacher_permalink),
        )
        .route(
            "/admin/teachers",
            post(admin::provision_teacher).get(admin::list_teachers),
        )
        .route("/admin/teachers/upload", post(admin::upload_teachers))
        .route(
            "/admin/teachers/{teacher_id}/deactivate",
            post(admin::deactivate_teacher),
        )
        .layer(DefaultBodyLimit::max(settings.max_body_bytes));

    api.merge(files)
}
