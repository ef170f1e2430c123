// ============================
// crates/backend-lib/src/storage/unavailable.rs
// ============================
//! Adapter used when persistence is switched off.
//!
//! The relay keeps working; every REST persistence call answers 503.
use super::{
    FileStore, NewPermalink, NewTeacher, PermalinkRecord, PermalinkStore, SceneRecord, SceneStore,
    TeacherRecord, TeacherStore,
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableStorage;

fn unavailable<T>() -> Result<T, AppError> {
    Err(AppError::StoreUnavailable("storage backend is disabled".to_string()))
}

#[async_trait]
impl SceneStore for UnavailableStorage {
    async fn get_scene(&self, _room_id: &str) -> Result<SceneRecord, AppError> {
        unavailable()
    }

    async fn put_scene(&self, _: &str, _: i64, _: &str, _: &str) -> Result<(), AppError> {
        unavailable()
    }
}

#[async_trait]
impl PermalinkStore for UnavailableStorage {
    async fn insert_permalink(&self, _new: NewPermalink) -> Result<PermalinkRecord, AppError> {
        unavailable()
    }

    async fn active_permalink(&self, _: &str) -> Result<Option<PermalinkRecord>, AppError> {
        unavailable()
    }

    async fn active_permalink_for_student(&self, _: &str, _: &str) -> Result<Option<PermalinkRecord>, AppError> {
        unavailable()
    }

    async fn active_permalink_for_room(&self, _: &str, _: &str) -> Result<Option<PermalinkRecord>, AppError> {
        unavailable()
    }

    async fn permalinks_for_teacher(&self, _: &str) -> Result<Vec<PermalinkRecord>, AppError> {
        unavailable()
    }

    async fn touch_permalink(&self, _: &str, _: DateTime<Utc>) -> Result<(), AppError> {
        unavailable()
    }

    async fn deactivate_permalink(&self, _: &str, _: &str) -> Result<bool, AppError> {
        unavailable()
    }
}

#[async_trait]
impl TeacherStore for UnavailableStorage {
    async fn insert_teacher(&self, _new: NewTeacher) -> Result<TeacherRecord, AppError> {
        unavailable()
    }

    async fn teacher(&self, _: &str) -> Result<Option<TeacherRecord>, AppError> {
        unavailable()
    }

    async fn list_teachers(&self) -> Result<Vec<TeacherRecord>, AppError> {
        unavailable()
    }

    async fn touch_teacher(&self, _: &str, _: DateTime<Utc>) -> Result<(), AppError> {
        unavailable()
    }

    async fn deactivate_teacher(&self, _: &str) -> Result<bool, AppError> {
        unavailable()
    }
}

#[async_trait]
impl FileStore for UnavailableStorage {
    async fn put_file(&self, _: &str, _: &str, _: Vec<u8>) -> Result<(), AppError> {
        unavailable()
    }

    async fn get_file(&self, _: &str, _: &str) -> Result<Vec<u8>, AppError> {
        unavailable()
    }
}
