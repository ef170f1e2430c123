// ============================
// crates/backend-lib/src/storage/mod.rs
// ============================
//! Persistence contract with interchangeable adapters.
//!
//! Handlers and directories only see `Arc<dyn Storage>`; which adapter sits
//! behind it is decided once at start-up.
use crate::error::AppError;
use async_trait::async_trait;
use boardsync_common::api::{PermalinkSummary, SceneDocument, TeacherSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod flat_file;
mod pg;
mod unavailable;

pub use flat_file::FlatFileStorage;
pub use pg::PgStorage;
pub use unavailable::UnavailableStorage;

/// Latest encrypted snapshot of one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SceneRecord {
    pub room_id: String,
    pub scene_version: i64,
    pub iv: String,
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PermalinkRecord {
    pub permalink: String,
    pub room_id: String,
    pub room_key: String,
    pub student_name: Option<String>,
    pub teacher_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TeacherRecord {
    pub teacher_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewPermalink {
    pub permalink: String,
    pub room_id: String,
    pub room_key: String,
    pub student_name: Option<String>,
    pub teacher_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewTeacher {
    pub teacher_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub token: String,
}

/// Scene snapshots, one row per room
#[async_trait]
pub trait SceneStore: Send + Sync {
    /// `NotFound` when the room has never been saved
    async fn get_scene(&self, room_id: &str) -> Result<SceneRecord, AppError>;

    /// Insert or replace the room's snapshot atomically
    async fn put_scene(
        &self,
        room_id: &str,
        scene_version: i64,
        iv: &str,
        ciphertext: &str,
    ) -> Result<(), AppError>;
}

#[async_trait]
pub trait PermalinkStore: Send + Sync {
    /// Insert a new active link.
    ///
    /// Fails with `ConstraintConflict` when the token is taken, or when the
    /// active `(teacher_id, student_name)` or `(room_id, room_key)` pair
    /// already has a link.
    async fn insert_permalink(&self, new: NewPermalink) -> Result<PermalinkRecord, AppError>;

    async fn active_permalink(&self, permalink: &str) -> Result<Option<PermalinkRecord>, AppError>;

    async fn active_permalink_for_student(
        &self,
        teacher_id: &str,
        student_name: &str,
    ) -> Result<Option<PermalinkRecord>, AppError>;

    async fn active_permalink_for_room(
        &self,
        room_id: &str,
        room_key: &str,
    ) -> Result<Option<PermalinkRecord>, AppError>;

    /// Active links owned by the teacher, newest first
    async fn permalinks_for_teacher(&self, teacher_id: &str) -> Result<Vec<PermalinkRecord>, AppError>;

    async fn touch_permalink(&self, permalink: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    /// Returns whether an active row owned by `teacher_id` was deactivated
    async fn deactivate_permalink(&self, permalink: &str, teacher_id: &str) -> Result<bool, AppError>;
}

#[async_trait]
pub trait TeacherStore: Send + Sync {
    /// `ConstraintConflict` when the id or token is taken
    async fn insert_teacher(&self, new: NewTeacher) -> Result<TeacherRecord, AppError>;

    /// Looks up a teacher regardless of `is_active`
    async fn teacher(&self, teacher_id: &str) -> Result<Option<TeacherRecord>, AppError>;

    /// All teachers, newest first
    async fn list_teachers(&self) -> Result<Vec<TeacherRecord>, AppError>;

    async fn touch_teacher(&self, teacher_id: &str, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn deactivate_teacher(&self, teacher_id: &str) -> Result<bool, AppError>;
}

/// Encrypted binary attachments scoped to a room
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn put_file(&self, room_id: &str, file_id: &str, data: Vec<u8>) -> Result<(), AppError>;

    async fn get_file(&self, room_id: &str, file_id: &str) -> Result<Vec<u8>, AppError>;
}

/// Everything the server persists
pub trait Storage: SceneStore + PermalinkStore + TeacherStore + FileStore {}

impl<T> Storage for T where T: SceneStore + PermalinkStore + TeacherStore + FileStore {}

impl From<SceneRecord> for SceneDocument {
    fn from(record: SceneRecord) -> Self {
        SceneDocument {
            room_id: record.room_id,
            scene_version: record.scene_version,
            iv: record.iv,
            ciphertext: record.ciphertext,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<PermalinkRecord> for PermalinkSummary {
    fn from(record: PermalinkRecord) -> Self {
        PermalinkSummary {
            permalink: record.permalink,
            room_id: record.room_id,
            room_key: record.room_key,
            student_name: record.student_name,
            created_at: record.created_at,
            last_accessed: record.last_accessed,
            is_active: record.is_active,
        }
    }
}

impl From<TeacherRecord> for TeacherSummary {
    fn from(record: TeacherRecord) -> Self {
        TeacherSummary {
            teacher_id: record.teacher_id,
            name: record.name,
            email: record.email,
            token: record.token,
            created_at: record.created_at,
            last_accessed: record.last_accessed,
            is_active: record.is_active,
        }
    }
}
