// ============================
// crates/backend-lib/src/storage/pg.rs
// ============================
//! Postgres adapter.
use super::{
    FileStore, NewPermalink, NewTeacher, PermalinkRecord, PermalinkStore, SceneRecord, SceneStore,
    TeacherRecord, TeacherStore,
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, query, query_as, query_scalar, PgPool};
use std::time::Duration;

const SCHEMA: [&str; 8] = [
    "CREATE TABLE IF NOT EXISTS scenes (
        room_id TEXT PRIMARY KEY,
        scene_version BIGINT NOT NULL,
        iv TEXT NOT NULL,
        ciphertext TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS permalinks (
        permalink TEXT PRIMARY KEY,
        room_id TEXT NOT NULL,
        room_key TEXT NOT NULL,
        student_name TEXT,
        teacher_id TEXT,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_accessed TIMESTAMPTZ,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS teachers (
        teacher_id TEXT PRIMARY KEY,
        name TEXT,
        email TEXT,
        token TEXT UNIQUE NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        last_accessed TIMESTAMPTZ,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )",
    "CREATE TABLE IF NOT EXISTS room_files (
        room_id TEXT NOT NULL,
        file_id TEXT NOT NULL,
        data BYTEA NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (room_id, file_id)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS uniq_permalinks_teacher_student
        ON permalinks (teacher_id, student_name)
        WHERE is_active AND teacher_id IS NOT NULL AND student_name IS NOT NULL",
    "CREATE UNIQUE INDEX IF NOT EXISTS uniq_permalinks_room_key
        ON permalinks (room_id, room_key)
        WHERE is_active",
    "CREATE INDEX IF NOT EXISTS idx_permalinks_teacher_id ON permalinks (teacher_id)",
    "CREATE INDEX IF NOT EXISTS idx_teachers_created_at ON teachers (created_at)",
];

/// Postgres implementation of the storage contract
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    /// Connect and create the schema if it is missing
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(url)
            .await
            .map_err(|e| AppError::StoreUnavailable(e.to_string()))?;

        let storage = Self { pool };
        storage.migrate().await?;
        Ok(storage)
    }

    async fn migrate(&self) -> Result<(), AppError> {
        for statement in SCHEMA {
            query(statement).execute(&self.pool).await?;
        }
        tracing::info!("postgres schema ready");
        Ok(())
    }
}

#[async_trait]
impl SceneStore for PgStorage {
    async fn get_scene(&self, room_id: &str) -> Result<SceneRecord, AppError> {
        query_as::<_, SceneRecord>(
            "SELECT room_id, scene_version, iv, ciphertext, created_at, updated_at
             FROM scenes WHERE room_id = $1",
        )
        .bind(room_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("scene".to_string()))
    }

    async fn put_scene(
        &self,
        room_id: &str,
        scene_version: i64,
        iv: &str,
        ciphertext: &str,
    ) -> Result<(), AppError> {
        query(
            "INSERT INTO scenes (room_id, scene_version, iv, ciphertext)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (room_id) DO UPDATE SET
                scene_version = EXCLUDED.scene_version,
                iv = EXCLUDED.iv,
                ciphertext = EXCLUDED.ciphertext,
                updated_at = NOW()",
        )
        .bind(room_id)
        .bind(scene_version)
        .bind(iv)
        .bind(ciphertext)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const PERMALINK_COLUMNS: &str =
    "permalink, room_id, room_key, student_name, teacher_id, created_at, last_accessed, is_active";

#[async_trait]
impl PermalinkStore for PgStorage {
    async fn insert_permalink(&self, new: NewPermalink) -> Result<PermalinkRecord, AppError> {
        let sql = format!(
            "INSERT INTO permalinks (permalink, room_id, room_key, student_name, teacher_id)
             VALUES ($1, $2, $3, $4, $5) RETURNING {PERMALINK_COLUMNS}"
        );
        let record = query_as::<_, PermalinkRecord>(&sql)
            .bind(&new.permalink)
            .bind(&new.room_id)
            .bind(&new.room_key)
            .bind(&new.student_name)
            .bind(&new.teacher_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(record)
    }

    async fn active_permalink(&self, permalink: &str) -> Result<Option<PermalinkRecord>, AppError> {
        let sql = format!("SELECT {PERMALINK_COLUMNS} FROM permalinks WHERE permalink = $1 AND is_active");
        Ok(query_as::<_, PermalinkRecord>(&sql)
            .bind(permalink)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_permalink_for_student(
        &self,
        teacher_id: &str,
        student_name: &str,
    ) -> Result<Option<PermalinkRecord>, AppError> {
        let sql = format!(
            "SELECT {PERMALINK_COLUMNS} FROM permalinks
             WHERE teacher_id = $1 AND student_name = $2 AND is_active LIMIT 1"
        );
        Ok(query_as::<_, PermalinkRecord>(&sql)
            .bind(teacher_id)
            .bind(student_name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn active_permalink_for_room(
        &self,
        room_id: &str,
        room_key: &str,
    ) -> Result<Option<PermalinkRecord>, AppError> {
        let sql = format!(
            "SELECT {PERMALINK_COLUMNS} FROM permalinks
             WHERE room_id = $1 AND room_key = $2 AND is_active LIMIT 1"
        );
        Ok(query_as::<_, PermalinkRecord>(&sql)
            .bind(room_id)
            .bind(room_key)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn permalinks_for_teacher(&self, teacher_id: &str) -> Result<Vec<PermalinkRecord>, AppError> {
        let sql = format!(
            "SELECT {PERMALINK_COLUMNS} FROM permalinks
             WHERE teacher_id = $1 AND is_active ORDER BY created_at DESC"
        );
        Ok(query_as::<_, PermalinkRecord>(&sql)
            .bind(teacher_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn touch_permalink(&self, permalink: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        query("UPDATE permalinks SET last_accessed = $2 WHERE permalink = $1")
            .bind(permalink)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_permalink(&self, permalink: &str, teacher_id: &str) -> Result<bool, AppError> {
        let result = query(
            "UPDATE permalinks SET is_active = FALSE
             WHERE permalink = $1 AND teacher_id = $2 AND is_active",
        )
        .bind(permalink)
        .bind(teacher_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

const TEACHER_COLUMNS: &str = "teacher_id, name, email, token, created_at, last_accessed, is_active";

#[async_trait]
impl TeacherStore for PgStorage {
    async fn insert_teacher(&self, new: NewTeacher) -> Result<TeacherRecord, AppError> {
        let sql = format!(
            "INSERT INTO teachers (teacher_id, name, email, token)
             VALUES ($1, $2, $3, $4) RETURNING {TEACHER_COLUMNS}"
        );
        Ok(query_as::<_, TeacherRecord>(&sql)
            .bind(&new.teacher_id)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.token)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn teacher(&self, teacher_id: &str) -> Result<Option<TeacherRecord>, AppError> {
        let sql = format!("SELECT {TEACHER_COLUMNS} FROM teachers WHERE teacher_id = $1");
        Ok(query_as::<_, TeacherRecord>(&sql)
            .bind(teacher_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_teachers(&self) -> Result<Vec<TeacherRecord>, AppError> {
        let sql = format!("SELECT {TEACHER_COLUMNS} FROM teachers ORDER BY created_at DESC");
        Ok(query_as::<_, TeacherRecord>(&sql).fetch_all(&self.pool).await?)
    }

    async fn touch_teacher(&self, teacher_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        query("UPDATE teachers SET last_accessed = $2 WHERE teacher_id = $1")
            .bind(teacher_id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn deactivate_teacher(&self, teacher_id: &str) -> Result<bool, AppError> {
        let result = query("UPDATE teachers SET is_active = FALSE WHERE teacher_id = $1 AND is_active")
            .bind(teacher_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FileStore for PgStorage {
    async fn put_file(&self, room_id: &str, file_id: &str, data: Vec<u8>) -> Result<(), AppError> {
        query(
            "INSERT INTO room_files (room_id, file_id, data) VALUES ($1, $2, $3)
             ON CONFLICT (room_id, file_id) DO UPDATE SET data = EXCLUDED.data, updated_at = NOW()",
        )
        .bind(room_id)
        .bind(file_id)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_file(&self, room_id: &str, file_id: &str) -> Result<Vec<u8>, AppError> {
        query_scalar::<_, Vec<u8>>("SELECT data FROM room_files WHERE room_id = $1 AND file_id = $2")
            .bind(room_id)
            .bind(file_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound("file".to_string()))
    }
}
