// ============================
// crates/backend-lib/src/permalinks.rs
// ============================
//! Permalink directory: stable share links mapping to `(room, key)`.
use crate::{
    auth::{generate_permalink, AccessGuard, TeacherGrant},
    error::AppError,
    metrics::{PERMALINK_CREATED, PERMALINK_RESOLVED},
    storage::{NewPermalink, PermalinkRecord, PermalinkStore, Storage, TeacherStore},
    validation::{is_valid_permalink, non_blank, validate_name, validate_room_id},
};
use boardsync_common::api::{CreatePermalinkRequest, ResolvedPermalink};
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lookup-then-insert rounds before giving up on a contended create
const MAX_CREATE_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct PermalinkDirectory {
    storage: Arc<dyn Storage>,
    guard: AccessGuard,
}

impl PermalinkDirectory {
    pub fn new(storage: Arc<dyn Storage>, guard: AccessGuard) -> Self {
        Self { storage, guard }
    }

    /// Create a link or return the one that already covers the request.
    ///
    /// Reuse order: the teacher's active link for the same student, then any
    /// active link for the same `(room_id, room_key)`. A lost insert race is
    /// answered by re-reading, never by an error.
    pub async fn create(&self, request: CreatePermalinkRequest) -> Result<String, AppError> {
        let room_id = validate_room_id(request.room_id.trim())?.to_string();
        let room_key = request.room_key.trim().to_string();
        if room_key.is_empty() {
            return Err(AppError::InvalidPayload("room_key must not be empty".to_string()));
        }
        let student_name = non_blank(request.student_name);
        if let Some(name) = &student_name {
            validate_name(name)?;
        }

        let teacher_id = match non_blank(request.teacher_id) {
            Some(teacher_id) => {
                let token = non_blank(request.teacher_token);
                let grant = self
                    .guard
                    .authorize_teacher(&teacher_id, token.as_deref(), true)
                    .await?;
                Some(grant.teacher_id().to_string())
            },
            None => None,
        };

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            if let Some(existing) = self.existing_link(&room_id, &room_key, &teacher_id, &student_name).await? {
                debug!(room_id = %room_id, permalink = %existing.permalink, "reusing active permalink");
                return Ok(existing.permalink);
            }

            let new = NewPermalink {
                permalink: generate_permalink(),
                room_id: room_id.clone(),
                room_key: room_key.clone(),
                student_name: student_name.clone(),
                teacher_id: teacher_id.clone(),
            };
            match self.storage.insert_permalink(new).await {
                Ok(record) => {
                    counter!(PERMALINK_CREATED).increment(1);
                    info!(
                        room_id = %room_id,
                        teacher_id = record.teacher_id.as_deref().unwrap_or("-"),
                        "permalink created"
                    );
                    return Ok(record.permalink);
                },
                Err(AppError::ConstraintConflict(what)) => {
                    debug!(attempt, what = %what, "permalink insert conflicted, re-reading");
                },
                Err(e) => return Err(e),
            }
        }

        Err(AppError::Internal(format!(
            "permalink create for room {room_id} still conflicting after {MAX_CREATE_ATTEMPTS} attempts"
        )))
    }

    async fn existing_link(
        &self,
        room_id: &str,
        room_key: &str,
        teacher_id: &Option<String>,
        student_name: &Option<String>,
    ) -> Result<Option<PermalinkRecord>, AppError> {
        if let (Some(teacher_id), Some(student_name)) = (teacher_id, student_name) {
            let found = self
                .storage
                .active_permalink_for_student(teacher_id, student_name)
                .await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        self.storage.active_permalink_for_room(room_id, room_key).await
    }

    /// Resolve an active link and record the access.
    ///
    /// Access stamping is best effort and never fails the read.
    pub async fn resolve(&self, permalink: &str) -> Result<ResolvedPermalink, AppError> {
        if !is_valid_permalink(permalink) {
            return Err(AppError::NotFound("permalink".to_string()));
        }
        let record = self
            .storage
            .active_permalink(permalink)
            .await?
            .ok_or_else(|| AppError::NotFound("permalink".to_string()))?;

        let now = Utc::now();
        if let Err(e) = self.storage.touch_permalink(permalink, now).await {
            warn!(permalink, error = %e, "failed to record permalink access");
        }
        if let Some(teacher_id) = &record.teacher_id {
            if let Err(e) = self.storage.touch_teacher(teacher_id, now).await {
                warn!(teacher_id = %teacher_id, error = %e, "failed to record teacher access");
            }
        }

        counter!(PERMALINK_RESOLVED).increment(1);
        Ok(ResolvedPermalink {
            room_id: record.room_id,
            room_key: record.room_key,
            student_name: record.student_name,
        })
    }

    /// The teacher's active links, newest first
    pub async fn list_for_teacher(&self, grant: &TeacherGrant) -> Result<Vec<PermalinkRecord>, AppError> {
        self.storage.permalinks_for_teacher(grant.teacher_id()).await
    }

    /// Soft-delete one of the teacher's links; unknown links are a no-op
    pub async fn deactivate(&self, permalink: &str, grant: &TeacherGrant) -> Result<(), AppError> {
        let changed = self
            .storage
            .deactivate_permalink(permalink, grant.teacher_id())
            .await?;
        info!(permalink, teacher_id = grant.teacher_id(), changed, "permalink deactivate");
        Ok(())
    }
}
