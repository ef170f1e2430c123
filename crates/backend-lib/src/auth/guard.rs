// ============================
// crates/backend-lib/src/auth/guard.rs
// ============================
//! Access control for admin and teacher-scoped operations.
//!
//! Each credential type has exactly one entry point and yields a typed grant;
//! handlers that need authority take the grant as an argument.
use crate::{
    error::AppError,
    metrics::ACCESS_FORBIDDEN,
    storage::{Storage, TeacherStore},
    validation::validate_teacher_id,
};
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Proof that the caller presented the admin credential
#[derive(Debug)]
pub struct AdminGrant(());

/// Proof that the caller holds a valid token for an active teacher
#[derive(Debug, Clone)]
pub struct TeacherGrant {
    teacher_id: String,
}

impl TeacherGrant {
    pub fn teacher_id(&self) -> &str {
        &self.teacher_id
    }
}

#[derive(Clone)]
pub struct AccessGuard {
    admin_token: Option<String>,
    storage: Arc<dyn Storage>,
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

fn forbidden(reason: &'static str) -> AppError {
    counter!(ACCESS_FORBIDDEN).increment(1);
    tracing::debug!(reason, "access denied");
    AppError::Forbidden
}

impl AccessGuard {
    /// An empty or absent admin token closes every admin operation
    pub fn new(admin_token: Option<String>, storage: Arc<dyn Storage>) -> Self {
        Self {
            admin_token: admin_token.filter(|t| !t.is_empty()),
            storage,
        }
    }

    pub fn authorize_admin(&self, presented: Option<&str>) -> Result<AdminGrant, AppError> {
        let Some(expected) = self.admin_token.as_deref() else {
            return Err(forbidden("admin credential not configured"));
        };
        match presented {
            Some(presented) if constant_time_eq(presented, expected) => Ok(AdminGrant(())),
            Some(_) => Err(forbidden("admin credential mismatch")),
            None => Err(forbidden("admin credential missing")),
        }
    }

    /// Check `token` against the active teacher `teacher_id`.
    ///
    /// Storage failures propagate unchanged so an outage is never reported as
    /// a bad credential.
    pub async fn authorize_teacher(
        &self,
        teacher_id: &str,
        token: Option<&str>,
        update_access: bool,
    ) -> Result<TeacherGrant, AppError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(forbidden("teacher token missing"));
        };
        if validate_teacher_id(teacher_id).is_err() {
            return Err(forbidden("teacher id malformed"));
        }

        let teacher = match self.storage.teacher(teacher_id).await? {
            Some(teacher) if teacher.is_active => teacher,
            Some(_) => return Err(forbidden("teacher inactive")),
            None => return Err(forbidden("teacher unknown")),
        };
        if !constant_time_eq(token, &teacher.token) {
            return Err(forbidden("teacher token mismatch"));
        }

        if update_access {
            if let Err(e) = self.storage.touch_teacher(teacher_id, Utc::now()).await {
                tracing::warn!(teacher_id, error = %e, "failed to record teacher access");
            }
        }

        Ok(TeacherGrant {
            teacher_id: teacher.teacher_id,
        })
    }

    /// Boolean form of [`Self::authorize_teacher`]
    pub async fn validate_teacher_token(
        &self,
        teacher_id: &str,
        token: &str,
        update_access: bool,
    ) -> Result<bool, AppError> {
        match self.authorize_teacher(teacher_id, Some(token), update_access).await {
            Ok(_) => Ok(true),
            Err(AppError::Forbidden) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
