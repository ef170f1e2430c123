// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Input validation for identifiers and directory fields.

use crate::error::AppError;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

const MAX_NAME_LENGTH: usize = 200;
const MAX_EMAIL_LENGTH: usize = 254; // RFC 5321 SMTP limit
const MAX_IV_LENGTH: usize = 256;

// Regex patterns for validation
static ROOM_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("room id regex"));
static PERMALINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{4,64}$").expect("permalink regex"));
static TEACHER_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("teacher id regex"));
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex")
});

/// Possible validation errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid room id: {0}")]
    InvalidRoomId(String),

    #[error("Invalid file id: {0}")]
    InvalidFileId(String),

    #[error("Invalid permalink: {0}")]
    InvalidPermalink(String),

    #[error("Invalid teacher id: {0}")]
    InvalidTeacherId(String),

    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error("Invalid name: {0}")]
    InvalidName(String),

    #[error("Invalid scene: {0}")]
    InvalidScene(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidPayload(err.to_string())
    }
}

/// Trim a user-supplied optional field; blank counts as absent
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn validate_room_id(room_id: &str) -> ValidationResult<&str> {
    if ROOM_ID_REGEX.is_match(room_id) {
        Ok(room_id)
    } else {
        Err(ValidationError::InvalidRoomId(
            "Room id must be 1-128 characters of A-Z, a-z, 0-9, '_' or '-'".to_string(),
        ))
    }
}

pub fn validate_file_id(file_id: &str) -> ValidationResult<&str> {
    if ROOM_ID_REGEX.is_match(file_id) {
        Ok(file_id)
    } else {
        Err(ValidationError::InvalidFileId(
            "File id must be 1-128 characters of A-Z, a-z, 0-9, '_' or '-'".to_string(),
        ))
    }
}

pub fn is_valid_permalink(permalink: &str) -> bool {
    PERMALINK_REGEX.is_match(permalink)
}

pub fn validate_permalink(permalink: &str) -> ValidationResult<&str> {
    if is_valid_permalink(permalink) {
        Ok(permalink)
    } else {
        Err(ValidationError::InvalidPermalink(
            "Permalink must be 4-64 url-safe characters".to_string(),
        ))
    }
}

pub fn is_valid_teacher_id(teacher_id: &str) -> bool {
    TEACHER_ID_REGEX.is_match(teacher_id)
}

pub fn validate_teacher_id(teacher_id: &str) -> ValidationResult<&str> {
    if is_valid_teacher_id(teacher_id) {
        Ok(teacher_id)
    } else {
        Err(ValidationError::InvalidTeacherId(
            "Teacher id must be 1-64 url-safe characters".to_string(),
        ))
    }
}

/// Validate an email address
pub fn validate_email(email: &str) -> ValidationResult<&str> {
    if email.len() > MAX_EMAIL_LENGTH {
        return Err(ValidationError::InvalidEmail(format!(
            "Email address cannot exceed {MAX_EMAIL_LENGTH} characters"
        )));
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err(ValidationError::InvalidEmail(
            "Invalid email address format".to_string(),
        ));
    }

    Ok(email)
}

/// Display names and student labels
pub fn validate_name(name: &str) -> ValidationResult<&str> {
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ValidationError::InvalidName(format!(
            "Name cannot exceed {MAX_NAME_LENGTH} characters"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(ValidationError::InvalidName(
            "Name contains control characters".to_string(),
        ));
    }
    Ok(name)
}

/// Shape check of an encrypted scene; the payload itself is opaque
pub fn validate_scene(scene_version: i64, iv: &str) -> ValidationResult<()> {
    if scene_version < 0 {
        return Err(ValidationError::InvalidScene(
            "scene_version must not be negative".to_string(),
        ));
    }
    if iv.is_empty() || iv.len() > MAX_IV_LENGTH {
        return Err(ValidationError::InvalidScene(format!(
            "iv must be 1-{MAX_IV_LENGTH} characters"
        )));
    }
    Ok(())
}
