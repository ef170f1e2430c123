//! REST request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored encrypted scene as returned by `GET /api/scenes/{room_id}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SceneDocument {
    pub room_id: String,
    pub scene_version: i64,
    pub iv: String,
    pub ciphertext: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /api/scenes/{room_id}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SaveSceneRequest {
    pub scene_version: i64,
    pub iv: String,
    pub ciphertext: String,
}

/// Generic acknowledgement
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub const OK: Ack = Ack { ok: true };
}

/// Body of `POST /api/permalinks`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct CreatePermalinkRequest {
    pub room_id: String,
    pub room_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PermalinkCreated {
    pub permalink: String,
}

/// Body of `GET /api/permalinks/{permalink}`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPermalink {
    pub room_id: String,
    pub room_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
}

/// One row of a teacher's permalink listing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PermalinkSummary {
    pub permalink: String,
    pub room_id: String,
    pub room_key: String,
    pub student_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// `{ "items": [...] }` wrapper used by every listing endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Items<T> {
    pub items: Vec<T>,
}

/// Body of `POST /api/admin/teachers`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionTeacherRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedTeacher {
    pub teacher_id: String,
    pub token: String,
}

/// Body of `POST /api/admin/teachers/upload`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TeacherUploadRequest {
    pub csv: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadedTeacher {
    pub teacher_id: String,
    pub token: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A CSV row that could not be provisioned
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// 1-based line number in the uploaded text
    pub line: usize,
    pub reason: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TeacherUploadResponse {
    pub items: Vec<UploadedTeacher>,
    #[serde(default)]
    pub failed: Vec<UploadFailure>,
}

/// Admin view of a teacher, token included
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TeacherSummary {
    pub teacher_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Error body returned with every non-2xx REST response
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
