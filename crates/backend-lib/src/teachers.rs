// ============================
// crates/backend-lib/src/teachers.rs
// ============================
//! Teacher directory: admin-only provisioning and listing.
use crate::{
    auth::{generate_teacher_id, generate_teacher_token, AdminGrant},
    error::AppError,
    metrics::TEACHER_PROVISIONED,
    storage::{NewTeacher, Storage, TeacherRecord, TeacherStore},
    validation::{non_blank, validate_email, validate_name, validate_teacher_id},
};
use boardsync_common::api::{TeacherUploadResponse, UploadFailure, UploadedTeacher};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Fresh id/token pairs tried before a provision gives up
const MAX_PROVISION_ATTEMPTS: usize = 5;

#[derive(Clone)]
pub struct TeacherDirectory {
    storage: Arc<dyn Storage>,
}

/// A CSV row that passed parsing, with its 1-based line number
#[derive(Debug, Clone, PartialEq, Eq)]
struct CsvRow {
    line: usize,
    name: Option<String>,
    email: Option<String>,
}

fn looks_like_header(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    lower.contains("name") || lower.contains("email")
}

/// Split `name,email` lines, skipping blank lines and a leading header
fn parse_csv(csv: &str) -> Vec<CsvRow> {
    let mut rows = csv
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .peekable();

    if rows.peek().is_some_and(|(_, first)| looks_like_header(first)) {
        rows.next();
    }

    rows.map(|(index, line)| {
        let mut parts = line.split(',').map(|part| part.trim().to_string());
        CsvRow {
            line: index + 1,
            name: non_blank(parts.next()),
            email: non_blank(parts.next()),
        }
    })
    .collect()
}

impl TeacherDirectory {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create one teacher with a fresh id and token
    pub async fn provision(
        &self,
        _grant: &AdminGrant,
        name: Option<String>,
        email: Option<String>,
    ) -> Result<TeacherRecord, AppError> {
        let name = non_blank(name);
        let email = non_blank(email);
        if let Some(name) = &name {
            validate_name(name)?;
        }
        if let Some(email) = &email {
            validate_email(email)?;
        }
        self.insert_fresh(name, email).await
    }

    async fn insert_fresh(&self, name: Option<String>, email: Option<String>) -> Result<TeacherRecord, AppError> {
        for attempt in 1..=MAX_PROVISION_ATTEMPTS {
            let new = NewTeacher {
                teacher_id: generate_teacher_id(),
                name: name.clone(),
                email: email.clone(),
                token: generate_teacher_token(),
            };
            match self.storage.insert_teacher(new).await {
                Ok(record) => {
                    counter!(TEACHER_PROVISIONED).increment(1);
                    info!(teacher_id = %record.teacher_id, "teacher provisioned");
                    return Ok(record);
                },
                Err(AppError::ConstraintConflict(what)) => {
                    debug!(attempt, what = %what, "teacher id or token collided, regenerating");
                },
                Err(e) => return Err(e),
            }
        }
        Err(AppError::Internal(
            "could not allocate a unique teacher id".to_string(),
        ))
    }

    /// Provision one teacher per CSV line.
    ///
    /// Rows with a malformed name or email are reported in `failed`; a store
    /// error aborts the batch.
    pub async fn provision_batch(
        &self,
        _grant: &AdminGrant,
        csv: &str,
    ) -> Result<TeacherUploadResponse, AppError> {
        let rows = parse_csv(csv);
        let mut items = Vec::with_capacity(rows.len());
        let mut failed = Vec::new();

        for row in rows {
            let invalid = row
                .name
                .as_deref()
                .map(validate_name)
                .transpose()
                .err()
                .or_else(|| row.email.as_deref().map(validate_email).transpose().err());
            if let Some(reason) = invalid {
                warn!(line = row.line, reason = %reason, "skipping csv row");
                failed.push(UploadFailure {
                    line: row.line,
                    reason: reason.to_string(),
                });
                continue;
            }

            let record = self.insert_fresh(row.name, row.email).await?;
            items.push(UploadedTeacher {
                teacher_id: record.teacher_id,
                token: record.token,
                name: record.name,
                email: record.email,
            });
        }

        info!(provisioned = items.len(), failed = failed.len(), "teacher batch upload");
        Ok(TeacherUploadResponse { items, failed })
    }

    /// Every teacher, tokens included, newest first
    pub async fn list(&self, _grant: &AdminGrant) -> Result<Vec<TeacherRecord>, AppError> {
        self.storage.list_teachers().await
    }

    /// Soft-deactivate a teacher; their token stops validating
    pub async fn deactivate(&self, _grant: &AdminGrant, teacher_id: &str) -> Result<(), AppError> {
        validate_teacher_id(teacher_id)?;
        if self.storage.deactivate_teacher(teacher_id).await? {
            info!(teacher_id, "teacher deactivated");
            Ok(())
        } else {
            match self.storage.teacher(teacher_id).await? {
                Some(_) => Ok(()),
                None => Err(AppError::NotFound("teacher".to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AccessGuard;
    use crate::storage::FlatFileStorage;
    use tempfile::{tempdir, TempDir};

    fn setup() -> (TeacherDirectory, AdminGrant, AccessGuard, TempDir) {
        let dir = tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(FlatFileStorage::new(dir.path()).unwrap());
        let guard = AccessGuard::new(Some("admin".to_string()), storage.clone());
        let grant = guard.authorize_admin(Some("admin")).unwrap();
        (TeacherDirectory::new(storage), grant, guard, dir)
    }

    #[test]
    fn test_parse_csv_skips_header_and_blanks() {
        let rows = parse_csv("name,email\nAnna,a@x.com\n\n  \nBob,b@x.com\n");
        assert_eq!(
            rows,
            vec![
                CsvRow { line: 2, name: Some("Anna".into()), email: Some("a@x.com".into()) },
                CsvRow { line: 5, name: Some("Bob".into()), email: Some("b@x.com".into()) },
            ]
        );
    }

    #[test]
    fn test_parse_csv_without_header() {
        let rows = parse_csv("Anna,a@x.com\r\nBob\r\n");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].name.as_deref(), Some("Bob"));
        assert_eq!(rows[1].email, None);
        assert!(parse_csv("").is_empty());
    }

    #[tokio::test]
    async fn test_batch_upload_provisions_each_row() {
        let (teachers, grant, guard, _dir) = setup();
        let response = teachers
            .provision_batch(&grant, "name,email\nAnna,a@x.com\nBob,b@x.com")
            .await
            .unwrap();

        assert_eq!(response.items.len(), 2);
        assert!(response.failed.is_empty());
        assert_eq!(response.items[0].name.as_deref(), Some("Anna"));
        for item in &response.items {
            assert!(guard
                .validate_teacher_token(&item.teacher_id, &item.token, false)
                .await
                .unwrap());
        }
        assert_ne!(response.items[0].token, response.items[1].token);
    }

    #[tokio::test]
    async fn test_batch_upload_reports_bad_rows() {
        let (teachers, grant, _guard, _dir) = setup();
        let response = teachers
            .provision_batch(&grant, "Anna,a@x.com\nBroken,not-an-email\nCid,")
            .await
            .unwrap();

        assert_eq!(response.items.len(), 2);
        assert_eq!(response.failed.len(), 1);
        assert_eq!(response.failed[0].line, 2);
    }

    #[tokio::test]
    async fn test_provision_list_and_deactivate() {
        let (teachers, grant, guard, _dir) = setup();
        let first = teachers
            .provision(&grant, Some("Ada".into()), Some("ada@school.org".into()))
            .await
            .unwrap();
        let second = teachers.provision(&grant, Some(" ".into()), None).await.unwrap();
        assert_eq!(second.name, None);

        let listed = teachers.list(&grant).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].teacher_id, second.teacher_id);

        teachers.deactivate(&grant, &first.teacher_id).await.unwrap();
        teachers.deactivate(&grant, &first.teacher_id).await.unwrap();
        assert!(!guard
            .validate_teacher_token(&first.teacher_id, &first.token, false)
            .await
            .unwrap());
        assert!(matches!(
            teachers.deactivate(&grant, "nobody").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_provision_rejects_bad_email() {
        let (teachers, grant, _guard, _dir) = setup();
        assert!(matches!(
            teachers.provision(&grant, Some("Ada".into()), Some("nope".into())).await,
            Err(AppError::InvalidPayload(_))
        ));
    }
}
