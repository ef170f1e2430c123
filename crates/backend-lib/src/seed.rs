// ============================
// crates/backend-lib/src/seed.rs
// ============================
//! Start-up seeding of a demo teacher and one student permalink.
use crate::{
    auth::{generate_permalink, generate_teacher_id, generate_teacher_token, token_generator::generate_secure_token_with_size},
    config::SeedSettings,
    error::AppError,
    storage::{NewPermalink, NewTeacher, PermalinkStore, Storage, TeacherStore},
    validation::{non_blank, validate_permalink, validate_room_id, validate_teacher_id},
};
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Random bytes in a generated seed room id / room key
const ROOM_ID_BYTES: usize = 10;
const ROOM_KEY_BYTES: usize = 16;

/// What seeding produced; the panel URL carries the teacher token
#[derive(Debug, Clone)]
pub struct SeedReport {
    pub teacher_id: String,
    pub permalink: String,
    pub teacher_panel_url: String,
    pub student_url: String,
}

/// Ensure the configured teacher and their test student's link exist.
///
/// Existing rows are reused, so running this on every start is harmless.
pub async fn seed_defaults(
    storage: &Arc<dyn Storage>,
    seed: &SeedSettings,
) -> Result<Option<SeedReport>, AppError> {
    if !seed.enabled {
        return Ok(None);
    }

    let teacher_id = non_blank(seed.teacher_id.clone()).unwrap_or_else(generate_teacher_id);
    validate_teacher_id(&teacher_id)?;

    let teacher = match storage.teacher(&teacher_id).await? {
        Some(existing) => existing,
        None => {
            let record = storage
                .insert_teacher(NewTeacher {
                    teacher_id: teacher_id.clone(),
                    name: non_blank(Some(seed.teacher_name.clone())),
                    email: non_blank(seed.teacher_email.clone()),
                    token: non_blank(seed.teacher_token.clone()).unwrap_or_else(generate_teacher_token),
                })
                .await?;
            info!(teacher_id = %record.teacher_id, "seed: created teacher");
            record
        },
    };

    let student_name =
        non_blank(Some(seed.student_name.clone())).unwrap_or_else(|| "Test Student".to_string());

    let permalink = match storage
        .active_permalink_for_student(&teacher.teacher_id, &student_name)
        .await?
    {
        Some(existing) => existing.permalink,
        None => insert_student_link(storage, seed, &teacher.teacher_id, &student_name).await?,
    };

    let origin = Url::parse(&seed.app_origin)
        .map_err(|e| AppError::InvalidPayload(format!("seed.app_origin: {e}")))?;

    let mut panel = origin.clone();
    panel
        .query_pairs_mut()
        .append_pair("teacher", &teacher.teacher_id)
        .append_pair("t", &teacher.token);

    let mut student = origin;
    student
        .query_pairs_mut()
        .append_pair("permalink", &permalink)
        .append_pair("student", &student_name);

    Ok(Some(SeedReport {
        teacher_id: teacher.teacher_id,
        permalink,
        teacher_panel_url: panel.into(),
        student_url: student.into(),
    }))
}

async fn insert_student_link(
    storage: &Arc<dyn Storage>,
    seed: &SeedSettings,
    teacher_id: &str,
    student_name: &str,
) -> Result<String, AppError> {
    let room_id = non_blank(seed.room_id.clone())
        .unwrap_or_else(|| generate_secure_token_with_size(ROOM_ID_BYTES));
    validate_room_id(&room_id)?;
    let room_key = non_blank(seed.room_key.clone())
        .unwrap_or_else(|| generate_secure_token_with_size(ROOM_KEY_BYTES));
    let permalink = non_blank(seed.permalink.clone()).unwrap_or_else(generate_permalink);
    validate_permalink(&permalink)?;

    let inserted = storage
        .insert_permalink(NewPermalink {
            permalink,
            room_id: room_id.clone(),
            room_key: room_key.clone(),
            student_name: Some(student_name.to_string()),
            teacher_id: Some(teacher_id.to_string()),
        })
        .await;

    match inserted {
        Ok(record) => {
            info!(permalink = %record.permalink, room_id = %room_id, "seed: created test permalink");
            Ok(record.permalink)
        },
        // the configured room already has a link of its own
        Err(AppError::ConstraintConflict(_)) => storage
            .active_permalink_for_room(&room_id, &room_key)
            .await?
            .map(|record| record.permalink)
            .ok_or_else(|| AppError::ConstraintConflict("seed permalink is taken".to_string())),
        Err(e) => Err(e),
    }
}
