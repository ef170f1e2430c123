// ============================
// crates/backend-lib/src/storage/flat_file.rs
// ============================
//! Embedded file-based adapter.
//!
//! Layout under the data directory:
//! - `scenes/<room>.json`: one snapshot per room
//! - `files/<room>/<file>.bin`: room attachments
//! - `permalinks.json`, `teachers.json`: directory tables
//!
//! Path segments are base64url-encoded identifiers.
use super::{
    FileStore, NewPermalink, NewTeacher, PermalinkRecord, PermalinkStore, SceneRecord, SceneStore,
    TeacherRecord, TeacherStore,
};
use crate::error::AppError;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::{
    fs,
    future::Future,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs as tokio_fs, io::AsyncWriteExt, sync::Mutex};

const PERMALINKS_FILE: &str = "permalinks.json";
const TEACHERS_FILE: &str = "teachers.json";

#[derive(Default)]
struct Tables {
    permalinks: Vec<PermalinkRecord>,
    teachers: Vec<TeacherRecord>,
}

/// Flat-file implementation of the storage contract
pub struct FlatFileStorage {
    root: PathBuf,
    /// Serialises writers of the same scene or file
    locks: DashMap<String, Arc<Mutex<()>>>,
    tables: Mutex<Tables>,
}

impl FlatFileStorage {
    pub fn new<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("scenes"))?;
        fs::create_dir_all(root.join("files"))?;

        let tables = Tables {
            permalinks: load_table(&root.join(PERMALINKS_FILE))?,
            teachers: load_table(&root.join(TEACHERS_FILE))?,
        };
        tracing::info!(
            root = %root.display(),
            permalinks = tables.permalinks.len(),
            teachers = tables.teachers.len(),
            "flat-file storage opened"
        );

        Ok(Self {
            root,
            locks: DashMap::new(),
            tables: Mutex::new(tables),
        })
    }

    /// Run `op` holding the lock for `key`; the entry is dropped again once
    /// no other writer is waiting on it
    async fn locked<T>(&self, key: String, op: impl Future<Output = T>) -> T {
        let lock = self.locks.entry(key.clone()).or_default().clone();
        let out = {
            let _guard = lock.lock().await;
            op.await
        };
        drop(lock);
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);
        out
    }

    fn scene_path(&self, room_id: &str) -> PathBuf {
        self.root
            .join("scenes")
            .join(format!("{}.json", encode_segment(room_id)))
    }

    fn file_path(&self, room_id: &str, file_id: &str) -> PathBuf {
        self.root
            .join("files")
            .join(encode_segment(room_id))
            .join(format!("{}.bin", encode_segment(file_id)))
    }

    async fn save_permalinks(&self, tables: &Tables) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(&tables.permalinks)?;
        write_atomic(&self.root.join(PERMALINKS_FILE), &json).await
    }

    async fn save_teachers(&self, tables: &Tables) -> Result<(), AppError> {
        let json = serde_json::to_vec_pretty(&tables.teachers)?;
        write_atomic(&self.root.join(TEACHERS_FILE), &json).await
    }

    /// Change one permalink row and persist; the row is restored if the
    /// write fails so memory never runs ahead of disk
    async fn commit_permalink(
        &self,
        tables: &mut Tables,
        idx: usize,
        change: impl FnOnce(&mut PermalinkRecord),
    ) -> Result<(), AppError> {
        let before = tables.permalinks[idx].clone();
        change(&mut tables.permalinks[idx]);
        if let Err(e) = self.save_permalinks(tables).await {
            tables.permalinks[idx] = before;
            return Err(e);
        }
        Ok(())
    }

    async fn commit_teacher(
        &self,
        tables: &mut Tables,
        idx: usize,
        change: impl FnOnce(&mut TeacherRecord),
    ) -> Result<(), AppError> {
        let before = tables.teachers[idx].clone();
        change(&mut tables.teachers[idx]);
        if let Err(e) = self.save_teachers(tables).await {
            tables.teachers[idx] = before;
            return Err(e);
        }
        Ok(())
    }
}

fn encode_segment(id: &str) -> String {
    URL_SAFE_NO_PAD.encode(id.as_bytes())
}

fn load_table<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(e.into()),
    }
}

/// The data directory failing under us is an outage, not a bug
fn unavailable(e: std::io::Error) -> AppError {
    AppError::StoreUnavailable(e.to_string())
}

/// Write to a sibling temp file, then rename over the target
async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), AppError> {
    if let Some(parent) = path.parent() {
        tokio_fs::create_dir_all(parent).await.map_err(unavailable)?;
    }
    let tmp = path.with_extension("tmp");

    let mut file = tokio_fs::File::create(&tmp).await.map_err(unavailable)?;
    file.write_all(contents).await.map_err(unavailable)?;
    file.sync_all().await.map_err(unavailable)?;
    drop(file);

    tokio_fs::rename(&tmp, path).await.map_err(unavailable)
}

async fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, AppError> {
    match tokio_fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound(what.to_string())),
        Err(e) => Err(unavailable(e)),
    }
}

fn newest_first<T>(
    rows: impl DoubleEndedIterator<Item = T>,
    created_at: impl Fn(&T) -> DateTime<Utc>,
) -> Vec<T> {
    // Reverse insertion order first so equal timestamps list the later row first
    let mut rows: Vec<T> = rows.rev().collect();
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    rows
}

fn same<T: PartialEq>(stored: &Option<T>, wanted: &T) -> bool {
    stored.as_ref() == Some(wanted)
}

#[async_trait]
impl SceneStore for FlatFileStorage {
    async fn get_scene(&self, room_id: &str) -> Result<SceneRecord, AppError> {
        read_json(&self.scene_path(room_id), "scene").await
    }

    async fn put_scene(
        &self,
        room_id: &str,
        scene_version: i64,
        iv: &str,
        ciphertext: &str,
    ) -> Result<(), AppError> {
        let path = self.scene_path(room_id);
        self.locked(format!("scene:{room_id}"), async {
            let now = Utc::now();
            let created_at = match read_json::<SceneRecord>(&path, "scene").await {
                Ok(existing) => existing.created_at,
                Err(AppError::NotFound(_)) => now,
                Err(e) => return Err(e),
            };

            let record = SceneRecord {
                room_id: room_id.to_string(),
                scene_version,
                iv: iv.to_string(),
                ciphertext: ciphertext.to_string(),
                created_at,
                updated_at: now,
            };
            write_atomic(&path, &serde_json::to_vec(&record)?).await
        })
        .await
    }
}

#[async_trait]
impl PermalinkStore for FlatFileStorage {
    async fn insert_permalink(&self, new: NewPermalink) -> Result<PermalinkRecord, AppError> {
        let mut tables = self.tables.lock().await;

        if tables.permalinks.iter().any(|p| p.permalink == new.permalink) {
            return Err(AppError::ConstraintConflict("permalink token".to_string()));
        }
        if let (Some(teacher_id), Some(student_name)) = (&new.teacher_id, &new.student_name) {
            let taken = tables.permalinks.iter().any(|p| {
                p.is_active && same(&p.teacher_id, teacher_id) && same(&p.student_name, student_name)
            });
            if taken {
                return Err(AppError::ConstraintConflict("teacher student pair".to_string()));
            }
        }
        let room_taken = tables
            .permalinks
            .iter()
            .any(|p| p.is_active && p.room_id == new.room_id && p.room_key == new.room_key);
        if room_taken {
            return Err(AppError::ConstraintConflict("room link".to_string()));
        }

        let record = PermalinkRecord {
            permalink: new.permalink,
            room_id: new.room_id,
            room_key: new.room_key,
            student_name: new.student_name,
            teacher_id: new.teacher_id,
            created_at: Utc::now(),
            last_accessed: None,
            is_active: true,
        };
        tables.permalinks.push(record.clone());
        if let Err(e) = self.save_permalinks(&tables).await {
            tables.permalinks.pop();
            return Err(e);
        }
        Ok(record)
    }

    async fn active_permalink(&self, permalink: &str) -> Result<Option<PermalinkRecord>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .permalinks
            .iter()
            .find(|p| p.is_active && p.permalink == permalink)
            .cloned())
    }

    async fn active_permalink_for_student(
        &self,
        teacher_id: &str,
        student_name: &str,
    ) -> Result<Option<PermalinkRecord>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .permalinks
            .iter()
            .find(|p| {
                p.is_active
                    && p.teacher_id.as_deref() == Some(teacher_id)
                    && p.student_name.as_deref() == Some(student_name)
            })
            .cloned())
    }

    async fn active_permalink_for_room(
        &self,
        room_id: &str,
        room_key: &str,
    ) -> Result<Option<PermalinkRecord>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .permalinks
            .iter()
            .find(|p| p.is_active && p.room_id == room_id && p.room_key == room_key)
            .cloned())
    }

    async fn permalinks_for_teacher(&self, teacher_id: &str) -> Result<Vec<PermalinkRecord>, AppError> {
        let tables = self.tables.lock().await;
        let owned = tables
            .permalinks
            .iter()
            .filter(|p| p.is_active && p.teacher_id.as_deref() == Some(teacher_id))
            .cloned();
        Ok(newest_first(owned, |p| p.created_at))
    }

    async fn touch_permalink(&self, permalink: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let Some(idx) = tables.permalinks.iter().position(|p| p.permalink == permalink) else {
            return Ok(());
        };
        self.commit_permalink(&mut tables, idx, |row| row.last_accessed = Some(at))
            .await
    }

    async fn deactivate_permalink(&self, permalink: &str, teacher_id: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        let found = tables.permalinks.iter().position(|p| {
            p.is_active && p.permalink == permalink && p.teacher_id.as_deref() == Some(teacher_id)
        });
        let Some(idx) = found else {
            return Ok(false);
        };
        self.commit_permalink(&mut tables, idx, |row| row.is_active = false)
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl TeacherStore for FlatFileStorage {
    async fn insert_teacher(&self, new: NewTeacher) -> Result<TeacherRecord, AppError> {
        let mut tables = self.tables.lock().await;

        if tables.teachers.iter().any(|t| t.teacher_id == new.teacher_id) {
            return Err(AppError::ConstraintConflict("teacher id".to_string()));
        }
        if tables.teachers.iter().any(|t| t.token == new.token) {
            return Err(AppError::ConstraintConflict("teacher token".to_string()));
        }

        let record = TeacherRecord {
            teacher_id: new.teacher_id,
            name: new.name,
            email: new.email,
            token: new.token,
            created_at: Utc::now(),
            last_accessed: None,
            is_active: true,
        };
        tables.teachers.push(record.clone());
        if let Err(e) = self.save_teachers(&tables).await {
            tables.teachers.pop();
            return Err(e);
        }
        Ok(record)
    }

    async fn teacher(&self, teacher_id: &str) -> Result<Option<TeacherRecord>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .teachers
            .iter()
            .find(|t| t.teacher_id == teacher_id)
            .cloned())
    }

    async fn list_teachers(&self) -> Result<Vec<TeacherRecord>, AppError> {
        let tables = self.tables.lock().await;
        Ok(newest_first(tables.teachers.iter().cloned(), |t| t.created_at))
    }

    async fn touch_teacher(&self, teacher_id: &str, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut tables = self.tables.lock().await;
        let Some(idx) = tables.teachers.iter().position(|t| t.teacher_id == teacher_id) else {
            return Ok(());
        };
        self.commit_teacher(&mut tables, idx, |row| row.last_accessed = Some(at))
            .await
    }

    async fn deactivate_teacher(&self, teacher_id: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().await;
        let found = tables
            .teachers
            .iter()
            .position(|t| t.is_active && t.teacher_id == teacher_id);
        let Some(idx) = found else {
            return Ok(false);
        };
        self.commit_teacher(&mut tables, idx, |row| row.is_active = false)
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl FileStore for FlatFileStorage {
    async fn put_file(&self, room_id: &str, file_id: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.file_path(room_id, file_id);
        self.locked(format!("file:{room_id}/{file_id}"), write_atomic(&path, &data))
            .await
    }

    async fn get_file(&self, room_id: &str, file_id: &str) -> Result<Vec<u8>, AppError> {
        match tokio_fs::read(self.file_path(room_id, file_id)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound("file".to_string())),
            Err(e) => Err(unavailable(e)),
        }
    }
}
