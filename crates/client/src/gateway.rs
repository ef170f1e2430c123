// ============================
// crates/client/src/gateway.rs
// ============================
//! Client persistence gateway.
//!
//! A [`CollabSession`] tracks one joined room. Saving fetches the stored
//! snapshot, reconciles it with the local elements when someone else wrote
//! in between, and persists the merge with a version that never goes
//! backwards. Broadcast payloads are sealed with the same room key, so the
//! relay only ever sees ciphertext.
use crate::api::SceneApi;
use crate::cipher::SceneCipher;
use crate::error::ClientError;
use boardsync_common::api::{SaveSceneRequest, SceneDocument};
use boardsync_common::{reconcile, retain_syncable, scene_version, ClientToServer, Element, LocalAppState};
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded exponential backoff for retryable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// `max_attempts` is used up
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt - 1);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Unsynced,
    Saving,
    Synced,
}

/// Result of loading a room
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedScene {
    /// Nothing stored yet; start with a blank canvas
    Fresh,
    Restored(Vec<Element>),
}

/// What a save persisted
#[derive(Debug, Clone, PartialEq)]
pub struct SavedScene {
    pub scene_version: i64,
    pub elements: Vec<Element>,
}

/// Per-room client state, alive for as long as the client is in the room
#[derive(Debug)]
pub struct CollabSession {
    room_id: String,
    room_key: String,
    cipher: SceneCipher,
    last_saved_version: Option<i64>,
    state: SyncState,
    retry: RetryPolicy,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl CollabSession {
    pub fn new(room_id: impl Into<String>, room_key: impl Into<String>) -> Result<Self, ClientError> {
        let room_key = room_key.into();
        let cipher = SceneCipher::from_room_key(&room_key)?;
        Ok(Self {
            room_id: room_id.into(),
            room_key,
            cipher,
            last_saved_version: None,
            state: SyncState::Unsynced,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The key in share-link form, for building invite links
    pub fn room_key(&self) -> &str {
        &self.room_key
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Version of the snapshot this session last loaded or saved
    pub fn last_saved_version(&self) -> Option<i64> {
        self.last_saved_version
    }

    /// True when `elements` is exactly what this session last synced, so a
    /// save has nothing to send
    pub fn is_saved(&self, elements: &[Element]) -> bool {
        self.state == SyncState::Synced && self.last_saved_version == Some(scene_version(elements))
    }

    /// Record a local edit; the next save goes to the server even if the
    /// element versions happen to add up to the synced version
    pub fn mark_dirty(&mut self) {
        if self.state == SyncState::Synced {
            self.state = SyncState::Unsynced;
        }
    }

    fn open_scene(&self, scene: &SceneDocument) -> Result<Vec<Element>, ClientError> {
        let plaintext = self.cipher.decrypt(&scene.iv, &scene.ciphertext)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Load the room's stored scene.
    ///
    /// A snapshot that fails to decrypt is an error, never `Fresh`.
    pub async fn load(&mut self, api: &dyn SceneApi) -> Result<LoadedScene, ClientError> {
        let stored = self.retry.run(|| api.fetch_scene(&self.room_id)).await?;
        match stored {
            None => {
                debug!(room_id = %self.room_id, "no stored scene");
                self.last_saved_version = None;
                self.state = SyncState::Unsynced;
                Ok(LoadedScene::Fresh)
            },
            Some(scene) => {
                let mut elements = self.open_scene(&scene)?;
                retain_syncable(&mut elements, now_ms());
                self.last_saved_version = Some(scene.scene_version);
                self.state = SyncState::Synced;
                Ok(LoadedScene::Restored(elements))
            },
        }
    }

    /// Persist `local`, merging in whatever another client stored since this
    /// session last synced. Returns the merged elements for the caller to
    /// apply.
    pub async fn save(
        &mut self,
        api: &dyn SceneApi,
        local: &[Element],
        app_state: &LocalAppState,
    ) -> Result<SavedScene, ClientError> {
        if let Some(version) = self.last_saved_version.filter(|_| self.is_saved(local)) {
            debug!(room_id = %self.room_id, scene_version = version, "scene already saved");
            return Ok(SavedScene {
                scene_version: version,
                elements: local.to_vec(),
            });
        }
        self.state = SyncState::Saving;
        match self.save_inner(api, local, app_state).await {
            Ok(saved) => {
                self.last_saved_version = Some(saved.scene_version);
                self.state = SyncState::Synced;
                info!(room_id = %self.room_id, scene_version = saved.scene_version, "scene saved");
                Ok(saved)
            },
            Err(e) => {
                self.state = SyncState::Unsynced;
                Err(e)
            },
        }
    }

    async fn save_inner(
        &self,
        api: &dyn SceneApi,
        local: &[Element],
        app_state: &LocalAppState,
    ) -> Result<SavedScene, ClientError> {
        let now = now_ms();
        let mut elements = local.to_vec();
        retain_syncable(&mut elements, now);

        let remote = self.retry.run(|| api.fetch_scene(&self.room_id)).await?;
        let remote_version = remote.as_ref().map_or(0, |scene| scene.scene_version);

        if let Some(scene) = remote.filter(|scene| Some(scene.scene_version) != self.last_saved_version) {
            debug!(
                room_id = %self.room_id,
                remote_version = scene.scene_version,
                cached_version = ?self.last_saved_version,
                "stored scene diverged, reconciling"
            );
            let mut stored = self.open_scene(&scene)?;
            retain_syncable(&mut stored, now);
            elements = reconcile(&elements, &stored, app_state);
            retain_syncable(&mut elements, now);
        }

        let version = scene_version(&elements).max(remote_version);
        let sealed = self.cipher.encrypt(&serde_json::to_vec(&elements)?)?;
        let request = SaveSceneRequest {
            scene_version: version,
            iv: sealed.iv,
            ciphertext: sealed.ciphertext,
        };
        self.retry
            .run(|| api.store_scene(&self.room_id, &request))
            .await?;

        Ok(SavedScene {
            scene_version: version,
            elements,
        })
    }

    /// Encrypt a realtime payload into a broadcast frame for this room
    pub fn seal_update<T: Serialize>(&self, payload: &T, volatile: bool) -> Result<ClientToServer, ClientError> {
        let sealed = self.cipher.encrypt(&serde_json::to_vec(payload)?)?;
        let room_id = self.room_id.clone();
        Ok(if volatile {
            ClientToServer::ServerVolatileBroadcast {
                room_id,
                data: sealed.ciphertext,
                iv: sealed.iv,
            }
        } else {
            ClientToServer::ServerBroadcast {
                room_id,
                data: sealed.ciphertext,
                iv: sealed.iv,
            }
        })
    }

    /// Decrypt the `data`/`iv` of a received `client-broadcast`
    pub fn open_update<T: DeserializeOwned>(&self, data: &str, iv: &str) -> Result<T, ClientError> {
        let plaintext = self.cipher.decrypt(iv, data)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::generate_room_key;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::Mutex;

    /// In-memory scene store with optional injected outages
    #[derive(Default)]
    struct MemoryApi {
        scenes: Mutex<HashMap<String, SceneDocument>>,
        outages: AtomicU32,
        fetches: AtomicU32,
    }

    impl MemoryApi {
        fn failing(times: u32) -> Self {
            let api = Self::default();
            api.outages.store(times, Ordering::SeqCst);
            api
        }

        fn outage(&self) -> Result<(), ClientError> {
            let left = self.outages.load(Ordering::SeqCst);
            if left > 0 {
                self.outages.store(left - 1, Ordering::SeqCst);
                return Err(ClientError::StoreUnavailable("db down".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SceneApi for MemoryApi {
        async fn fetch_scene(&self, room_id: &str) -> Result<Option<SceneDocument>, ClientError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.outage()?;
            Ok(self.scenes.lock().await.get(room_id).cloned())
        }

        async fn store_scene(&self, room_id: &str, scene: &SaveSceneRequest) -> Result<(), ClientError> {
            self.outage()?;
            let now = Utc::now();
            self.scenes.lock().await.insert(
                room_id.to_string(),
                SceneDocument {
                    room_id: room_id.to_string(),
                    scene_version: scene.scene_version,
                    iv: scene.iv.clone(),
                    ciphertext: scene.ciphertext.clone(),
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(())
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        }
    }

    fn ids(elements: &[Element]) -> Vec<&str> {
        let mut ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    #[tokio::test]
    async fn test_fresh_room_loads_as_fresh() {
        let api = MemoryApi::default();
        let mut session = CollabSession::new("r1", generate_room_key()).unwrap();

        assert_eq!(session.load(&api).await.unwrap(), LoadedScene::Fresh);
        assert_eq!(session.state(), SyncState::Unsynced);
        assert_eq!(session.last_saved_version(), None);
    }

    #[tokio::test]
    async fn test_stale_writer_merges_instead_of_overwriting() {
        let api = MemoryApi::default();
        let key = generate_room_key();
        let app_state = LocalAppState::default();

        // both clients start from the same version-3 scene
        let base = vec![Element::new("shared", 3, 1).with_index("a0")];
        let mut first = CollabSession::new("r2", key.clone()).unwrap();
        first.save(&api, &base, &app_state).await.unwrap();
        let mut second = CollabSession::new("r2", key).unwrap();
        assert_eq!(
            second.load(&api).await.unwrap(),
            LoadedScene::Restored(base.clone())
        );

        // first moves ahead to version 5
        let first_edit = vec![
            Element::new("shared", 3, 1).with_index("a0"),
            Element::new("from-first", 2, 7).with_index("a1"),
        ];
        let saved = first.save(&api, &first_edit, &app_state).await.unwrap();
        assert_eq!(saved.scene_version, 5);

        // second still thinks the room is at 3 and adds its own element
        let second_edit = vec![
            Element::new("shared", 3, 1).with_index("a0"),
            Element::new("from-second", 1, 9).with_index("a2"),
        ];
        let merged = second.save(&api, &second_edit, &app_state).await.unwrap();

        assert!(merged.scene_version >= 5);
        assert_eq!(ids(&merged.elements), vec!["from-first", "from-second", "shared"]);

        let mut reader = CollabSession::new("r2", second.room_key().to_string()).unwrap();
        match reader.load(&api).await.unwrap() {
            LoadedScene::Restored(elements) => {
                assert_eq!(ids(&elements), vec!["from-first", "from-second", "shared"])
            },
            LoadedScene::Fresh => panic!("scene should be stored"),
        }
        assert_eq!(reader.last_saved_version(), Some(merged.scene_version));
    }

    #[tokio::test]
    async fn test_version_never_decreases() {
        let api = MemoryApi::default();
        let key = generate_room_key();
        let mut session = CollabSession::new("r3", key).unwrap();
        session
            .save(&api, &[Element::new("a", 10, 1)], &LocalAppState::default())
            .await
            .unwrap();

        // a later save with fewer element revisions keeps the stored version
        let mut late = CollabSession::new("r3", session.room_key().to_string()).unwrap();
        let saved = late
            .save(&api, &[Element::new("b", 1, 1)], &LocalAppState::default())
            .await
            .unwrap();
        assert_eq!(saved.scene_version, 11);
    }

    #[tokio::test]
    async fn test_repeat_save_skips_the_network() {
        let api = MemoryApi::default();
        let app_state = LocalAppState::default();
        let mut session = CollabSession::new("r7", generate_room_key()).unwrap();
        let elements = vec![Element::new("a", 2, 1), Element::new("b", 1, 4)];

        let first = session.save(&api, &elements, &app_state).await.unwrap();
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
        assert!(session.is_saved(&first.elements));

        let again = session.save(&api, &first.elements, &app_state).await.unwrap();
        assert_eq!(again.scene_version, first.scene_version);
        assert_eq!(api.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(session.state(), SyncState::Synced);

        // an edit bumps an element version and is no longer saved
        let edited = vec![Element::new("a", 3, 2), Element::new("b", 1, 4)];
        assert!(!session.is_saved(&edited));
        session.save(&api, &edited, &app_state).await.unwrap();
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_marked_dirty_session_saves_again() {
        let api = MemoryApi::default();
        let app_state = LocalAppState::default();
        let mut session = CollabSession::new("r8", generate_room_key()).unwrap();
        let elements = vec![Element::new("a", 1, 1)];
        session.save(&api, &elements, &app_state).await.unwrap();

        session.mark_dirty();
        assert_eq!(session.state(), SyncState::Unsynced);
        assert!(!session.is_saved(&elements));
        session.save(&api, &elements, &app_state).await.unwrap();
        assert_eq!(api.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(session.state(), SyncState::Synced);
    }

    #[tokio::test]
    async fn test_wrong_key_is_an_error_not_fresh() {
        let api = MemoryApi::default();
        let mut writer = CollabSession::new("r4", generate_room_key()).unwrap();
        writer
            .save(&api, &[Element::new("a", 1, 1)], &LocalAppState::default())
            .await
            .unwrap();

        let mut intruder = CollabSession::new("r4", generate_room_key()).unwrap();
        assert!(matches!(intruder.load(&api).await, Err(ClientError::Crypto(_))));
    }

    #[tokio::test]
    async fn test_outages_are_retried_within_bounds() {
        let api = MemoryApi::failing(2);
        let mut session = CollabSession::new("r5", generate_room_key())
            .unwrap()
            .with_retry(fast_retry());
        assert_eq!(session.load(&api).await.unwrap(), LoadedScene::Fresh);
        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);

        let api = MemoryApi::failing(5);
        let result = session
            .save(&api, &[Element::new("a", 1, 1)], &LocalAppState::default())
            .await;
        assert!(matches!(result, Err(ClientError::StoreUnavailable(_))));
        assert_eq!(api.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(session.state(), SyncState::Unsynced);
    }

    #[tokio::test]
    async fn test_non_retryable_errors_fail_fast() {
        let policy = fast_retry();
        let calls = AtomicU32::new(0);
        let result: Result<(), ClientError> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Forbidden)
            })
            .await;
        assert!(matches!(result, Err(ClientError::Forbidden)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_broadcast_frames_carry_only_ciphertext() {
        let key = generate_room_key();
        let sender = CollabSession::new("r6", key.clone()).unwrap();
        let receiver = CollabSession::new("r6", key.clone()).unwrap();
        let elements = vec![Element::new("a", 2, 5)];

        let frame = sender.seal_update(&elements, false).unwrap();
        let text = serde_json::to_string(&frame).unwrap();
        assert!(!text.contains(&key));
        assert!(!text.contains("\"version\""));

        match frame {
            ClientToServer::ServerBroadcast { room_id, data, iv } => {
                assert_eq!(room_id, "r6");
                let opened: Vec<Element> = receiver.open_update(&data, &iv).unwrap();
                assert_eq!(opened, elements);
            },
            other => panic!("unexpected frame {other:?}"),
        }

        assert!(matches!(
            sender.seal_update(&elements, true).unwrap(),
            ClientToServer::ServerVolatileBroadcast { .. }
        ));
    }
}
