// ============================
// crates/client/tests/gateway_http.rs
// ============================
//! The client against a real server on a loopback port.
use backend_lib::{
    app,
    config::{Settings, StorageBackend},
    open_storage,
    storage::{NewTeacher, Storage, TeacherStore},
    AppState,
};
use boardsync_client::{
    generate_room_key, ClientError, CollabSession, HttpApiClient, LoadedScene, RetryPolicy, SceneApi,
};
use boardsync_common::api::CreatePermalinkRequest;
use boardsync_common::{Element, LocalAppState};
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tokio::net::TcpListener;

struct Server {
    client: HttpApiClient,
    storage: Arc<dyn Storage>,
    _dir: TempDir,
}

async fn spawn_server(backend: StorageBackend) -> Server {
    let dir = tempdir().unwrap();
    let mut settings = Settings {
        data_dir: dir.path().to_path_buf(),
        ..Settings::default()
    };
    settings.storage.backend = backend;

    let storage = open_storage(&settings).await.unwrap();
    let state = AppState::new(storage.clone(), settings);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app(state)).await.unwrap();
    });

    Server {
        client: HttpApiClient::new(format!("http://{addr}")),
        storage,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_concurrent_editors_keep_both_edit_sets() {
    let server = spawn_server(StorageBackend::FlatFile).await;
    let key = generate_room_key();
    let app_state = LocalAppState::default();

    let mut alice = CollabSession::new("r2", key.clone()).unwrap();
    let mut bob = CollabSession::new("r2", key).unwrap();

    let base = vec![Element::new("base", 3, 1).with_index("a0")];
    alice.save(&server.client, &base, &app_state).await.unwrap();
    assert!(matches!(bob.load(&server.client).await.unwrap(), LoadedScene::Restored(_)));

    let mut alice_edit = base.clone();
    alice_edit.push(Element::new("alice", 2, 4).with_index("a1"));
    assert_eq!(
        alice.save(&server.client, &alice_edit, &app_state).await.unwrap().scene_version,
        5
    );

    let mut bob_edit = base.clone();
    bob_edit.push(Element::new("bob", 1, 8).with_index("a2"));
    let merged = bob.save(&server.client, &bob_edit, &app_state).await.unwrap();
    assert!(merged.scene_version >= 5);

    let stored = server.client.fetch_scene("r2").await.unwrap().unwrap();
    assert_eq!(stored.scene_version, merged.scene_version);

    let mut reader = CollabSession::new("r2", bob.room_key().to_string()).unwrap();
    match reader.load(&server.client).await.unwrap() {
        LoadedScene::Restored(elements) => {
            let ids: Vec<&str> = elements.iter().map(|e| e.id.as_str()).collect();
            assert_eq!(ids, vec!["base", "alice", "bob"]);
        },
        LoadedScene::Fresh => panic!("scene should be stored"),
    }
}

#[tokio::test]
async fn test_missing_scene_is_none() {
    let server = spawn_server(StorageBackend::FlatFile).await;
    assert!(server.client.fetch_scene("never-saved").await.unwrap().is_none());
    assert_eq!(server.client.health().await.unwrap().status, "ok");
}

#[tokio::test]
async fn test_disabled_store_is_not_an_empty_room() {
    let server = spawn_server(StorageBackend::Disabled).await;
    let mut session = CollabSession::new("r1", generate_room_key())
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        });

    assert!(matches!(
        session.load(&server.client).await,
        Err(ClientError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn test_teacher_permalink_lifecycle() {
    let server = spawn_server(StorageBackend::FlatFile).await;
    server
        .storage
        .insert_teacher(NewTeacher {
            teacher_id: "t1".to_string(),
            name: Some("Ada".to_string()),
            email: None,
            token: "secret-token".to_string(),
        })
        .await
        .unwrap();

    let request = CreatePermalinkRequest {
        room_id: "r1".to_string(),
        room_key: "k1".to_string(),
        student_name: Some("Alice".to_string()),
        teacher_id: Some("t1".to_string()),
        teacher_token: Some("secret-token".to_string()),
    };
    let p1 = server.client.create_permalink(&request).await.unwrap();
    assert_eq!(server.client.create_permalink(&request).await.unwrap(), p1);

    let resolved = server.client.resolve_permalink(&p1).await.unwrap();
    assert_eq!(resolved.room_id, "r1");
    assert_eq!(resolved.room_key, "k1");
    assert_eq!(resolved.student_name.as_deref(), Some("Alice"));

    let listed = server.client.list_permalinks("t1", "secret-token").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(matches!(
        server.client.list_permalinks("t1", "wrong").await,
        Err(ClientError::Forbidden)
    ));

    server.client.delete_permalink(&p1, "t1", "secret-token").await.unwrap();
    server.client.delete_permalink(&p1, "t1", "secret-token").await.unwrap();
    assert!(matches!(
        server.client.resolve_permalink(&p1).await,
        Err(ClientError::NotFound)
    ));
}

#[tokio::test]
async fn test_unreachable_server_surfaces_a_retryable_error() {
    let client = HttpApiClient::new("http://127.0.0.1:1");
    let mut session = CollabSession::new("r1", generate_room_key())
        .unwrap()
        .with_retry(RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        });

    match session.load(&client).await {
        Err(e @ ClientError::Http(_)) => assert!(e.is_retryable()),
        other => panic!("expected a connection error, got {other:?}"),
    }
}
