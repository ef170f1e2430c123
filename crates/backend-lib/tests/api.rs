// ============================
// crates/backend-lib/tests/api.rs
// ============================
//! REST surface exercised through the router with `oneshot`.
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use backend_lib::{
    app,
    config::{Settings, StorageBackend},
    open_storage,
    storage::Storage,
    AppState,
};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

const ADMIN: &str = "admin-secret";

struct TestApp {
    router: Router,
    _storage: Arc<dyn Storage>,
    _dir: TempDir,
}

async fn test_app_with(configure: impl FnOnce(&mut Settings)) -> TestApp {
    let dir = tempdir().unwrap();
    let mut settings = Settings {
        data_dir: dir.path().to_path_buf(),
        admin_token: Some(ADMIN.to_string()),
        ..Settings::default()
    };
    configure(&mut settings);

    let storage = open_storage(&settings).await.unwrap();
    let router = app(AppState::new(storage.clone(), settings));
    TestApp {
        router,
        _storage: storage,
        _dir: dir,
    }
}

async fn test_app() -> TestApp {
    test_app_with(|_| {}).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    async fn call(&self, method: Method, uri: &str, headers: &[(&str, &str)], body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.call(Method::GET, uri, &[], None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, &[], Some(body)).await
    }

    async fn admin(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, &[("x-admin-token", ADMIN)], body).await
    }

    /// Provision a teacher through the admin API, returning `(teacher_id, token)`
    async fn teacher(&self, name: &str) -> (String, String) {
        let (status, body) = self
            .admin(Method::POST, "/api/admin/teachers", Some(json!({ "name": name })))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (
            body["teacher_id"].as_str().unwrap().to_string(),
            body["token"].as_str().unwrap().to_string(),
        )
    }
}

#[tokio::test]
async fn test_health() {
    let app = test_app().await;
    for path in ["/api/health", "/health"] {
        let (status, body) = app.get(path).await;
        assert_eq!(status, StatusCode::OK, "{path}");
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }
}

#[tokio::test]
async fn test_scene_round_trip() {
    let app = test_app().await;

    let (status, body) = app.get("/api/scenes/room1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = app
        .post(
            "/api/scenes/room1",
            json!({ "scene_version": 7, "iv": "aXY=", "ciphertext": "Y2lwaGVy" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let (status, body) = app.get("/api/scenes/room1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["room_id"], "room1");
    assert_eq!(body["scene_version"], 7);
    assert_eq!(body["iv"], "aXY=");
    assert_eq!(body["ciphertext"], "Y2lwaGVy");
    assert!(body["updated_at"].is_string());

    // last write by arrival wins, even a lower version
    app.post(
        "/api/scenes/room1",
        json!({ "scene_version": 3, "iv": "aXY=", "ciphertext": "b2xk" }),
    )
    .await;
    let (_, body) = app.get("/api/scenes/room1").await;
    assert_eq!(body["scene_version"], 3);
    assert_eq!(body["ciphertext"], "b2xk");
}

#[tokio::test]
async fn test_scene_payload_errors_are_400() {
    let app = test_app().await;

    let (status, body) = app
        .post(
            "/api/scenes/room1",
            json!({ "scene_version": "five", "iv": "x", "ciphertext": "y" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_payload");

    let (status, _) = app
        .post("/api/scenes/room1", json!({ "iv": "x", "ciphertext": "y" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/scenes/room1")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/api/scenes/bad%20room",
            json!({ "scene_version": 1, "iv": "x", "ciphertext": "y" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_permalink_create_and_resolve() {
    let app = test_app().await;
    let (teacher_id, token) = app.teacher("Ada").await;

    let create = json!({
        "room_id": "r1",
        "room_key": "k1",
        "student_name": "Alice",
        "teacher_id": teacher_id,
        "teacher_token": token,
    });
    let (status, body) = app.post("/api/permalinks", create.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let p1 = body["permalink"].as_str().unwrap().to_string();

    let (_, again) = app.post("/api/permalinks", create).await;
    assert_eq!(again["permalink"], p1.as_str());

    let before: DateTime<Utc> = Utc::now();
    let (status, body) = app.get(&format!("/api/permalinks/{p1}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "roomId": "r1", "roomKey": "k1", "studentName": "Alice" })
    );

    let (status, listing) = app.admin(Method::GET, "/api/admin/teachers", None).await;
    assert_eq!(status, StatusCode::OK);
    let row = &listing["items"][0];
    assert_eq!(row["teacher_id"], teacher_id.as_str());
    let last_accessed: DateTime<Utc> = row["last_accessed"].as_str().unwrap().parse().unwrap();
    assert!(last_accessed >= before);

    let (status, body) = app.get("/api/permalinks/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_permalink_create_validation() {
    let app = test_app().await;
    let (teacher_id, _) = app.teacher("Ada").await;

    let (status, _) = app.post("/api/permalinks", json!({ "room_id": "r1" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/api/permalinks",
            json!({ "room_id": "r1", "room_key": "k1", "teacher_id": teacher_id }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "forbidden" }));

    // a malformed teacher id is a bad credential, not a bad payload
    let (status, body) = app
        .post(
            "/api/permalinks",
            json!({ "room_id": "r1", "room_key": "k1", "teacher_id": "no such/id", "teacher_token": "x" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({ "error": "forbidden" }));

    // anonymous links need no credential
    let (status, _) = app
        .post("/api/permalinks", json!({ "room_id": "r9", "room_key": "k9" }))
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_teacher_listing_access_matrix() {
    let app = test_app().await;
    let (t1, token1) = app.teacher("One").await;
    let (t2, token2) = app.teacher("Two").await;
    let (t3, token3) = app.teacher("Gone").await;
    let (status, _) = app
        .admin(Method::POST, &format!("/api/admin/teachers/{t3}/deactivate"), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    app.post(
        "/api/permalinks",
        json!({ "room_id": "r1", "room_key": "k1", "student_name": "Alice", "teacher_id": t1, "teacher_token": token1 }),
    )
    .await;

    let denied = [
        format!("/api/permalinks?teacher_id={t1}"),
        format!("/api/permalinks?teacher_id={t1}&token="),
        format!("/api/permalinks?teacher_id={t1}&token=wrong"),
        format!("/api/permalinks?teacher_id={t1}&token={token2}"),
        format!("/api/permalinks?teacher_id={t3}&token={token3}"),
        format!("/api/permalinks?teacher_id=nobody&token={token1}"),
        format!("/api/permalinks?teacher_id=no%2Fbody&token={token1}"),
    ];
    for uri in &denied {
        let (status, _) = app.get(uri).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{uri}");
    }

    let (status, _) = app.get(&format!("/api/permalinks?token={token1}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .get(&format!("/api/permalinks?teacher_id={t1}&token={token1}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert_eq!(body["items"][0]["student_name"], "Alice");

    // path alias with a bearer token
    let bearer = format!("Bearer {token1}");
    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/teachers/{t1}/permalinks"),
            &[("authorization", bearer.as_str())],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .get(&format!("/api/teachers/{t2}/permalinks?token={token2}"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_permalink_delete() {
    let app = test_app().await;
    let (t1, token1) = app.teacher("One").await;
    let (t2, token2) = app.teacher("Two").await;

    let (_, body) = app
        .post(
            "/api/permalinks",
            json!({ "room_id": "r1", "room_key": "k1", "student_name": "Alice", "teacher_id": t1, "teacher_token": token1 }),
        )
        .await;
    let p1 = body["permalink"].as_str().unwrap().to_string();

    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/permalinks/{p1}?teacher_id={t1}&token=wrong"),
            &[],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // another teacher's valid token does not reach this link
    let (status, _) = app
        .call(
            Method::DELETE,
            &format!("/api/teachers/{t2}/permalinks/{p1}?token={token2}"),
            &[],
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.get(&format!("/api/permalinks/{p1}")).await.0, StatusCode::OK);

    for _ in 0..2 {
        let (status, body) = app
            .call(
                Method::DELETE,
                &format!("/api/permalinks/{p1}?teacher_id={t1}&token={token1}"),
                &[],
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }
    assert_eq!(
        app.get(&format!("/api/permalinks/{p1}")).await.0,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_admin_credential_is_required() {
    let app = test_app().await;
    let body = Some(json!({ "name": "Eve" }));

    let (status, _) = app
        .call(Method::POST, "/api/admin/teachers", &[], body.clone())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/admin/teachers",
            &[("x-admin-token", "guess")],
            body,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.get("/api/admin/teachers").await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .call(
            Method::POST,
            "/api/admin/teachers/upload",
            &[],
            Some(json!({ "csv": "Eve,e@x.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_closed_without_configured_token() {
    let app = test_app_with(|settings| settings.admin_token = None).await;
    let (status, _) = app
        .admin(Method::POST, "/api/admin/teachers", Some(json!({ "name": "Eve" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_csv_upload() {
    let app = test_app().await;
    let (status, body) = app
        .admin(
            Method::POST,
            "/api/admin/teachers/upload",
            Some(json!({ "csv": "name,email\nAnna,a@x.com\nBob,b@x.com" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["name"], "Anna");
    assert_eq!(items[0]["email"], "a@x.com");
    assert_eq!(items[1]["name"], "Bob");
    assert!(items.iter().all(|item| item["token"].as_str().unwrap().len() == 43));
    assert!(body["failed"].as_array().unwrap().is_empty());

    let (_, listing) = app.admin(Method::GET, "/api/admin/teachers", None).await;
    assert_eq!(listing["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_deactivate_unknown_teacher_is_404() {
    let app = test_app().await;
    let (status, _) = app
        .admin(Method::POST, "/api/admin/teachers/nobody/deactivate", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_room_files() {
    let app = test_app_with(|settings| settings.max_file_bytes = 16).await;

    let put = |body: &'static [u8]| {
        Request::builder()
            .method(Method::PUT)
            .uri("/api/files/room1/image-1")
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(Body::from(body))
            .unwrap()
    };

    let (status, _) = app.get("/api/files/room1/image-1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.send(put(b"\x00\x01encrypted")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true }));

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/files/room1/image-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/octet-stream"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"\x00\x01encrypted");

    let (status, _) = app.send(put(b"this body is longer than sixteen bytes")).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_disabled_storage_answers_503() {
    let app = test_app_with(|settings| settings.storage.backend = StorageBackend::Disabled).await;

    let (status, body) = app.get("/api/scenes/room1").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "store_unavailable");

    let (status, _) = app
        .post("/api/permalinks", json!({ "room_id": "r1", "room_key": "k1" }))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = app.get("/api/health").await;
    assert_eq!(status, StatusCode::OK);
}
