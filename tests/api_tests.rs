//! End-to-end tests over the HTTP surface: in-memory SQLite, temp
//! storage directories, and stub shell tools standing in for the
//! separation / chord-extraction processes.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chordtrack::{
    routes::routes::routes,
    services::{analyzer::Analyzer, chord_service::ChordService, upload_service::UploadService},
    state::AppState,
};
use chrono::Utc;
use http_body_util::BodyExt;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;
use uuid::Uuid;

const BOUNDARY: &str = "chordtrack-test-boundary";

const CHORDS_JSON: &str = concat!(
    r#"{"duration":30.0,"events":["#,
    r#"{"time":0.0,"chord":"C","confidence":0.9},"#,
    r#"{"time":10.0,"chord":"G","confidence":0.8},"#,
    r#"{"time":20.0,"chord":"Am","confidence":0.7}]}"#
);

struct TestApp {
    router: Router,
    pool: Arc<SqlitePool>,
    user: Uuid,
    _root: TempDir,
}

fn stub_tool(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write stub");
    let mut perms = std::fs::metadata(&path).expect("stub metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod stub");
    path.display().to_string()
}

/// Spin up the app against stub tools. The separator stub drops a fake
/// stem file into the output directory; the chord stub writes a fixed
/// timeline to the requested artifact path.
async fn test_app() -> TestApp {
    let root = TempDir::new().expect("tempdir");

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    for stmt in include_str!("../migrations/0001_init.sql")
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        sqlx::query(stmt).execute(&pool).await.expect("migration");
    }
    let pool = Arc::new(pool);

    let user = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, username, is_admin, created_at) VALUES (?, ?, 0, ?)")
        .bind(user)
        .bind("listener")
        .bind(Utc::now())
        .execute(&*pool)
        .await
        .expect("insert user");

    let separator = stub_tool(root.path(), "separate_audio", "printf 'RIFF' > \"$2/vocals.wav\"");
    let chord = stub_tool(
        root.path(),
        "extract_chords",
        &format!("printf '%s' '{}' > \"$3\"", CHORDS_JSON),
    );

    let analyzer = Analyzer::new(separator, chord);
    let uploads = UploadService::new(
        pool.clone(),
        root.path().join("uploads"),
        root.path().join("processed"),
        analyzer.clone(),
    );
    let chords = ChordService::new(uploads.clone(), analyzer);
    let router = routes().with_state(AppState { uploads, chords });

    TestApp {
        router,
        pool,
        user,
        _root: root,
    }
}

fn multipart_audio(artist: Option<&str>, content_type: &str) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    if let Some(artist) = artist {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"artist\"\r\n\r\n{artist}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; \
             filename=\"song.mp3\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"fake-mp3-bytes");
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("infallible");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn submit_upload(app: &TestApp) -> serde_json::Value {
    let (content_type, body) = multipart_audio(Some("Test Artist"), "audio/mpeg");
    let request = Request::post("/api/uploads")
        .header("content-type", content_type)
        .header("x-user-id", app.user.to_string())
        .body(Body::from(body))
        .unwrap();
    let (status, json) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED, "upload failed: {}", json);
    json
}

/// Poll until the background pipeline lands the upload in `want`.
async fn await_status(app: &TestApp, id: &str, want: &str) -> serde_json::Value {
    for _ in 0..150 {
        let request = Request::get(format!("/api/uploads/{}", id))
            .header("x-user-id", app.user.to_string())
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        if json["status"] == want {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("upload {} never reached status {}", id, want);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = test_app().await;
    let (status, json) = send(
        &app,
        Request::get("/healthz").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn upload_runs_to_completion() {
    let app = test_app().await;
    let record = submit_upload(&app).await;
    assert_eq!(record["artist"], "Test Artist");
    assert_eq!(record["owner_id"], app.user.to_string());

    let id = record["id"].as_str().unwrap();
    let completed = await_status(&app, id, "completed").await;
    assert!(completed["result_path"].is_string());
    assert_eq!(completed["title"], "song");
}

#[tokio::test]
async fn upload_requires_identity() {
    let app = test_app().await;
    let (content_type, body) = multipart_audio(None, "audio/mpeg");
    let request = Request::post("/api/uploads")
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upload_rejects_disallowed_media_type() {
    let app = test_app().await;
    let (content_type, body) = multipart_audio(None, "text/plain");
    let request = Request::post("/api/uploads")
        .header("content-type", content_type)
        .header("x-user-id", app.user.to_string())
        .body(Body::from(body))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", json);

    let request = Request::get("/api/uploads")
        .header("x-user-id", app.user.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().map(Vec::len), Some(0));
}

#[tokio::test]
async fn chords_unavailable_before_regeneration() {
    let app = test_app().await;
    let record = submit_upload(&app).await;
    let id = record["id"].as_str().unwrap().to_string();
    await_status(&app, &id, "completed").await;

    let request = Request::get(format!("/api/chords/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["events"].as_array().map(Vec::len), Some(0));
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn chords_unknown_upload_is_404() {
    let app = test_app().await;
    let request = Request::get(format!("/api/chords/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn regenerate_writes_and_serves_fresh_timeline() {
    let app = test_app().await;
    let record = submit_upload(&app).await;
    let id = record["id"].as_str().unwrap().to_string();
    await_status(&app, &id, "completed").await;

    let request = Request::post(format!("/api/chords/{}/regenerate", id))
        .header("content-type", "application/json")
        .header("x-user-id", app.user.to_string())
        .body(Body::from(r#"{"stem":"other"}"#))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK, "{}", json);
    assert_eq!(json["duration"], 30.0);
    assert_eq!(json["events"].as_array().map(Vec::len), Some(3));

    // The freshly written artifact is what subsequent loads observe.
    let request = Request::get(format!("/api/chords/{}", id))
        .body(Body::empty())
        .unwrap();
    let (status, loaded) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["events"], json["events"]);
    assert!(loaded.get("error").is_none());
}

#[tokio::test]
async fn regenerate_rejects_unknown_stem() {
    let app = test_app().await;
    let record = submit_upload(&app).await;
    let id = record["id"].as_str().unwrap().to_string();
    await_status(&app, &id, "completed").await;

    let request = Request::post(format!("/api/chords/{}/regenerate", id))
        .header("content-type", "application/json")
        .header("x-user-id", app.user.to_string())
        .body(Body::from(r#"{"stem":"piano"}"#))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("piano"));
}

#[tokio::test]
async fn regenerate_rejects_unprocessed_upload() {
    let app = test_app().await;

    // A row that never went through processing.
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO uploads (id, owner_id, original_filename, saved_filename, storage_path, \
         size_bytes, etag, artist, title, status, result_path, created_at) \
         VALUES (?, ?, 'a.mp3', 'a.mp3', '/tmp/a.mp3', 4, NULL, 'A', 'a', 'pending', NULL, ?)",
    )
    .bind(id)
    .bind(app.user)
    .bind(Utc::now())
    .execute(&*app.pool)
    .await
    .unwrap();

    let request = Request::post(format!("/api/chords/{}/regenerate", id))
        .header("content-type", "application/json")
        .header("x-user-id", app.user.to_string())
        .body(Body::from(r#"{"stem":"other"}"#))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("pending"));
}

#[tokio::test]
async fn regenerate_denied_for_other_users() {
    let app = test_app().await;
    let record = submit_upload(&app).await;
    let id = record["id"].as_str().unwrap().to_string();
    await_status(&app, &id, "completed").await;

    let request = Request::post(format!("/api/chords/{}/regenerate", id))
        .header("content-type", "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .body(Body::from(r#"{"stem":"other"}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // An administrator may regenerate anyone's upload.
    let request = Request::post(format!("/api/chords/{}/regenerate", id))
        .header("content-type", "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .header("x-user-admin", "1")
        .body(Body::from(r#"{"stem":"vocals"}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn metadata_update_and_delete_lifecycle() {
    let app = test_app().await;
    let record = submit_upload(&app).await;
    let id = record["id"].as_str().unwrap().to_string();

    let request = Request::patch(format!("/api/uploads/{}", id))
        .header("content-type", "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .body(Body::from(r#"{"artist":"Hijacker"}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::patch(format!("/api/uploads/{}", id))
        .header("content-type", "application/json")
        .header("x-user-id", app.user.to_string())
        .body(Body::from(r#"{"artist":"Renamed"}"#))
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["artist"], "Renamed");
    assert_eq!(json["title"], "song");

    let request = Request::delete(format!("/api/uploads/{}", id))
        .header("x-user-id", app.user.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let request = Request::get(format!("/api/uploads/{}", id))
        .header("x-user-id", app.user.to_string())
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn processed_artifacts_are_streamed() {
    let app = test_app().await;
    let record = submit_upload(&app).await;
    let id = record["id"].as_str().unwrap().to_string();
    await_status(&app, &id, "completed").await;

    let request = Request::get(format!("/processed/{}/vocals.wav", id))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "audio/wav"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"RIFF");

    let request = Request::get(format!("/processed/{}/..", id))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
