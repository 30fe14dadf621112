//! HTTP surface tests driven through the router with `oneshot`

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use docstream::config::PipelineConfig;
use docstream::server::build_router;
use docstream::server::state::AppState;
use futures_util::StreamExt;
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "docstream-test-boundary";

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.queue.workers = Some(1);
    config.queue.retry_delay_ms = 10;
    config.upload.max_file_size = 1024;
    config.watchdog.enabled = false;
    config
}

async fn test_app() -> (Router, AppState) {
    let state = AppState::new(test_config()).await.expect("state");
    (build_router(state.clone()), state)
}

fn multipart_body(name: &str, content: &[u8], kind: Option<&str>) -> Body {
    let mut body = Vec::new();
    if let Some(kind) = kind {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"kind\"\r\n\r\n{kind}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn upload_request(uri: &str, owner: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
    if let Some(owner) = owner {
        builder = builder.header("x-owner-id", owner);
    }
    builder.body(body).expect("request")
}

fn get_request(uri: &str, owner: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .header("x-owner-id", owner)
        .body(Body::empty())
        .expect("request")
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

async fn upload_sync(app: &Router, owner: &str, name: &str, content: &[u8]) -> Value {
    let response = app
        .clone()
        .oneshot(upload_request(
            "/api/documents/sync",
            Some(owner),
            multipart_body(name, content, None),
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await
}

#[tokio::test]
async fn health_and_info() {
    let (app, state) = test_app().await;

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/api/info").body(Body::empty()).expect("request"))
        .await
        .expect("router response");
    let info = json_body(response).await;
    assert_eq!(info["name"], "docstream");
    assert!(info["endpoints"]["GET /api/stream"].is_string());
    state.shutdown().await;
}

#[tokio::test]
async fn upload_is_accepted_and_queued() {
    let (app, state) = test_app().await;

    let response = app
        .clone()
        .oneshot(upload_request(
            "/api/documents",
            Some("alice"),
            multipart_body("notes.txt", b"some words to ingest", None),
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let receipt = json_body(response).await;
    let document_id = receipt["document_id"].as_str().expect("document id").to_string();
    assert_eq!(receipt["status"], "uploading");
    assert!(receipt["job_id"].is_string());

    let response = app
        .clone()
        .oneshot(get_request("/api/documents", "alice"))
        .await
        .expect("router response");
    let listing = json_body(response).await;
    assert_eq!(listing["total"], 1);
    assert_eq!(listing["documents"][0]["id"], document_id.as_str());
    state.shutdown().await;
}

#[tokio::test]
async fn missing_owner_header_is_rejected() {
    let (app, state) = test_app().await;

    let response = app
        .clone()
        .oneshot(upload_request(
            "/api/documents",
            None,
            multipart_body("notes.txt", b"hello", None),
        ))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "validation_error");

    let response = app
        .oneshot(Request::get("/api/documents").body(Body::empty()).expect("request"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    state.shutdown().await;
}

#[tokio::test]
async fn invalid_uploads_are_rejected_without_a_document() {
    let (app, state) = test_app().await;

    let cases: Vec<(&str, Vec<u8>, Option<&str>)> = vec![
        ("big.txt", vec![b'a'; 2048], None),
        ("empty.txt", Vec::new(), None),
        ("archive.bin", b"binary".to_vec(), None),
        ("scan.pdf", b"%PDF-1.4".to_vec(), None),
        ("notes.txt", b"hello".to_vec(), Some("spreadsheet")),
    ];
    for (name, content, kind) in cases {
        let response = app
            .clone()
            .oneshot(upload_request(
                "/api/documents",
                Some("alice"),
                multipart_body(name, &content, kind),
            ))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", name);
    }

    let response = app
        .oneshot(get_request("/api/documents", "alice"))
        .await
        .expect("router response");
    assert_eq!(json_body(response).await["total"], 0);
    assert_eq!(state.job_queue().stats().total(), 0);
    state.shutdown().await;
}

#[tokio::test]
async fn sync_upload_returns_completed_document() {
    let (app, state) = test_app().await;

    let document = upload_sync(&app, "alice", "notes.md", b"# Title\n\nFirst paragraph here.").await;
    assert_eq!(document["status"], "completed");
    assert_eq!(document["progress"], 100);
    assert_eq!(document["mime_class"], "markdown");
    let id = document["id"].as_str().expect("id");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/documents/{}/content", id), "alice"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let content = json_body(response).await;
    assert_eq!(content["chunks"].as_array().map(Vec::len), Some(1));
    assert!(content["full_text"].as_str().unwrap_or("").contains("First paragraph"));

    // Nothing was queued for the inline path
    assert_eq!(state.job_queue().stats().total(), 0);
    state.shutdown().await;
}

#[tokio::test]
async fn sync_upload_of_unparseable_content_reports_failure() {
    let (app, state) = test_app().await;

    let document = upload_sync(&app, "alice", "broken.txt", &[0xff, 0xfe, 0xfd]).await;
    assert_eq!(document["status"], "failed");
    assert!(document["error"]
        .as_str()
        .unwrap_or("")
        .contains("unsupported encoding"));
    state.shutdown().await;
}

#[tokio::test]
async fn document_status_respects_limit_and_ownership() {
    let (app, state) = test_app().await;

    let document = upload_sync(&app, "alice", "notes.txt", b"plain words for the record").await;
    let id = document["id"].as_str().expect("id").to_string();

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/documents/{}?limit=2", id), "alice"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let report = json_body(response).await;
    assert_eq!(report["document"]["status"], "completed");
    let events = report["events"].as_array().expect("events");
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["status"], "completed");

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/documents/{}", id), "mallory"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/documents/{}/content", id), "mallory"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get_request("/api/documents/does-not-exist", "alice"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["type"], "not_found");
    state.shutdown().await;
}

#[tokio::test]
async fn jobs_are_scoped_to_their_owner() {
    let (app, state) = test_app().await;

    let response = app
        .clone()
        .oneshot(upload_request(
            "/api/documents",
            Some("alice"),
            multipart_body("notes.txt", b"queued words", None),
        ))
        .await
        .expect("router response");
    let receipt = json_body(response).await;
    let job_id = receipt["job_id"].as_str().expect("job id").to_string();

    let response = app
        .clone()
        .oneshot(get_request("/api/jobs", "alice"))
        .await
        .expect("router response");
    let listing = json_body(response).await;
    assert!(listing["stats"]["pending"].as_u64().is_some());
    let jobs = listing["jobs"].as_array().expect("jobs");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], job_id.as_str());
    assert_eq!(jobs[0]["job_type"], "ingest_document");
    assert!(jobs[0].get("payload").is_none());
    assert_eq!(jobs[0]["owner_id"], "alice");

    let response = app
        .clone()
        .oneshot(get_request("/api/jobs", "bob"))
        .await
        .expect("router response");
    assert_eq!(json_body(response).await["jobs"].as_array().map(Vec::len), Some(0));

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/jobs/{}", job_id), "alice"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request(&format!("/api/jobs/{}", job_id), "bob"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(get_request(&format!("/api/jobs/{}", uuid::Uuid::new_v4()), "alice"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    state.shutdown().await;
}

#[tokio::test]
async fn stream_opens_with_a_snapshot() {
    let (app, state) = test_app().await;
    upload_sync(&app, "alice", "notes.txt", b"already processed").await;

    let response = app
        .oneshot(get_request("/api/stream", "alice"))
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let mut frames = response.into_body().into_data_stream();
    let first = tokio::time::timeout(Duration::from_secs(5), frames.next())
        .await
        .expect("frame before timeout")
        .expect("stream open")
        .expect("frame bytes");
    let text = String::from_utf8_lossy(&first);
    assert!(text.contains("event: snapshot"), "{}", text);
    assert!(text.contains("notes.txt"), "{}", text);
    state.shutdown().await;
}
