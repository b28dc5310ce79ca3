//! API integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use dealscope::api::{AppState, create_router};
use dealscope::transport::{AgentTransport, TransportError, TransportEvent};

/// Transport stub: tests exercise the HTTP surface, not the upstream.
struct NullTransport;

#[async_trait::async_trait]
impl AgentTransport for NullTransport {
    async fn run_turn(
        &self,
        _prompt: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let _ = events.send(TransportEvent::Ended).await;
        Ok(())
    }
}

fn test_app(logs_root: PathBuf) -> Router {
    let state = AppState::new(logs_root, Arc::new(NullTransport));
    create_router(state)
}

/// Create a gateway router over a temp directory seeded with one report.
fn test_app_with_report() -> (tempfile::TempDir, Router) {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("logs")).unwrap();
    std::fs::write(
        dir.path().join("logs/acme-analysis.md"),
        "---\ncompany: Acme\nurl: https://acme.io\nindustry: SaaS\nlocation: NYC\nsize: 50\nanalyzed: 2024-01-01\n---\n\n# Acme\n\nReport body.\n",
    )
    .unwrap();

    let app = test_app(dir.path().to_path_buf());
    (dir, app)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>, axum::http::HeaderMap) {
    let response = app
        .oneshot(
            Request::builder()
                .uri(uri)
                .method(Method::GET)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    (status, body.to_vec(), headers)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_dir, app) = test_app_with_report();

    let (status, body, _) = get(app, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["active_connections"], 0);
}

#[tokio::test]
async fn test_read_returns_report_content() {
    let (_dir, app) = test_app_with_report();

    let (status, body, headers) = get(app, "/api/read?path=logs/acme-analysis.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );

    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("company: Acme"));
    assert!(text.contains("Report body."));
}

#[tokio::test]
async fn test_read_requires_path_param() {
    let (_dir, app) = test_app_with_report();

    let (status, body, _) = get(app, "/api/read").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_read_rejects_traversal_and_foreign_paths() {
    for path in [
        "logs/../Cargo.toml",
        "notes/acme-analysis.md",
        "/etc/passwd",
    ] {
        let (_dir, app) = test_app_with_report();
        let encoded = path.replace('/', "%2F");
        let (status, _, _) = get(app, &format!("/api/read?path={encoded}")).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "accepted {path}");
    }
}

#[tokio::test]
async fn test_read_missing_file_is_404() {
    let (_dir, app) = test_app_with_report();

    let (status, body, _) = get(app, "/api/read?path=logs/other-analysis.md").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_download_exports_print_ready_document() {
    let (_dir, app) = test_app_with_report();

    let (status, body, headers) = get(app, "/api/download?path=logs/acme-analysis.md").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "text/html; charset=utf-8"
    );
    assert_eq!(
        headers.get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"acme-analysis.html\""
    );

    let html = String::from_utf8(body).unwrap();
    assert!(html.starts_with("<!doctype html>"));
    assert!(html.contains("Report body."));
    // Front matter is metadata, not prose.
    assert!(!html.contains("company: Acme"));
}

#[tokio::test]
async fn test_download_applies_same_path_policy() {
    let (_dir, app) = test_app_with_report();

    let (status, _, _) = get(app, "/api/download?path=logs%2F..%2FCargo.toml").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}
