//! API request handlers.

use axum::{
    Json,
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::markdown;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_connections: usize,
}

/// Health check endpoint.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_connections: state.hub.connection_count(),
    })
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    #[serde(default)]
    pub path: Option<String>,
}

/// Plain-text read of a report file.
///
/// GET /api/read?path=logs/acme-analysis.md
pub async fn read_file(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<impl IntoResponse> {
    let path = validate_report_path(query.path.as_deref())?;
    let content = tokio::fs::read_to_string(state.logs_root.join(path)).await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        content,
    ))
}

/// On-the-fly export of a report as a print-ready document.
///
/// GET /api/download?path=logs/acme-analysis.md
pub async fn download_report(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> ApiResult<impl IntoResponse> {
    let path = validate_report_path(query.path.as_deref())?;
    let content = tokio::fs::read_to_string(state.logs_root.join(path)).await?;

    let stem = std::path::Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("report");
    let document = markdown::render_export_document(stem, &content).await;

    info!(path, "exported report");
    Ok((
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{stem}.html\""),
            ),
        ],
        document,
    ))
}

/// Only files under the logs directory may be served, and traversal is
/// rejected outright.
fn validate_report_path(path: Option<&str>) -> Result<&str, ApiError> {
    let path = path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_request("File path is required"))?;

    if !path.contains("logs/") || path.contains("..") || path.starts_with('/') {
        return Err(ApiError::forbidden("Invalid file path"));
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_report_path_accepts_logs_paths() {
        assert_eq!(
            validate_report_path(Some("logs/acme-analysis.md")).unwrap(),
            "logs/acme-analysis.md"
        );
    }

    #[test]
    fn test_validate_report_path_requires_param() {
        assert!(matches!(
            validate_report_path(None),
            Err(ApiError::BadRequest(_))
        ));
        assert!(matches!(
            validate_report_path(Some("")),
            Err(ApiError::BadRequest(_))
        ));
    }

    #[test]
    fn test_validate_report_path_rejects_escapes() {
        for path in [
            "notes/acme.md",
            "logs/../secrets.env",
            "/etc/passwd",
            "../logs/acme-analysis.md",
        ] {
            assert!(
                matches!(validate_report_path(Some(path)), Err(ApiError::Forbidden(_))),
                "accepted {path}"
            );
        }
    }
}
