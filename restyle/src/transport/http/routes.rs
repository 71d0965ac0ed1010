//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;

use crate::service::{SubmitError, TransformService};
use crate::transform::TransformError;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: String,
    active_requests: usize,
    max_concurrent: usize,
    available: usize,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    server: &'static str,
    status: &'static str,
    active_requests: usize,
    max_concurrent: usize,
    uptime: u64,
    timestamp: String,
}

pub fn routes(service: Arc<TransformService>) -> Router {
    let body_limit = DefaultBodyLimit::max(service.max_upload_bytes());
    Router::new()
        .route("/transform", post(transform))
        .route("/result/{image_id}", get(result))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/progress/{request_id}", get(progress))
        .layer(body_limit)
        .with_state(service)
}

async fn transform(
    State(service): State<Arc<TransformService>>,
    mut multipart: Multipart,
) -> Response {
    let mut image: Option<(Vec<u8>, String)> = None;
    let mut style: Option<String> = None;
    let mut prompt: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => return error_body(StatusCode::BAD_REQUEST, "Malformed multipart upload"),
        };
        match field.name() {
            Some("image") => {
                let content_type = field.content_type().unwrap_or("").to_string();
                match field.bytes().await {
                    Ok(bytes) => image = Some((bytes.to_vec(), content_type)),
                    Err(_) => {
                        return error_body(
                            StatusCode::BAD_REQUEST,
                            "Image upload too large or unreadable",
                        );
                    }
                }
            }
            Some("style") => style = field.text().await.ok(),
            Some("prompt") => prompt = field.text().await.ok(),
            _ => {}
        }
    }

    let Some((bytes, content_type)) = image else {
        return error_body(StatusCode::BAD_REQUEST, "Missing image or style/prompt");
    };
    if !content_type.starts_with("image/") {
        return error_body(StatusCode::BAD_REQUEST, "Only image files are allowed");
    }

    let upload_path = match service
        .store()
        .save_upload(upload_extension(&content_type), &bytes)
    {
        Ok(path) => path,
        Err(e) => {
            tracing::error!(error = %e, "failed to persist upload");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store upload");
        }
    };

    match service.submit(upload_path, style, prompt).await {
        Ok(receipt) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "image_id": receipt.image_id,
                "request_id": receipt.request_id,
                "processing_time": receipt.processing_time.as_millis() as u64,
            })),
        )
            .into_response(),
        Err(e) => submit_error_response(e),
    }
}

fn upload_extension(content_type: &str) -> &str {
    let subtype = content_type.strip_prefix("image/").unwrap_or("");
    match subtype {
        "jpeg" => "jpg",
        "" => "bin",
        s if s.chars().all(|c| c.is_ascii_alphanumeric()) => s,
        _ => "bin",
    }
}

fn submit_error_response(err: SubmitError) -> Response {
    match err {
        SubmitError::AtCapacity(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "success": false,
                "error": format!(
                    "Server is at capacity ({} users). Please try again in a moment.",
                    e.ceiling
                ),
                "queuePosition": e.queue_position(),
                "estimatedWaitTime": e.estimated_wait_minutes(),
            })),
        )
            .into_response(),
        SubmitError::TimedOut(timeout) => (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "success": false,
                "error": format!(
                    "Request timeout - image processing took longer than {} minutes. Please try again.",
                    timeout.as_secs().div_ceil(60)
                ),
                "timeout": true,
            })),
        )
            .into_response(),
        SubmitError::Transform(e) => {
            let status = match &e {
                TransformError::Validation(_) | TransformError::UnknownStyle => {
                    StatusCode::BAD_REQUEST
                }
                TransformError::UpstreamTimeout => StatusCode::REQUEST_TIMEOUT,
                TransformError::UpstreamRateLimit => StatusCode::TOO_MANY_REQUESTS,
                TransformError::NoResult
                | TransformError::Upstream(_)
                | TransformError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let message = match e {
                TransformError::UpstreamTimeout => "Request timeout - please try again".to_string(),
                TransformError::UpstreamRateLimit => {
                    "Rate limit exceeded - please wait a moment".to_string()
                }
                TransformError::NoResult => "No image data from provider".to_string(),
                other => other.to_string(),
            };
            error_body(status, &message)
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": message}))).into_response()
}

async fn result(
    State(service): State<Arc<TransformService>>,
    Path(image_id): Path<String>,
) -> Response {
    let Some(path) = service.store().result_path(&image_id) else {
        return result_not_found(&image_id);
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [
                    ("content-type", mime.essence_str().to_string()),
                    // Results are embedded cross-origin by the browser UI.
                    ("access-control-allow-origin", "*".to_string()),
                    ("cross-origin-resource-policy", "cross-origin".to_string()),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(image_id = %image_id, error = %e, "result file vanished before read");
            result_not_found(&image_id)
        }
    }
}

fn result_not_found(image_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": "Result not found", "imageId": image_id})),
    )
        .into_response()
}

async fn health(State(service): State<Arc<TransformService>>) -> Json<HealthResponse> {
    let admission = service.admission();
    Json(HealthResponse {
        status: "OK",
        timestamp: chrono::Utc::now().to_rfc3339(),
        active_requests: admission.active(),
        max_concurrent: admission.ceiling(),
        available: admission.available(),
    })
}

async fn status(State(service): State<Arc<TransformService>>) -> Json<StatusResponse> {
    let admission = service.admission();
    Json(StatusResponse {
        server: "restyle",
        status: "running",
        active_requests: admission.active(),
        max_concurrent: admission.ceiling(),
        uptime: service.uptime().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

async fn progress(
    State(service): State<Arc<TransformService>>,
    Path(request_id): Path<String>,
) -> Json<serde_json::Value> {
    let admission = service.admission();
    match service.supervisor().elapsed(&request_id) {
        Some(elapsed) => Json(json!({
            "status": "processing",
            "message": "Your image is being transformed...",
            "elapsed_ms": elapsed.as_millis() as u64,
            "active_requests": admission.active(),
            "max_concurrent": admission.ceiling(),
        })),
        None => Json(json!({
            "status": "not_found",
            "message": "Request not found or completed",
            "active_requests": admission.active(),
        })),
    }
}
