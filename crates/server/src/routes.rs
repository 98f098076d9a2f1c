use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use finvo_core::{ExtractionRequest, ExtractionResponse, InvoiceData};
use finvo_document::formats::extension_of;
use schemars::schema_for;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiFailure};
use crate::state::AppState;

/// Room for multipart framing on top of the largest accepted file.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;
/// Room for the JSON envelope and a `data:` URL prefix around base64 data.
const BASE64_ENVELOPE_OVERHEAD: u64 = 64 * 1024;

/// Body limit for a base64 upload: the encoded form of the largest
/// accepted file plus the envelope. The loader checks the decoded size.
pub fn base64_body_limit(max_file_size: u64) -> usize {
    (max_file_size.div_ceil(3) * 4 + BASE64_ENVELOPE_OVERHEAD) as usize
}

pub fn router(state: AppState) -> Router {
    let max_file_size = state.agent.loader().max_file_size();
    let body_limit = (max_file_size + MULTIPART_OVERHEAD) as usize;

    let api = Router::new()
        .route("/health", get(api_health))
        .route("/supported-formats", get(supported_formats))
        .route("/schema", get(schema))
        .route("/stats", get(stats))
        .route("/extract/upload", post(extract_upload))
        .route(
            "/extract/base64",
            post(extract_base64).layer(DefaultBodyLimit::max(base64_body_limit(max_file_size))),
        );

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
            tracing::info_span!(
                "http_request",
                request_id = %Uuid::new_v4(),
                method = %req.method(),
                uri = %req.uri(),
            )
        }))
        .with_state(state)
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": state.settings.app_name,
        "version": state.settings.app_version,
        "description": "Invoice and receipt extraction service",
        "environment": state.settings.environment,
        "status": "operational",
    }))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let s = &state.settings;
    Json(json!({
        "status": "healthy",
        "service": s.app_name,
        "version": s.app_version,
        "environment": s.environment,
        "model": s.model,
        "debug": s.debug,
        "extraction_mode": state.agent.config().mode.as_str(),
        "ocr_backend": state.agent.loader().ocr_backend(),
    }))
}

async fn api_health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "finvo-ai",
        "version": state.settings.app_version,
        "environment": state.settings.environment,
    }))
}

async fn supported_formats(State(state): State<AppState>) -> Json<Value> {
    let formats = state.agent.supported_formats();
    Json(json!({
        "total_formats": formats.len(),
        "supported_formats": formats,
    }))
}

async fn schema() -> Json<Value> {
    Json(json!({
        "invoice_data_schema": schema_for!(InvoiceData),
        "extraction_request_schema": schema_for!(ExtractionRequest),
        "extraction_response_schema": schema_for!(ExtractionResponse),
    }))
}

async fn stats(State(state): State<AppState>) -> Json<Value> {
    let s = &state.settings;
    Json(json!({
        "service_name": s.app_name,
        "version": s.app_version,
        "environment": s.environment,
        "model_info": {
            "model": s.model,
            "temperature": s.temperature,
            "max_tokens": s.max_tokens,
        },
        "extraction_mode": state.agent.config().mode.as_str(),
        "limits": {
            "max_file_size_mb": s.max_file_size_mb,
            "supported_formats": s.allowed_extensions,
        },
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionFlags {
    extract_fuel_info: Option<bool>,
    extract_line_items: Option<bool>,
}

struct Upload {
    filename: String,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

/// `multipart/form-data` with a `file` part. The two extraction flags may
/// come as query parameters or as form fields; form fields win.
async fn extract_upload(
    State(state): State<AppState>,
    Query(mut flags): Query<ExtractionFlags>,
    mut multipart: Multipart,
) -> Result<Json<ExtractionResponse>, ApiFailure> {
    let start = Instant::now();
    let limit = state.agent.loader().max_file_size();
    let multipart_error = move |e: MultipartError| multipart_failure(e, limit);
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let Some(filename) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string) else {
                    return Err(ApiError::BadRequest("No file provided".into()).into());
                };
                // Reject by name before reading the body.
                let extension = extension_of(&filename);
                if !state.settings.allowed_extensions.contains(&extension) {
                    let info = file_info(&filename, None, field.content_type());
                    return Err(ApiFailure::from(ApiError::UnsupportedFormat {
                        extension,
                        supported: state.settings.allowed_extensions.clone(),
                    })
                    .with_detail("filename", filename.as_str())
                    .with_timing(start.elapsed().as_secs_f64())
                    .with_file_info(info));
                }
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                upload = Some(Upload { filename, content_type, bytes });
            }
            Some("extract_fuel_info") => {
                flags.extract_fuel_info = Some(parse_flag("extract_fuel_info", &field.text().await.map_err(multipart_error)?)?);
            }
            Some("extract_line_items") => {
                flags.extract_line_items = Some(parse_flag("extract_line_items", &field.text().await.map_err(multipart_error)?)?);
            }
            _ => {}
        }
    }

    let Upload { filename, content_type, bytes } =
        upload.ok_or_else(|| ApiFailure::from(ApiError::BadRequest("No file provided".into())))?;
    let size = bytes.len();
    let info = file_info(&filename, Some(size), content_type.as_deref());

    let mut request = ExtractionRequest::new(filename.as_str());
    request.file_size = Some(size as u64);
    request.extract_fuel_info = flags.extract_fuel_info.unwrap_or(true);
    request.extract_line_items = flags.extract_line_items.unwrap_or(true);

    match state.agent.extract_from_bytes(bytes, &filename, Some(&request)).await {
        Ok(data) => {
            let processing_time = start.elapsed().as_secs_f64();
            info!(
                filename = %filename,
                file_size = size,
                processing_time,
                confidence_score = data.confidence_score,
                "Upload extraction completed"
            );
            Ok(Json(ExtractionResponse::success(data, processing_time, info)))
        }
        Err(e) => Err(ApiFailure::from(e)
            .with_detail("filename", filename.as_str())
            .with_detail("file_size", size)
            .with_timing(start.elapsed().as_secs_f64())
            .with_file_info(info)),
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct Base64Upload {
    file_name: String,
    /// Raw base64 or a `data:` URL.
    data: String,
    #[serde(default = "default_true")]
    extract_fuel_info: bool,
    #[serde(default = "default_true")]
    extract_line_items: bool,
}

async fn extract_base64(
    State(state): State<AppState>,
    payload: Result<Json<Base64Upload>, JsonRejection>,
) -> Result<Json<ExtractionResponse>, ApiFailure> {
    let start = Instant::now();
    let limit = state.agent.loader().max_file_size();
    let Json(upload) = payload.map_err(|e| json_failure(e, limit))?;

    let extension = extension_of(&upload.file_name);
    let mut info = file_info(&upload.file_name, None, None);
    info.insert("encoded_size".to_string(), upload.data.len().into());
    if !state.settings.allowed_extensions.contains(&extension) {
        return Err(ApiFailure::from(ApiError::UnsupportedFormat {
            extension,
            supported: state.settings.allowed_extensions.clone(),
        })
        .with_detail("filename", upload.file_name.as_str())
        .with_file_info(info));
    }

    let mut request = ExtractionRequest::new(upload.file_name.as_str());
    request.extract_fuel_info = upload.extract_fuel_info;
    request.extract_line_items = upload.extract_line_items;

    match state
        .agent
        .extract_from_base64(&upload.data, &upload.file_name, Some(&request))
        .await
    {
        Ok(data) => Ok(Json(ExtractionResponse::success(
            data,
            start.elapsed().as_secs_f64(),
            info,
        ))),
        Err(e) => Err(ApiFailure::from(e)
            .with_detail("filename", upload.file_name.as_str())
            .with_timing(start.elapsed().as_secs_f64())
            .with_file_info(info)),
    }
}

fn file_info(filename: &str, size: Option<usize>, content_type: Option<&str>) -> Map<String, Value> {
    let mut info = Map::new();
    info.insert("filename".to_string(), filename.into());
    info.insert("size".to_string(), size.into());
    info.insert("format".to_string(), extension_of(filename).into());
    info.insert("content_type".to_string(), content_type.into());
    info
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ApiFailure> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ApiError::BadRequest(format!("{name} must be a boolean, got '{other}'")).into()),
    }
}

fn json_failure(e: JsonRejection, limit: u64) -> ApiFailure {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge { limit }.into()
    } else {
        ApiError::BadRequest(e.body_text()).into()
    }
}

fn multipart_failure(e: MultipartError, limit: u64) -> ApiFailure {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::FileTooLarge { limit }.into()
    } else {
        ApiError::BadRequest(e.body_text()).into()
    }
}
