//! HTTP error mapping. Every failure is reported as an `ExtractionResponse`
//! with `status: "error"`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use finvo_agent::{ExtractionError, LlmError};
use finvo_core::{ErrorDetails, ExtractionResponse};
use finvo_document::LoaderError;
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Unsupported file format '{extension}'. Supported: {}", supported.join(", "))]
    UnsupportedFormat { extension: String, supported: Vec<String> },

    #[error("File too large: exceeds limit of {limit} bytes")]
    FileTooLarge { limit: u64 },

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::UnsupportedFormat { .. } => StatusCode::BAD_REQUEST,
            ApiError::FileTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Extraction(e) => match e {
                ExtractionError::Loader(LoaderError::Unsupported(_)) => StatusCode::BAD_REQUEST,
                ExtractionError::Loader(LoaderError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
                ExtractionError::Loader(LoaderError::Io(_) | LoaderError::Task(_)) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                _ => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }

    pub fn category(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST if matches!(self, ApiError::BadRequest(_)) => "BAD_REQUEST",
            StatusCode::BAD_REQUEST => "UNSUPPORTED_FORMAT",
            StatusCode::PAYLOAD_TOO_LARGE => "FILE_TOO_LARGE",
            StatusCode::UNPROCESSABLE_ENTITY => "EXTRACTION_FAILED",
            _ => "SYSTEM_ERROR",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            ApiError::FileTooLarge { .. } => "FILE_SIZE_ERROR",
            ApiError::Internal(_) => "UNEXPECTED_ERROR",
            ApiError::Extraction(e) => match e {
                ExtractionError::Loader(LoaderError::Unsupported(_)) => "UNSUPPORTED_FORMAT",
                ExtractionError::Loader(LoaderError::TooLarge { .. }) => "FILE_SIZE_ERROR",
                ExtractionError::Loader(LoaderError::Io(_) | LoaderError::Task(_)) => "UNEXPECTED_ERROR",
                ExtractionError::Loader(_) => "DOCUMENT_LOADER_ERROR",
                ExtractionError::Llm(LlmError::Timeout(_) | LlmError::Connection(_)) => "AI_SERVICE_UNAVAILABLE",
                ExtractionError::Llm(_) => "AI_SERVICE_ERROR",
                ExtractionError::Validation(_) => "VALIDATION_ERROR",
                ExtractionError::NoDocuments | ExtractionError::Completion(_) => "EXTRACTION_ERROR",
            },
        }
    }

    fn message(&self) -> String {
        match self.status() {
            StatusCode::INTERNAL_SERVER_ERROR => format!("Unexpected processing error: {self}"),
            _ => self.to_string(),
        }
    }
}

/// An [`ApiError`] plus what is known about the request that failed.
#[derive(Debug)]
pub struct ApiFailure {
    pub error: ApiError,
    pub processing_time: Option<f64>,
    pub details: Map<String, Value>,
    pub file_info: Option<Map<String, Value>>,
}

impl ApiFailure {
    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn with_timing(mut self, seconds: f64) -> Self {
        self.processing_time = Some(seconds);
        self.details.insert("processing_time".to_string(), seconds.into());
        self
    }

    pub fn with_file_info(mut self, file_info: Map<String, Value>) -> Self {
        self.file_info = Some(file_info);
        self
    }
}

impl From<ApiError> for ApiFailure {
    fn from(error: ApiError) -> Self {
        ApiFailure {
            error,
            processing_time: None,
            details: Map::new(),
            file_info: None,
        }
    }
}

impl From<ExtractionError> for ApiFailure {
    fn from(error: ExtractionError) -> Self {
        ApiError::from(error).into()
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let status = self.error.status();
        if status.is_server_error() {
            tracing::error!(error = %self.error, "Request failed");
        } else {
            tracing::warn!(error = %self.error, code = self.error.code(), "Request rejected");
        }

        let mut body = ExtractionResponse::error(ErrorDetails {
            message: self.error.message(),
            category: self.error.category().to_string(),
            code: Some(self.error.code().to_string()),
            details: self.details,
        });
        body.processing_time = self.processing_time;
        body.file_info = self.file_info;
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiFailure::from(self).into_response()
    }
}
