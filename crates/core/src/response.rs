use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::invoice::InvoiceData;

/// Options accompanying an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionRequest {
    pub file_name: String,
    pub file_size: Option<u64>,
    #[serde(default = "default_true")]
    pub extract_fuel_info: bool,
    #[serde(default = "default_true")]
    pub extract_line_items: bool,
}

fn default_true() -> bool {
    true
}

impl ExtractionRequest {
    pub fn new(file_name: impl Into<String>) -> Self {
        ExtractionRequest {
            file_name: file_name.into(),
            file_size: None,
            extract_fuel_info: true,
            extract_line_items: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDetails {
    pub message: String,
    pub category: String,
    pub code: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResponse {
    pub status: ResponseStatus,
    pub data: Option<InvoiceData>,
    pub error: Option<ErrorDetails>,
    /// Seconds.
    pub processing_time: Option<f64>,
    pub file_info: Option<Map<String, Value>>,
}

impl ExtractionResponse {
    pub fn success(data: InvoiceData, processing_time: f64, file_info: Map<String, Value>) -> Self {
        ExtractionResponse {
            status: ResponseStatus::Success,
            data: Some(data),
            error: None,
            processing_time: Some(processing_time),
            file_info: Some(file_info),
        }
    }

    pub fn error(details: ErrorDetails) -> Self {
        ExtractionResponse {
            status: ResponseStatus::Error,
            data: None,
            error: Some(details),
            processing_time: None,
            file_info: None,
        }
    }
}
