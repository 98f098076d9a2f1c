use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("Expected a JSON object, got {0}")]
    NotAnObject(&'static str),
    #[error("No recognized invoice fields in extraction result")]
    NoRecognizedFields,
    #[error("Date format not recognized: '{0}'")]
    InvalidDate(String),
    #[error("Time format not recognized: '{0}'")]
    InvalidTime(String),
    #[error("Invalid currency code: '{0}'")]
    InvalidCurrency(String),
    #[error("Invalid amount for {field}: '{value}'")]
    InvalidAmount { field: &'static str, value: String },
    #[error("{field} must not be negative (got {value})")]
    Negative { field: &'static str, value: String },
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("confidence_score must be between 0 and 1 (got {0})")]
    ConfidenceOutOfRange(f64),
    #[error("Field {field} has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
}
