use finvo_core::SchemaError;
use finvo_document::LoaderError;
use thiserror::Error;

use crate::llm::LlmError;
use crate::parse::CompletionError;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to load document: {0}")]
    Loader(#[from] LoaderError),

    #[error("no documents to process")]
    NoDocuments,

    #[error("AI service error: {0}")]
    Llm(#[from] LlmError),

    #[error("could not read the model reply: {0}")]
    Completion(#[from] CompletionError),

    #[error("extraction result failed validation: {0}")]
    Validation(#[from] SchemaError),
}
