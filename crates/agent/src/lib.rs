//! Invoice extraction: loaded documents in, one validated [`InvoiceData`]
//! record out, by way of a chat-completion model.
//!
//! [`InvoiceData`]: finvo_core::InvoiceData

pub mod agent;
pub mod error;
pub mod llm;
pub mod parse;
pub mod prompt;

pub use agent::{AgentConfig, ExtractionAgent, ExtractionMode};
pub use error::ExtractionError;
pub use llm::{ChatMessage, ChatRequest, ContentPart, LlmClient, LlmError, MockLlm, OpenAiClient, OpenAiConfig, Role};
pub use parse::{parse_completion, CompletionError};
