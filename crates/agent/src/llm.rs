//! Chat-completion clients.
//!
//! [`OpenAiClient`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint. [`MockLlm`] replays scripted replies for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("cannot connect to LLM endpoint at {0}")]
    Connection(String),

    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed LLM response: {0}")]
    ResponseParsing(String),

    #[error("LLM returned no content")]
    EmptyResponse,

    #[error("HTTP client error: {0}")]
    Http(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentPart {
    Text(String),
    /// `data:<mime>;base64,<payload>`
    ImageDataUrl(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self { role: Role::User, parts }
    }

    /// Concatenated text parts, ignoring images.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text(t) => Some(t.as_str()),
                ContentPart::ImageDataUrl(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, ContentPart::ImageDataUrl(_)))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the endpoint for a JSON object response.
    pub json_mode: bool,
    pub messages: Vec<ChatMessage>,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// The assistant's reply text for a single completion.
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key,
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<WireResponseFormat>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: WireContent<'a>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent<'a> {
    Text(&'a str),
    Parts(Vec<WirePart<'a>>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireImageUrl<'a> },
}

#[derive(Serialize)]
struct WireImageUrl<'a> {
    url: &'a str,
}

#[derive(Serialize)]
struct WireResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireReply,
}

#[derive(Deserialize)]
struct WireReply {
    content: Option<String>,
}

fn to_wire(request: &ChatRequest) -> WireRequest<'_> {
    let messages = request
        .messages
        .iter()
        .map(|m| {
            let content = match m.parts.as_slice() {
                [ContentPart::Text(text)] => WireContent::Text(text),
                parts => WireContent::Parts(
                    parts
                        .iter()
                        .map(|p| match p {
                            ContentPart::Text(text) => WirePart::Text { text },
                            ContentPart::ImageDataUrl(url) => WirePart::ImageUrl {
                                image_url: WireImageUrl { url },
                            },
                        })
                        .collect(),
                ),
            };
            WireMessage { role: m.role, content }
        })
        .collect();

    WireRequest {
        model: &request.model,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        messages,
        response_format: request
            .json_mode
            .then_some(WireResponseFormat { kind: "json_object" }),
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = to_wire(&request);

        debug!(model = %request.model, messages = request.messages.len(), "Sending chat completion");
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    LlmError::Connection(self.base_url.clone())
                } else if e.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Chat completion rejected");
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Replays scripted replies in order, then falls back to a fixed reply.
/// Every request is recorded.
pub struct MockLlm {
    reply: String,
    script: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlm {
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `Err` entries surface as a 500 from the endpoint.
    pub fn scripted(replies: Vec<Result<&str, &str>>) -> Self {
        let script = replies
            .into_iter()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Self {
            reply: String::new(),
            script: Mutex::new(script),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(body)) => Err(LlmError::Status { status: 500, body }),
            None => Ok(self.reply.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(parts: Vec<ContentPart>, json_mode: bool) -> ChatRequest {
        ChatRequest {
            model: "gpt-4o".into(),
            temperature: 0.1,
            max_tokens: 1500,
            json_mode,
            messages: vec![ChatMessage::system("be precise"), ChatMessage::user(parts)],
        }
    }

    #[test]
    fn text_only_message_serializes_as_string() {
        let req = request(vec![ContentPart::Text("hello".into())], true);
        let wire = serde_json::to_value(to_wire(&req)).unwrap();
        assert_eq!(wire["messages"][0], json!({"role": "system", "content": "be precise"}));
        assert_eq!(wire["messages"][1]["content"], json!("hello"));
        assert_eq!(wire["response_format"], json!({"type": "json_object"}));
        assert_eq!(wire["max_tokens"], json!(1500));
    }

    #[test]
    fn images_serialize_as_content_parts() {
        let req = request(
            vec![
                ContentPart::Text("look".into()),
                ContentPart::ImageDataUrl("data:image/png;base64,AAAA".into()),
            ],
            false,
        );
        let wire = serde_json::to_value(to_wire(&req)).unwrap();
        assert_eq!(
            wire["messages"][1]["content"],
            json!([
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
            ])
        );
        assert!(wire.get("response_format").is_none());
    }

    #[test]
    fn message_helpers() {
        let msg = ChatMessage::user(vec![
            ContentPart::Text("a".into()),
            ContentPart::ImageDataUrl("data:x".into()),
            ContentPart::Text("b".into()),
        ]);
        assert_eq!(msg.text(), "a\nb");
        assert_eq!(msg.image_count(), 1);
    }

    #[tokio::test]
    async fn mock_replays_script_then_falls_back() {
        let mut mock = MockLlm::scripted(vec![Ok("{\"a\":1}"), Err("boom")]);
        mock.reply = "fallback".into();

        let req = request(vec![ContentPart::Text("x".into())], true);
        assert_eq!(mock.complete(req.clone()).await.unwrap(), "{\"a\":1}");
        assert!(matches!(
            mock.complete(req.clone()).await,
            Err(LlmError::Status { status: 500, .. })
        ));
        assert_eq!(mock.complete(req).await.unwrap(), "fallback");
        assert_eq!(mock.requests().len(), 3);
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = OpenAiClient::new(OpenAiConfig {
            api_key: "sk-test".into(),
            base_url: format!("http://127.0.0.1:{port}/v1/"),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.base_url(), format!("http://127.0.0.1:{port}/v1"));

        let err = client
            .complete(request(vec![ContentPart::Text("x".into())], true))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Connection(_)), "got {err:?}");
    }
}
