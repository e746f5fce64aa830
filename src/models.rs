use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    pub model: &'static str,
    pub temperature: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub params: SamplingParams,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("model call failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("model call failed: {0}")]
    Other(String),
}

impl TransportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Other(_) => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            TransportError::Status { message, .. } => message,
            TransportError::Other(message) => message,
        }
    }
}

/// A chat-completion backend: role-tagged messages in, one completion out.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn complete(&self, credential: &str, req: ChatRequest) -> Result<String, TransportError>;
}

#[derive(Clone)]
pub struct OpenAICompatible {
    pub base_url: String,
    client: reqwest::Client,
}

impl OpenAICompatible {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: reqwest::Client::new() }
    }
}

#[derive(Debug, Serialize)]
struct OaiChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct OaiChatResponse {
    choices: Vec<OaiChoice>,
}

#[derive(Debug, Deserialize)]
struct OaiChoice {
    message: OaiMessage,
}

#[derive(Debug, Deserialize)]
struct OaiMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OaiErrorEnvelope {
    error: OaiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OaiErrorBody {
    message: String,
}

#[async_trait]
impl ChatTransport for OpenAICompatible {
    async fn complete(&self, credential: &str, req: ChatRequest) -> Result<String, TransportError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = OaiChatRequest {
            model: req.params.model,
            messages: &req.messages,
            temperature: req.params.temperature,
            max_tokens: req.params.max_tokens,
            presence_penalty: req.params.presence_penalty,
            frequency_penalty: req.params.frequency_penalty,
        };
        let resp = self
            .client
            .post(url)
            .bearer_auth(credential)
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OaiErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(TransportError::Status { status: status.as_u16(), message });
        }

        let v: OaiChatResponse = resp.json().await.map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(v.choices.into_iter().next().and_then(|c| c.message.content).unwrap_or_default())
    }
}
