//! Chat backend abstraction and chat-completions implementation.
//!
//! This module provides a generic [`ChatBackend`] trait for talking to a
//! hosted language model, along with concrete implementations:
//!
//! - [`ChatCompletionsClient`]: OpenAI-compatible chat completions endpoint
//! - [`MockChatBackend`]: test double for unit tests
//!
//! Responses are decoded by trying an ordered list of known response shapes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::ChatConfig;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during chat backend operations.
#[derive(Debug, Error)]
pub enum LlmError {
    /// No chat backend URL/key configured.
    #[error("chat backend not configured")]
    NotConfigured,

    /// HTTP or network error occurred.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The request exceeded the configured timeout.
    #[error("chat backend timed out")]
    Timeout,

    /// Failed to parse the API response body as JSON.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The response was JSON but matched no known schema.
    #[error("unrecognized response schema")]
    UnrecognizedSchema,

    /// Model returned no text content.
    #[error("Model returned empty response")]
    EmptyResponse,
}

// ============================================================================
// Message Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The result of a successful completion request.
#[derive(Debug, Clone)]
pub struct Completion {
    /// The generated text from the model.
    pub text: String,
}

// ============================================================================
// ChatBackend Trait
// ============================================================================

/// Generic interface for chat backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate a completion for an ordered conversation.
    ///
    /// `messages` starts with the system prompt, followed by trailing
    /// history and the current user message.
    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError>;
}

// ============================================================================
// Response extraction
// ============================================================================

/// One known response schema.
#[derive(Debug, Clone, Copy)]
enum Shape {
    /// `choices[0].message.content`
    ChoiceMessage,
    /// `choices[0].text`
    ChoiceText,
    /// `message` as a string, or an object carrying `content`.
    Message,
    /// A top-level string field.
    Field(&'static str),
}

/// Tried in order; the first shape that yields a string wins.
const SHAPES: &[Shape] = &[
    Shape::ChoiceMessage,
    Shape::ChoiceText,
    Shape::Field("response"),
    Shape::Message,
    Shape::Field("content"),
    Shape::Field("text"),
    Shape::Field("result"),
    Shape::Field("answer"),
];

impl Shape {
    fn extract(self, body: &Value) -> Option<String> {
        let value = match self {
            Self::ChoiceMessage => body.pointer("/choices/0/message/content")?,
            Self::ChoiceText => body.pointer("/choices/0/text")?,
            Self::Message => match body.get("message")? {
                Value::Object(obj) => obj.get("content")?,
                other => other,
            },
            Self::Field(name) => body.get(name)?,
        };
        value.as_str().map(str::to_string)
    }
}

/// Pull the reply text out of a backend response.
pub fn extract_reply(body: &Value) -> Result<String, LlmError> {
    let text = SHAPES
        .iter()
        .find_map(|shape| shape.extract(body))
        .ok_or(LlmError::UnrecognizedSchema)?;
    if text.trim().is_empty() {
        return Err(LlmError::EmptyResponse);
    }
    Ok(text)
}

// ============================================================================
// Chat completions implementation
// ============================================================================

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct ChatCompletionsClient {
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
}

/// Request body for the chat completions API.
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f32,
}

impl ChatCompletionsClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::NotConfigured`] if the URL or key is missing.
    pub fn from_config(config: &ChatConfig) -> Result<Self, LlmError> {
        match (config.api_url.as_deref(), config.api_key.as_deref()) {
            (Some(url), Some(key)) => Self::new(
                url,
                key,
                &config.model,
                config.temperature,
                Duration::from_secs(config.timeout_secs),
            ),
            _ => Err(LlmError::NotConfigured),
        }
    }

    pub fn new(
        api_url: &str,
        api_key: &str,
        model: &str,
        temperature: f32,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature,
            client,
        })
    }
}

#[async_trait]
impl ChatBackend for ChatCompletionsClient {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        let request_body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(http_err)?;

        let status = response.status();
        let raw = response.text().await.map_err(http_err)?;

        if !status.is_success() {
            let parsed: Option<Value> = serde_json::from_str(&raw).ok();
            let detail = parsed
                .as_ref()
                .and_then(|b| b.pointer("/error/message").or_else(|| b.get("error")))
                .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                .unwrap_or(raw);
            return Err(LlmError::Http(format!("HTTP {}: {detail}", status.as_u16())));
        }

        let body: Value = serde_json::from_str(&raw).map_err(|e| LlmError::Parse(e.to_string()))?;
        Ok(Completion {
            text: extract_reply(&body)?,
        })
    }
}

fn http_err(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Http(err.to_string())
    }
}

// ============================================================================
// Mock Implementation (Test Only)
// ============================================================================

/// Mock chat backend for testing. Returns pre-programmed results in FIFO
/// order and records the conversations it was sent.
#[cfg(test)]
pub struct MockChatBackend {
    pub responses: std::sync::Mutex<std::collections::VecDeque<Result<String, LlmError>>>,
    pub seen: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl MockChatBackend {
    /// # Panics
    ///
    /// Panics if [`complete`](ChatBackend::complete) is called more times
    /// than there are responses.
    pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into()),
            seen: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn complete(&self, messages: &[Message]) -> Result<Completion, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("MockChatBackend: no more responses available")
            .map(|text| Completion { text })
    }
}

// ============================================================================
// Tests
// ============================================================================
