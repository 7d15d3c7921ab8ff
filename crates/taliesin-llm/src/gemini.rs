//! Gemini backend speaking the `generateContent` REST API.
//!
//! Streaming uses `streamGenerateContent?alt=sse`: the response body is a
//! sequence of `data: {json}` lines, each a complete chunk, with no
//! terminator event. The stream simply ends when the reply is finished.

use crate::backend::{with_retry, ChatBackend, ChunkEvent, ChunkStream};
use crate::error::{LlmError, Result};
use crate::types::{
    Citation, FinishReason, FunctionCall, GenerationRequest, GenerationResponse, Part, Usage,
};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::Deserialize;
use std::pin::Pin;
use std::time::Duration;

/// Default API base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Default request timeout in seconds (generous, covers long streams).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for the Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key.
    pub api_key: String,
    /// Model identifier, e.g. `gemini-3-flash-preview`.
    pub model: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum retries for retryable errors on non-streaming calls.
    pub max_retries: u32,
    /// Initial backoff between retries (doubles each attempt).
    pub retry_backoff: Duration,
}

impl GeminiConfig {
    /// Create a config with the given API key and default settings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_API_BASE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    /// Create a config from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| LlmError::Config("GEMINI_API_KEY environment variable not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// Backend for the Gemini generation API.
pub struct GeminiBackend {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiBackend {
    /// Create a backend from a config.
    pub fn new(config: GeminiConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    /// Create a backend configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn generate_url(&self) -> String {
        format!("{}/{}:generateContent", self.config.base_url, self.config.model)
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/{}:streamGenerateContent?alt=sse",
            self.config.base_url, self.config.model
        )
    }

    async fn execute_generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let response = self
            .client
            .post(self.generate_url())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status, &body));
        }

        let chunk: ApiChunk = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(format!("Failed to parse response body: {}", e)))?;
        let event = chunk.into_event();
        Ok(GenerationResponse {
            parts: event.parts,
            citations: event.citations,
            finish_reason: event.finish_reason,
            usage: event.usage,
        })
    }
}

#[async_trait::async_trait]
impl ChatBackend for GeminiBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            "gemini",
            || self.execute_generate(&request),
        )
        .await
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream> {
        let response = self
            .client
            .post(self.stream_url())
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status, &body));
        }

        Ok(parse_sse_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Error handling
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

fn parse_api_error(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
}

/// Map an HTTP error response to an [`LlmError`].
///
/// A 404 or any message mentioning expiry means the remote conversation
/// handle is gone and the session must be rebuilt; everything else follows
/// the usual status classification.
fn handle_error_response(status: StatusCode, body: &str) -> LlmError {
    let message = parse_api_error(body).unwrap_or_else(|| {
        if body.is_empty() {
            format!("HTTP {}", status)
        } else {
            body.chars().take(200).collect()
        }
    });

    if message.to_lowercase().contains("expired") {
        return LlmError::SessionExpired(message);
    }

    match status.as_u16() {
        401 | 403 => LlmError::Auth(message),
        404 => LlmError::SessionExpired(message),
        429 => LlmError::RateLimit(message),
        400 => LlmError::InvalidRequest(message),
        s if s >= 500 => LlmError::Api(format!("Server error ({}): {}", s, message)),
        _ => LlmError::Api(format!("Unexpected status {}: {}", status, message)),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiChunk {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
    #[serde(rename = "groundingMetadata")]
    grounding_metadata: Option<ApiGroundingMetadata>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<FinishReason>,
}

#[derive(Debug, Deserialize)]
struct ApiContent {
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiPart {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct ApiGroundingMetadata {
    #[serde(rename = "groundingChunks", default)]
    grounding_chunks: Vec<ApiGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct ApiGroundingChunk {
    web: Option<ApiGroundingSource>,
    maps: Option<ApiGroundingSource>,
}

#[derive(Debug, Deserialize)]
struct ApiGroundingSource {
    uri: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

impl ApiChunk {
    /// Flatten the first candidate into a [`ChunkEvent`].
    fn into_event(self) -> ChunkEvent {
        let mut event = ChunkEvent::default();

        if let Some(usage) = self.usage_metadata {
            event.usage = Some(Usage::new(
                usage.prompt_token_count,
                usage.candidates_token_count,
            ));
        }

        let Some(candidate) = self.candidates.into_iter().next() else {
            return event;
        };

        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(text) = part.text {
                    if !text.is_empty() {
                        event.parts.push(Part::text(text));
                    }
                } else if let Some(function_call) = part.function_call {
                    event.parts.push(Part::FunctionCall { function_call });
                }
            }
        }

        if let Some(grounding) = candidate.grounding_metadata {
            for chunk in grounding.grounding_chunks {
                if let Some(source) = chunk.web.or(chunk.maps) {
                    if let Some(uri) = source.uri {
                        let title = source.title.unwrap_or_else(|| uri.clone());
                        event.citations.push(Citation { title, uri });
                    }
                }
            }
        }

        event.finish_reason = candidate.finish_reason;
        event
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE parsing
// ─────────────────────────────────────────────────────────────────────────────

struct SseState {
    byte_stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: String,
    done: bool,
}

/// Remove and return the next complete line from the buffer.
fn take_line(buffer: &mut String) -> Option<String> {
    let pos = buffer.find('\n')?;
    let mut line: String = buffer.drain(..=pos).collect();
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}

/// Decode one SSE line into an event, if it carries one.
fn process_line(line: &str) -> Option<Result<ChunkEvent>> {
    let data = line
        .strip_prefix("data: ")
        .or_else(|| line.strip_prefix("data:"))?;
    let data = data.trim();
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str::<ApiChunk>(data) {
        Ok(chunk) => {
            let event = chunk.into_event();
            if event.is_empty() {
                None
            } else {
                Some(Ok(event))
            }
        }
        Err(e) => Some(Err(LlmError::Serialization(format!(
            "Undecodable stream chunk: {}",
            e
        )))),
    }
}

/// Turn a raw SSE byte stream into a stream of chunk events.
///
/// A transport error or undecodable chunk ends the stream after the error
/// is yielded. Nothing is pulled from the wire unless the caller polls.
fn parse_sse_stream<S>(byte_stream: S) -> ChunkStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = SseState {
        byte_stream: Box::pin(byte_stream),
        buffer: String::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        loop {
            while let Some(line) = take_line(&mut state.buffer) {
                if let Some(event) = process_line(&line) {
                    if event.is_err() {
                        state.done = true;
                    }
                    return Some((event, state));
                }
            }

            match state.byte_stream.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.push_str(&String::from_utf8_lossy(&bytes));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e.into()), state));
                }
                None => {
                    state.done = true;
                    // A final line may lack a trailing newline.
                    let leftover = std::mem::take(&mut state.buffer);
                    return process_line(leftover.trim()).map(|event| (event, state));
                }
            }
        }
    }))
}
