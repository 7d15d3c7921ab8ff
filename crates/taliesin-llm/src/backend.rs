//! Backend trait, streaming chunk types, and the scripted mock backend.

use crate::error::{LlmError, Result};
use crate::types::{
    Citation, FinishReason, FunctionCall, GenerationRequest, GenerationResponse, Part, Usage,
};
use futures::stream::Stream;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Retry a fallible async operation with exponential backoff.
///
/// Only retryable errors (network, rate limit) are retried; everything else
/// is returned immediately. The backoff doubles after each failed attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..=max_retries {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                tracing::warn!(
                    backend = backend_name,
                    attempt = attempt + 1,
                    max_retries,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Retryable LLM error, backing off"
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| LlmError::Internal("retry loop exhausted".to_string())))
}

/// One increment of a streamed reply.
///
/// A chunk may carry any mix of parts (text deltas, function calls),
/// newly grounded citations, a finish reason, and usage totals. The
/// final chunk of a stream is the one carrying `finish_reason`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChunkEvent {
    pub parts: Vec<Part>,
    pub citations: Vec<Citation>,
    pub finish_reason: Option<FinishReason>,
    pub usage: Option<Usage>,
}

impl ChunkEvent {
    /// A chunk carrying a single text delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::text(text)],
            ..Self::default()
        }
    }

    /// A chunk carrying a single function call.
    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self {
            parts: vec![Part::FunctionCall {
                function_call: FunctionCall::new(name, args),
            }],
            ..Self::default()
        }
    }

    /// A chunk carrying only citations.
    pub fn citations(citations: Vec<Citation>) -> Self {
        Self {
            citations,
            ..Self::default()
        }
    }

    /// The terminal chunk of a stream.
    pub fn finish(reason: FinishReason) -> Self {
        Self {
            finish_reason: Some(reason),
            ..Self::default()
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Concatenated text of this chunk's text parts.
    pub fn text_delta(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }

    /// True when the chunk carries no parts, citations, finish reason, or usage.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
            && self.citations.is_empty()
            && self.finish_reason.is_none()
            && self.usage.is_none()
    }
}

/// A pinned, boxed stream of reply chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChunkEvent>> + Send + 'static>>;

/// Abstraction over a conversational generation provider.
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Produce a complete reply in one round trip.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;

    /// Produce a reply as a stream of chunks.
    ///
    /// The returned stream is lazy: no further bytes are pulled from the
    /// provider once the caller drops it.
    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Shared reference to a backend.
pub type SharedBackend = Arc<dyn ChatBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock backend
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted reply: the exact sequence of chunk events one `generate_stream`
/// call will yield.
#[derive(Debug, Clone)]
pub struct MockReply {
    events: Vec<Result<ChunkEvent>>,
    open_error: Option<LlmError>,
}

impl MockReply {
    /// A reply that streams one text chunk and stops.
    pub fn text(text: impl Into<String>) -> Self {
        Self::events(vec![
            Ok(ChunkEvent::text(text)),
            Ok(ChunkEvent::finish(FinishReason::Stop)),
        ])
    }

    /// A reply that streams each delta as its own chunk, then stops.
    pub fn deltas<I, S>(deltas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut events: Vec<Result<ChunkEvent>> =
            deltas.into_iter().map(|d| Ok(ChunkEvent::text(d))).collect();
        events.push(Ok(ChunkEvent::finish(FinishReason::Stop)));
        Self::events(events)
    }

    /// A reply that asks for one function call and stops.
    pub fn function_call(name: impl Into<String>, args: Value) -> Self {
        Self::events(vec![
            Ok(ChunkEvent::function_call(name, args)),
            Ok(ChunkEvent::finish(FinishReason::Stop)),
        ])
    }

    /// A reply whose stream fails on its first item.
    pub fn error(error: LlmError) -> Self {
        Self::events(vec![Err(error)])
    }

    /// A reply that fails before a stream is even handed out, as a dead
    /// session or unreachable host would.
    pub fn unavailable(error: LlmError) -> Self {
        Self {
            events: Vec::new(),
            open_error: Some(error),
        }
    }

    /// A reply built from an explicit event sequence.
    pub fn events(events: Vec<Result<ChunkEvent>>) -> Self {
        Self {
            events,
            open_error: None,
        }
    }
}

/// Scripted backend for tests.
///
/// Replies are consumed in FIFO order, one per generation call. Every
/// request is recorded so tests can assert on the exact history and tool
/// declarations sent upstream.
pub struct MockBackend {
    name: String,
    replies: Mutex<VecDeque<MockReply>>,
    request_log: Mutex<Vec<GenerationRequest>>,
}

impl MockBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(VecDeque::new()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock preloaded with scripted replies.
    pub fn with_replies(name: impl Into<String>, replies: Vec<MockReply>) -> Self {
        Self {
            name: name.into(),
            replies: Mutex::new(replies.into()),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Queue another scripted reply.
    pub fn push_reply(&self, reply: MockReply) {
        self.replies.lock().push_back(reply);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.request_log.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }

    fn next_reply(&self, request: GenerationRequest) -> Result<MockReply> {
        self.request_log.lock().push(request);
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Api("mock backend has no scripted reply left".to_string()))
    }
}

#[async_trait::async_trait]
impl ChatBackend for MockBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        let reply = self.next_reply(request)?;
        if let Some(error) = reply.open_error {
            return Err(error);
        }
        let mut response = GenerationResponse::default();
        for event in reply.events {
            let chunk = event?;
            response.parts.extend(chunk.parts);
            response.citations.extend(chunk.citations);
            if chunk.finish_reason.is_some() {
                response.finish_reason = chunk.finish_reason;
            }
            if chunk.usage.is_some() {
                response.usage = chunk.usage;
            }
        }
        Ok(response)
    }

    async fn generate_stream(&self, request: GenerationRequest) -> Result<ChunkStream> {
        let reply = self.next_reply(request)?;
        if let Some(error) = reply.open_error {
            return Err(error);
        }
        Ok(Box::pin(futures::stream::iter(reply.events)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
