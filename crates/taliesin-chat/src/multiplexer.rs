//! Translates a backend chunk stream into ordered turn events.
//!
//! ```text
//!   ChunkStream ──▶ open_turn ──▶ TurnEventStream
//!                      │
//!                      ├── text parts      ──▶ TurnEvent::TextDelta
//!                      ├── function calls  ──▶ TurnEvent::ToolCall
//!                      └── citations       ──▶ TurnEvent::CitationBatch
//! ```
//!
//! Events are yielded in the order the backend produced them, with a chunk's
//! parts emitted before its citation batch. Finish reasons and usage totals
//! are logged here rather than surfaced; consumers only see the three event
//! kinds above. The underlying stream is not opened until the returned
//! stream is first polled, and dropping it stops all backend I/O.

use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use taliesin_llm::{Citation, FunctionCall, GenerationRequest, Part, SharedBackend};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::Result;

/// One incremental event of an assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// A fragment of reply text, in arrival order.
    TextDelta(String),
    /// The model asked for a tool invocation.
    ToolCall(ToolCallRecord),
    /// Citations grounded so far for the current reply.
    CitationBatch(Vec<Citation>),
}

/// A tool invocation lifted out of the stream, tagged for log correlation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRecord {
    /// Locally minted identifier. The wire protocol correlates responses by
    /// function name, so this only threads through logs.
    pub id: String,
    pub call: FunctionCall,
}

impl ToolCallRecord {
    pub fn new(call: FunctionCall) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            call,
        }
    }

    pub fn name(&self) -> &str {
        &self.call.name
    }
}

/// A pinned, boxed stream of turn events.
pub type TurnEventStream = std::pin::Pin<Box<dyn Stream<Item = Result<TurnEvent>> + Send>>;

/// Open one reply stream and translate its chunks into turn events.
///
/// An error opening the stream, or mid-stream, is yielded once and ends the
/// stream; the caller decides how the turn fails.
pub fn open_turn(backend: SharedBackend, request: GenerationRequest) -> TurnEventStream {
    Box::pin(stream! {
        let mut chunks = match backend.generate_stream(request).await {
            Ok(chunks) => chunks,
            Err(error) => {
                yield Err(error.into());
                return;
            }
        };
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    yield Err(error.into());
                    return;
                }
            };
            for part in chunk.parts {
                match part {
                    Part::Text { text } if !text.is_empty() => {
                        yield Ok(TurnEvent::TextDelta(text));
                    }
                    Part::Text { .. } => {}
                    Part::FunctionCall { function_call } => {
                        let record = ToolCallRecord::new(function_call);
                        trace!(call = record.id, tool = record.name(), "Model requested a tool");
                        yield Ok(TurnEvent::ToolCall(record));
                    }
                    // Only ever sent to the model, never received from it.
                    Part::FunctionResponse { .. } => {}
                }
            }
            if !chunk.citations.is_empty() {
                yield Ok(TurnEvent::CitationBatch(chunk.citations));
            }
            if let Some(reason) = chunk.finish_reason {
                trace!(?reason, "Reply stream finished");
            }
            if let Some(usage) = chunk.usage {
                debug!(
                    prompt_tokens = usage.prompt_tokens,
                    response_tokens = usage.response_tokens,
                    "Token usage"
                );
            }
        }
    })
}

/// Folds one reply's events into the pieces needed to continue the turn.
///
/// Citations are not collected here; the transcript owns those.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    text: String,
    tool_calls: Vec<ToolCallRecord>,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, event: &TurnEvent) {
        match event {
            TurnEvent::TextDelta(delta) => self.text.push_str(delta),
            TurnEvent::ToolCall(record) => self.tool_calls.push(record.clone()),
            TurnEvent::CitationBatch(_) => {}
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tool_calls(&self) -> &[ToolCallRecord] {
        &self.tool_calls
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The model turn to append to session history, or `None` for a reply
    /// that produced nothing.
    pub fn model_content(&self) -> Option<taliesin_llm::Content> {
        let mut parts = Vec::new();
        if !self.text.is_empty() {
            parts.push(Part::text(&self.text));
        }
        for record in &self.tool_calls {
            parts.push(Part::FunctionCall {
                function_call: record.call.clone(),
            });
        }
        if parts.is_empty() {
            None
        } else {
            Some(taliesin_llm::Content::model_parts(parts))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use taliesin_llm::{ChunkEvent, Content, LlmError, MockBackend, MockReply};

    fn request() -> GenerationRequest {
        GenerationRequest::new(vec![Content::user("hello")])
    }

    async fn collect(stream: TurnEventStream) -> Vec<Result<TurnEvent>> {
        stream.collect().await
    }

    #[tokio::test]
    async fn test_deltas_and_citations_keep_stream_order() {
        let backend = Arc::new(MockBackend::with_replies(
            "mock",
            vec![MockReply::events(vec![
                Ok(ChunkEvent::text("The portal ")),
                Ok(ChunkEvent::text("has a reset page.")
                    .with_citations(vec![Citation::new("KB", "https://kb/reset")])),
                Ok(ChunkEvent::finish(taliesin_llm::FinishReason::Stop)),
            ])],
        ));
        let events = collect(open_turn(backend, request())).await;
        let events: Vec<TurnEvent> = events.into_iter().map(|e| e.unwrap()).collect();
        assert_eq!(
            events,
            vec![
                TurnEvent::TextDelta("The portal ".to_string()),
                TurnEvent::TextDelta("has a reset page.".to_string()),
                TurnEvent::CitationBatch(vec![Citation::new("KB", "https://kb/reset")]),
            ]
        );
    }

    #[tokio::test]
    async fn test_function_calls_become_tool_events() {
        let backend = Arc::new(MockBackend::with_replies(
            "mock",
            vec![MockReply::function_call(
                "record_incident",
                json!({"urgency": "High"}),
            )],
        ));
        let events = collect(open_turn(backend, request())).await;
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            TurnEvent::ToolCall(record) => {
                assert_eq!(record.name(), "record_incident");
                assert_eq!(record.call.args["urgency"], "High");
                assert!(!record.id.is_empty());
            }
            other => panic!("expected a tool call, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_failure_yields_one_error() {
        let backend = Arc::new(MockBackend::with_replies(
            "mock",
            vec![MockReply::unavailable(LlmError::Network(
                "unreachable".to_string(),
            ))],
        ));
        let events = collect(open_turn(backend, request())).await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_the_stream() {
        let backend = Arc::new(MockBackend::with_replies(
            "mock",
            vec![MockReply::events(vec![
                Ok(ChunkEvent::text("partial")),
                Err(LlmError::Network("dropped".to_string())),
                Ok(ChunkEvent::text("never seen")),
            ])],
        ));
        let events = collect(open_turn(backend, request())).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            *events[0].as_ref().unwrap(),
            TurnEvent::TextDelta("partial".to_string())
        );
        assert!(events[1].is_err());
    }

    #[tokio::test]
    async fn test_stream_is_lazy_until_polled() {
        let backend = Arc::new(MockBackend::with_replies(
            "mock",
            vec![MockReply::text("unused")],
        ));
        let stream = open_turn(backend.clone(), request());
        assert_eq!(backend.request_count(), 0);
        drop(stream);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn test_accumulator_folds_text_and_calls() {
        let mut acc = ReplyAccumulator::new();
        acc.absorb(&TurnEvent::TextDelta("Let me file that. ".to_string()));
        acc.absorb(&TurnEvent::TextDelta("One moment.".to_string()));
        acc.absorb(&TurnEvent::CitationBatch(vec![Citation::new(
            "KB",
            "https://kb",
        )]));
        acc.absorb(&TurnEvent::ToolCall(ToolCallRecord::new(
            FunctionCall::new("record_incident", json!({})),
        )));

        assert_eq!(acc.text(), "Let me file that. One moment.");
        assert!(acc.has_tool_calls());
        let content = acc.model_content().unwrap();
        assert_eq!(content.text(), "Let me file that. One moment.");
        assert_eq!(content.parts.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_accumulator_yields_no_content() {
        let acc = ReplyAccumulator::new();
        assert!(acc.model_content().is_none());
        assert!(!acc.has_tool_calls());
    }
}
