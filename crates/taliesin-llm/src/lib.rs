//! Gemini streaming client for Taliesin.
//!
//! This crate owns everything that talks to the generation API: the wire
//! types, the [`ChatBackend`] trait, the SSE chunk stream, and a scripted
//! [`MockBackend`] for tests.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │  ChatBackend trait                       │
//! │  - generate() -> GenerationResponse      │
//! │  - generate_stream() -> Stream<Chunk>    │
//! └──────────────────────────────────────────┘
//!                 │
//!        ┌────────┴────────┐
//!        ▼                 ▼
//!  ┌───────────┐    ┌─────────────┐
//!  │  Gemini   │    │ MockBackend │
//!  └───────────┘    └─────────────┘
//! ```
//!
//! Streams are lazy and single-consumer: dropping a [`ChunkStream`] cancels
//! the underlying transfer without pulling further bytes.

pub mod backend;
pub mod error;
pub mod types;

// Provider implementation
pub mod gemini;

pub use backend::{
    with_retry, ChatBackend, ChunkEvent, ChunkStream, MockBackend, MockReply, SharedBackend,
};
pub use error::{is_retryable, LlmError, Result};
pub use types::{
    Citation, Content, FinishReason, FunctionCall, FunctionResponse, GenerationConfig,
    GenerationRequest, GenerationResponse, Part, Role, SystemInstruction, ToolDeclaration,
    ToolGroup, Usage,
};

// Re-export provider config
pub use gemini::{GeminiBackend, GeminiConfig};
