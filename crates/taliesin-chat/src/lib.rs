//! Conversation orchestrator for the Taliesin support assistant.
//!
//! This crate turns one outbound user message into an ordered, incrementally
//! rendered reply: text fragments, citations, and server-invoked tool calls,
//! all landing in an append-only transcript. It also keeps the backend
//! session consistent across language switches, knowledge swaps, and
//! transport failures.
//!
//! # Architecture
//!
//! ```text
//!                ┌────────────────────────────────────┐
//!                │             ChatClient             │
//!                │  submit / feedback / reconfigure   │
//!                └──────┬──────────┬──────────┬───────┘
//!                       │          │          │
//!            ┌──────────▼───┐  ┌───▼──────┐  ┌▼──────────────┐
//!            │  Transcript  │  │ ToolSet  │  │ SessionManager │
//!            │ (append-only)│  │ incident │  │ (lazy rebuild) │
//!            └──────────────┘  │ feedback │  └───────┬────────┘
//!                              └────┬─────┘          │
//!                                   │          ┌─────▼─────┐
//!                              RecordStore     │  backend  │
//!                                              │  stream   │
//!                                              └───────────┘
//! ```
//!
//! The streaming path lives in [`multiplexer`]: backend chunks are
//! translated into [`TurnEvent`]s which the [`ChatClient`] applies to the
//! transcript in receipt order while feeding tool calls back to the model.

pub mod analysis;
pub mod client;
pub mod error;
pub mod multiplexer;
pub mod prompt;
pub mod session;
pub mod tools;
pub mod transcript;

pub use client::{ChatClient, TurnPhase, TurnReport, DEFAULT_MAX_TOOL_ROUNDS};
pub use error::{ChatError, Result};
pub use multiplexer::{open_turn, ReplyAccumulator, ToolCallRecord, TurnEvent, TurnEventStream};
pub use prompt::{build_system_prompt, Language, DEFAULT_KNOWLEDGE, FALLBACK_MESSAGE};
pub use session::{SessionConfig, SessionContext, SessionId, SessionManager};
pub use tools::{
    FeedbackArgs, IncidentArgs, ToolArgError, ToolInvocation, ToolSet, RECORD_FEEDBACK,
    RECORD_INCIDENT,
};
pub use transcript::{Transcript, Turn, TurnId};
