//! The turn controller: owns the transcript and drives each turn through
//! its lifecycle.
//!
//! ```text
//!   submit(text)
//!       │
//!       ▼
//!   Opened ──▶ Streaming ──▶ AwaitingToolResults ─┐
//!                 ▲   │                           │
//!                 └───┴───────────────────────────┘
//!                     │
//!                     ├──▶ Closed  (reply frozen, conversation archived)
//!                     └──▶ Failed  (fallback folded into the reply)
//! ```
//!
//! One turn at a time: `submit` takes `&mut self`, so a second submission
//! cannot start while one is in flight. Session expiry is the one failure
//! the caller is expected to handle: the turn still fails with the fallback
//! in place, but the session is invalidated and the error is classified so
//! the caller can retry once against a fresh session.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use serde_json::json;
use taliesin_llm::{
    Content, FunctionResponse, GenerationConfig, GenerationRequest, SharedBackend,
};
use taliesin_store::{ArchiveId, FeedbackEntry, FeedbackKind, RecordStore, SessionArchive};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis;
use crate::error::{ChatError, Result};
use crate::multiplexer::{self, ReplyAccumulator, TurnEvent};
use crate::prompt::{Language, FALLBACK_MESSAGE};
use crate::session::{SessionConfig, SessionId, SessionManager};
use crate::tools::ToolSet;
use crate::transcript::{Transcript, TurnId};

/// Upper bound on streaming rounds within one turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: u32 = 8;

/// Lifecycle states of one turn, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Opened,
    Streaming,
    AwaitingToolResults,
    Closed,
    Failed,
}

/// Outcome of a completed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnReport {
    /// Transcript id of the closed reply turn.
    pub reply: TurnId,
    /// Streaming rounds the turn needed (1 when no tools were called).
    pub rounds: u32,
}

/// A single support conversation: transcript, backend session, and tools.
pub struct ChatClient {
    backend: Option<SharedBackend>,
    store: Arc<RecordStore>,
    tools: ToolSet,
    sessions: SessionManager,
    transcript: Transcript,
    archive_id: ArchiveId,
    max_tool_rounds: u32,
    cancel: CancellationToken,
}

impl ChatClient {
    pub fn new(backend: SharedBackend, store: Arc<RecordStore>, config: SessionConfig) -> Self {
        Self::build(Some(backend), store, config)
    }

    /// A client with no backend credential. Construction succeeds so the
    /// rest of the application still works; every turn submission fails
    /// with the same configuration error until a key is provided.
    pub fn unavailable(store: Arc<RecordStore>, config: SessionConfig) -> Self {
        Self::build(None, store, config)
    }

    fn build(
        backend: Option<SharedBackend>,
        store: Arc<RecordStore>,
        config: SessionConfig,
    ) -> Self {
        let welcome = config.language.welcome_message();
        Self {
            backend,
            tools: ToolSet::new(store.clone()),
            store,
            sessions: SessionManager::new(config),
            transcript: Transcript::new(welcome),
            archive_id: ArchiveId::new(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: u32) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Turns
    // ─────────────────────────────────────────────────────────────────────

    /// Submit a user message and run the turn to completion.
    pub async fn submit(&mut self, text: impl Into<String>) -> Result<TurnReport> {
        self.submit_with(text, |_| {}).await
    }

    /// Submit a user message, reporting each turn event to `observer` as it
    /// lands in the transcript.
    pub async fn submit_with<F>(&mut self, text: impl Into<String>, mut observer: F) -> Result<TurnReport>
    where
        F: FnMut(&TurnEvent),
    {
        let backend = self.require_backend()?;
        let text = text.into();

        self.transcript.push_user(&text);
        let reply_id = self.transcript.open_reply()?;
        debug!(turn = %reply_id, phase = ?TurnPhase::Opened, "Turn opened");
        let session = self.sessions.ensure();
        let checkpoint = session.checkpoint();
        session.push(Content::user(&text));

        match self.run_turn(backend, reply_id, &mut observer).await {
            Ok(rounds) => {
                let reply = self.transcript.close_reply()?;
                debug!(turn = %reply, phase = ?TurnPhase::Closed, rounds, "Turn closed");
                self.archive_conversation();
                Ok(TurnReport { reply, rounds })
            }
            Err(error) => self.fail_turn(reply_id, checkpoint, error),
        }
    }

    async fn run_turn<F>(
        &mut self,
        backend: SharedBackend,
        reply_id: TurnId,
        observer: &mut F,
    ) -> Result<u32>
    where
        F: FnMut(&TurnEvent),
    {
        let cancel = self.cancel.clone();
        let mut rounds: u32 = 0;
        loop {
            rounds += 1;
            if rounds > self.max_tool_rounds {
                return Err(ChatError::MaxToolRounds(self.max_tool_rounds));
            }
            debug!(turn = %reply_id, phase = ?TurnPhase::Streaming, round = rounds, "Streaming reply");

            let request = self.build_request();
            let mut events = multiplexer::open_turn(backend.clone(), request);
            let mut reply = ReplyAccumulator::new();

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                    event = events.next() => {
                        let Some(event) = event else { break };
                        let event = event?;
                        self.apply_event(&event)?;
                        reply.absorb(&event);
                        observer(&event);
                    }
                }
            }

            if let Some(content) = reply.model_content() {
                self.sessions.ensure().push(content);
            }
            if !reply.has_tool_calls() {
                return Ok(rounds);
            }

            debug!(
                turn = %reply_id,
                phase = ?TurnPhase::AwaitingToolResults,
                calls = reply.tool_calls().len(),
                "Running tool calls"
            );
            let mut results = Vec::with_capacity(reply.tool_calls().len());
            for record in reply.tool_calls() {
                let outcome = self.tools.execute(&record.call);
                results.push(FunctionResponse::new(record.name(), json!({ "result": outcome })));
            }
            self.sessions.ensure().push(Content::function_results(results));
        }
    }

    fn apply_event(&mut self, event: &TurnEvent) -> Result<()> {
        match event {
            TurnEvent::TextDelta(delta) => self.transcript.append_delta(delta),
            TurnEvent::CitationBatch(citations) => self.transcript.append_citations(citations),
            TurnEvent::ToolCall(record) => {
                debug!(call = record.id, tool = record.name(), "Tool call received");
                Ok(())
            }
        }
    }

    /// Freeze the placeholder with the fallback message and classify the
    /// failure. The failed exchange is never committed to the session
    /// history. Session expiry also drops the session so the caller's one
    /// retry starts fresh.
    fn fail_turn(&mut self, reply_id: TurnId, checkpoint: usize, error: ChatError) -> Result<TurnReport> {
        warn!(turn = %reply_id, phase = ?TurnPhase::Failed, error = %error, "Turn failed");
        self.transcript.fail_reply(FALLBACK_MESSAGE);
        if error.is_session_expired() {
            info!("Backend session expired; the next turn starts a fresh one");
            self.sessions.invalidate();
        } else {
            self.sessions.ensure().rollback(checkpoint);
        }
        Err(error)
    }

    fn build_request(&mut self) -> GenerationRequest {
        let declarations = self.tools.declarations();
        let session = self.sessions.ensure();
        GenerationRequest::new(session.history().to_vec())
            .with_system(session.system_instruction())
            .with_tools(declarations)
            .with_config(GenerationConfig::chat())
    }

    fn require_backend(&self) -> Result<SharedBackend> {
        self.backend
            .clone()
            .ok_or_else(|| ChatError::config("No API key is configured; set GEMINI_API_KEY"))
    }

    /// Upsert the conversation snapshot under this conversation's archive id.
    /// Archival is best-effort: a storage failure is logged, never surfaced.
    fn archive_conversation(&self) {
        let Some(reply) = self.transcript.last() else {
            return;
        };
        if reply.content.is_empty() {
            return;
        }
        let archive = SessionArchive {
            id: self.archive_id,
            turns: self.transcript.to_archive_turns(),
            created_at: Utc::now(),
        };
        match self.store.save_archive(&archive) {
            Ok(()) => {
                debug!(archive = %self.archive_id, turns = archive.turns.len(), "Conversation archived");
            }
            Err(error) => {
                warn!(archive = %self.archive_id, error = %error, "Conversation could not be archived");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Feedback, reconfiguration, analysis
    // ─────────────────────────────────────────────────────────────────────

    /// Flip feedback on a reply. Every press is persisted with the exact
    /// text rated, including presses that clear the rating.
    pub fn toggle_feedback(
        &mut self,
        turn: TurnId,
        kind: FeedbackKind,
    ) -> Result<Option<FeedbackKind>> {
        let state = self.transcript.toggle_feedback(turn, kind)?;
        let rated_text = self
            .transcript
            .get(turn)
            .map(|t| t.content.clone())
            .unwrap_or_default();
        self.store.append_feedback(&FeedbackEntry::new(kind, rated_text))?;
        debug!(turn = %turn, kind = kind.as_str(), state = ?state, "Feedback toggled");
        Ok(state)
    }

    /// Switch conversation language. The transcript is kept; the session is
    /// rebuilt lazily and a notice in the new language marks the switch.
    pub fn set_language(&mut self, language: Language) {
        info!(language = language.code(), "Switching conversation language");
        self.sessions.set_language(language);
        self.transcript.push_notice(language.reconfigured_notice());
    }

    /// Replace the knowledge corpus. The transcript is kept; the session is
    /// rebuilt lazily and a notice marks the change.
    pub fn set_knowledge(&mut self, knowledge: impl Into<String>) {
        info!("Replacing the knowledge corpus");
        self.sessions.set_knowledge(knowledge);
        self.transcript
            .push_notice(self.sessions.language().reconfigured_notice());
    }

    /// Drop the transcript and session and start over under a new archive.
    pub fn reset_conversation(&mut self) {
        info!("Starting a fresh conversation");
        self.sessions.invalidate();
        self.archive_id = ArchiveId::new();
        self.transcript
            .reset(self.sessions.language().welcome_message());
    }

    /// Produce the administrative report for the current transcript.
    pub async fn analyze(&self) -> Result<String> {
        let backend = self.require_backend()?;
        analysis::analyze_transcript(backend, &self.transcript).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn language(&self) -> Language {
        self.sessions.language()
    }

    pub fn is_session_active(&self) -> bool {
        self.sessions.is_active()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.sessions.current_id()
    }

    pub fn archive_id(&self) -> ArchiveId {
        self.archive_id
    }

    /// Token that aborts the in-flight turn when cancelled. Cancellation is
    /// permanent for this client; it is meant for process shutdown.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use taliesin_llm::{ChunkEvent, Citation, FinishReason, LlmError, MockBackend, MockReply, Part};
    use taliesin_store::Urgency;

    fn client_with(replies: Vec<MockReply>) -> (ChatClient, Arc<MockBackend>, Arc<RecordStore>) {
        let backend = Arc::new(MockBackend::with_replies("mock", replies));
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let client = ChatClient::new(backend.clone(), store.clone(), SessionConfig::default());
        (client, backend, store)
    }

    fn incident_args() -> Value {
        json!({
            "reporter_name": "Dana Silva",
            "reporter_email": "dana@company.com",
            "department": "Finance",
            "summary": "VPN certificate invalid",
            "description": "AnyConnect rejects my certificate since this morning.",
            "urgency": "High",
        })
    }

    fn function_response_results(request: &GenerationRequest) -> Vec<(String, String)> {
        request
            .contents
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter_map(|p| match p {
                Part::FunctionResponse { function_response } => Some((
                    function_response.name.clone(),
                    function_response.response["result"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                )),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_reply_streams_deltas_in_order() {
        let (mut client, backend, _store) = client_with(vec![MockReply::deltas([
            "Restart ",
            "the AnyConnect ",
            "client.",
        ])]);
        let mut seen = Vec::new();
        let report = client
            .submit_with("my vpn will not connect", |event| {
                if let TurnEvent::TextDelta(delta) = event {
                    seen.push(delta.clone());
                }
            })
            .await
            .unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(seen, vec!["Restart ", "the AnyConnect ", "client."]);
        let reply = client.transcript().get(report.reply).unwrap();
        assert_eq!(reply.content, "Restart the AnyConnect client.");
        assert!(!reply.error);
        assert_eq!(client.transcript().len(), 3);
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_requests_carry_history_instruction_and_tools() {
        let (mut client, backend, _store) = client_with(vec![MockReply::text("Hello there.")]);
        client.submit("hello").await.unwrap();

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        // welcome turn then the user turn
        assert_eq!(requests[0].contents.len(), 2);
        assert_eq!(
            requests[0].contents[0].text(),
            Language::English.welcome_message()
        );
        assert_eq!(requests[0].contents[1].text(), "hello");
        let instruction = requests[0].system_instruction.as_ref().unwrap();
        assert!(instruction.parts[0]
            .as_text()
            .unwrap()
            .contains("IT Support Supervisor Agent"));
        assert_eq!(requests[0].tools[0].function_declarations.len(), 2);
        assert_eq!(
            requests[0].generation_config.as_ref().unwrap().temperature,
            Some(0.1)
        );
    }

    #[tokio::test]
    async fn test_citations_accumulate_across_batches() {
        let (mut client, _backend, _store) = client_with(vec![MockReply::events(vec![
            Ok(ChunkEvent::text("Use the reset portal.")
                .with_citations(vec![Citation::new("Reset guide", "https://kb/reset")])),
            Ok(ChunkEvent::text(" It sends a code.")
                .with_citations(vec![Citation::new("Portal", "https://portal")])),
            Ok(ChunkEvent::finish(FinishReason::Stop)),
        ])]);
        let report = client.submit("how do I reset my password?").await.unwrap();
        let reply = client.transcript().get(report.reply).unwrap();
        assert_eq!(reply.citations.len(), 2);
        assert_eq!(reply.citations[0].title, "Reset guide");
        assert_eq!(reply.citations[1].title, "Portal");
    }

    #[tokio::test]
    async fn test_incident_tool_round_trip() {
        let (mut client, backend, store) = client_with(vec![
            MockReply::function_call(crate::tools::RECORD_INCIDENT, incident_args()),
            MockReply::text("Your report is filed and IT has been notified."),
        ]);
        let report = client
            .submit("the vpn still fails, please file a report")
            .await
            .unwrap();

        assert_eq!(report.rounds, 2);
        let reply = client.transcript().get(report.reply).unwrap();
        assert_eq!(reply.content, "Your report is filed and IT has been notified.");

        let incidents = store.list_incidents(10, 0).unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].urgency, Urgency::High);
        let emails = store.list_emails(10, 0).unwrap();
        assert_eq!(emails.len(), 1);
        assert_eq!(emails[0].to, "admin@gmail.com");

        // Second request carries the call echo and the tool result.
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        let results = function_response_results(&requests[1]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, crate::tools::RECORD_INCIDENT);
        assert!(results[0].1.contains("recorded with High urgency"));
        let echoed_calls: usize = requests[1]
            .contents
            .iter()
            .flat_map(|c| c.parts.iter())
            .filter(|p| matches!(p, Part::FunctionCall { .. }))
            .count();
        assert_eq!(echoed_calls, 1);
    }

    #[tokio::test]
    async fn test_missing_tool_fields_become_a_tool_result() {
        let (mut client, backend, store) = client_with(vec![
            MockReply::function_call(
                crate::tools::RECORD_INCIDENT,
                json!({"reporter_name": "Dana Silva", "summary": "vpn broken"}),
            ),
            MockReply::text("Could you share your department and email?"),
        ]);
        let report = client.submit("file a report for me").await.unwrap();

        assert!(store.list_incidents(10, 0).unwrap().is_empty());
        assert!(store.list_emails(10, 0).unwrap().is_empty());
        let results = function_response_results(&backend.requests()[1]);
        assert!(results[0].1.starts_with("Error: Missing required fields:"));
        assert!(results[0].1.contains("department"));
        let reply = client.transcript().get(report.reply).unwrap();
        assert_eq!(reply.content, "Could you share your department and email?");
    }

    #[tokio::test]
    async fn test_feedback_tool_round_trip() {
        let (mut client, _backend, store) = client_with(vec![
            MockReply::function_call(
                crate::tools::RECORD_FEEDBACK,
                json!({"helpful": false, "rated_text": "Restart the router."}),
            ),
            MockReply::text("Sorry that did not help. Shall I file an incident?"),
        ]);
        client.submit("that did not work").await.unwrap();

        let entries = store.list_feedback(10, 0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, FeedbackKind::Negative);
        assert_eq!(entries[0].rated_text, "Restart the router.");
    }

    #[tokio::test]
    async fn test_tool_loop_cap_fails_the_turn() {
        let looped = || MockReply::function_call(crate::tools::RECORD_FEEDBACK,
            json!({"helpful": true, "rated_text": "x"}));
        let (mut client, backend, _store) =
            client_with(vec![looped(), looped(), looped()]);
        client = client.with_max_tool_rounds(2);

        let error = client.submit("loop forever").await.unwrap_err();
        assert!(matches!(error, ChatError::MaxToolRounds(2)));
        assert_eq!(backend.request_count(), 2);

        let last = client.transcript().last().unwrap();
        assert!(last.error);
        assert_eq!(last.content, FALLBACK_MESSAGE);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_partial_text_and_prior_turns() {
        let (mut client, _backend, store) = client_with(vec![MockReply::events(vec![
            Ok(ChunkEvent::text("The fix is")),
            Err(LlmError::Network("connection reset".to_string())),
        ])]);
        let error = client.submit("help").await.unwrap_err();
        assert!(matches!(error, ChatError::Llm(LlmError::Network(_))));

        let turns = client.transcript().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[0].content, Language::English.welcome_message());
        assert_eq!(turns[1].content, "help");
        assert_eq!(turns[2].content, format!("The fix is\n\n{}", FALLBACK_MESSAGE));
        assert!(turns[2].error);
        // transient failures keep the session alive
        assert!(client.is_session_active());
        // failed turns are not archived
        assert!(store.list_archives(10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_exchanges_are_not_committed_to_session_history() {
        let (mut client, backend, _store) = client_with(vec![
            MockReply::error(LlmError::Network("unreachable".to_string())),
            MockReply::text("Second answer."),
        ]);
        client.submit("first question").await.unwrap_err();
        assert!(client.is_session_active());

        client.submit("second question").await.unwrap();
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);

        // The unanswered first message was rolled back: welcome plus the new
        // user turn only, with roles alternating.
        assert_eq!(requests[1].contents.len(), 2);
        assert_eq!(requests[1].contents[1].text(), "second question");
        let has_consecutive_users = requests[1]
            .contents
            .windows(2)
            .any(|w| w[0].role == taliesin_llm::Role::User && w[1].role == taliesin_llm::Role::User);
        assert!(!has_consecutive_users);
    }

    #[tokio::test]
    async fn test_mid_loop_failure_rolls_back_tool_rounds_too() {
        let (mut client, backend, _store) = client_with(vec![
            MockReply::function_call(
                crate::tools::RECORD_FEEDBACK,
                json!({"helpful": true, "rated_text": "x"}),
            ),
            MockReply::error(LlmError::Network("reset".to_string())),
            MockReply::text("Recovered."),
        ]);
        client.submit("rate that").await.unwrap_err();

        client.submit("try again").await.unwrap();
        let requests = backend.requests();
        assert_eq!(requests.len(), 3);
        // No function-call echo or tool result from the failed turn survives.
        assert_eq!(requests[2].contents.len(), 2);
        assert!(requests[2]
            .contents
            .iter()
            .flat_map(|c| c.parts.iter())
            .all(|p| matches!(p, Part::Text { .. })));
    }

    #[tokio::test]
    async fn test_failure_before_any_text_shows_the_fallback_verbatim() {
        let (mut client, _backend, _store) = client_with(vec![MockReply::error(
            LlmError::Network("unreachable".to_string()),
        )]);
        client.submit("help").await.unwrap_err();
        let last = client.transcript().last().unwrap();
        assert_eq!(last.content, FALLBACK_MESSAGE);
        assert!(last.error);
    }

    #[tokio::test]
    async fn test_session_expiry_invalidates_and_a_retry_recovers() {
        let (mut client, backend, _store) = client_with(vec![
            MockReply::unavailable(LlmError::SessionExpired("404 session not found".to_string())),
            MockReply::text("Recovered answer."),
        ]);

        let error = client.submit("first try").await.unwrap_err();
        assert!(error.is_session_expired());
        assert!(!client.is_session_active());
        assert!(client.transcript().last().unwrap().error);

        let report = client.submit("first try").await.unwrap();
        let reply = client.transcript().get(report.reply).unwrap();
        assert_eq!(reply.content, "Recovered answer.");

        // The retry was sent on a fresh session: welcome plus one user turn.
        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].contents.len(), 2);
        assert_eq!(
            requests[1].contents[0].text(),
            Language::English.welcome_message()
        );
    }

    #[tokio::test]
    async fn test_feedback_presses_persist_even_when_clearing() {
        let (mut client, _backend, store) = client_with(vec![MockReply::text("The answer.")]);
        let report = client.submit("question").await.unwrap();

        let state = client
            .toggle_feedback(report.reply, FeedbackKind::Positive)
            .unwrap();
        assert_eq!(state, Some(FeedbackKind::Positive));
        let state = client
            .toggle_feedback(report.reply, FeedbackKind::Positive)
            .unwrap();
        assert_eq!(state, None);

        let entries = store.list_feedback(10, 0).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.kind == FeedbackKind::Positive));
        assert!(entries.iter().all(|e| e.rated_text == "The answer."));
    }

    #[tokio::test]
    async fn test_language_switch_keeps_transcript_and_rebuilds_session() {
        let (mut client, backend, _store) = client_with(vec![
            MockReply::text("First answer."),
            MockReply::text("දෙවන පිළිතුර."),
        ]);
        client.submit("first question").await.unwrap();
        assert_eq!(client.transcript().len(), 3);

        client.set_language(Language::Sinhala);
        assert!(!client.is_session_active());
        assert_eq!(client.transcript().len(), 4);
        assert_eq!(
            client.transcript().last().unwrap().content,
            Language::Sinhala.reconfigured_notice()
        );

        client.submit("දෙවන ප්‍රශ්නය").await.unwrap();
        let requests = backend.requests();
        // Fresh session history: Sinhala welcome plus the new user turn only.
        assert_eq!(requests[1].contents.len(), 2);
        assert_eq!(
            requests[1].contents[0].text(),
            Language::Sinhala.welcome_message()
        );
        assert!(requests[1].system_instruction.as_ref().unwrap().parts[0]
            .as_text()
            .unwrap()
            .contains("Sinhala"));
        // The transcript kept growing across the switch.
        assert_eq!(client.transcript().len(), 6);
    }

    #[tokio::test]
    async fn test_knowledge_swap_rebuilds_the_instruction() {
        let (mut client, backend, _store) = client_with(vec![MockReply::text("Noted.")]);
        client.set_knowledge("TITLE: Badge Readers\nCONTENT: Hold the badge flat.");
        assert_eq!(client.transcript().len(), 2);

        client.submit("badge question").await.unwrap();
        let instruction = backend.requests()[0]
            .system_instruction
            .as_ref()
            .unwrap()
            .parts[0]
            .as_text()
            .unwrap()
            .to_string();
        assert!(instruction.ends_with("TITLE: Badge Readers\nCONTENT: Hold the badge flat."));
        assert!(!instruction.contains("Password Reset Procedure"));
    }

    #[tokio::test]
    async fn test_closed_turns_upsert_one_archive() {
        let (mut client, _backend, store) = client_with(vec![
            MockReply::text("First answer."),
            MockReply::text("Second answer."),
        ]);
        client.submit("one").await.unwrap();
        let archives = store.list_archives(10, 0).unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].id, client.archive_id());
        assert_eq!(archives[0].turns.len(), 3);

        client.submit("two").await.unwrap();
        let archives = store.list_archives(10, 0).unwrap();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].turns.len(), 5);
    }

    #[tokio::test]
    async fn test_reset_starts_a_new_archive() {
        let (mut client, backend, store) = client_with(vec![MockReply::text("First answer.")]);
        client.submit("one").await.unwrap();
        let first_archive = client.archive_id();

        client.reset_conversation();
        assert_eq!(client.transcript().len(), 1);
        assert!(!client.is_session_active());
        assert_ne!(client.archive_id(), first_archive);

        backend.push_reply(MockReply::text("Fresh answer."));
        client.submit("fresh question").await.unwrap();
        assert_eq!(store.list_archives(10, 0).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_client_fails_fast_and_identically() {
        let store = Arc::new(RecordStore::open_in_memory().unwrap());
        let mut client = ChatClient::unavailable(store.clone(), SessionConfig::default());

        for _ in 0..2 {
            let error = client.submit("hello").await.unwrap_err();
            assert!(matches!(error, ChatError::Config(_)));
        }
        // Nothing was appended and nothing was archived.
        assert_eq!(client.transcript().len(), 1);
        assert!(store.list_archives(10, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_fails_the_turn_before_the_backend_is_hit() {
        let (mut client, backend, _store) = client_with(vec![MockReply::text("never sent")]);
        client.cancellation_token().cancel();

        let error = client.submit("hello").await.unwrap_err();
        assert!(matches!(error, ChatError::Cancelled));
        assert_eq!(backend.request_count(), 0);
        let last = client.transcript().last().unwrap();
        assert!(last.error);
        assert_eq!(last.content, FALLBACK_MESSAGE);
    }
}
