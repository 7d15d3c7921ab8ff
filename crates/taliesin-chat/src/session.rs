//! Backend session lifecycle.
//!
//! A session pairs a system instruction (language + knowledge corpus) with
//! the request history sent to the backend. Sessions are built lazily on
//! first use and dropped whenever the configuration changes or the backend
//! reports them expired; the next turn then starts a fresh one.

use chrono::{DateTime, Utc};
use taliesin_llm::Content;
use tracing::{debug, info};
use uuid::Uuid;

use crate::prompt::{self, Language};

/// Identifier for one backend session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Settings a session is built from.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub language: Language,
    pub knowledge: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            language: Language::default(),
            knowledge: prompt::DEFAULT_KNOWLEDGE.to_string(),
        }
    }
}

/// One live backend session: instruction plus accumulated history.
#[derive(Debug, Clone)]
pub struct SessionContext {
    id: SessionId,
    system_instruction: String,
    history: Vec<Content>,
    created_at: DateTime<Utc>,
}

impl SessionContext {
    fn new(config: &SessionConfig) -> Self {
        Self {
            id: SessionId::new(),
            system_instruction: prompt::build_system_prompt(config.language, &config.knowledge),
            history: vec![Content::model(config.language.welcome_message())],
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Record one more turn of request history.
    pub fn push(&mut self, content: Content) {
        self.history.push(content);
    }

    /// Current history length, usable as a rollback checkpoint.
    pub fn checkpoint(&self) -> usize {
        self.history.len()
    }

    /// Discard everything pushed after `checkpoint`. A failed exchange is
    /// rolled back with this so the next request never carries an
    /// unanswered user message.
    pub fn rollback(&mut self, checkpoint: usize) {
        if checkpoint < self.history.len() {
            debug!(
                session = %self.id,
                dropped = self.history.len() - checkpoint,
                "Rolled back uncommitted history"
            );
            self.history.truncate(checkpoint);
        }
    }
}

/// Owns the current session and the configuration it is built from.
#[derive(Debug, Clone)]
pub struct SessionManager {
    config: SessionConfig,
    session: Option<SessionContext>,
}

impl SessionManager {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn language(&self) -> Language {
        self.config.language
    }

    /// The active session, building one from the current configuration if
    /// none exists.
    pub fn ensure(&mut self) -> &mut SessionContext {
        let config = &self.config;
        self.session.get_or_insert_with(|| {
            let session = SessionContext::new(config);
            info!(
                session = %session.id(),
                language = config.language.code(),
                "Opened backend session"
            );
            session
        })
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id())
    }

    /// Drop the active session so the next turn starts a fresh one.
    pub fn invalidate(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(session = %session.id(), "Invalidated backend session");
        }
    }

    /// Switch conversation language. Invalidates any active session.
    pub fn set_language(&mut self, language: Language) {
        self.config.language = language;
        self.invalidate();
    }

    /// Replace the knowledge corpus. Invalidates any active session.
    pub fn set_knowledge(&mut self, knowledge: impl Into<String>) {
        self.config.knowledge = knowledge.into();
        self.invalidate();
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sessions_build_lazily_and_persist() {
        let mut manager = SessionManager::default();
        assert!(!manager.is_active());
        let id = manager.ensure().id();
        assert!(manager.is_active());
        assert_eq!(manager.ensure().id(), id);
    }

    #[test]
    fn test_new_sessions_seed_the_welcome_turn() {
        let mut manager = SessionManager::default();
        let session = manager.ensure();
        assert_eq!(session.history().len(), 1);
        assert_eq!(
            session.history()[0].text(),
            Language::English.welcome_message()
        );
        assert!(session.system_instruction().contains("English"));
    }

    #[test]
    fn test_invalidate_drops_history() {
        let mut manager = SessionManager::default();
        manager.ensure().push(Content::user("hello"));
        assert_eq!(manager.ensure().history().len(), 2);
        manager.invalidate();
        assert!(!manager.is_active());
        assert_eq!(manager.ensure().history().len(), 1);
    }

    #[test]
    fn test_rollback_restores_a_checkpoint() {
        let mut manager = SessionManager::default();
        let session = manager.ensure();
        let checkpoint = session.checkpoint();

        session.push(Content::user("never answered"));
        session.push(Content::model("partial"));
        session.rollback(checkpoint);

        assert_eq!(session.history().len(), 1);
        // A stale checkpoint never truncates newer history.
        session.push(Content::user("kept"));
        session.rollback(checkpoint + 5);
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn test_set_language_rebuilds_the_instruction() {
        let mut manager = SessionManager::default();
        let first = manager.ensure().id();
        manager.set_language(Language::Tamil);
        assert!(!manager.is_active());
        let session = manager.ensure();
        assert_ne!(session.id(), first);
        assert!(session.system_instruction().contains("Tamil"));
        assert_eq!(
            session.history()[0].text(),
            Language::Tamil.welcome_message()
        );
    }

    #[test]
    fn test_set_knowledge_invalidates() {
        let mut manager = SessionManager::default();
        manager.ensure();
        manager.set_knowledge("TITLE: Custom\nCONTENT: body");
        assert!(!manager.is_active());
        assert!(manager
            .ensure()
            .system_instruction()
            .ends_with("TITLE: Custom\nCONTENT: body"));
    }
}
