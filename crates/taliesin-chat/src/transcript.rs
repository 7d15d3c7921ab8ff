//! The ordered record of one conversation.
//!
//! A transcript is append-only: turns are never removed or reordered once
//! pushed, and a reply's text only ever grows. At most one model reply is
//! "open" (still streaming) at a time; deltas and citations may only be
//! attached to that turn, and it must be closed or failed before the next
//! turn starts.

use chrono::{DateTime, Utc};
use taliesin_llm::{Citation, Role};
use taliesin_store::{ArchivedCitation, ArchivedTurn, FeedbackKind};
use uuid::Uuid;

use crate::error::{ChatError, Result};

/// Identifier for a single transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnId(Uuid);

impl TurnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TurnId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TurnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user message or assistant reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub id: TurnId,
    pub role: Role,
    pub content: String,
    pub citations: Vec<Citation>,
    pub feedback: Option<FeedbackKind>,
    /// Set when the turn ended with the fallback message instead of a
    /// complete reply.
    pub error: bool,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: TurnId::new(),
            role,
            content: content.into(),
            citations: Vec::new(),
            feedback: None,
            error: false,
            created_at: Utc::now(),
        }
    }
}

/// Append-only conversation log with at most one streaming reply open.
#[derive(Debug, Clone)]
pub struct Transcript {
    turns: Vec<Turn>,
    open_reply: Option<usize>,
}

impl Transcript {
    /// Start a transcript seeded with the assistant's greeting.
    pub fn new(welcome: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::new(Role::Model, welcome)],
            open_reply: None,
        }
    }

    /// Discard everything and reseed with a fresh greeting.
    pub fn reset(&mut self, welcome: impl Into<String>) {
        self.turns.clear();
        self.turns.push(Turn::new(Role::Model, welcome));
        self.open_reply = None;
    }

    /// Append a user turn.
    pub fn push_user(&mut self, content: impl Into<String>) -> TurnId {
        let turn = Turn::new(Role::User, content);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Append a completed assistant turn, such as a reconfiguration notice.
    pub fn push_notice(&mut self, content: impl Into<String>) -> TurnId {
        let turn = Turn::new(Role::Model, content);
        let id = turn.id;
        self.turns.push(turn);
        id
    }

    /// Append an empty assistant turn and mark it as the streaming target.
    pub fn open_reply(&mut self) -> Result<TurnId> {
        if self.open_reply.is_some() {
            return Err(ChatError::transcript("A reply is already streaming"));
        }
        let turn = Turn::new(Role::Model, "");
        let id = turn.id;
        self.open_reply = Some(self.turns.len());
        self.turns.push(turn);
        Ok(id)
    }

    /// True while a reply is still being streamed into.
    pub fn reply_is_open(&self) -> bool {
        self.open_reply.is_some()
    }

    /// Append streamed text to the open reply.
    pub fn append_delta(&mut self, delta: &str) -> Result<()> {
        let turn = self.open_turn_mut()?;
        turn.content.push_str(delta);
        Ok(())
    }

    /// Attach citations to the open reply. Earlier citations are kept.
    pub fn append_citations(&mut self, citations: &[Citation]) -> Result<()> {
        let turn = self.open_turn_mut()?;
        turn.citations.extend_from_slice(citations);
        Ok(())
    }

    /// Mark the open reply complete.
    pub fn close_reply(&mut self) -> Result<TurnId> {
        let index = self
            .open_reply
            .take()
            .ok_or_else(|| ChatError::transcript("No reply is streaming"))?;
        Ok(self.turns[index].id)
    }

    /// Close the open reply as failed, folding in the fallback message.
    ///
    /// Partial text already streamed is kept with the fallback appended
    /// after a blank line; a reply with no text yet becomes the fallback
    /// verbatim. Returns `None` when no reply was open.
    pub fn fail_reply(&mut self, fallback: &str) -> Option<TurnId> {
        let index = self.open_reply.take()?;
        let turn = &mut self.turns[index];
        if turn.content.is_empty() {
            turn.content.push_str(fallback);
        } else {
            turn.content.push_str("\n\n");
            turn.content.push_str(fallback);
        }
        turn.error = true;
        Some(turn.id)
    }

    /// Flip the feedback state of an assistant turn.
    ///
    /// Pressing the already-recorded kind clears it; anything else replaces
    /// it. Returns the new state.
    pub fn toggle_feedback(
        &mut self,
        id: TurnId,
        kind: FeedbackKind,
    ) -> Result<Option<FeedbackKind>> {
        let turn = self
            .turns
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| ChatError::transcript(format!("No turn {}", id)))?;
        if turn.role != Role::Model {
            return Err(ChatError::transcript("Only assistant replies can be rated"));
        }
        turn.feedback = if turn.feedback == Some(kind) {
            None
        } else {
            Some(kind)
        };
        Ok(turn.feedback)
    }

    /// Id of the n-th assistant turn counting back from the latest (n = 1).
    pub fn nth_model_turn_from_end(&self, n: usize) -> Option<TurnId> {
        if n == 0 {
            return None;
        }
        self.turns
            .iter()
            .rev()
            .filter(|t| t.role == Role::Model)
            .nth(n - 1)
            .map(|t| t.id)
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        self.turns.iter().find(|t| t.id == id)
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Snapshot the transcript in the shape the archive store persists.
    pub fn to_archive_turns(&self) -> Vec<ArchivedTurn> {
        self.turns
            .iter()
            .map(|turn| ArchivedTurn {
                role: match turn.role {
                    Role::User => "user".to_string(),
                    Role::Model => "model".to_string(),
                },
                content: turn.content.clone(),
                feedback: turn.feedback,
                citations: turn
                    .citations
                    .iter()
                    .map(|c| ArchivedCitation {
                        title: c.title.clone(),
                        uri: c.uri.clone(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn open_turn_mut(&mut self) -> Result<&mut Turn> {
        let index = self
            .open_reply
            .ok_or_else(|| ChatError::transcript("No reply is streaming"))?;
        Ok(&mut self.turns[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        Transcript::new("Hello, how can I help?")
    }

    #[test]
    fn test_new_transcript_seeds_the_greeting() {
        let t = transcript();
        assert_eq!(t.len(), 1);
        let greeting = t.last().unwrap();
        assert_eq!(greeting.role, Role::Model);
        assert_eq!(greeting.content, "Hello, how can I help?");
        assert!(!t.reply_is_open());
    }

    #[test]
    fn test_deltas_concatenate_in_order() {
        let mut t = transcript();
        t.push_user("vpn is down");
        t.open_reply().unwrap();
        t.append_delta("Try restarting ").unwrap();
        t.append_delta("the AnyConnect client.").unwrap();
        let id = t.close_reply().unwrap();
        let reply = t.get(id).unwrap();
        assert_eq!(reply.content, "Try restarting the AnyConnect client.");
        assert!(!reply.error);
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_citations_accumulate_without_loss() {
        let mut t = transcript();
        t.push_user("how do I reset my password?");
        t.open_reply().unwrap();
        t.append_citations(&[Citation::new("Reset guide", "https://kb/reset")])
            .unwrap();
        t.append_delta("See the portal.").unwrap();
        t.append_citations(&[Citation::new("Portal", "https://portal")])
            .unwrap();
        let id = t.close_reply().unwrap();
        let reply = t.get(id).unwrap();
        assert_eq!(reply.citations.len(), 2);
        assert_eq!(reply.citations[0].title, "Reset guide");
        assert_eq!(reply.citations[1].uri, "https://portal");
    }

    #[test]
    fn test_only_one_reply_open_at_a_time() {
        let mut t = transcript();
        t.open_reply().unwrap();
        assert!(t.open_reply().is_err());
        t.close_reply().unwrap();
        assert!(t.open_reply().is_ok());
    }

    #[test]
    fn test_appending_without_an_open_reply_fails() {
        let mut t = transcript();
        assert!(t.append_delta("orphan").is_err());
        assert!(t.close_reply().is_err());
        assert_eq!(t.fail_reply("fallback"), None);
    }

    #[test]
    fn test_fail_reply_with_no_text_becomes_the_fallback() {
        let mut t = transcript();
        t.push_user("hi");
        t.open_reply().unwrap();
        let id = t.fail_reply("Something went wrong.").unwrap();
        let reply = t.get(id).unwrap();
        assert_eq!(reply.content, "Something went wrong.");
        assert!(reply.error);
        assert!(!t.reply_is_open());
    }

    #[test]
    fn test_fail_reply_keeps_partial_text() {
        let mut t = transcript();
        t.push_user("hi");
        t.open_reply().unwrap();
        t.append_delta("Here is the first half").unwrap();
        let id = t.fail_reply("Something went wrong.").unwrap();
        let reply = t.get(id).unwrap();
        assert_eq!(
            reply.content,
            "Here is the first half\n\nSomething went wrong."
        );
        assert!(reply.error);
    }

    #[test]
    fn test_feedback_toggles_and_replaces() {
        let mut t = transcript();
        t.push_user("hi");
        t.open_reply().unwrap();
        t.append_delta("answer").unwrap();
        let id = t.close_reply().unwrap();

        assert_eq!(
            t.toggle_feedback(id, FeedbackKind::Positive).unwrap(),
            Some(FeedbackKind::Positive)
        );
        assert_eq!(
            t.toggle_feedback(id, FeedbackKind::Negative).unwrap(),
            Some(FeedbackKind::Negative)
        );
        assert_eq!(t.toggle_feedback(id, FeedbackKind::Negative).unwrap(), None);
    }

    #[test]
    fn test_feedback_rejects_user_turns() {
        let mut t = transcript();
        let user = t.push_user("hi");
        assert!(t.toggle_feedback(user, FeedbackKind::Positive).is_err());
    }

    #[test]
    fn test_nth_model_turn_from_end() {
        let mut t = transcript();
        t.push_user("one");
        t.open_reply().unwrap();
        t.append_delta("first answer").unwrap();
        let first = t.close_reply().unwrap();
        t.push_user("two");
        t.open_reply().unwrap();
        t.append_delta("second answer").unwrap();
        let second = t.close_reply().unwrap();

        assert_eq!(t.nth_model_turn_from_end(1), Some(second));
        assert_eq!(t.nth_model_turn_from_end(2), Some(first));
        assert_eq!(t.nth_model_turn_from_end(0), None);
        assert_eq!(t.nth_model_turn_from_end(10), None);
    }

    #[test]
    fn test_archive_snapshot_carries_feedback_and_citations() {
        let mut t = transcript();
        t.push_user("question");
        t.open_reply().unwrap();
        t.append_delta("answer").unwrap();
        t.append_citations(&[Citation::new("Doc", "https://doc")]).unwrap();
        let id = t.close_reply().unwrap();
        t.toggle_feedback(id, FeedbackKind::Positive).unwrap();

        let archived = t.to_archive_turns();
        assert_eq!(archived.len(), 3);
        assert_eq!(archived[0].role, "model");
        assert_eq!(archived[1].role, "user");
        assert_eq!(archived[2].feedback, Some(FeedbackKind::Positive));
        assert_eq!(archived[2].citations[0].uri, "https://doc");
    }

    #[test]
    fn test_reset_reseeds_the_greeting() {
        let mut t = transcript();
        t.push_user("hi");
        t.open_reply().unwrap();
        t.append_delta("answer").unwrap();
        t.close_reply().unwrap();
        t.reset("Fresh greeting");
        assert_eq!(t.len(), 1);
        assert_eq!(t.last().unwrap().content, "Fresh greeting");
        assert!(!t.reply_is_open());
    }
}
