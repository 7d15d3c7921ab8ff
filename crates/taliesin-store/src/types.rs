//! Record types persisted by the store.
//!
//! These mirror what the support assistant writes during a conversation:
//! incident reports, notification emails, message feedback, archived
//! transcripts, and administrator accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for an incident report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(pub Uuid);

impl IncidentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for IncidentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IncidentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a logged email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailId(pub Uuid);

impl EmailId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for EmailId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EmailId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a feedback entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackId(pub Uuid);

impl FeedbackId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for FeedbackId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an archived session transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArchiveId(pub Uuid);

impl ArchiveId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ArchiveId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an administrator account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AdminId(pub Uuid);

impl AdminId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> std::result::Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AdminId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AdminId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Incident reports
// ─────────────────────────────────────────────────────────────────────────────

/// Urgency level of an incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "Low",
            Urgency::Medium => "Medium",
            Urgency::High => "High",
        }
    }

    /// Parse an urgency level, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Urgency::Low),
            "medium" => Some(Urgency::Medium),
            "high" => Some(Urgency::High),
            _ => None,
        }
    }
}

impl std::fmt::Display for Urgency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured incident report filed from a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: IncidentId,
    pub reporter_name: String,
    pub reporter_email: String,
    pub department: String,
    pub summary: String,
    pub description: String,
    pub urgency: Urgency,
    pub created_at: DateTime<Utc>,
}

impl IncidentReport {
    /// Create a new incident report timestamped now.
    pub fn new(
        reporter_name: impl Into<String>,
        reporter_email: impl Into<String>,
        department: impl Into<String>,
        summary: impl Into<String>,
        description: impl Into<String>,
        urgency: Urgency,
    ) -> Self {
        Self {
            id: IncidentId::new(),
            reporter_name: reporter_name.into(),
            reporter_email: reporter_email.into(),
            department: department.into(),
            summary: summary.into(),
            description: description.into(),
            urgency,
            created_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Email log
// ─────────────────────────────────────────────────────────────────────────────

/// A notification email recorded alongside an incident.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailLog {
    pub id: EmailId,
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl EmailLog {
    /// Create a new email log entry timestamped now.
    pub fn new(
        to: impl Into<String>,
        from: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: EmailId::new(),
            to: to.into(),
            from: from.into(),
            subject: subject.into(),
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feedback
// ─────────────────────────────────────────────────────────────────────────────

/// Direction of a feedback rating on an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    Positive,
    Negative,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Positive => "positive",
            FeedbackKind::Negative => "negative",
        }
    }

    /// Parse a feedback kind, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "positive" => Some(FeedbackKind::Positive),
            "negative" => Some(FeedbackKind::Negative),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded rating of one assistant message, keeping the exact text rated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub id: FeedbackId,
    pub kind: FeedbackKind,
    pub rated_text: String,
    pub created_at: DateTime<Utc>,
}

impl FeedbackEntry {
    /// Create a new feedback entry timestamped now.
    pub fn new(kind: FeedbackKind, rated_text: impl Into<String>) -> Self {
        Self {
            id: FeedbackId::new(),
            kind,
            rated_text: rated_text.into(),
            created_at: Utc::now(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session archives
// ─────────────────────────────────────────────────────────────────────────────

/// A source reference preserved in an archived turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedCitation {
    pub title: String,
    pub uri: String,
}

/// One turn of an archived transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedTurn {
    /// "user" or "model".
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackKind>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<ArchivedCitation>,
}

/// A completed conversation saved for later review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionArchive {
    pub id: ArchiveId,
    pub turns: Vec<ArchivedTurn>,
    pub created_at: DateTime<Utc>,
}

impl SessionArchive {
    /// Create a new archive timestamped now.
    pub fn new(turns: Vec<ArchivedTurn>) -> Self {
        Self {
            id: ArchiveId::new(),
            turns,
            created_at: Utc::now(),
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Administrator accounts
// ─────────────────────────────────────────────────────────────────────────────

/// Role of an administrator account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminRole {
    #[serde(rename = "Super Admin")]
    SuperAdmin,
    Admin,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::SuperAdmin => "Super Admin",
            AdminRole::Admin => "Admin",
        }
    }

    /// Parse a role, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "super admin" => Some(AdminRole::SuperAdmin),
            "admin" => Some(AdminRole::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdminRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An administrator account for the records tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminAccount {
    pub id: AdminId,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub role: AdminRole,
    pub created_at: DateTime<Utc>,
}

impl AdminAccount {
    /// Create a new account timestamped now.
    pub fn new(email: impl Into<String>, password: Option<String>, role: AdminRole) -> Self {
        Self {
            id: AdminId::new(),
            email: email.into(),
            password,
            role,
            created_at: Utc::now(),
        }
    }
}

/// Partial update applied to an administrator account. `None` fields keep
/// their stored value.
#[derive(Debug, Clone, Default)]
pub struct AdminUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<AdminRole>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Counts
// ─────────────────────────────────────────────────────────────────────────────

/// Row counts across all record tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub incidents: usize,
    pub emails: usize,
    pub feedback: usize,
    pub archives: usize,
    pub admins: usize,
}
