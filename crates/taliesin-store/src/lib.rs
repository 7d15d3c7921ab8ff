//! Record persistence for Taliesin.
//!
//! Everything the assistant writes during a conversation lands here, backed
//! by a single SQLite database:
//!
//! - Incident reports filed through the `record_incident` tool
//! - Notification emails derived from those incidents
//! - Per-message feedback ratings
//! - Archived session transcripts
//! - Administrator accounts for the records tooling

pub mod error;
pub mod store;
pub mod types;

// Re-export error types
pub use error::{Result, StoreError};

// Re-export store
pub use store::{DEFAULT_ADMIN_EMAIL, RecordStore};

// Re-export record types
pub use types::{
    AdminAccount,
    AdminId,
    AdminRole,
    AdminUpdate,
    // Archive types
    ArchiveId,
    ArchivedCitation,
    ArchivedTurn,
    EmailId,
    EmailLog,
    FeedbackEntry,
    FeedbackId,
    FeedbackKind,
    // Incident types
    IncidentId,
    IncidentReport,
    SessionArchive,
    StoreCounts,
    Urgency,
};
