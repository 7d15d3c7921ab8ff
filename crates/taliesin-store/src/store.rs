//! Record store implementation using SQLite.
//!
//! Appends are the normal write path: incidents, emails, and feedback are
//! written once during a conversation and never updated. Listings return
//! newest records first. Uses WAL mode for better concurrent reads.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::types::{
    AdminAccount, AdminId, AdminRole, AdminUpdate, ArchiveId, EmailId, EmailLog, FeedbackEntry,
    FeedbackId, FeedbackKind, IncidentId, IncidentReport, SessionArchive, StoreCounts, Urgency,
};

// ─────────────────────────────────────────────────────────────────────────────
// Schema Version
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

/// Email of the administrator seeded into an empty database.
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@gmail.com";

// ─────────────────────────────────────────────────────────────────────────────
// Record Store
// ─────────────────────────────────────────────────────────────────────────────

/// Record store backed by SQLite.
pub struct RecordStore {
    /// The SQLite connection (wrapped in Mutex for thread safety).
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore").finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Initialization
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Open or create a record store at the given path.
    ///
    /// Creates the database file and initializes the schema if it doesn't
    /// exist. An empty database is seeded with a default administrator.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|_| {
                    StoreError::Database(rusqlite::Error::InvalidPath(path.to_path_buf()))
                })?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        info!("Record store opened at {:?}", path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;

        info!("In-memory record store created");
        Ok(store)
    }

    /// Initialize the database with schema and pragmas.
    fn initialize(&self) -> Result<()> {
        {
            let conn = self.conn.lock();

            // Enable WAL mode for better concurrent reads
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;

            self.create_schema(&conn)?;
        }

        self.seed_default_admin()?;
        Ok(())
    }

    /// Create the database schema.
    fn create_schema(&self, conn: &Connection) -> Result<()> {
        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);

        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        conn.execute_batch(
            r#"
            -- Incident reports filed by the assistant
            CREATE TABLE IF NOT EXISTS incidents (
                id TEXT PRIMARY KEY,
                reporter_name TEXT NOT NULL,
                reporter_email TEXT NOT NULL,
                department TEXT NOT NULL,
                summary TEXT NOT NULL,
                description TEXT NOT NULL,
                urgency TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_incidents_created_at
                ON incidents(created_at);

            -- Notification emails derived from incidents
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                recipient TEXT NOT NULL,
                sender TEXT NOT NULL,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Ratings on individual assistant messages
            CREATE TABLE IF NOT EXISTS feedback (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                rated_text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Archived session transcripts (turns stored as JSON)
            CREATE TABLE IF NOT EXISTS archives (
                id TEXT PRIMARY KEY,
                turns TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Administrator accounts
            CREATE TABLE IF NOT EXISTS admins (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                password TEXT,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;

        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    /// Seed the default administrator into an empty admins table.
    fn seed_default_admin(&self) -> Result<()> {
        if self.count_table("admins")? > 0 {
            return Ok(());
        }

        let admin = AdminAccount::new(
            DEFAULT_ADMIN_EMAIL,
            Some("123".to_string()),
            AdminRole::SuperAdmin,
        );
        self.insert_admin(&admin)?;

        info!("Seeded default administrator account");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Incidents
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Append an incident report.
    pub fn append_incident(&self, incident: &IncidentReport) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO incidents (id, reporter_name, reporter_email, department, summary,
                                   description, urgency, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                incident.id.to_string(),
                incident.reporter_name,
                incident.reporter_email,
                incident.department,
                incident.summary,
                incident.description,
                incident.urgency.as_str(),
                incident.created_at.to_rfc3339(),
            ],
        )?;

        debug!("Recorded incident {}", incident.id);
        Ok(())
    }

    /// List incident reports, newest first.
    pub fn list_incidents(&self, limit: usize, offset: usize) -> Result<Vec<IncidentReport>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, reporter_name, reporter_email, department, summary, description,
                   urgency, created_at
            FROM incidents
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )?;

        let mut rows = stmt.query(params![limit as i64, offset as i64])?;

        let mut incidents = Vec::new();
        while let Some(row) = rows.next()? {
            incidents.push(Self::row_to_incident(row)?);
        }

        Ok(incidents)
    }

    fn row_to_incident(row: &rusqlite::Row) -> Result<IncidentReport> {
        let id_str: String = row.get(0)?;
        let urgency_str: String = row.get(6)?;
        let created_at_str: String = row.get(7)?;

        Ok(IncidentReport {
            id: IncidentId::parse(&id_str)?,
            reporter_name: row.get(1)?,
            reporter_email: row.get(2)?,
            department: row.get(3)?,
            summary: row.get(4)?,
            description: row.get(5)?,
            urgency: Urgency::parse(&urgency_str)
                .ok_or_else(|| StoreError::InvalidData(format!("Unknown urgency: {}", urgency_str)))?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Emails
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Append an email log entry.
    pub fn append_email(&self, email: &EmailLog) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO emails (id, recipient, sender, subject, body, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                email.id.to_string(),
                email.to,
                email.from,
                email.subject,
                email.body,
                email.created_at.to_rfc3339(),
            ],
        )?;

        debug!("Recorded email {}", email.id);
        Ok(())
    }

    /// List email log entries, newest first.
    pub fn list_emails(&self, limit: usize, offset: usize) -> Result<Vec<EmailLog>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, recipient, sender, subject, body, created_at
            FROM emails
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )?;

        let mut rows = stmt.query(params![limit as i64, offset as i64])?;

        let mut emails = Vec::new();
        while let Some(row) = rows.next()? {
            emails.push(Self::row_to_email(row)?);
        }

        Ok(emails)
    }

    fn row_to_email(row: &rusqlite::Row) -> Result<EmailLog> {
        let id_str: String = row.get(0)?;
        let created_at_str: String = row.get(5)?;

        Ok(EmailLog {
            id: EmailId::parse(&id_str)?,
            to: row.get(1)?,
            from: row.get(2)?,
            subject: row.get(3)?,
            body: row.get(4)?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Feedback
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Append a feedback entry.
    pub fn append_feedback(&self, entry: &FeedbackEntry) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO feedback (id, kind, rated_text, created_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                entry.id.to_string(),
                entry.kind.as_str(),
                entry.rated_text,
                entry.created_at.to_rfc3339(),
            ],
        )?;

        debug!("Recorded {} feedback {}", entry.kind, entry.id);
        Ok(())
    }

    /// List feedback entries, newest first.
    pub fn list_feedback(&self, limit: usize, offset: usize) -> Result<Vec<FeedbackEntry>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, kind, rated_text, created_at
            FROM feedback
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )?;

        let mut rows = stmt.query(params![limit as i64, offset as i64])?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(Self::row_to_feedback(row)?);
        }

        Ok(entries)
    }

    fn row_to_feedback(row: &rusqlite::Row) -> Result<FeedbackEntry> {
        let id_str: String = row.get(0)?;
        let kind_str: String = row.get(1)?;
        let created_at_str: String = row.get(3)?;

        Ok(FeedbackEntry {
            id: FeedbackId::parse(&id_str)?,
            kind: FeedbackKind::parse(&kind_str)
                .ok_or_else(|| StoreError::InvalidData(format!("Unknown feedback kind: {}", kind_str)))?,
            rated_text: row.get(2)?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session archives
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Save an archived session transcript.
    ///
    /// A live conversation re-saves its snapshot under the same id after
    /// every completed exchange, so this is an upsert: the turn list is
    /// replaced, the original creation timestamp is kept.
    pub fn save_archive(&self, archive: &SessionArchive) -> Result<()> {
        let turns = serde_json::to_string(&archive.turns)?;
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO archives (id, turns, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET turns = excluded.turns
            "#,
            params![
                archive.id.to_string(),
                turns,
                archive.created_at.to_rfc3339(),
            ],
        )?;

        debug!(
            "Archived session {} ({} turns)",
            archive.id,
            archive.turn_count()
        );
        Ok(())
    }

    /// Get an archived session by ID.
    pub fn get_archive(&self, id: ArchiveId) -> Result<Option<SessionArchive>> {
        let conn = self.conn.lock();

        let mut stmt =
            conn.prepare("SELECT id, turns, created_at FROM archives WHERE id = ?1")?;
        let mut rows = stmt.query(params![id.to_string()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_archive(row)?))
        } else {
            Ok(None)
        }
    }

    /// List archived sessions, newest first.
    pub fn list_archives(&self, limit: usize, offset: usize) -> Result<Vec<SessionArchive>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, turns, created_at
            FROM archives
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?1 OFFSET ?2
            "#,
        )?;

        let mut rows = stmt.query(params![limit as i64, offset as i64])?;

        let mut archives = Vec::new();
        while let Some(row) = rows.next()? {
            archives.push(Self::row_to_archive(row)?);
        }

        Ok(archives)
    }

    fn row_to_archive(row: &rusqlite::Row) -> Result<SessionArchive> {
        let id_str: String = row.get(0)?;
        let turns_json: String = row.get(1)?;
        let created_at_str: String = row.get(2)?;

        Ok(SessionArchive {
            id: ArchiveId::parse(&id_str)?,
            turns: serde_json::from_str(&turns_json)?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Administrator accounts
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Add an administrator with the `Admin` role.
    pub fn add_admin(&self, email: &str, password: Option<String>) -> Result<AdminAccount> {
        if self.find_admin(email)?.is_some() {
            return Err(StoreError::InvalidData(format!(
                "Administrator {} already exists",
                email
            )));
        }

        let admin = AdminAccount::new(email, password, AdminRole::Admin);
        self.insert_admin(&admin)?;

        debug!("Added administrator {}", admin.email);
        Ok(admin)
    }

    /// Update an administrator's email, password, or role by id.
    pub fn update_admin(&self, id: AdminId, update: &AdminUpdate) -> Result<AdminAccount> {
        let current = self
            .get_admin(id)?
            .ok_or_else(|| StoreError::NotFound(format!("Administrator {}", id)))?;

        // An email change must not collide with another account.
        if let Some(new_email) = &update.email
            && let Some(other) = self.find_admin(new_email)?
            && other.id != id
        {
            return Err(StoreError::InvalidData(format!(
                "Administrator {} already exists",
                new_email
            )));
        }

        let email = update.email.clone().unwrap_or(current.email);
        let password = update.password.clone().or(current.password);
        let role = update.role.unwrap_or(current.role);

        let conn = self.conn.lock();
        let rows_affected = conn.execute(
            "UPDATE admins SET email = ?1, password = ?2, role = ?3 WHERE id = ?4",
            params![email, password, role.as_str(), id.to_string()],
        )?;
        if rows_affected == 0 {
            return Err(StoreError::NotFound(format!("Administrator {}", id)));
        }

        debug!("Updated administrator {}", id);
        Ok(AdminAccount {
            id,
            email,
            password,
            role,
            created_at: current.created_at,
        })
    }

    /// Delete an administrator by id.
    pub fn delete_admin(&self, id: AdminId) -> Result<()> {
        let conn = self.conn.lock();

        let rows_affected =
            conn.execute("DELETE FROM admins WHERE id = ?1", params![id.to_string()])?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound(format!("Administrator {}", id)));
        }

        Ok(())
    }

    /// Remove an administrator by email.
    pub fn remove_admin(&self, email: &str) -> Result<()> {
        let admin = self
            .find_admin(email)?
            .ok_or_else(|| StoreError::NotFound(format!("Administrator {}", email)))?;
        self.delete_admin(admin.id)
    }

    /// Find an administrator by id.
    pub fn get_admin(&self, id: AdminId) -> Result<Option<AdminAccount>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, email, password, role, created_at FROM admins WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id.to_string()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_admin(row)?))
        } else {
            Ok(None)
        }
    }

    /// Find an administrator by email.
    pub fn find_admin(&self, email: &str) -> Result<Option<AdminAccount>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            "SELECT id, email, password, role, created_at FROM admins WHERE email = ?1",
        )?;
        let mut rows = stmt.query(params![email])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_admin(row)?))
        } else {
            Ok(None)
        }
    }

    /// List administrator accounts, oldest first.
    pub fn list_admins(&self) -> Result<Vec<AdminAccount>> {
        let conn = self.conn.lock();

        let mut stmt = conn.prepare(
            r#"
            SELECT id, email, password, role, created_at
            FROM admins
            ORDER BY created_at ASC, rowid ASC
            "#,
        )?;

        let mut rows = stmt.query([])?;

        let mut admins = Vec::new();
        while let Some(row) = rows.next()? {
            admins.push(Self::row_to_admin(row)?);
        }

        Ok(admins)
    }

    fn insert_admin(&self, admin: &AdminAccount) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute(
            r#"
            INSERT INTO admins (id, email, password, role, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                admin.id.to_string(),
                admin.email,
                admin.password,
                admin.role.as_str(),
                admin.created_at.to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn row_to_admin(row: &rusqlite::Row) -> Result<AdminAccount> {
        let id_str: String = row.get(0)?;
        let role_str: String = row.get(3)?;
        let created_at_str: String = row.get(4)?;

        Ok(AdminAccount {
            id: AdminId::parse(&id_str)?,
            email: row.get(1)?,
            password: row.get(2)?,
            role: AdminRole::parse(&role_str)
                .ok_or_else(|| StoreError::InvalidData(format!("Unknown role: {}", role_str)))?,
            created_at: parse_timestamp(&created_at_str)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Counts
// ─────────────────────────────────────────────────────────────────────────────

impl RecordStore {
    /// Get row counts across all record tables.
    pub fn counts(&self) -> Result<StoreCounts> {
        Ok(StoreCounts {
            incidents: self.count_table("incidents")?,
            emails: self.count_table("emails")?,
            feedback: self.count_table("feedback")?,
            archives: self.count_table("archives")?,
            admins: self.count_table("admins")?,
        })
    }

    fn count_table(&self, table: &str) -> Result<usize> {
        let conn = self.conn.lock();
        // Table names are fixed strings from this module, never user input.
        let count: i64 =
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("Invalid timestamp: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArchivedCitation, ArchivedTurn};

    fn create_test_store() -> RecordStore {
        RecordStore::open_in_memory().unwrap()
    }

    fn sample_incident() -> IncidentReport {
        IncidentReport::new(
            "Jordan Reyes",
            "jordan@example.com",
            "Finance",
            "VPN will not connect",
            "Cisco AnyConnect fails with authentication error after password reset.",
            Urgency::High,
        )
    }

    #[test]
    fn test_open_seeds_default_admin() {
        let store = create_test_store();
        let admins = store.list_admins().unwrap();
        assert_eq!(admins.len(), 1);
        assert_eq!(admins[0].email, DEFAULT_ADMIN_EMAIL);
        assert_eq!(admins[0].role, AdminRole::SuperAdmin);
    }

    #[test]
    fn test_incident_round_trip() {
        let store = create_test_store();

        let incident = sample_incident();
        store.append_incident(&incident).unwrap();

        let listed = store.list_incidents(10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], incident);
    }

    #[test]
    fn test_incidents_list_newest_first() {
        let store = create_test_store();

        let first = sample_incident();
        let mut second = sample_incident();
        second.summary = "Printer offline".to_string();

        store.append_incident(&first).unwrap();
        store.append_incident(&second).unwrap();

        let listed = store.list_incidents(10, 0).unwrap();
        assert_eq!(listed[0].summary, "Printer offline");
        assert_eq!(listed[1].summary, "VPN will not connect");
    }

    #[test]
    fn test_incident_pagination() {
        let store = create_test_store();

        for i in 0..5 {
            let mut incident = sample_incident();
            incident.summary = format!("Issue {}", i);
            store.append_incident(&incident).unwrap();
        }

        let page1 = store.list_incidents(2, 0).unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].summary, "Issue 4");

        let page2 = store.list_incidents(2, 2).unwrap();
        assert_eq!(page2.len(), 2);
        assert_eq!(page2[0].summary, "Issue 2");
    }

    #[test]
    fn test_email_round_trip() {
        let store = create_test_store();

        let email = EmailLog::new(
            "it-admins@example.com",
            "support-desk@taliesin.local",
            "[High] VPN will not connect",
            "A new incident has been filed.",
        );
        store.append_email(&email).unwrap();

        let listed = store.list_emails(10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], email);
    }

    #[test]
    fn test_feedback_round_trip() {
        let store = create_test_store();

        let entry = FeedbackEntry::new(FeedbackKind::Negative, "That did not help.");
        store.append_feedback(&entry).unwrap();

        let listed = store.list_feedback(10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0], entry);
    }

    #[test]
    fn test_archive_round_trip() {
        let store = create_test_store();

        let archive = SessionArchive::new(vec![
            ArchivedTurn {
                role: "model".to_string(),
                content: "Hello, I am the IT support chatbot.".to_string(),
                feedback: None,
                citations: Vec::new(),
            },
            ArchivedTurn {
                role: "user".to_string(),
                content: "My VPN is down.".to_string(),
                feedback: None,
                citations: Vec::new(),
            },
            ArchivedTurn {
                role: "model".to_string(),
                content: "Try reconnecting through Cisco AnyConnect.".to_string(),
                feedback: Some(FeedbackKind::Positive),
                citations: vec![ArchivedCitation {
                    title: "VPN Guide".to_string(),
                    uri: "https://example.com/vpn".to_string(),
                }],
            },
        ]);
        store.save_archive(&archive).unwrap();

        let fetched = store.get_archive(archive.id).unwrap().unwrap();
        assert_eq!(fetched, archive);
        assert_eq!(fetched.turns[2].feedback, Some(FeedbackKind::Positive));
        assert_eq!(fetched.turns[2].citations.len(), 1);

        assert!(store.get_archive(ArchiveId::new()).unwrap().is_none());

        let listed = store.list_archives(10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].turn_count(), 3);
    }

    #[test]
    fn test_save_archive_replaces_turns_for_same_id() {
        let store = create_test_store();

        let mut archive = SessionArchive::new(vec![ArchivedTurn {
            role: "user".to_string(),
            content: "First".to_string(),
            feedback: None,
            citations: Vec::new(),
        }]);
        store.save_archive(&archive).unwrap();

        archive.turns.push(ArchivedTurn {
            role: "model".to_string(),
            content: "Second".to_string(),
            feedback: None,
            citations: Vec::new(),
        });
        store.save_archive(&archive).unwrap();

        let listed = store.list_archives(10, 0).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].turn_count(), 2);
    }

    #[test]
    fn test_admin_add_and_remove() {
        let store = create_test_store();

        let added = store.add_admin("ops@example.com", None).unwrap();
        assert_eq!(added.role, AdminRole::Admin);
        assert_eq!(store.list_admins().unwrap().len(), 2);

        let duplicate = store.add_admin("ops@example.com", None);
        assert!(matches!(duplicate, Err(StoreError::InvalidData(_))));

        store.remove_admin("ops@example.com").unwrap();
        assert_eq!(store.list_admins().unwrap().len(), 1);

        let missing = store.remove_admin("ops@example.com");
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_find_admin() {
        let store = create_test_store();
        assert!(store.find_admin(DEFAULT_ADMIN_EMAIL).unwrap().is_some());
        assert!(store.find_admin("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_admin_update_by_id() {
        let store = create_test_store();
        let added = store.add_admin("ops@example.com", None).unwrap();

        let updated = store
            .update_admin(
                added.id,
                &AdminUpdate {
                    email: Some("oncall@example.com".to_string()),
                    password: Some("hunter2".to_string()),
                    role: Some(AdminRole::SuperAdmin),
                },
            )
            .unwrap();
        assert_eq!(updated.id, added.id);
        assert_eq!(updated.email, "oncall@example.com");
        assert_eq!(updated.password.as_deref(), Some("hunter2"));
        assert_eq!(updated.role, AdminRole::SuperAdmin);
        assert_eq!(updated.created_at, added.created_at);

        // The change is visible to readers, and the old email is gone.
        let stored = store.get_admin(added.id).unwrap().unwrap();
        assert_eq!(stored, updated);
        assert!(store.find_admin("ops@example.com").unwrap().is_none());
    }

    #[test]
    fn test_admin_update_leaves_unset_fields_alone() {
        let store = create_test_store();
        let added = store
            .add_admin("ops@example.com", Some("hunter2".to_string()))
            .unwrap();

        let updated = store
            .update_admin(
                added.id,
                &AdminUpdate {
                    role: Some(AdminRole::SuperAdmin),
                    ..AdminUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.email, "ops@example.com");
        assert_eq!(updated.password.as_deref(), Some("hunter2"));
        assert_eq!(updated.role, AdminRole::SuperAdmin);
    }

    #[test]
    fn test_admin_update_unknown_id_is_not_found() {
        let store = create_test_store();
        let missing = store.update_admin(AdminId::new(), &AdminUpdate::default());
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_admin_update_rejects_email_collision() {
        let store = create_test_store();
        let added = store.add_admin("ops@example.com", None).unwrap();

        let collision = store.update_admin(
            added.id,
            &AdminUpdate {
                email: Some(DEFAULT_ADMIN_EMAIL.to_string()),
                ..AdminUpdate::default()
            },
        );
        assert!(matches!(collision, Err(StoreError::InvalidData(_))));
        // The account is untouched.
        assert_eq!(
            store.get_admin(added.id).unwrap().unwrap().email,
            "ops@example.com"
        );
    }

    #[test]
    fn test_admin_delete_by_id() {
        let store = create_test_store();
        let added = store.add_admin("ops@example.com", None).unwrap();

        store.delete_admin(added.id).unwrap();
        assert!(store.get_admin(added.id).unwrap().is_none());

        let missing = store.delete_admin(added.id);
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_counts() {
        let store = create_test_store();

        store.append_incident(&sample_incident()).unwrap();
        store
            .append_feedback(&FeedbackEntry::new(FeedbackKind::Positive, "Thanks!"))
            .unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.incidents, 1);
        assert_eq!(counts.emails, 0);
        assert_eq!(counts.feedback, 1);
        assert_eq!(counts.archives, 0);
        assert_eq!(counts.admins, 1);
    }

    #[test]
    fn test_reopen_persists_and_does_not_reseed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("records.db");

        {
            let store = RecordStore::open(&path).unwrap();
            store.append_incident(&sample_incident()).unwrap();
            store.add_admin("ops@example.com", None).unwrap();
        }

        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.list_incidents(10, 0).unwrap().len(), 1);
        // Default admin was seeded on first open only; both accounts survive.
        assert_eq!(store.list_admins().unwrap().len(), 2);
    }
}
