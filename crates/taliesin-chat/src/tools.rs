//! The tools the model may invoke mid-turn.
//!
//! Two tools are declared to the backend: `record_incident` files a support
//! incident and logs a notification email to the admin team, and
//! `record_feedback` captures an in-conversation satisfaction rating. A raw
//! call is classified into the closed [`ToolInvocation`] set before anything
//! runs, so adding a tool means adding a variant and the compiler finds
//! every dispatch site.
//!
//! Argument problems never abort a turn. A call with missing or invalid
//! fields produces a textual `Error: ...` result that flows back to the
//! model, which is expected to re-ask the user and retry.

use serde_json::{json, Value};
use std::sync::Arc;
use taliesin_llm::{FunctionCall, ToolDeclaration};
use taliesin_store::{EmailLog, FeedbackEntry, FeedbackKind, IncidentReport, RecordStore, Urgency};
use tracing::{debug, info, warn};

/// Wire name of the incident filing tool.
pub const RECORD_INCIDENT: &str = "record_incident";

/// Wire name of the feedback capture tool.
pub const RECORD_FEEDBACK: &str = "record_feedback";

/// Recipient used when no admin account exists.
pub const DEFAULT_NOTIFY_ADDRESS: &str = "it-admins@example.com";

/// Sender recorded on notification emails.
const SENDER_ADDRESS: &str = "support-desk@taliesin.local";

/// Why a tool call's arguments were rejected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolArgError {
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Invalid value '{value}' for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        value: String,
        message: &'static str,
    },
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}

/// A tool call validated into one of the known operations.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    RecordIncident(IncidentArgs),
    RecordFeedback(FeedbackArgs),
}

impl ToolInvocation {
    /// Classify a raw function call, validating its arguments.
    pub fn classify(call: &FunctionCall) -> std::result::Result<Self, ToolArgError> {
        match call.name.as_str() {
            RECORD_INCIDENT => Ok(Self::RecordIncident(IncidentArgs::try_from(&call.args)?)),
            RECORD_FEEDBACK => Ok(Self::RecordFeedback(FeedbackArgs::try_from(&call.args)?)),
            other => Err(ToolArgError::UnknownTool(other.to_string())),
        }
    }
}

/// Validated arguments for `record_incident`.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentArgs {
    pub reporter_name: String,
    pub reporter_email: String,
    pub department: String,
    pub summary: String,
    pub description: String,
    pub urgency: Urgency,
}

impl TryFrom<&Value> for IncidentArgs {
    type Error = ToolArgError;

    /// Every missing field is reported at once, so the model can collect
    /// them all in a single follow-up question.
    fn try_from(args: &Value) -> std::result::Result<Self, Self::Error> {
        let mut missing = Vec::new();
        let mut take = |field: &'static str| match text_field(args, field) {
            Some(value) => Some(value),
            None => {
                missing.push(field);
                None
            }
        };
        let reporter_name = take("reporter_name");
        let reporter_email = take("reporter_email");
        let department = take("department");
        let summary = take("summary");
        let description = take("description");
        let urgency = take("urgency");

        let (
            Some(reporter_name),
            Some(reporter_email),
            Some(department),
            Some(summary),
            Some(description),
            Some(urgency),
        ) = (
            reporter_name,
            reporter_email,
            department,
            summary,
            description,
            urgency,
        )
        else {
            return Err(ToolArgError::MissingFields(missing));
        };

        if !reporter_email.contains('@') {
            return Err(ToolArgError::InvalidValue {
                field: "reporter_email",
                value: reporter_email,
                message: "expected an email address",
            });
        }
        let urgency = Urgency::parse(&urgency).ok_or(ToolArgError::InvalidValue {
            field: "urgency",
            value: urgency.clone(),
            message: "expected Low, Medium, or High",
        })?;

        Ok(Self {
            reporter_name,
            reporter_email,
            department,
            summary,
            description,
            urgency,
        })
    }
}

/// Validated arguments for `record_feedback`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackArgs {
    pub helpful: bool,
    pub rated_text: String,
}

impl FeedbackArgs {
    pub fn kind(&self) -> FeedbackKind {
        if self.helpful {
            FeedbackKind::Positive
        } else {
            FeedbackKind::Negative
        }
    }
}

impl TryFrom<&Value> for FeedbackArgs {
    type Error = ToolArgError;

    fn try_from(args: &Value) -> std::result::Result<Self, Self::Error> {
        let mut missing = Vec::new();
        let helpful_raw = args.get("helpful").filter(|v| !v.is_null());
        if helpful_raw.is_none() {
            missing.push("helpful");
        }
        let rated_text = text_field(args, "rated_text");
        if rated_text.is_none() {
            missing.push("rated_text");
        }
        let (Some(helpful_raw), Some(rated_text)) = (helpful_raw, rated_text) else {
            return Err(ToolArgError::MissingFields(missing));
        };

        // Models sometimes quote the boolean.
        let helpful = match helpful_raw {
            Value::Bool(b) => *b,
            Value::String(s) if s.eq_ignore_ascii_case("true") => true,
            Value::String(s) if s.eq_ignore_ascii_case("false") => false,
            other => {
                return Err(ToolArgError::InvalidValue {
                    field: "helpful",
                    value: other.to_string(),
                    message: "expected true or false",
                });
            }
        };

        Ok(Self {
            helpful,
            rated_text,
        })
    }
}

/// A string argument. Numbers and booleans are coerced; blank strings count
/// as absent.
fn text_field(args: &Value, field: &str) -> Option<String> {
    match args.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Executes tool calls against the record store.
#[derive(Clone)]
pub struct ToolSet {
    store: Arc<RecordStore>,
}

impl ToolSet {
    pub fn new(store: Arc<RecordStore>) -> Self {
        Self { store }
    }

    /// Declarations advertised to the backend with every request.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        vec![
            ToolDeclaration::new(
                RECORD_INCIDENT,
                "File a formal IT support incident and dispatch a notification \
                 email to the IT admin team.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "reporter_name": {
                            "type": "STRING",
                            "description": "Full name of the person reporting the issue",
                        },
                        "reporter_email": {
                            "type": "STRING",
                            "description": "Email address of the reporter",
                        },
                        "department": {
                            "type": "STRING",
                            "description": "Department the reporter belongs to",
                        },
                        "summary": {
                            "type": "STRING",
                            "description": "Short one-line summary of the issue",
                        },
                        "description": {
                            "type": "STRING",
                            "description": "Full description of the issue",
                        },
                        "urgency": {
                            "type": "STRING",
                            "enum": ["Low", "Medium", "High"],
                            "description": "How urgent the issue is",
                        },
                    },
                    "required": [
                        "reporter_name",
                        "reporter_email",
                        "department",
                        "summary",
                        "description",
                        "urgency",
                    ],
                }),
            ),
            ToolDeclaration::new(
                RECORD_FEEDBACK,
                "Record whether the user found the last answer helpful.",
                json!({
                    "type": "OBJECT",
                    "properties": {
                        "helpful": {
                            "type": "BOOLEAN",
                            "description": "True if the user was satisfied with the answer",
                        },
                        "rated_text": {
                            "type": "STRING",
                            "description": "The answer text the user rated",
                        },
                    },
                    "required": ["helpful", "rated_text"],
                }),
            ),
        ]
    }

    /// Run one tool call and produce the textual result sent back to the
    /// model. Rejections and storage failures become `Error: ...` strings;
    /// they never abort the turn.
    pub fn execute(&self, call: &FunctionCall) -> String {
        debug!(tool = %call.name, "Executing tool call");
        let result = match ToolInvocation::classify(call) {
            Ok(ToolInvocation::RecordIncident(args)) => self.record_incident(args),
            Ok(ToolInvocation::RecordFeedback(args)) => self.record_feedback(args),
            Err(error) => Err(error.to_string()),
        };
        match result {
            Ok(outcome) => outcome,
            Err(message) => {
                warn!(tool = %call.name, error = %message, "Tool call rejected");
                format!("Error: {}", message)
            }
        }
    }

    fn record_incident(&self, args: IncidentArgs) -> std::result::Result<String, String> {
        let report = IncidentReport::new(
            args.reporter_name,
            args.reporter_email,
            args.department,
            args.summary,
            args.description,
            args.urgency,
        );
        self.store
            .append_incident(&report)
            .map_err(|e| format!("The incident could not be saved: {}", e))?;
        info!(incident = %report.id, urgency = report.urgency.as_str(), "Incident recorded");

        let recipient = self.notify_address();
        let email = EmailLog::new(
            recipient.clone(),
            SENDER_ADDRESS,
            format!("[{}] {}", report.urgency, report.summary),
            format!(
                "A new support incident has been filed.\n\n\
                 Reporter: {} <{}>\n\
                 Department: {}\n\
                 Urgency: {}\n\
                 Summary: {}\n\n\
                 {}",
                report.reporter_name,
                report.reporter_email,
                report.department,
                report.urgency,
                report.summary,
                report.description,
            ),
        );
        match self.store.append_email(&email) {
            Ok(()) => Ok(format!(
                "Incident {} recorded with {} urgency. A notification email has \
                 been dispatched to {}.",
                report.id, report.urgency, recipient
            )),
            Err(e) => {
                warn!(incident = %report.id, error = %e, "Notification email could not be logged");
                Ok(format!(
                    "Incident {} recorded with {} urgency.",
                    report.id, report.urgency
                ))
            }
        }
    }

    fn record_feedback(&self, args: FeedbackArgs) -> std::result::Result<String, String> {
        let entry = FeedbackEntry::new(args.kind(), args.rated_text);
        self.store
            .append_feedback(&entry)
            .map_err(|e| format!("The feedback could not be saved: {}", e))?;
        info!(kind = entry.kind.as_str(), "Feedback recorded via tool call");
        Ok("Feedback recorded. Thank the user for their input.".to_string())
    }

    /// First admin on file, or the static fallback address.
    fn notify_address(&self) -> String {
        match self.store.list_admins() {
            Ok(admins) => admins
                .first()
                .map(|a| a.email.clone())
                .unwrap_or_else(|| DEFAULT_NOTIFY_ADDRESS.to_string()),
            Err(e) => {
                warn!(error = %e, "Could not look up admin recipients");
                DEFAULT_NOTIFY_ADDRESS.to_string()
            }
        }
    }
}
