//! System prompt assembly, language strings, and the built-in knowledge base.
//!
//! The system instruction sent with every session is the supervisor template
//! with `{{LANGUAGE_NAME}}` substituted, followed by the knowledge corpus.
//! Conversational strings (welcome, system notice) are emitted into the
//! transcript and so carry per-language variants; the fallback message shown
//! for failed turns is a single fixed string.

/// Shown in place of a reply when a turn fails.
pub const FALLBACK_MESSAGE: &str =
    "I'm sorry, I encountered an error while processing your request. Please try again.";

/// Placeholder substituted with the language display name.
const LANGUAGE_PLACEHOLDER: &str = "{{LANGUAGE_NAME}}";

/// The supervisor instruction. The knowledge corpus is appended after the
/// trailing `KNOWLEDGE BASE CONTENT:` header.
pub const SYSTEM_PROMPT_TEMPLATE: &str = r#"You are the IT Support Supervisor Agent. You manage specialized agents to ensure a strict 4-step flow.

### LANGUAGE SETTING:
IMPORTANT: You MUST communicate with the user ONLY in the following language: {{LANGUAGE_NAME}}.
Even if the Knowledge Base is in English, translate the information accurately into {{LANGUAGE_NAME}} for the user.

### YOUR AGENTS:
1. **Knowledge Agent**: Answers inquiries using ONLY the provided Knowledge Base.
2. **Feedback Agent**: Asks for satisfaction immediately after a Knowledge Agent response.
3. **Incident Agent**: Handles formal reporting.

### 🔄 CONVERSATION FLOW RULES:

**Step 1: Inquiry Handling**
- Use Knowledge Agent for Knowledge Base content.

**Step 2: Feedback Collection**
- Ask "Was this helpful?" in {{LANGUAGE_NAME}}.

**Step 3: Evaluation**
- If feedback is Negative OR user asks to report a problem: Apologize and trigger the **Incident Agent**.

**Step 4: Incident Reporting (LOGIC UPDATE)**
When the Incident Agent is active, follow this EXACT logic:
1. **Initial Request**: If you have NO details, provide a clear list of required fields: Full Name, User Email, Department, Short Summary, Full Description, and Urgency (Low/Medium/High).
2. **Data Extraction & Tool Priority**: When the user responds, you MUST immediately scan their text for the required fields. You MUST extract values from multi-line blocks or unstructured text automatically.
3. **DO NOT REPEAT**: If the user has provided the details in their previous message, DO NOT ask for them again. Proceed directly to the tool call.
4. **Tool Execution**: Call 'record_incident' as soon as the data is collected.
5. **Confirmation**: After 'record_incident' success, tell the user in {{LANGUAGE_NAME}} that the report is saved and an email has been dispatched to IT Admins.

### 🚦 SENTIMENT DETECTION:
Assume NEGATIVE if the user expresses frustration or says the solution didn't work.

### 🗣️ TONE:
Professional, reassuring, and efficient in {{LANGUAGE_NAME}}.

---
KNOWLEDGE BASE CONTENT:
"#;

/// Built-in corpus used when no knowledge file is configured.
pub const DEFAULT_KNOWLEDGE: &str = r#"TITLE: Password Reset Procedure
CONTENT:
To reset your corporate password:
1. Go to https://portal.company.com/reset.
2. Enter your employee ID and click "Verify".
3. A 6-digit code will be sent to your registered mobile device.
4. Enter the code and create a new password.
Note: Passwords must be at least 12 characters long and contain one special character.

TITLE: VPN Connection Issues
CONTENT:
If you cannot connect to the VPN (Cisco AnyConnect):
1. Ensure you have an active internet connection.
2. Restart the Cisco AnyConnect client.
3. If the issue persists, verify your certificate status in the "Settings" tab.
4. Error "Certificate Invalid": Please contact the Service Desk at ext 5555 to renew your certificate.

TITLE: VPN Troubleshooting Guide
CONTENT:
1. Ensure internet connectivity is active.
2. Verify username and password.
3. Restart the VPN client.
4. Check if the VPN server is under maintenance.
5. Contact IT support if the issue persists.

TITLE: Printer Setup and Offline Issues
CONTENT:
To add a network printer:
1. Open Settings > Printers & Scanners.
2. Select "Add printer" and pick the office printer from the list.
3. Install the driver when prompted.
If the printer shows "Offline": power cycle the printer, then remove and re-add it.
For toner or hardware faults, contact the Service Desk at ext 5555.

TITLE: Email Access
CONTENT:
To access corporate email:
1. Web: sign in at https://mail.company.com with your corporate credentials.
2. Mobile: install the Outlook app and add your corporate account.
If your account is locked after repeated failed sign-ins, wait 15 minutes or contact IT support to unlock it.

TITLE: IT Troubleshooting Matrix
CONTENT:
Issue: Outlook is slow
Possible Cause: Mailbox storage is full
Resolution: Delete old emails or archive them.

Issue: WiFi disconnects frequently
Possible Cause: Weak signal or interference
Resolution: Move closer to the router or restart it.

Issue: Cannot access company email
Possible Cause: Account locked
Resolution: Contact IT support to unlock the account.
"#;

/// Languages the assistant can converse in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Sinhala,
    Tamil,
}

impl Language {
    /// Two-letter code used in configuration and the CLI.
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Sinhala => "si",
            Language::Tamil => "ta",
        }
    }

    /// Name substituted into the system prompt.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Sinhala => "Sinhala",
            Language::Tamil => "Tamil",
        }
    }

    /// Parse a language from its code or English name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Some(Language::English),
            "si" | "sinhala" => Some(Language::Sinhala),
            "ta" | "tamil" => Some(Language::Tamil),
            _ => None,
        }
    }

    /// Greeting seeded into every new session and transcript.
    pub fn welcome_message(&self) -> &'static str {
        match self {
            Language::English => "Hello, I am the IT support chatbot. How can I assist you today?",
            Language::Sinhala => {
                "ආයුබෝවන්, මම IT සහාය චැට්බෝට් වෙමි. මට අද ඔබට උදව් කළ හැක්කේ කෙසේද?"
            }
            Language::Tamil => {
                "வணக்கம், நான் IT ஆதரவு சாட்போட். இன்று நான் உங்களுக்கு எவ்வாறு உதவ முடியும்?"
            }
        }
    }

    /// Notice appended to the transcript after a reconfiguration.
    pub fn reconfigured_notice(&self) -> &'static str {
        match self {
            Language::English => "The support system has been updated. How can I assist you?",
            Language::Sinhala => {
                "සහාය පද්ධතිය යාවත්කාලීන කර ඇත. මට ඔබට උදව් කළ හැක්කේ කෙසේද?"
            }
            Language::Tamil => {
                "ஆதரவு அமைப்பு புதுப்பிக்கப்பட்டுள்ளது. நான் உங்களுக்கு எப்படி உதவ முடியும்?"
            }
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Language::parse(s).ok_or_else(|| format!("Unknown language '{}' (expected en, si, or ta)", s))
    }
}

/// Assemble the system instruction for one session configuration.
pub fn build_system_prompt(language: Language, knowledge: &str) -> String {
    let instruction = SYSTEM_PROMPT_TEMPLATE.replace(LANGUAGE_PLACEHOLDER, language.display_name());
    format!("{}\n{}", instruction, knowledge)
}
