//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [llm]                    # model and transport settings
//! model = "gemini-3-flash-preview"
//!
//! [chat]                   # conversation defaults
//! language = "en"
//! max_tool_rounds = 8
//! knowledge_file = "/etc/taliesin/kb.txt"
//!
//! [storage]                # record database location
//! database_path = "/var/lib/taliesin/records.db"
//!
//! [logging]                # log file location
//! directory = "/var/log/taliesin"
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Environment variable checked first when resolving the API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// Maps to the full TOML config file. All sections are optional so that
/// partial configs (e.g., project-local overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaliesinConfig {
    /// Model and transport settings.
    pub llm: Option<LlmSection>,

    /// Conversation defaults.
    pub chat: Option<ChatSection>,

    /// Record database location.
    pub storage: Option<StorageSection>,

    /// Log file location.
    pub logging: Option<LoggingSection>,
}

impl TaliesinConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: TaliesinConfig) {
        if other.llm.is_some() {
            self.llm = other.llm;
        }

        if other.chat.is_some() {
            self.chat = other.chat;
        }

        if other.storage.is_some() {
            self.storage = other.storage;
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Resolve the API key: environment variable first, then config file.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Ok(key) = std::env::var(API_KEY_ENV)
            && !key.is_empty()
        {
            return Ok(key);
        }

        if let Some(llm) = &self.llm
            && let Some(key) = &llm.api_key
            && !key.is_empty()
        {
            return Ok(key.clone());
        }

        Err(ConfigError::ApiKeyNotFound {
            env_var: API_KEY_ENV.to_string(),
        })
    }

    /// True if the config carries a plaintext API key.
    pub fn has_plaintext_api_key(&self) -> bool {
        self.llm
            .as_ref()
            .and_then(|llm| llm.api_key.as_ref())
            .is_some_and(|key| !key.is_empty())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// The `[llm]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// Model identifier.
    pub model: Option<String>,
    /// API base URL override (useful for proxies and tests).
    pub base_url: Option<String>,
    /// Plaintext API key. Prefer the environment variable.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Maximum retries for retryable errors.
    pub max_retries: Option<u32>,
}

/// The `[chat]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// Reply language code: "en", "si", or "ta".
    pub language: Option<String>,
    /// Maximum tool rounds per turn before the turn is failed.
    pub max_tool_rounds: Option<u32>,
    /// Path to a knowledge base file replacing the built-in content.
    pub knowledge_file: Option<PathBuf>,
}

/// The `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Record database path.
    pub database_path: Option<PathBuf>,
}

/// The `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Directory for JSON log files.
    pub directory: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = TaliesinConfig::from_toml(
            r#"
[llm]
model = "gemini-test"
base_url = "http://localhost:9999"
max_retries = 1

[chat]
language = "si"
max_tool_rounds = 4

[storage]
database_path = "/tmp/records.db"
"#,
        )
        .unwrap();

        let llm = config.llm.as_ref().unwrap();
        assert_eq!(llm.model.as_deref(), Some("gemini-test"));
        assert_eq!(llm.max_retries, Some(1));

        let chat = config.chat.as_ref().unwrap();
        assert_eq!(chat.language.as_deref(), Some("si"));
        assert_eq!(chat.max_tool_rounds, Some(4));

        assert!(config.logging.is_none());
    }

    #[test]
    fn test_empty_config_parses() {
        let config = TaliesinConfig::from_toml("").unwrap();
        assert!(config.llm.is_none());
        assert!(config.chat.is_none());
    }

    #[test]
    fn test_merge_section_replacement() {
        let mut base = TaliesinConfig::from_toml(
            r#"
[llm]
model = "base-model"

[chat]
language = "en"
"#,
        )
        .unwrap();

        let overlay = TaliesinConfig::from_toml(
            r#"
[llm]
model = "overlay-model"
"#,
        )
        .unwrap();

        base.merge(overlay);

        assert_eq!(
            base.llm.as_ref().unwrap().model.as_deref(),
            Some("overlay-model")
        );
        // Sections absent from the overlay are preserved.
        assert_eq!(base.chat.as_ref().unwrap().language.as_deref(), Some("en"));
    }

    #[test]
    fn test_round_trip_toml() {
        let original = TaliesinConfig::from_toml(
            r#"
[chat]
language = "ta"
"#,
        )
        .unwrap();

        let reparsed = TaliesinConfig::from_toml(&original.to_toml().unwrap()).unwrap();
        assert_eq!(
            reparsed.chat.as_ref().unwrap().language.as_deref(),
            Some("ta")
        );
    }

    #[test]
    fn test_resolve_api_key_from_config() {
        // SAFETY: No other test in this module touches this variable, and
        // test threads do not read it concurrently.
        unsafe { std::env::remove_var(API_KEY_ENV) };

        let config = TaliesinConfig::from_toml(
            r#"
[llm]
api_key = "file-key"
"#,
        )
        .unwrap();
        assert_eq!(config.resolve_api_key().unwrap(), "file-key");
        assert!(config.has_plaintext_api_key());

        let empty = TaliesinConfig::new();
        assert!(matches!(
            empty.resolve_api_key(),
            Err(ConfigError::ApiKeyNotFound { .. })
        ));
    }
}
