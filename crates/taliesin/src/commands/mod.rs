//! CLI command handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use taliesin_chat::{ChatClient, Language, SessionConfig, DEFAULT_KNOWLEDGE};
use taliesin_config::TaliesinConfig;
use taliesin_llm::{GeminiBackend, GeminiConfig};
use taliesin_store::RecordStore;
use tracing::{debug, warn};

pub mod admins;
pub mod ask;
pub mod chat;
pub mod config;
pub mod records;
pub mod repl;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration from all config layers.
    pub config: TaliesinConfig,
    /// Language override from the CLI.
    pub language: Option<Language>,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Open the record store at the configured database path.
    pub fn open_store(&self) -> Result<Arc<RecordStore>> {
        let path = taliesin_config::database_path(&self.config)
            .context("Could not resolve a data directory for the record database")?;
        let store = RecordStore::open(&path)
            .with_context(|| format!("Could not open record store at {}", path.display()))?;
        Ok(Arc::new(store))
    }

    /// Effective reply language: CLI flag, then config file, then English.
    pub fn language(&self) -> Language {
        if let Some(language) = self.language {
            return language;
        }
        self.config
            .chat
            .as_ref()
            .and_then(|c| c.language.as_deref())
            .and_then(Language::parse)
            .unwrap_or_default()
    }

    /// Knowledge corpus: the configured file if readable, else the built-in.
    pub fn knowledge(&self) -> String {
        let Some(path) = self
            .config
            .chat
            .as_ref()
            .and_then(|c| c.knowledge_file.as_ref())
        else {
            return DEFAULT_KNOWLEDGE.to_string();
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                debug!(path = %path.display(), "Loaded knowledge corpus");
                contents
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Knowledge file could not be read; using the built-in corpus"
                );
                DEFAULT_KNOWLEDGE.to_string()
            }
        }
    }

    /// Build the conversation client.
    ///
    /// Without an API key the client is constructed in the unavailable
    /// state: commands still start, but every turn fails with a
    /// configuration error until a key is provided.
    pub fn build_client(&self) -> Result<ChatClient> {
        let store = self.open_store()?;
        let session = SessionConfig {
            language: self.language(),
            knowledge: self.knowledge(),
        };

        let mut client = match self.config.resolve_api_key() {
            Ok(api_key) => {
                let mut gemini = GeminiConfig::new(api_key);
                if let Some(llm) = &self.config.llm {
                    if let Some(model) = &llm.model {
                        gemini = gemini.with_model(model);
                    }
                    if let Some(base_url) = &llm.base_url {
                        gemini = gemini.with_base_url(base_url);
                    }
                    if let Some(secs) = llm.timeout_secs {
                        gemini = gemini.with_timeout(Duration::from_secs(secs));
                    }
                    if let Some(retries) = llm.max_retries {
                        gemini = gemini.with_max_retries(retries);
                    }
                }
                let backend = Arc::new(GeminiBackend::new(gemini)?);
                ChatClient::new(backend, store, session)
            }
            Err(e) => {
                warn!("{}", e);
                ChatClient::unavailable(store, session)
            }
        };

        if let Some(rounds) = self.config.chat.as_ref().and_then(|c| c.max_tool_rounds) {
            client = client.with_max_tool_rounds(rounds);
        }
        Ok(client)
    }
}
