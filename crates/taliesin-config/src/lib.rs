//! Configuration system for the Taliesin support assistant.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (XDG user config + project-local overrides)
//! - API key resolution (env var → config file)
//! - Data directory resolution for the record database and logs

pub mod discovery;
pub mod error;
pub mod paths;
pub mod types;

pub use discovery::{
    load_config, load_config_file, load_config_with_options, save_config, xdg_config_dir,
    xdg_config_path, ConfigSource, LoadedConfig,
};
pub use error::{ConfigError, Result};
pub use paths::{data_dir, database_path, log_dir, DATA_DIR_ENV};
pub use types::{
    ChatSection, LlmSection, LoggingSection, StorageSection, TaliesinConfig, API_KEY_ENV,
};
