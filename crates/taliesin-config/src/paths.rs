//! Data directory resolution for the record database and log files.

use std::path::PathBuf;

use crate::TaliesinConfig;

/// Environment variable to override the data directory.
///
/// When set, this takes precedence over the platform default. Useful for
/// testing and running multiple instances with separate databases.
pub const DATA_DIR_ENV: &str = "TALIESIN_DATA_DIR";

/// Database filename within the data directory.
const DATABASE_FILE: &str = "records.db";

/// Log subdirectory within the data directory.
const LOG_SUBDIR: &str = "logs";

/// Application name for platform data directory resolution.
const APP_NAME: &str = "taliesin";

/// Get the data directory for taliesin.
///
/// Checks `TALIESIN_DATA_DIR` env var first, then falls back to the
/// platform default (`~/.local/share/taliesin` on Linux).
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::data_dir().map(|d| d.join(APP_NAME))
}

/// Resolve the record database path.
///
/// An explicit `[storage] database_path` wins over the data-dir default.
pub fn database_path(config: &TaliesinConfig) -> Option<PathBuf> {
    if let Some(storage) = &config.storage
        && let Some(path) = &storage.database_path
    {
        return Some(path.clone());
    }
    data_dir().map(|d| d.join(DATABASE_FILE))
}

/// Resolve the log directory.
///
/// An explicit `[logging] directory` wins over the data-dir default.
pub fn log_dir(config: &TaliesinConfig) -> Option<PathBuf> {
    if let Some(logging) = &config.logging
        && let Some(dir) = &logging.directory
    {
        return Some(dir.clone());
    }
    data_dir().map(|d| d.join(LOG_SUBDIR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_paths_win_over_defaults() {
        let config = TaliesinConfig::from_toml(
            r#"
[storage]
database_path = "/srv/taliesin/records.db"

[logging]
directory = "/var/log/taliesin"
"#,
        )
        .unwrap();

        assert_eq!(
            database_path(&config).unwrap(),
            PathBuf::from("/srv/taliesin/records.db")
        );
        assert_eq!(
            log_dir(&config).unwrap(),
            PathBuf::from("/var/log/taliesin")
        );
    }

    #[test]
    fn test_data_dir_env_override() {
        // SAFETY: No other test in this module touches this variable, and
        // test threads do not read it concurrently.
        unsafe { std::env::set_var(DATA_DIR_ENV, "/tmp/taliesin-test") };

        let config = TaliesinConfig::new();
        assert_eq!(
            database_path(&config).unwrap(),
            PathBuf::from("/tmp/taliesin-test/records.db")
        );
        assert_eq!(
            log_dir(&config).unwrap(),
            PathBuf::from("/tmp/taliesin-test/logs")
        );

        unsafe { std::env::remove_var(DATA_DIR_ENV) };
    }
}
