//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/taliesin/config.toml` (XDG user config)
//! 2. `./taliesin.toml` (project-local)
//! 3. CLI arguments (handled externally)

use std::path::{Path, PathBuf};

use crate::{ConfigError, Result, TaliesinConfig};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "taliesin.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "taliesin";

/// Environment variable to override the config directory.
///
/// When set, this takes precedence over the platform default. Useful for
/// testing and running multiple instances with different configs.
const CONFIG_DIR_ENV: &str = "TALIESIN_CONFIG_DIR";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: TaliesinConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Warnings generated during loading (e.g., plaintext API keys).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
///
/// Searches for config files in order:
/// 1. User config dir (from `TALIESIN_CONFIG_DIR` env or platform default)
/// 2. Project-local (`./taliesin.toml` or specified project dir)
///
/// Later files override earlier ones.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `TALIESIN_CONFIG_DIR` and the platform
/// default. Pass `Some(path)` to use a specific directory, or `None` to use
/// the default resolution.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    let mut config = TaliesinConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    // 1. User config — explicit override, then env var, then platform default
    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        let source = load_layer(&mut config, &path, &mut warnings)?;
        sources.push(source);
    }

    // 2. Project-local config
    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    let source = load_layer(&mut config, &project_path, &mut warnings)?;
    sources.push(source);

    if config.has_plaintext_api_key() {
        warnings.push(
            "[llm] config contains a plaintext API key. \
             Consider using the GEMINI_API_KEY environment variable instead."
                .to_string(),
        );
    }

    Ok(LoadedConfig {
        config,
        sources,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<TaliesinConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    TaliesinConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &TaliesinConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Get the XDG config file path for taliesin.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the XDG config directory for taliesin.
///
/// Checks `TALIESIN_CONFIG_DIR` env var first, then falls back to the
/// platform default (`~/.config/taliesin` on Linux).
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Try to load a config file and merge it into the existing config.
fn load_layer(
    config: &mut TaliesinConfig,
    path: &Path,
    warnings: &mut Vec<String>,
) -> Result<ConfigSource> {
    if !path.is_file() {
        return Ok(ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        });
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            })
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[llm]
model = "test-model"
"#,
        )
        .unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(
            config.llm.as_ref().unwrap().model.as_deref(),
            Some("test-model")
        );
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        // Use explicit empty config dir so we don't pick up the real user config
        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert!(loaded.config.llm.is_none());
        assert!(loaded.loaded_from().is_empty());
    }

    #[test]
    fn test_load_config_layered_merge() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[llm]
model = "base-model"

[chat]
language = "en"
"#,
        )
        .unwrap();

        fs::write(
            project_dir.path().join("taliesin.toml"),
            r#"
[llm]
model = "project-model"
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(project_dir.path()), Some(user_dir.path())).unwrap();
        let config = &loaded.config;

        // Project-local overrides the user config
        assert_eq!(
            config.llm.as_ref().unwrap().model.as_deref(),
            Some("project-model")
        );
        // User-config sections absent from the project layer survive
        assert_eq!(
            config.chat.as_ref().unwrap().language.as_deref(),
            Some("en")
        );
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_plaintext_key_warning() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("taliesin.toml"),
            r#"
[llm]
api_key = "secret"
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("plaintext"));
    }

    #[test]
    fn test_malformed_config_warns_but_continues() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        fs::write(dir.path().join("taliesin.toml"), "not valid toml {{{{").unwrap();

        let loaded =
            load_config_with_options(Some(dir.path()), Some(empty_config_dir.path())).unwrap();
        assert!(!loaded.warnings.is_empty());
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    fn test_save_config_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = TaliesinConfig::from_toml("[chat]\nlanguage = \"si\"\n").unwrap();
        save_config(&config, &path).unwrap();

        let reloaded = load_config_file(&path).unwrap();
        assert_eq!(
            reloaded.chat.as_ref().unwrap().language.as_deref(),
            Some("si")
        );
    }
}
