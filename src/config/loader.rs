//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (platform config dir, e.g. ~/.config/tally/config.toml)
//! 3. Project config (.tally/config.toml)
//! 4. Environment variables (TALLY_* prefix)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::constants::storage as storage_constants;
use crate::types::{Result, TallyError};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project rooted at `root`:
    /// defaults → global → project → env vars
    pub fn load_from(root: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = Self::global_config_path()
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        let project_path = Self::project_config_path(root);
        if project_path.exists() {
            debug!("Loading project config from: {}", project_path.display());
            figment = figment.merge(Toml::file(&project_path));
        }

        figment = figment.merge(Self::env_provider());

        let config: Config = figment
            .extract()
            .map_err(|e| TallyError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| TallyError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// `TALLY_<SECTION>_<KEY>` maps to `section.key`; only the first
    /// underscore separates, so `TALLY_EXTRACTION_TIMEOUT_SECS` reaches
    /// `extraction.timeout_secs`.
    fn env_provider() -> Env {
        Env::prefixed("TALLY_").map(|key| key.as_str().replacen('_', ".", 1).into())
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Global config directory (platform specific)
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "tally").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join(storage_constants::CONFIG_FILE))
    }

    /// Project data directory under `root`
    pub fn project_dir(root: &Path) -> PathBuf {
        root.join(storage_constants::DATA_DIR)
    }

    /// Project config file under `root`
    pub fn project_config_path(root: &Path) -> PathBuf {
        Self::project_dir(root).join(storage_constants::CONFIG_FILE)
    }

    /// Check if a project is initialized under `root`
    pub fn is_project_initialized(root: &Path) -> bool {
        Self::project_dir(root).exists()
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            TallyError::Config("Cannot determine global config directory".to_string())
        })?;

        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join(storage_constants::CONFIG_FILE);
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_global_config())?;
            info!("Created global config: {}", config_path.display());
        } else {
            info!("Global config exists: {}", config_path.display());
        }

        Ok(config_path)
    }

    /// Initialize project configuration under `root`. An existing config is
    /// left untouched.
    pub fn init_project(root: &Path) -> Result<PathBuf> {
        let project_dir = Self::project_dir(root);
        fs::create_dir_all(&project_dir)?;

        let config_path = Self::project_config_path(root);
        if !config_path.exists() {
            fs::write(&config_path, Self::default_project_config())?;
            info!("Created project config: {}", config_path.display());
        }

        Ok(project_dir)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn default_global_config() -> String {
        r#"# Tally Global Configuration
# User-wide defaults. Project settings in .tally/config.toml override these.

version = "1.0"

# Extraction model. The API key comes from TALLY_LLM_API_KEY or OPENAI_API_KEY.
[llm]
provider = "openai"
temperature = 0.0
timeout_secs = 60

[extraction]
timeout_secs = 20
max_retries = 1
"#
        .to_string()
    }

    fn default_project_config() -> String {
        r#"# Tally Project Configuration
# Project-specific settings that override global defaults.

version = "1.0"

[agent]
default_user = "local"
targeted_default_confidence = 0.5

[storage]
db_path = ".tally/tally.db"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_project_writes_loadable_config() {
        let temp_dir = TempDir::new().unwrap();
        let dir = ConfigLoader::init_project(temp_dir.path()).unwrap();

        assert!(dir.exists());
        assert!(ConfigLoader::is_project_initialized(temp_dir.path()));

        let config =
            ConfigLoader::load_from_file(&ConfigLoader::project_config_path(temp_dir.path()))
                .unwrap();
        assert_eq!(config.agent.default_user, "local");
        assert_eq!(config.storage.db_path, PathBuf::from(".tally/tally.db"));
    }

    #[test]
    fn test_init_project_keeps_existing_config() {
        let temp_dir = TempDir::new().unwrap();
        ConfigLoader::init_project(temp_dir.path()).unwrap();
        let path = ConfigLoader::project_config_path(temp_dir.path());
        fs::write(&path, "[agent]\ndefault_user = \"alice\"\n").unwrap();

        ConfigLoader::init_project(temp_dir.path()).unwrap();
        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.agent.default_user, "alice");
    }

    #[test]
    fn test_project_file_overrides_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(
            &path,
            "[llm]\nprovider = \"ollama\"\nmodel = \"llama3.2\"\n\n[extraction]\ntimeout_secs = 5\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.llm.provider, "ollama");
        assert_eq!(config.llm.model.as_deref(), Some("llama3.2"));
        assert_eq!(config.extraction.timeout_secs, 5);
        assert_eq!(config.extraction.max_retries, 1);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "[llm]\ntemperature = 3.0\n").unwrap();

        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(TallyError::Config(_))
        ));
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: no other test reads this variable
        unsafe {
            std::env::set_var("TALLY_EXTRACTION_MAX_RETRIES", "4");
        }
        let config = ConfigLoader::load_from(temp_dir.path());
        unsafe {
            std::env::remove_var("TALLY_EXTRACTION_MAX_RETRIES");
        }
        assert_eq!(config.unwrap().extraction.max_retries, 4);
    }
}
