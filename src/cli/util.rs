//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::agent::{AgentOrchestrator, FinalizeService};
use crate::ai::{LlmExtractionService, SharedExtractionService, SharedProvider, create_provider};
use crate::config::{Config, ConfigLoader};
use crate::storage::{Database, SharedDatabase, Stores};
use crate::types::{Result, TallyError, UserId};

/// Command execution context
///
/// Created via `CommandContext::load()` for commands that touch the
/// database; the LLM provider is only built when a command needs the agent.
#[derive(Clone)]
pub struct CommandContext {
    /// Project root directory
    pub project_root: PathBuf,
    /// Loaded configuration
    pub config: Config,
    /// Shared database handle
    pub db: SharedDatabase,
    /// Agent collaborators over `db`
    pub stores: Stores,
}

impl CommandContext {
    /// Validates initialization, loads config, and opens the database
    pub fn load() -> Result<Self> {
        let project_root = std::env::current_dir()?;
        require_initialized(&project_root)?;
        let config = ConfigLoader::load_from(&project_root)?;
        let db = Arc::new(open_db(&project_root, &config)?);

        Ok(Self {
            stores: Stores::from_database(db.clone()),
            project_root,
            config,
            db,
        })
    }

    /// `--user` when given, the configured default otherwise
    pub fn user(&self, user: Option<String>) -> UserId {
        UserId::new(user.unwrap_or_else(|| self.config.agent.default_user.clone()))
    }

    /// Database file as configured, relative paths resolved against the root
    pub fn db_path(&self) -> PathBuf {
        resolve_db_path(&self.project_root, &self.config)
    }

    /// The configured LLM provider
    pub fn provider(&self) -> Result<SharedProvider> {
        let provider = create_provider(&self.config.to_provider_config())?;
        debug!(provider = provider.name(), model = provider.model(), "extraction provider ready");
        Ok(provider)
    }

    /// Agent extracting through `provider`
    pub fn orchestrator(&self, provider: SharedProvider) -> AgentOrchestrator {
        let extraction: SharedExtractionService = Arc::new(
            LlmExtractionService::new(provider)
                .with_timeouts(self.config.to_timeout_config())
                .with_max_retries(self.config.extraction.max_retries),
        );

        AgentOrchestrator::new(self.stores.clone(), extraction)
            .with_targeted_confidence(self.config.agent.targeted_default_confidence)
    }

    pub fn finalizer(&self) -> FinalizeService {
        FinalizeService::new(self.stores.clone())
    }
}

/// Require `.tally/` under `root`
pub fn require_initialized(root: &Path) -> Result<()> {
    if !ConfigLoader::is_project_initialized(root) {
        return Err(TallyError::NotInitialized);
    }
    Ok(())
}

pub fn resolve_db_path(root: &Path, config: &Config) -> PathBuf {
    if config.storage.db_path.is_absolute() {
        config.storage.db_path.clone()
    } else {
        root.join(&config.storage.db_path)
    }
}

/// Open the configured database, creating its directory and schema if needed
pub fn open_db(root: &Path, config: &Config) -> Result<Database> {
    let db_path = resolve_db_path(root, config);

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db = Database::open(&db_path)?;
    db.initialize()?;

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_require_initialized() {
        let temp_dir = TempDir::new().unwrap();
        assert!(matches!(
            require_initialized(temp_dir.path()),
            Err(TallyError::NotInitialized)
        ));

        ConfigLoader::init_project(temp_dir.path()).unwrap();
        assert!(require_initialized(temp_dir.path()).is_ok());
    }

    #[test]
    fn test_open_db_creates_schema() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.db_path = PathBuf::from("nested/dir/tally.db");

        let db = open_db(temp_dir.path(), &config).unwrap();
        assert!(temp_dir.path().join("nested/dir/tally.db").exists());
        assert!(db.schema_version().unwrap() > 0);
    }
}
