//! Init Command
//!
//! Initialize Tally in the current directory.

use crate::cli::util::open_db;
use crate::config::ConfigLoader;
use crate::types::{Result, TallyError};

pub fn run(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;

    if ConfigLoader::is_project_initialized(&root) && !force {
        return Err(TallyError::Config(
            "Already initialized. Use --force to re-run initialization.".to_string(),
        ));
    }

    ConfigLoader::init_project(&root)?;

    // Global config is optional; never overwrite an existing one here
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    let config = ConfigLoader::load_from(&root)?;
    let db = open_db(&root, &config)?;

    println!("✓ Initialized Tally in .tally/");
    println!("  Database: {}", config.storage.db_path.display());
    println!("  Schema:   v{}", db.schema_version()?);
    println!();
    println!("Next steps:");
    println!("  1. tally pool add \"Main Wallet\" --currency USD --balance 1000");
    println!("  2. tally category add groceries --type expense --icon 🛒");
    println!("  3. tally chat");

    Ok(())
}
