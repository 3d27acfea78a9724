//! Config Command
//!
//! Usage:
//!   tally config show [-f json]
//!   tally config path
//!   tally config init [-g] [--force]

use crate::config::ConfigLoader;
use crate::types::{Result, TallyError};

/// Show the merged effective configuration
pub fn show(format: &str) -> Result<()> {
    let root = std::env::current_dir()?;
    let config = ConfigLoader::load_from(&root)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!(
            "{}",
            toml::to_string_pretty(&config).map_err(|e| TallyError::Config(e.to_string()))?
        );
    }
    Ok(())
}

/// Show configuration paths
pub fn path() -> Result<()> {
    let root = std::env::current_dir()?;
    println!("Configuration paths:");
    println!();

    match ConfigLoader::global_config_path() {
        Some(global) => {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        }
        None => println!("  Global:  (not available)"),
    }

    let project = ConfigLoader::project_config_path(&root);
    let exists = if project.exists() { "✓" } else { "✗" };
    println!("  Project: {} {}", exists, project.display());
    Ok(())
}

pub fn init_global(force: bool) -> Result<()> {
    let path = ConfigLoader::init_global(force)?;
    println!("✓ Initialized global configuration");
    println!("  Config: {}", path.display());
    Ok(())
}

pub fn init_project() -> Result<()> {
    let root = std::env::current_dir()?;
    let dir = ConfigLoader::init_project(&root)?;
    println!("✓ Initialized project configuration");
    println!("  Directory: {}", dir.display());
    println!(
        "  Config:    {}",
        ConfigLoader::project_config_path(&root).display()
    );
    Ok(())
}
