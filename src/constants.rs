//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Confidence scores
pub mod confidence {
    /// Extraction reported HIGH confidence
    pub const HIGH: f64 = 0.9;
    /// Extraction reported MEDIUM confidence
    pub const MEDIUM: f64 = 0.6;
    /// Extraction reported LOW confidence
    pub const LOW: f64 = 0.3;
    /// Targeted edit when the extraction did not score the field
    pub const TARGETED_DEFAULT: f64 = 0.5;
    /// Explicitly cleared field
    pub const CLEARED: f64 = 0.0;
}

/// Draft validation rules
pub mod validation {
    /// Minimum trimmed length of a purpose
    pub const MIN_PURPOSE_LEN: usize = 3;
}

/// Reply classification during confirmation
pub mod tokens {
    pub const CONFIRM: &[&str] = &["confirm", "yes", "approve"];
    pub const CANCEL: &[&str] = &["cancel", "no", "never mind", "forget this", "abort", "stop"];
}

/// Display fallbacks for the confirmation payload
pub mod display {
    pub const UNKNOWN_POOL: &str = "Unknown Pool";
    pub const UNKNOWN_CATEGORY: &str = "Unknown Category";
}

/// Extraction service call
pub mod extraction {
    /// Upper bound for one extraction call (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 20;
    /// Retries for transient provider errors
    pub const DEFAULT_MAX_RETRIES: usize = 1;
    /// First backoff delay (milliseconds)
    pub const BASE_DELAY_MS: u64 = 250;
}

/// Network constants
pub mod network {
    /// Default HTTP request timeout in seconds
    pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
    /// Connection timeout in seconds
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
}

/// Storage constants
pub mod storage {
    /// Project data directory
    pub const DATA_DIR: &str = ".tally";
    /// Database file inside the data directory
    pub const DB_FILE: &str = "tally.db";
    /// Config file inside the data directory
    pub const CONFIG_FILE: &str = "config.toml";
}

/// CLI defaults
pub mod cli {
    /// User id used when none is given
    pub const DEFAULT_USER: &str = "local";
}
