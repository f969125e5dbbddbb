//! Trellis configuration
//!
//! Settings for a run, loaded and merged in the following order (later
//! overrides earlier):
//! 1. Project config (`trellis.toml`, found by walking up from the working directory)
//! 2. Environment variables (`TRELLIS_*`, `NO_COLOR`)
//! 3. CLI flags (applied by the harness)
//!
//! # Example
//!
//! ```no_run
//! use trellis_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("timeout: {:?}", config.project.timeout());
//! ```

pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "trellis.toml";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use loader::{Config, ConfigLoader};
pub use project::{
    CoberturaConfig, EnvironmentConfig, ReportersConfig, RunConfig, TrellisConfig,
};
