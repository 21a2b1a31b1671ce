use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::language::{
    FileExtension, Language, LaunchConfig, SOURCE_PLACEHOLDER,
};

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../codepipe.example.toml");

/// Prefix for environment variable overrides (e.g., `CODEPIPE_LISTEN`)
pub const ENV_PREFIX: &str = "CODEPIPE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid characters in file extension")]
    InvalidFileExtChars,

    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("language '{0}' not found in configuration")]
    LanguageNotFound(Language),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Config for codepipe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the server listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Scratch directory for materialized source files.
    ///
    /// Created at startup if absent. Files inside are named
    /// `code_<connection>.<ext>` and removed when their session ends.
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Capacity of the per-session output and input channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Launch table keyed by language ID
    #[serde(default)]
    pub languages: HashMap<String, LaunchConfig>,
}

impl Config {
    /// Create a new config with embedded default languages
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages
    pub fn empty() -> Self {
        Self {
            listen: default_listen(),
            workspace_dir: default_workspace_dir(),
            channel_capacity: default_channel_capacity(),
            languages: HashMap::new(),
        }
    }

    /// Get the launch configuration for a language
    pub fn launch_config(&self, language: Language) -> Result<&LaunchConfig, ConfigError> {
        self.languages
            .get(language.id())
            .ok_or(ConfigError::LanguageNotFound(language))
    }

    /// Replace the scratch directory
    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = dir.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_listen() -> String {
    "127.0.0.1:4000".to_owned()
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_channel_capacity() -> usize {
    100
}
