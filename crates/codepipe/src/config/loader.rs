//! Configuration file loading for codepipe
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};

use crate::config::{Config, ConfigError, ENV_PREFIX, EXAMPLE_CONFIG, Language, SOURCE_PLACEHOLDER};

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = ConfigBuilder::builder()
            .add_source(File::from(path))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration layered from the embedded defaults, an optional
    /// file and `CODEPIPE_*` environment variables (highest precedence)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            ConfigBuilder::builder().add_source(File::from_str(EXAMPLE_CONFIG, FileFormat::Toml));
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        let config = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be greater than zero".to_owned(),
            ));
        }

        for (id, launch) in &self.languages {
            match id.parse::<Language>() {
                Ok(language) if language.id() == id => {}
                Ok(language) => {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' must be keyed by its id '{}'",
                        language.id()
                    )));
                }
                Err(_) => {
                    return Err(ConfigError::Invalid(format!(
                        "language '{id}' is not a supported language"
                    )));
                }
            }
            if launch.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty name"
                )));
            }
            if launch.extension.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty extension"
                )));
            }
            if launch.command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' has empty command"
                )));
            }
            if !launch
                .command
                .iter()
                .any(|arg| arg.contains(SOURCE_PLACEHOLDER))
            {
                return Err(ConfigError::Invalid(format!(
                    "language '{id}' command never references {SOURCE_PLACEHOLDER}"
                )));
            }
        }

        Ok(())
    }
}
