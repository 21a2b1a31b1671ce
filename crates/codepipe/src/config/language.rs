use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, de};

use crate::config::ConfigError;

const INVALID_FILE_EXT_CHARS: [char; 2] = ['/', '.'];

/// Placeholder in a launch command that expands to the materialized source path
pub const SOURCE_PLACEHOLDER: &str = "{source}";

/// A supported source language
///
/// The set is closed: every language maps onto an entry of the launch table
/// in [`Config::languages`](crate::config::Config::languages) by its [`id`](Language::id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[serde(alias = "js")]
    JavaScript,
    #[serde(alias = "py")]
    Python,
}

impl Language {
    /// All supported languages
    pub const ALL: [Language; 2] = [Language::JavaScript, Language::Python];

    /// Identifier used as the launch table key
    pub fn id(&self) -> &'static str {
        match self {
            Language::JavaScript => "javascript",
            Language::Python => "python",
        }
    }
}

impl FromStr for Language {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "javascript" | "js" => Ok(Language::JavaScript),
            "python" | "py" => Ok(Language::Python),
            other => Err(ConfigError::UnsupportedLanguage(other.to_owned())),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// How to launch an interpreter for one language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Human-readable name for the language (e.g., "Python 3")
    pub name: String,

    /// File extension of the materialized source
    pub extension: FileExtension,

    /// Command and arguments with placeholders
    /// Placeholders: {source}
    pub command: Vec<String>,

    /// Environment variables to set for the interpreter
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl LaunchConfig {
    /// Expand placeholders in the given command
    pub fn expand_command(command: &[String], source: &str) -> Vec<String> {
        command
            .iter()
            .map(|arg| arg.replace(SOURCE_PLACEHOLDER, source))
            .collect()
    }

    /// The command for this language with `{source}` expanded
    pub fn command_for(&self, source: &str) -> Vec<String> {
        Self::expand_command(&self.command, source)
    }

    /// Interpreter program (first element of the command)
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }
}

/// File extension without dot (e.g., "py")
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileExtension(String);

impl FileExtension {
    pub fn new(extension: &str) -> Result<Self, ConfigError> {
        let contains_invalid = extension
            .chars()
            .any(|c| INVALID_FILE_EXT_CHARS.contains(&c));
        if contains_invalid {
            return Err(ConfigError::InvalidFileExtChars);
        }
        Ok(Self(extension.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for FileExtension {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        FileExtension::new(&s).map_err(|_| {
            de::Error::invalid_value(
                de::Unexpected::Str(&s),
                &"a file extension without '/' or '.' characters",
            )
        })
    }
}

impl fmt::Display for FileExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
