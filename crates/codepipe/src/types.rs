use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Language;

/// Returned when a connection identifier is not safe to embed in a file name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid connection id '{0}': only [A-Za-z0-9_-] allowed")]
pub struct InvalidConnectionId(pub String);

/// Opaque identifier of a client connection
///
/// Stable for the lifetime of the connection. The value is restricted to
/// `[A-Za-z0-9_-]` so it can name files in the scratch directory without any
/// path traversal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh random identifier
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Use a caller-chosen identifier
    pub fn parse(id: &str) -> Result<Self, InvalidConnectionId> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(InvalidConnectionId(id.to_owned()));
        }
        Ok(Self(id.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ConnectionId {
    type Err = InvalidConnectionId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generation number of one run on a connection
///
/// Every run request gets a new, strictly increasing id, so cleanup of an
/// older run never touches the registry entry of a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a connection's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No process for this connection
    #[default]
    Idle,

    /// A process is alive and wired to the client
    Running,

    /// The process is being killed or has exited and cleanup is in progress
    Terminating,
}

/// Point-in-time view of a registered session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionId,
    pub language: Language,
    pub file_path: PathBuf,
    pub pid: Option<u32>,
    pub state: SessionState,
}
