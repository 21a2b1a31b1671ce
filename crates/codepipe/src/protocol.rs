//! Wire messages exchanged with clients
//!
//! Every message is a JSON object `{"event": <name>, "data": <payload>}`
//! terminated by a newline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors decoding a client message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Payload of a run request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Source text to execute
    #[serde(alias = "source")]
    pub code: String,

    /// Language tag, validated by the session manager
    pub language: String,
}

/// Messages sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    /// Start (or replace) execution for this connection
    #[serde(rename = "execute")]
    Execute(RunRequest),

    /// Text for the running process's stdin
    #[serde(rename = "terminal:input")]
    Input(String),
}

/// Messages sent to a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SessionEvent {
    /// Identifier assigned to the connection
    #[serde(rename = "connected")]
    Connected(String),

    /// A chunk of process output or the final exit-status line
    #[serde(rename = "terminal:data")]
    Output(String),

    /// A failure that prevented execution from starting
    #[serde(rename = "error")]
    Error(String),
}

impl ClientMessage {
    /// Decode one line received from a client
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim_end())?)
    }

    /// Encode as a single line (without the trailing newline)
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl SessionEvent {
    /// Decode one line received from the server
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(line.trim_end())?)
    }

    /// Encode as a single line (without the trailing newline)
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Output text, if this is an output event
    pub fn as_output(&self) -> Option<&str> {
        match self {
            SessionEvent::Output(text) => Some(text),
            _ => None,
        }
    }
}
