//! Execution sessions
//!
//! One session per client connection: the submitted source is written to the
//! scratch workspace, an interpreter is spawned against it, its output is
//! streamed back and client input is forwarded to its stdin. Cleanup happens
//! on exit, on re-execution and on disconnect.

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;

pub use crate::session::manager::SessionManager;
pub use crate::session::process::{ExitReport, SessionProcess};
pub use crate::session::registry::{Registry, Termination};
pub use crate::session::stream::{
    OutputChunk, OutputStream, STDERR_PREFIX, STDERR_SUFFIX, Utf8Decoder,
};
pub use crate::session::workspace::Workspace;

mod forwarder;
mod manager;
mod process;
mod reaper;
mod registry;
mod stream;
mod supervisor;
mod workspace;

use crate::config::Language;
use crate::protocol::SessionEvent;
use crate::types::InvalidConnectionId;

/// Where a session sends the events destined for its client
///
/// Unbounded: the core never applies backpressure to a slow client.
pub type EventSink = mpsc::UnboundedSender<SessionEvent>;

/// Failures that prevent a session from starting
///
/// Failures during a process's life (bad user code, non-zero exit) are not
/// errors; they reach the client as ordinary output.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("unsupported language '{0}'")]
    UnsupportedLanguage(String),

    #[error("language '{0}' is not configured")]
    LanguageNotConfigured(Language),

    #[error(transparent)]
    InvalidConnectionId(#[from] InvalidConnectionId),

    #[error("failed to write source file {}: {source}", path.display())]
    Materialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}
