//! A library for interactive remote code execution.
//!
//! Codepipe runs client-submitted source through a local interpreter and
//! pipes the process to the client as it runs: output is streamed back live
//! and client input is forwarded to stdin. Each connection owns at most one
//! running process.
//!
//! # Features
//!
//! - **Session lifecycle** - A new run replaces the old one; disconnecting kills it.
//! - **Live streaming** - stdout and stderr are forwarded chunk by chunk, stderr marked in red.
//! - **Interactive input** - Client keystrokes reach the running program's stdin.
//! - **TOML configuration** - Per-language interpreter commands and environment.
//! - **JSON transport** - A small line-delimited JSON protocol over TCP.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, Language, LaunchConfig};
pub use protocol::{ClientMessage, ProtocolError, RunRequest, SessionEvent};
pub use server::{Server, ServerError};
pub use session::{EventSink, ExecutionError, ExitReport, Registry, SessionManager};
pub use types::{ConnectionId, InvalidConnectionId, SessionId, SessionInfo, SessionState};

pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod types;
