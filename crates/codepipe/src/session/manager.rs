//! Session manager
//!
//! Entry point of the session layer. Transports call into it with a
//! connection ID; it owns the workspace and the registry and spawns one
//! supervising task per running process.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, Language};
use crate::session::process::SessionProcess;
use crate::session::reaper::Reaper;
use crate::session::registry::Registry;
use crate::session::supervisor::{Supervisor, session_span};
use crate::session::workspace::Workspace;
use crate::session::{EventSink, ExecutionError};
use crate::types::{ConnectionId, SessionId, SessionInfo, SessionState};

/// Manages the execution sessions of all connections
#[derive(Debug, Clone)]
pub struct SessionManager {
    config: Arc<Config>,
    workspace: Workspace,
    registry: Arc<Registry>,
}

impl SessionManager {
    /// Create a manager, creating the workspace directory if needed
    pub async fn new(config: Config) -> Result<Self, ExecutionError> {
        Self::with_registry(config, Arc::new(Registry::new())).await
    }

    /// Create a manager on top of an existing registry
    pub async fn with_registry(
        config: Config,
        registry: Arc<Registry>,
    ) -> Result<Self, ExecutionError> {
        let workspace = Workspace::create(&config.workspace_dir).await?;
        Ok(Self {
            config: Arc::new(config),
            workspace,
            registry,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Parse a client supplied language tag
    pub fn parse_language(tag: &str) -> Result<Language, ExecutionError> {
        tag.parse()
            .map_err(|_| ExecutionError::UnsupportedLanguage(tag.to_owned()))
    }

    /// Validate a connection ID chosen by a transport
    pub fn connection_id(raw: &str) -> Result<ConnectionId, ExecutionError> {
        Ok(ConnectionId::parse(raw)?)
    }

    /// Run `source` for a connection, replacing whatever it was running
    ///
    /// The previous session is killed and fully cleaned up before the new
    /// file is written. Validation failures leave the previous session
    /// untouched.
    #[instrument(skip(self, source, sink), fields(%connection, len = source.len()))]
    pub async fn run(
        &self,
        connection: &ConnectionId,
        language: Language,
        source: &str,
        sink: EventSink,
    ) -> Result<SessionId, ExecutionError> {
        let launch = self
            .config
            .launch_config(language)
            .map_err(|_| ExecutionError::LanguageNotConfigured(language))?;

        let gate = self.registry.gate(connection);
        let _guard = gate.lock().await;

        if self.terminate_current(connection).await {
            debug!("previous session cleaned up");
        }

        let file_path = self
            .workspace
            .write(connection, &launch.extension, source.as_bytes())
            .await?;

        let process = match SessionProcess::spawn(launch, &file_path, self.workspace.root()) {
            Ok(process) => process,
            Err(e) => {
                self.workspace.remove(&file_path).await;
                return Err(e);
            }
        };
        let pid = process.pid();

        // Registered before the supervisor starts so its cleanup always finds the entry
        let control = self.registry.register(
            connection,
            language,
            file_path.clone(),
            pid,
            self.config.channel_capacity,
        );
        let session_id = control.session_id;

        let reaper = Reaper::new(
            connection.clone(),
            session_id,
            file_path,
            self.workspace.clone(),
            self.registry.clone(),
            control.done_tx,
        );
        Supervisor::new(
            process,
            control.stdin_rx,
            control.kill_rx,
            reaper,
            sink,
            self.config.channel_capacity,
        )
        .spawn(session_span(connection, session_id));

        info!(%session_id, ?pid, %language, "session started");
        Ok(session_id)
    }

    /// Like [`run`](Self::run), with the language given as a client tag
    pub async fn run_tagged(
        &self,
        connection: &ConnectionId,
        language: &str,
        source: &str,
        sink: EventSink,
    ) -> Result<SessionId, ExecutionError> {
        let language = Self::parse_language(language)?;
        self.run(connection, language, source, sink).await
    }

    /// Forward client input to the connection's running process
    ///
    /// Never waits: returns `false` if the input was dropped because nothing
    /// is running or the process has `channel_capacity` chunks unread.
    pub fn send_input(&self, connection: &ConnectionId, data: impl Into<Vec<u8>>) -> bool {
        let Some(stdin) = self.registry.stdin(connection) else {
            debug!(%connection, "no running session, input dropped");
            return false;
        };
        match stdin.try_send(data.into()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(%connection, "input backlog full, input dropped");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Kill the connection's running process, keeping the connection
    ///
    /// Returns whether there was a session to stop.
    #[instrument(skip(self), fields(%connection))]
    pub async fn terminate(&self, connection: &ConnectionId) -> bool {
        let gate = self.registry.gate(connection);
        let _guard = gate.lock().await;
        self.terminate_current(connection).await
    }

    /// Tear down everything belonging to a connection that has gone away
    ///
    /// Must not race a [`run`](Self::run) for the same connection; transports
    /// call it after their last request for the connection completed.
    #[instrument(skip(self), fields(%connection))]
    pub async fn disconnect(&self, connection: &ConnectionId) {
        let gate = self.registry.gate(connection);
        {
            let _guard = gate.lock().await;
            self.terminate_current(connection).await;
        }
        self.registry.release_gate(connection);
        debug!("connection released");
    }

    /// Stop every session
    pub async fn shutdown(&self) {
        let connections = self.registry.connections();
        info!(sessions = connections.len(), "shutting down sessions");
        for connection in connections {
            self.disconnect(&connection).await;
        }
    }

    pub fn state(&self, connection: &ConnectionId) -> SessionState {
        self.registry.state(connection)
    }

    pub fn snapshot(&self, connection: &ConnectionId) -> Option<SessionInfo> {
        self.registry.snapshot(connection)
    }

    /// Kill the current session and wait for its cleanup. Caller holds the gate.
    async fn terminate_current(&self, connection: &ConnectionId) -> bool {
        let Some(termination) = self.registry.begin_termination(connection) else {
            return false;
        };
        debug!(session = %termination.session_id(), "terminating session");
        termination.kill_and_wait().await;
        true
    }
}
