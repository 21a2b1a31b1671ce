//! Connection to session registry
//!
//! The registry is the only shared mutable state of the session layer. It
//! maps each connection to at most one session and hands out the
//! per-connection gate that serializes run and disconnect requests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot, watch};
use tracing::debug;

use crate::config::Language;
use crate::types::{ConnectionId, SessionId, SessionInfo, SessionState};

#[derive(Debug)]
struct SessionEntry {
    session_id: SessionId,
    language: Language,
    file_path: PathBuf,
    pid: Option<u32>,
    state: SessionState,
    stdin_tx: Option<mpsc::Sender<Vec<u8>>>,
    kill_tx: Option<oneshot::Sender<()>>,
    done_rx: watch::Receiver<bool>,
}

impl SessionEntry {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            language: self.language,
            file_path: self.file_path.clone(),
            pid: self.pid,
            state: self.state,
        }
    }
}

/// Receiving ends of a registered session's control channels
///
/// Owned by the task that supervises the process.
#[derive(Debug)]
pub(crate) struct SessionControl {
    pub session_id: SessionId,
    pub stdin_rx: mpsc::Receiver<Vec<u8>>,
    pub kill_rx: oneshot::Receiver<()>,
    pub done_tx: watch::Sender<bool>,
}

/// Handle to stop a session and wait until it has been cleaned up
#[derive(Debug)]
pub struct Termination {
    session_id: SessionId,
    kill_tx: Option<oneshot::Sender<()>>,
    done_rx: watch::Receiver<bool>,
}

impl Termination {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Kill the process and wait for its cleanup to finish
    pub async fn kill_and_wait(mut self) {
        if let Some(kill_tx) = self.kill_tx.take() {
            // The session may already be exiting on its own
            let _ = kill_tx.send(());
        }
        // Err means the supervising task is gone, which also ends the wait
        let _ = self.done_rx.wait_for(|done| *done).await;
    }
}

/// Registry of live sessions keyed by connection
#[derive(Debug, Default)]
pub struct Registry {
    sessions: Mutex<HashMap<ConnectionId, SessionEntry>>,
    gates: Mutex<HashMap<ConnectionId, Arc<AsyncMutex<()>>>>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock serializing run and disconnect requests of one connection
    pub fn gate(&self, connection: &ConnectionId) -> Arc<AsyncMutex<()>> {
        self.gates
            .lock()
            .entry(connection.clone())
            .or_default()
            .clone()
    }

    /// Forget the gate of a connection that has gone away
    pub fn release_gate(&self, connection: &ConnectionId) {
        self.gates.lock().remove(connection);
    }

    /// Register a freshly spawned process as the connection's running session
    pub(crate) fn register(
        &self,
        connection: &ConnectionId,
        language: Language,
        file_path: PathBuf,
        pid: Option<u32>,
        capacity: usize,
    ) -> SessionControl {
        let session_id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (stdin_tx, stdin_rx) = mpsc::channel(capacity);
        let (kill_tx, kill_rx) = oneshot::channel();
        let (done_tx, done_rx) = watch::channel(false);

        let entry = SessionEntry {
            session_id,
            language,
            file_path,
            pid,
            state: SessionState::Running,
            stdin_tx: Some(stdin_tx),
            kill_tx: Some(kill_tx),
            done_rx,
        };

        // A replaced entry drops its kill switch, which stops that process too
        if let Some(previous) = self.sessions.lock().insert(connection.clone(), entry) {
            debug!(%connection, previous = %previous.session_id, "replaced registry entry");
        }

        SessionControl {
            session_id,
            stdin_rx,
            kill_rx,
            done_tx,
        }
    }

    /// Start terminating the connection's session, if any
    ///
    /// The entry is marked `Terminating` and stops accepting input. It stays
    /// registered until its cleanup removes it.
    pub fn begin_termination(&self, connection: &ConnectionId) -> Option<Termination> {
        let mut sessions = self.sessions.lock();
        let entry = sessions.get_mut(connection)?;
        entry.state = SessionState::Terminating;
        entry.stdin_tx = None;
        Some(Termination {
            session_id: entry.session_id,
            kill_tx: entry.kill_tx.take(),
            done_rx: entry.done_rx.clone(),
        })
    }

    /// Mark a session as terminating (its process has exited or is being killed)
    pub(crate) fn mark_terminating(&self, connection: &ConnectionId, session_id: SessionId) {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = sessions.get_mut(connection)
            && entry.session_id == session_id
        {
            entry.state = SessionState::Terminating;
            entry.stdin_tx = None;
        }
    }

    /// Remove a session's entry
    ///
    /// Only removes the entry if it still belongs to `session_id`. Returns
    /// whether an entry was removed.
    pub(crate) fn remove(&self, connection: &ConnectionId, session_id: SessionId) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(connection) {
            Some(entry) if entry.session_id == session_id => {
                sessions.remove(connection);
                true
            }
            _ => false,
        }
    }

    /// Input channel of the connection's running session
    pub(crate) fn stdin(&self, connection: &ConnectionId) -> Option<mpsc::Sender<Vec<u8>>> {
        let sessions = self.sessions.lock();
        let entry = sessions.get(connection)?;
        if entry.state != SessionState::Running {
            return None;
        }
        entry.stdin_tx.clone()
    }

    /// State of the connection's session (`Idle` if none is registered)
    pub fn state(&self, connection: &ConnectionId) -> SessionState {
        self.sessions
            .lock()
            .get(connection)
            .map(|entry| entry.state)
            .unwrap_or_default()
    }

    /// Snapshot of the connection's session
    pub fn snapshot(&self, connection: &ConnectionId) -> Option<SessionInfo> {
        self.sessions.lock().get(connection).map(SessionEntry::info)
    }

    /// Connections that currently have a session
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.sessions.lock().keys().cloned().collect()
    }

    /// Number of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
