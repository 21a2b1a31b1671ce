//! Session cleanup
//!
//! Runs exactly once per session, whichever way it ended: report the exit to
//! the client, delete the source file, drop the registry entry and wake
//! anyone waiting for the session to be gone.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::protocol::SessionEvent;
use crate::session::EventSink;
use crate::session::process::ExitReport;
use crate::session::registry::Registry;
use crate::session::workspace::Workspace;
use crate::types::{ConnectionId, SessionId};

/// How the supervised process ended
#[derive(Debug)]
pub(crate) enum Ending {
    /// Exited on its own after its output closed
    Exited(ExitReport),

    /// Killed on request
    Killed(ExitReport),

    /// Waiting on the process failed
    Lost(std::io::Error),
}

/// Everything needed to clean up after one session
#[derive(Debug)]
pub(crate) struct Reaper {
    connection: ConnectionId,
    session_id: SessionId,
    file_path: PathBuf,
    workspace: Workspace,
    registry: Arc<Registry>,
    done_tx: watch::Sender<bool>,
    reaped: bool,
}

impl Reaper {
    pub(crate) fn new(
        connection: ConnectionId,
        session_id: SessionId,
        file_path: PathBuf,
        workspace: Workspace,
        registry: Arc<Registry>,
        done_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            connection,
            session_id,
            file_path,
            workspace,
            registry,
            done_tx,
            reaped: false,
        }
    }

    /// The process is on its way out; stop taking input for it
    pub(crate) fn mark_terminating(&self) {
        self.registry
            .mark_terminating(&self.connection, self.session_id);
    }

    pub(crate) async fn reap(mut self, ending: Ending, sink: &EventSink) {
        let report = match ending {
            Ending::Exited(report) => {
                info!(%report, "process exited");
                Some(report)
            }
            Ending::Killed(report) => {
                info!(%report, "process killed");
                Some(report)
            }
            Ending::Lost(e) => {
                warn!(error = %e, "failed to wait for process");
                None
            }
        };

        if let Some(report) = report
            && sink.send(SessionEvent::Output(report.status_line())).is_err()
        {
            debug!("client gone, exit status not delivered");
        }

        self.workspace.remove(&self.file_path).await;
        self.finish();
    }

    fn finish(&mut self) {
        if !self.registry.remove(&self.connection, self.session_id) {
            debug!("registry entry already replaced");
        }
        self.done_tx.send_replace(true);
        self.reaped = true;
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        warn!(
            connection = %self.connection,
            session = %self.session_id,
            "session dropped before cleanup"
        );
        // Best effort; we cannot await here
        match std::fs::remove_file(&self.file_path) {
            Ok(()) => debug!(path = ?self.file_path, "removed source file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = ?self.file_path,
                error = %e,
                "failed to remove source file"
            ),
        }
        self.finish();
    }
}
