//! Per-session task
//!
//! Drives one process from spawn to cleanup: streams its output to the
//! client, waits for it to exit or for a kill request, then hands over to
//! the reaper.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, info_span};

use crate::protocol::SessionEvent;
use crate::session::EventSink;
use crate::session::forwarder;
use crate::session::process::SessionProcess;
use crate::session::reaper::{Ending, Reaper};
use crate::session::stream::OutputStream;
use crate::types::{ConnectionId, SessionId};

pub(crate) struct Supervisor {
    process: SessionProcess,
    output: OutputStream,
    input: Option<JoinHandle<()>>,
    kill_rx: oneshot::Receiver<()>,
    reaper: Reaper,
    sink: EventSink,
}

impl Supervisor {
    /// Take over a spawned process
    ///
    /// Starts the output readers and the input forwarder right away.
    pub(crate) fn new(
        mut process: SessionProcess,
        stdin_rx: mpsc::Receiver<Vec<u8>>,
        kill_rx: oneshot::Receiver<()>,
        reaper: Reaper,
        sink: EventSink,
        capacity: usize,
    ) -> Self {
        let output = OutputStream::spawn(process.take_stdout(), process.take_stderr(), capacity);
        let input = process
            .take_stdin()
            .map(|stdin| forwarder::spawn(stdin, stdin_rx));

        Self {
            process,
            output,
            input,
            kill_rx,
            reaper,
            sink,
        }
    }

    pub(crate) fn spawn(self, span: tracing::Span) -> JoinHandle<()> {
        tokio::spawn(self.run().instrument(span))
    }

    async fn run(mut self) {
        let ending = self.drive().await;

        if let Some(input) = self.input.take() {
            input.abort();
        }

        let Self { reaper, sink, .. } = self;
        reaper.reap(ending, &sink).await;
    }

    async fn drive(&mut self) -> Ending {
        let mut output_open = true;

        loop {
            tokio::select! {
                biased;

                // A dropped sender counts as a kill request too
                _ = &mut self.kill_rx => {
                    debug!("kill requested");
                    self.reaper.mark_terminating();
                    self.output.abort();
                    return match self.process.kill().await {
                        Ok(report) => Ending::Killed(report),
                        Err(e) => Ending::Lost(e),
                    };
                }

                chunk = self.output.recv(), if output_open => {
                    match chunk {
                        Some(chunk) => {
                            if self.sink.send(SessionEvent::Output(chunk.render())).is_err() {
                                debug!("client gone, discarding output");
                            }
                        }
                        None => {
                            debug!("output closed");
                            output_open = false;
                        }
                    }
                }

                status = self.process.wait(), if !output_open => {
                    self.reaper.mark_terminating();
                    return match status {
                        Ok(report) => Ending::Exited(report),
                        Err(e) => Ending::Lost(e),
                    };
                }
            }
        }
    }
}

/// Span for a session's task
pub(crate) fn session_span(connection: &ConnectionId, session_id: SessionId) -> tracing::Span {
    info_span!("session", %connection, session = %session_id)
}
