//! TCP transport
//!
//! Clients speak line-delimited JSON (see [`crate::protocol`]). Every
//! accepted socket is a connection with a fresh [`ConnectionId`]; closing
//! the socket disconnects it and kills whatever it was running.

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::protocol::{ClientMessage, ProtocolError, SessionEvent};
use crate::session::{EventSink, SessionManager};
use crate::types::ConnectionId;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Listening server bound to a session manager
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    manager: SessionManager,
}

impl Server {
    /// Bind to the address configured in `manager`'s config
    pub async fn bind(manager: SessionManager) -> Result<Self, ServerError> {
        let addr = manager.config().listen.clone();
        Self::bind_to(&addr, manager).await
    }

    /// Bind to an explicit address
    pub async fn bind_to(addr: &str, manager: SessionManager) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        Ok(Self { listener, manager })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Serve clients until `shutdown` resolves, then stop every session
    pub async fn run<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "listening");
        }

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break;
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(stream, peer, self.manager.clone()));
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },

                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "connection task failed");
                    }
                }
            }
        }

        connections.abort_all();
        self.manager.shutdown().await;
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, manager: SessionManager) {
    let connection = ConnectionId::new();
    let span = info_span!("connection", %connection, %peer);

    async move {
        info!("client connected");
        let (read_half, write_half) = stream.into_split();
        let (sink, events) = mpsc::unbounded_channel();

        let writer = tokio::spawn(
            async move {
                if let Err(e) = write_events(write_half, events).await {
                    debug!(error = %e, "stopped writing to client");
                }
            }
            .in_current_span(),
        );

        let _ = sink.send(SessionEvent::Connected(connection.to_string()));

        if let Err(e) = read_requests(read_half, &connection, &manager, &sink).await {
            debug!(error = %e, "connection read failed");
        }

        manager.disconnect(&connection).await;
        drop(sink);
        let _ = writer.await;
        info!("client disconnected");
    }
    .instrument(span)
    .await
}

async fn read_requests(
    reader: OwnedReadHalf,
    connection: &ConnectionId,
    manager: &SessionManager,
    sink: &EventSink,
) -> Result<(), ServerError> {
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let message = match ClientMessage::decode(&line) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "rejecting message");
                let _ = sink.send(SessionEvent::Error(e.to_string()));
                continue;
            }
        };

        match message {
            ClientMessage::Execute(request) => {
                if let Err(e) = manager
                    .run_tagged(connection, &request.language, &request.code, sink.clone())
                    .await
                {
                    warn!(error = %e, "execution did not start");
                    let _ = sink.send(SessionEvent::Error(e.to_string()));
                }
            }
            ClientMessage::Input(data) => {
                manager.send_input(connection, data);
            }
        }
    }

    Ok(())
}

async fn write_events(
    mut writer: OwnedWriteHalf,
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
) -> Result<(), ServerError> {
    while let Some(event) = events.recv().await {
        let mut line = event.encode()?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
    }
    writer.shutdown().await?;
    Ok(())
}
