//! Client input to process stdin

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Start a task writing every received chunk to `stdin`, in order
///
/// The task ends when the sending side is gone or the process stops reading.
/// Dropping the writer closes the pipe, so the process sees EOF.
pub(crate) fn spawn<W>(stdin: W, rx: mpsc::Receiver<Vec<u8>>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(forward(stdin, rx))
}

async fn forward<W>(mut stdin: W, mut rx: mpsc::Receiver<Vec<u8>>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(data) = rx.recv().await {
        let written = async {
            stdin.write_all(&data).await?;
            stdin.flush().await
        }
        .await;

        if let Err(e) = written {
            debug!(error = %e, "stdin closed by process, dropping input");
            return;
        }
    }
    debug!("input channel closed");
}
