//! Output streaming for running sessions
//!
//! stdout and stderr are read by two independent tasks that feed one merged
//! channel. Order is preserved within each stream; no order is defined
//! between the two.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Marker placed before stderr text (ANSI red)
pub const STDERR_PREFIX: &str = "\x1b[31m";

/// Marker placed after stderr text (ANSI reset)
pub const STDERR_SUFFIX: &str = "\x1b[0m";

const READ_CHUNK_SIZE: usize = 4096;

/// A piece of decoded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(String),
    Stderr(String),
}

impl OutputChunk {
    /// Render for the client: stdout verbatim, stderr wrapped in markers
    pub fn render(self) -> String {
        match self {
            OutputChunk::Stdout(text) => text,
            OutputChunk::Stderr(text) => format!("{STDERR_PREFIX}{text}{STDERR_SUFFIX}"),
        }
    }
}

/// Incremental UTF-8 decoder
///
/// Holds back an incomplete multi-byte sequence at the end of a read until
/// the rest arrives. Invalid sequences are replaced with U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode as much of `bytes` (prefixed by any held-back bytes) as possible
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            // Incomplete sequence at the end; wait for more bytes
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }

    /// Flush whatever is held back at end of stream
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&rest).into_owned()
    }
}

/// Merged output of one process
pub struct OutputStream {
    rx: mpsc::Receiver<OutputChunk>,
    readers: Vec<JoinHandle<()>>,
}

impl OutputStream {
    /// Start reader tasks for the given pipes
    ///
    /// The stream ends once every reader has hit EOF.
    pub fn spawn<O, E>(stdout: Option<O>, stderr: Option<E>, capacity: usize) -> Self
    where
        O: AsyncRead + Unpin + Send + 'static,
        E: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity);
        let mut readers = Vec::with_capacity(2);

        if let Some(stdout) = stdout {
            readers.push(tokio::spawn(pump(stdout, tx.clone(), OutputChunk::Stdout)));
        }
        if let Some(stderr) = stderr {
            readers.push(tokio::spawn(pump(stderr, tx.clone(), OutputChunk::Stderr)));
        }

        Self { rx, readers }
    }

    /// Receive the next chunk, or `None` once both streams are closed
    pub async fn recv(&mut self) -> Option<OutputChunk> {
        self.rx.recv().await
    }

    /// Stop reading; anything not yet received is discarded
    pub fn abort(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
        self.rx.close();
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}

async fn pump<R>(mut reader: R, tx: mpsc::Sender<OutputChunk>, wrap: fn(String) -> OutputChunk)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    let mut decoder = Utf8Decoder::new();

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                if text.is_empty() {
                    continue;
                }
                if tx.send(wrap(text)).await.is_err() {
                    debug!("output receiver dropped");
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "output read error");
                break;
            }
        }
    }

    let tail = decoder.finish();
    if !tail.is_empty() {
        let _ = tx.send(wrap(tail)).await;
    }
}
