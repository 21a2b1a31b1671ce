//! Interpreter process spawning and I/O
//!
//! Handles starting an interpreter against a materialized source file with
//! all three standard streams piped.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{debug, instrument};

use crate::config::LaunchConfig;
use crate::session::ExecutionError;

/// Process handle for one session
#[derive(Debug)]
pub struct SessionProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    pid: Option<u32>,
}

impl SessionProcess {
    /// Spawn the interpreter for `source_path`
    ///
    /// The child is killed if the handle is dropped while it is still running.
    #[instrument(skip(launch), fields(language = %launch.name))]
    pub fn spawn(
        launch: &LaunchConfig,
        source_path: &Path,
        working_dir: &Path,
    ) -> Result<Self, ExecutionError> {
        let args = launch.command_for(&source_path.to_string_lossy());

        debug!(?args, "spawning interpreter");

        let program = args.first().ok_or_else(|| ExecutionError::Spawn {
            program: String::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
        })?;

        let mut child = Command::new(program)
            .args(&args[1..])
            .envs(&launch.env)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                program: program.clone(),
                source,
            })?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        debug!(?pid, "interpreter started");

        Ok(Self {
            child,
            stdin,
            stdout,
            stderr,
            pid,
        })
    }

    /// OS process id, if the process has not been reaped yet
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Take ownership of stdin
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Take ownership of stdout
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Take ownership of stderr
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.stderr.take()
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> std::io::Result<ExitReport> {
        let status = self.child.wait().await?;
        Ok(ExitReport::from(status))
    }

    /// Kill the process and reap it
    ///
    /// Killing a process that already exited is not an error.
    pub async fn kill(&mut self) -> std::io::Result<ExitReport> {
        self.stdin = None;
        if let Err(e) = self.child.start_kill() {
            // start_kill fails with InvalidInput once the child was reaped
            debug!(error = %e, "kill on exited process");
        }
        self.wait().await
    }
}

/// How a session's process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    /// Exit code if the program exited normally
    pub code: Option<i32>,

    /// Signal number if the program was killed by a signal
    pub signal: Option<i32>,
}

impl ExitReport {
    /// Check if the process exited with code 0
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// The synthetic status line appended to the output channel
    pub fn status_line(&self) -> String {
        format!("\r\n{self}\r\n")
    }

    /// Recover a report from an output chunk that is exactly a status line
    pub fn from_status_line(line: &str) -> Option<Self> {
        let text = line.strip_prefix("\r\n")?.strip_suffix("\r\n")?;
        if let Some(code) = text.strip_prefix("Process exited with code ") {
            return Some(Self {
                code: Some(code.parse().ok()?),
                signal: None,
            });
        }
        if let Some(signal) = text.strip_prefix("Process terminated by signal ") {
            return Some(Self {
                code: None,
                signal: Some(signal.parse().ok()?),
            });
        }
        (text == "Process exited").then_some(Self {
            code: None,
            signal: None,
        })
    }

    /// Exit status for a shell reporting this process, `128 + signal` when killed
    pub fn shell_code(&self) -> i32 {
        match (self.code, self.signal) {
            (Some(code), _) => code,
            (None, Some(signal)) => 128 + signal,
            (None, None) => 1,
        }
    }
}

impl From<ExitStatus> for ExitReport {
    fn from(status: ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = std::os::unix::process::ExitStatusExt::signal(&status);
        #[cfg(not(unix))]
        let signal = None;

        Self {
            code: status.code(),
            signal,
        }
    }
}

impl fmt::Display for ExitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "Process exited with code {code}"),
            (None, Some(signal)) => write!(f, "Process terminated by signal {signal}"),
            (None, None) => f.write_str("Process exited"),
        }
    }
}
