//! Asynchronous command execution with a single completion callback.
//!
//! [`CommandRunner`] is the seam between the status updater and the OS. The
//! real implementation ([`TokioCommandRunner`]) spawns child processes on the
//! current tokio runtime; tests swap in a runner that records callbacks and
//! completes them by hand.

use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, error, warn};

/// Receives the first line of stdout, or `None` if there was nothing to read.
pub type OnComplete = Box<dyn FnOnce(Option<String>) + Send + 'static>;

/// Runs argv-style commands without blocking the caller.
///
/// Implementations must call `on_complete` exactly once per `run`, whatever
/// happens to the process. They may call it before `run` returns.
pub trait CommandRunner {
    fn run(&self, command: &[String], on_complete: OnComplete);
}

/// Why a command produced no output. Only ever logged.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("empty command")]
    EmptyCommand,
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read stdout: {0}")]
    Read(#[source] std::io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("no tokio runtime to spawn on")]
    NoRuntime,
}

/// Spawns commands through [`tokio::process::Command`].
#[derive(Debug, Clone, Default)]
pub struct TokioCommandRunner {
    timeout: Option<Duration>,
}

impl TokioCommandRunner {
    /// `timeout` bounds how long a command may take to print its first line.
    /// `None` waits forever.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for TokioCommandRunner {
    fn run(&self, command: &[String], on_complete: OnComplete) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(h) => h,
            Err(_) => {
                error!(command = ?command, "{}", RunError::NoRuntime);
                on_complete(None);
                return;
            }
        };

        let argv = command.to_vec();
        let timeout = self.timeout;
        handle.spawn(async move {
            let output = match first_line(&argv, timeout).await {
                Ok(line) => line,
                Err(e @ RunError::Spawn { .. }) => {
                    warn!(command = ?argv, "Could not execute: {e}");
                    None
                }
                Err(e) => {
                    debug!(command = ?argv, "No output: {e}");
                    None
                }
            };
            on_complete(output);
        });
    }
}

/// Spawns `argv` and returns the first line it prints, without the line
/// terminator. An empty line or immediate EOF yields `Ok(None)`.
///
/// Returns as soon as the line is read. The child may keep running; it is
/// reaped on a separate task.
async fn first_line(argv: &[String], timeout: Option<Duration>) -> Result<Option<String>, RunError> {
    let (program, args) = argv.split_first().ok_or(RunError::EmptyCommand)?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunError::Spawn {
            program: program.clone(),
            source,
        })?;

    let Some(stdout) = child.stdout.take() else {
        return Ok(None);
    };
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    let read = reader.read_line(&mut line);
    let read_result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(r) => r,
            Err(_) => {
                let _ = child.start_kill();
                tokio::spawn(reap(child, program.clone()));
                return Err(RunError::TimedOut(limit));
            }
        },
        None => read.await,
    };
    // Closing our end of the pipe gives a chatty child EPIPE instead of a
    // full pipe.
    drop(reader);
    tokio::spawn(reap(child, program.clone()));
    read_result.map_err(RunError::Read)?;

    let trimmed = line.strip_suffix('\n').unwrap_or(&line);
    let trimmed = trimmed.strip_suffix('\r').unwrap_or(trimmed);
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

async fn reap(mut child: Child, program: String) {
    if let Err(e) = child.wait().await {
        debug!(program = %program, "Failed to reap child: {e}");
    }
}
