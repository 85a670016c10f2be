//! Command execution.
//!
//! [`CommandRunner`] is the narrow contract the dashboard uses to run git:
//! captured runs return their whole stdout at once, streaming runs hand back
//! a [`StreamHandle`] whose reader yields output incrementally while the child
//! believes it is attached to an interactive terminal.
//!
//! [`OsCommandRunner`] is the real implementation: `tokio::process` for
//! captured runs, a `portable-pty` pseudo-terminal for streaming runs.

use std::io::Read;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gitdeck_core::{DeckError, Result};
use parking_lot::Mutex;
use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::types::{CommandSpec, TermSize};

/// How long [`Terminate::reap`] waits for a child whose output has ended.
const REAP_TIMEOUT: Duration = Duration::from_secs(1);

/// Stops a streaming producer. Shared between the reading worker and
/// whoever cancels it, so every method takes `&self`.
pub trait Terminate: Send + Sync {
    /// Request termination. Idempotent; never blocks on the child exiting.
    fn terminate(&self);

    /// Collect the exit code once the output stream has ended.
    fn reap(&self) -> Option<u32>;
}

/// A running streaming command.
pub struct StreamHandle {
    /// Blocking reader over the command's terminal output; `Ok(0)` is EOF
    pub reader: Box<dyn Read + Send>,
    /// Termination handle for the underlying process
    pub terminator: Arc<dyn Terminate>,
}

impl StreamHandle {
    pub fn new(reader: Box<dyn Read + Send>, terminator: Arc<dyn Terminate>) -> Self {
        Self { reader, terminator }
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle").finish_non_exhaustive()
    }
}

/// Provider of command execution.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion and return stdout. A non-zero exit is an error
    /// carrying stderr.
    async fn run_captured(&self, spec: &CommandSpec) -> Result<String>;

    /// Start `spec` attached to a pseudo-terminal of `size`.
    fn run_streaming(&self, spec: &CommandSpec, size: TermSize) -> Result<StreamHandle>;
}

/// Runs commands as real OS processes.
#[derive(Debug, Clone, Default)]
pub struct OsCommandRunner {
    /// Working directory used when a spec does not set one
    default_dir: Option<PathBuf>,
}

impl OsCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run commands in `dir` unless the spec says otherwise.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: Some(dir.into()),
        }
    }

    fn working_dir<'a>(&'a self, spec: &'a CommandSpec) -> Option<&'a PathBuf> {
        spec.cwd.as_ref().or(self.default_dir.as_ref())
    }
}

#[async_trait]
impl CommandRunner for OsCommandRunner {
    #[instrument(level = "debug", skip_all, fields(command = %spec))]
    async fn run_captured(&self, spec: &CommandSpec) -> Result<String> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the future (task superseded) kills the child
            .kill_on_drop(true);

        if let Some(dir) = self.working_dir(spec) {
            cmd.current_dir(dir);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| DeckError::command_spawn(spec.to_string(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            debug!(status = %output.status, "captured command failed");
            return Err(DeckError::CommandFailed {
                command: spec.to_string(),
                exit_code: output.status.code(),
                stderr,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    #[instrument(level = "debug", skip_all, fields(command = %spec, cols = size.cols, rows = size.rows))]
    fn run_streaming(&self, spec: &CommandSpec, size: TermSize) -> Result<StreamHandle> {
        let mut builder = CommandBuilder::new(&spec.program);
        builder.args(&spec.args);
        builder.env("TERM", "xterm-256color");
        for (key, value) in &spec.env {
            builder.env(key, value);
        }
        if let Some(dir) = self.working_dir(spec) {
            builder.cwd(dir);
        }

        let pair = native_pty_system()
            .openpty(PtySize {
                rows: size.rows.max(1),
                cols: size.cols.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(DeckError::pty)?;

        let child = pair
            .slave
            .spawn_command(builder)
            .map_err(|e| DeckError::command_spawn(spec.to_string(), e.to_string()))?;
        // The parent must not hold the slave side open or EOF never arrives
        drop(pair.slave);

        let reader = pair.master.try_clone_reader().map_err(DeckError::pty)?;
        debug!(pid = ?child.process_id(), "streaming command started");

        let terminator = PtyTerminator {
            child: Mutex::new(child),
            master: Mutex::new(Some(pair.master)),
        };

        Ok(StreamHandle::new(reader, Arc::new(terminator)))
    }
}

/// Owns the pty child and master so they live as long as the producer.
struct PtyTerminator {
    child: Mutex<Box<dyn Child + Send + Sync>>,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
}

impl Terminate for PtyTerminator {
    fn terminate(&self) {
        {
            let mut child = self.child.lock();
            match child.try_wait() {
                Ok(Some(_)) => {}
                _ => {
                    if let Err(e) = child.kill() {
                        warn!(error = %e, "failed to kill streaming command");
                    }
                }
            }
        }
        // Closing the master hangs up the terminal and unblocks the reader
        self.master.lock().take();
    }

    fn reap(&self) -> Option<u32> {
        let deadline = Instant::now() + REAP_TIMEOUT;
        loop {
            {
                let mut child = self.child.lock();
                match child.try_wait() {
                    Ok(Some(status)) => return Some(status.exit_code()),
                    Ok(None) if Instant::now() >= deadline => {
                        // Output ended but the process lingers; stop it
                        let _ = child.kill();
                        return child.wait().ok().map(|s| s.exit_code());
                    }
                    Ok(None) => {}
                    Err(_) => return None,
                }
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }
}
