//! Local process execution backend

use async_process::Stdio;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::process::{CommandOutput, ExitStatus};
use crate::runner::{RunOptions, Runner};

/// Runner for executing processes on the local machine
#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    /// Working directory used when a command does not set its own
    working_dir: Option<PathBuf>,
}

impl LocalRunner {
    /// Create a runner that inherits the current working directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a runner rooted at `dir`
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: Some(dir.into()),
        }
    }
}

#[async_trait]
impl Runner for LocalRunner {
    async fn run_command(&self, command: &Command, opts: &RunOptions) -> Result<CommandOutput> {
        match (&self.working_dir, command.get_current_dir()) {
            (Some(dir), None) => {
                let mut command = command.clone();
                command.current_dir(dir);
                execute(&command, opts).await
            }
            _ => execute(command, opts).await,
        }
    }

    fn describe(&self) -> String {
        "local".to_string()
    }
}

/// Spawn `command`, capture stdout and stderr separately and wait for it.
///
/// The child is killed if the deadline passes or the token is cancelled.
pub(crate) async fn execute(command: &Command, opts: &RunOptions) -> Result<CommandOutput> {
    let line = command.to_shell_string();

    let mut async_cmd = command.prepare();
    async_cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(command = %line, "spawning process");
    let start = Instant::now();
    let child = async_cmd
        .spawn()
        .map_err(|e| Error::spawn_failed(line.clone(), e))?;

    let timeout = opts.timeout;
    let timeout_label = line.clone();
    let wait = async move {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, child.output())
                .await
                .map_err(|_| Error::Timeout {
                    command: timeout_label,
                    timeout: limit,
                })?
                .map_err(Error::from),
            None => child.output().await.map_err(Error::from),
        }
    };

    let output = match &opts.cancel {
        Some(token) => tokio::select! {
            res = wait => res,
            _ = token.cancelled() => Err(Error::Cancelled { command: line.clone() }),
        },
        None => wait.await,
    };

    let output = match output {
        Ok(output) => output,
        Err(e) => {
            warn!(command = %line, error = %e, "process did not complete");
            return Err(e);
        }
    };

    let result = CommandOutput {
        status: ExitStatus::from(output.status),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration: start.elapsed(),
    };
    debug!(
        command = %line,
        exit_code = result.exit_code(),
        elapsed_ms = result.duration.as_millis() as u64,
        "process finished"
    );
    Ok(result)
}
