//! The `Runner` seam shared by the local and SSH backends

use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::error::Result;
use crate::process::CommandOutput;

/// Per-invocation execution limits
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the process if it runs longer than this
    pub timeout: Option<Duration>,
    /// Kill the process when this token is cancelled
    pub cancel: Option<CancellationToken>,
}

impl RunOptions {
    /// Options with a deadline
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    /// Attach a cancellation token
    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

/// Something that can run commands and capture their output.
///
/// Implementations exist for the local machine and for remote hosts reached
/// over SSH. A non-zero exit is returned as `Ok` with the code preserved; only
/// failures to start, timeouts and cancellation surface as `Err`.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a structured command
    async fn run_command(&self, command: &Command, opts: &RunOptions) -> Result<CommandOutput>;

    /// Run a shell script line
    async fn run(&self, script: &str, opts: &RunOptions) -> Result<CommandOutput> {
        self.run_command(&Command::shell(script), opts).await
    }

    /// Human readable description of where commands run
    fn describe(&self) -> String;
}
