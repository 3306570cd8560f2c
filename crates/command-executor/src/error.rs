//! Error types for command execution

use std::time::Duration;
use thiserror::Error;

/// Unified error type for command execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        /// The command line that could not be started
        command: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Command did not finish within its deadline
    #[error("command `{command}` timed out after {timeout:?}")]
    Timeout {
        /// The command line that timed out
        command: String,
        /// The deadline that was exceeded
        timeout: Duration,
    },

    /// Command was cancelled before it finished
    #[error("command `{command}` was cancelled")]
    Cancelled {
        /// The command line that was cancelled
        command: String,
    },

    /// SSH key not found
    #[cfg(feature = "ssh")]
    #[error("SSH key not found: {path}")]
    SshKeyNotFound {
        /// The path where the SSH key was expected to be found
        path: String,
    },

    /// SSH could not reach or authenticate to the remote host
    #[cfg(feature = "ssh")]
    #[error("ssh connection to {host} failed: {message}")]
    SshConnectionFailed {
        /// The `user@host` target
        host: String,
        /// What ssh reported on stderr
        message: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            command: command.into(),
            source,
        }
    }

    /// Exit code reported for this error.
    ///
    /// A process that never ran has no real exit status, so every error maps
    /// to `-1`.
    pub fn exit_code(&self) -> i32 {
        -1
    }

    /// Returns true if the process could not be started at all
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::SpawnFailed { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
