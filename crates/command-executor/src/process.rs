//! Process outcome types

use std::time::Duration;

use crate::error::Error;

/// Process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code if the process exited normally
    pub code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[cfg(unix)]
    pub signal: Option<i32>,
}

impl ExitStatus {
    /// Returns true if the process exited successfully (code 0)
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Exit code as reported to callers, `-1` when killed by a signal
    pub fn code_or_negative(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Self {
                code: status.code(),
                signal: status.signal(),
            }
        }
        #[cfg(not(unix))]
        {
            Self {
                code: status.code(),
            }
        }
    }
}

/// Captured output of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// How the process exited
    pub status: ExitStatus,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock time between spawn and exit
    pub duration: Duration,
}

impl CommandOutput {
    /// Returns true if the command exited with code 0
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Exit code, `-1` when the process was killed by a signal
    pub fn exit_code(&self) -> i32 {
        self.status.code_or_negative()
    }

    /// Stdout followed by stderr, as a terminal would interleave them at the end
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout.trim_end(), self.stderr),
        }
    }
}

/// Exit code of a run, folding start-up failures into `-1`.
///
/// Normal exits keep their code, a process that could not be started at all
/// reports `-1`.
pub fn exit_code_of(result: &Result<CommandOutput, Error>) -> i32 {
    match result {
        Ok(output) => output.exit_code(),
        Err(e) => e.exit_code(),
    }
}
