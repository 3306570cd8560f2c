//! Command execution library
//!
//! This crate provides a unified interface for executing commands on the local
//! machine and on remote SSH hosts, with POSIX quoting, per-run timeouts and
//! cancellation.

#![warn(missing_docs)]

pub mod backends;
pub mod command;
pub mod error;
pub mod process;
pub mod quote;
pub mod runner;

pub use backends::LocalRunner;
#[cfg(feature = "ssh")]
pub use backends::{SshConfig, SshRunner};
pub use command::Command;
pub use error::{Error, Result};
pub use process::{CommandOutput, ExitStatus, exit_code_of};
pub use quote::{shell_join, shell_quote};
pub use runner::{RunOptions, Runner};
