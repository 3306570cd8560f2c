//! Backend implementations for different execution contexts
//!
//! Commands run either on the local machine or on a remote host through the
//! `ssh` binary. Both implement [`Runner`](crate::runner::Runner), so callers
//! can pick one per host and treat them the same way.

pub mod local;
pub use local::LocalRunner;

#[cfg(feature = "ssh")]
pub mod ssh;
#[cfg(feature = "ssh")]
pub use ssh::{SshConfig, SshRunner};

/// Returns true for addresses that should be reached without SSH
pub fn is_local_address(address: &str) -> bool {
    matches!(address, "" | "127.0.0.1" | "localhost" | "::1")
}
