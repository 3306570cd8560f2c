//! SSH remote execution backend using the `ssh` CLI

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::backends::local::execute;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::process::CommandOutput;
use crate::quote::shell_quote;
use crate::runner::{RunOptions, Runner};

/// SSH connection configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    /// Target host (hostname or IP)
    host: String,
    /// SSH user (optional, uses system default if not specified)
    user: Option<String>,
    /// SSH port (optional, defaults to 22)
    port: Option<u16>,
    /// Path to identity file (private key)
    identity_file: Option<PathBuf>,
    /// Additional SSH arguments
    extra_args: Vec<String>,
}

impl SshConfig {
    /// Create a new SSH configuration for the given host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            identity_file: None,
            extra_args: Vec::new(),
        }
    }

    /// Parse a `user@host` target; a bare host keeps the system default user
    pub fn from_target(target: &str) -> Self {
        match target.split_once('@') {
            Some((user, host)) if !user.is_empty() => Self::new(host).with_user(user),
            _ => Self::new(target.trim_start_matches('@')),
        }
    }

    /// Set the SSH user
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the identity file (private key); a leading `~/` is expanded
    pub fn with_identity_file(mut self, path: impl AsRef<Path>) -> Self {
        self.identity_file = Some(expand_home(path.as_ref()));
        self
    }

    /// Add extra SSH arguments
    pub fn with_extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// The bare host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the host string (user@host if user is specified)
    pub fn host_string(&self) -> String {
        if let Some(user) = &self.user {
            format!("{}@{}", user, self.host)
        } else {
            self.host.clone()
        }
    }

    /// Wrap `remote` so it runs through a login shell on the target host.
    ///
    /// Produces `ssh -o BatchMode=yes [-p port] [-i key] <target> sh -lc '<remote>'`.
    pub fn wrap(&self, remote: &str) -> Command {
        let mut ssh_cmd = Command::new("ssh");
        ssh_cmd.arg("-o").arg("BatchMode=yes");

        if let Some(port) = self.port {
            ssh_cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            ssh_cmd.arg("-i").arg(identity);
        }
        for arg in &self.extra_args {
            ssh_cmd.arg(arg);
        }

        ssh_cmd
            .arg(self.host_string())
            .arg("sh")
            .arg("-lc")
            .arg(shell_quote(remote));
        ssh_cmd
    }
}

/// Runner that executes commands on a remote host over SSH
#[derive(Debug, Clone)]
pub struct SshRunner {
    config: SshConfig,
}

impl SshRunner {
    /// Create a runner for the given connection settings
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Connection settings
    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Turn ssh's own connection failures into errors; remote exit codes pass through
    fn connection_result(&self, output: CommandOutput) -> Result<CommandOutput> {
        match connection_failure(&output) {
            Some(message) => Err(Error::SshConnectionFailed {
                host: self.config.host_string(),
                message,
            }),
            None => Ok(output),
        }
    }

    fn check_identity(&self) -> Result<()> {
        match &self.config.identity_file {
            Some(identity) if !identity.exists() => Err(Error::SshKeyNotFound {
                path: identity.display().to_string(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Runner for SshRunner {
    async fn run_command(&self, command: &Command, opts: &RunOptions) -> Result<CommandOutput> {
        self.check_identity()?;

        let ssh_cmd = self.config.wrap(&remote_line(command));
        let output = execute(&ssh_cmd, opts).await?;
        self.connection_result(output)
    }

    async fn run(&self, script: &str, opts: &RunOptions) -> Result<CommandOutput> {
        self.check_identity()?;

        let output = execute(&self.config.wrap(script), opts).await?;
        self.connection_result(output)
    }

    fn describe(&self) -> String {
        format!("ssh://{}", self.config.host_string())
    }
}

/// ssh exits 255 on its own errors
const SSH_ERROR_EXIT: i32 = 255;

const CONNECTION_ERRORS: &[&str] = &[
    "ssh: connect to host",
    "Connection refused",
    "Connection timed out",
    "Connection closed by",
    "No route to host",
    "Could not resolve hostname",
    "Permission denied (",
    "Host key verification failed",
    "kex_exchange_identification",
];

/// The ssh diagnostic when a run failed before reaching the remote command
fn connection_failure(output: &CommandOutput) -> Option<String> {
    if output.status.code != Some(SSH_ERROR_EXIT) {
        return None;
    }
    output
        .stderr
        .lines()
        .find(|line| CONNECTION_ERRORS.iter().any(|marker| line.contains(marker)))
        .map(|line| line.trim().to_string())
}

/// Shell line for a command run remotely; `sh -c <script>` is unwrapped
/// because the remote side already runs through `sh -lc`.
fn remote_line(command: &Command) -> String {
    let args = command.get_args();
    if command.get_program() == "sh" && args.len() == 2 && args[0] == "-c" && command.get_envs().is_empty() {
        let script = args[1].to_string_lossy();
        return match command.get_current_dir() {
            Some(dir) => format!("cd {} && {}", shell_quote(&dir.to_string_lossy()), script),
            None => script.into_owned(),
        };
    }
    command.to_shell_string()
}

/// Expand a leading `~/` to the user's home directory
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_ssh_config() {
        let config = SshConfig::new("example.com")
            .with_user("alice")
            .with_port(2222)
            .with_identity_file("/home/alice/.ssh/id_rsa");

        assert_eq!(config.host_string(), "alice@example.com");
        assert_eq!(config.port, Some(2222));
    }

    #[test]
    fn test_from_target() {
        assert_eq!(SshConfig::from_target("root@10.0.0.5").host_string(), "root@10.0.0.5");
        assert_eq!(SshConfig::from_target("edge-1").host_string(), "edge-1");
    }

    #[test]
    fn test_wrap_builds_batch_mode_login_shell() {
        let config = SshConfig::new("10.0.0.5")
            .with_user("ops")
            .with_identity_file("/keys/id");
        let cmd = config.wrap("docker ps --format '{{.Names}}'");

        assert_eq!(cmd.get_program(), "ssh");
        assert_eq!(
            args_of(&cmd),
            vec![
                "-o",
                "BatchMode=yes",
                "-i",
                "/keys/id",
                "ops@10.0.0.5",
                "sh",
                "-lc",
                r"'docker ps --format '\''{{.Names}}'\'''",
            ]
        );
    }

    #[test]
    fn test_remote_line_unwraps_shell_scripts() {
        let script = Command::shell("systemctl is-active frameworks-bridge");
        assert_eq!(remote_line(&script), "systemctl is-active frameworks-bridge");

        let structured = Command::builder("docker").args(["compose", "up", "-d"]).build();
        assert_eq!(remote_line(&structured), "docker compose up -d");
    }

    fn exited(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            status: crate::process::ExitStatus {
                code: Some(code),
                #[cfg(unix)]
                signal: None,
            },
            stdout: String::new(),
            stderr: stderr.to_string(),
            duration: std::time::Duration::from_millis(5),
        }
    }

    #[test]
    fn test_connection_failures_become_errors() {
        let runner = SshRunner::new(SshConfig::new("127.0.0.1").with_user("ops").with_port(1));

        let refused = exited(255, "ssh: connect to host 127.0.0.1 port 1: Connection refused\n");
        let result = runner.connection_result(refused);
        assert_eq!(crate::exit_code_of(&result), -1);
        match result {
            Err(Error::SshConnectionFailed { host, message }) => {
                assert_eq!(host, "ops@127.0.0.1");
                assert!(message.contains("Connection refused"));
            }
            other => panic!("expected connection failure, got {:?}", other),
        }

        let denied = exited(255, "ops@127.0.0.1: Permission denied (publickey).\n");
        assert!(runner.connection_result(denied).is_err());
    }

    #[test]
    fn test_remote_exit_codes_pass_through() {
        let runner = SshRunner::new(SshConfig::new("10.0.0.5"));

        let remote = runner.connection_result(exited(255, "custom failure\n")).unwrap();
        assert_eq!(remote.exit_code(), 255);

        let refused_text = exited(1, "Connection refused by upstream\n");
        assert_eq!(runner.connection_result(refused_text).unwrap().exit_code(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_port_reports_minus_one() {
        if std::process::Command::new("ssh").arg("-V").output().is_err() {
            return;
        }
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let runner = SshRunner::new(
            SshConfig::new("127.0.0.1")
                .with_port(port)
                .with_extra_arg("-o")
                .with_extra_arg("StrictHostKeyChecking=no"),
        );

        let result = runner.run_command(&Command::new("true"), &RunOptions::default()).await;
        assert_eq!(crate::exit_code_of(&result), -1);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home(Path::new("/abs/key")), PathBuf::from("/abs/key"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home(Path::new("~/.ssh/id")), home.join(".ssh/id"));
        }
    }
}
