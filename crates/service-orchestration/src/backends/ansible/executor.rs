//! `ansible-playbook` invocation and recap parsing

use command_executor::{Command, LocalRunner, RunOptions, Runner};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::inventory::Inventory;
use super::playbook::Playbook;
use crate::{Error, Result};

/// Playbook binary
pub const ANSIBLE_PLAYBOOK: &str = "ansible-playbook";
/// Default deadline for one playbook run
pub const DEFAULT_ANSIBLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Options for one `ansible-playbook` run
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Playbook file
    pub playbook: PathBuf,
    /// Inventory file passed with `-i`
    pub inventory: Option<PathBuf>,
    /// Add `-v`
    pub verbose: bool,
    /// Dry run (`--check`)
    pub check: bool,
    /// Show file diffs (`--diff`)
    pub diff: bool,
    /// Host pattern for `--limit`
    pub limit: Option<String>,
    /// Privilege escalation target user
    pub become_user: Option<String>,
    /// Remote login user
    pub user: Option<String>,
    /// SSH key for the remote user
    pub private_key: Option<String>,
    /// Only run tasks with these tags
    pub tags: Vec<String>,
    /// Skip tasks with these tags
    pub skip_tags: Vec<String>,
    /// `--extra-vars key=value` pairs
    pub extra_vars: BTreeMap<String, String>,
}

impl ExecuteOptions {
    /// Command line arguments, playbook first
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![self.playbook.display().to_string()];
        if let Some(inventory) = &self.inventory {
            args.push("-i".into());
            args.push(inventory.display().to_string());
        }
        if self.verbose {
            args.push("-vvv".into());
        }
        if self.check {
            args.push("--check".into());
        }
        if self.diff {
            args.push("--diff".into());
        }
        let flags = [
            ("--limit", &self.limit),
            ("--become-user", &self.become_user),
            ("--user", &self.user),
            ("--private-key", &self.private_key),
        ];
        for (flag, value) in flags {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                args.push(flag.into());
                args.push(value.into());
            }
        }
        if !self.tags.is_empty() {
            args.push("--tags".into());
            args.push(self.tags.join(","));
        }
        if !self.skip_tags.is_empty() {
            args.push("--skip-tags".into());
            args.push(self.skip_tags.join(","));
        }
        for (k, v) in &self.extra_vars {
            args.push("-e".into());
            args.push(format!("{}={}", k, v));
        }
        args
    }
}

/// Counters summed over every host line of `PLAY RECAP`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybookRunStats {
    /// Tasks that ran without change
    pub ok: u32,
    /// Tasks that changed the host
    pub changed: u32,
    /// Hosts that could not be reached
    pub unreachable: u32,
    /// Failed tasks
    pub failures: u32,
    /// Skipped tasks
    pub skipped: u32,
}

impl PlaybookRunStats {
    /// No failed and no unreachable hosts
    pub fn succeeded(&self) -> bool {
        self.failures == 0 && self.unreachable == 0
    }
}

/// Outcome of a playbook run
#[derive(Debug, Clone)]
pub struct ExecuteResult {
    /// Recap verdict, or the exit code when there is no recap
    pub success: bool,
    /// `None` when the output carried no recap
    pub stats: Option<PlaybookRunStats>,
    /// Process exit code, -1 when killed by a signal
    pub exit_code: i32,
    /// Combined stdout and stderr
    pub output: String,
}

/// Parse the `PLAY RECAP` section of playbook output
pub fn parse_recap(output: &str) -> Option<PlaybookRunStats> {
    let counter = Regex::new(r"\b(ok|changed|unreachable|failed|skipped)=(\d+)").ok()?;
    let mut lines = output.lines().skip_while(|l| !l.contains("PLAY RECAP"));
    lines.next()?;

    let mut stats = PlaybookRunStats::default();
    for line in lines {
        for caps in counter.captures_iter(line) {
            let value: u32 = caps[2].parse().unwrap_or(0);
            match &caps[1] {
                "ok" => stats.ok += value,
                "changed" => stats.changed += value,
                "unreachable" => stats.unreachable += value,
                "failed" => stats.failures += value,
                "skipped" => stats.skipped += value,
                _ => {}
            }
        }
    }
    Some(stats)
}

/// Version from the first line of `ansible-playbook --version`
pub fn parse_version(output: &str) -> Option<String> {
    let first = output.lines().next()?;
    let core = Regex::new(r"ansible-playbook \[core ([\d.]+)\]").ok()?;
    if let Some(caps) = core.captures(first) {
        return Some(caps[1].to_string());
    }
    let legacy = Regex::new(r"ansible-playbook ([\d.]+)").ok()?;
    legacy.captures(first).map(|caps| caps[1].to_string())
}

/// Runs playbooks on the control machine
pub struct AnsibleExecutor {
    runner: Arc<dyn Runner>,
    timeout: Duration,
}

impl Default for AnsibleExecutor {
    fn default() -> Self {
        Self {
            runner: Arc::new(LocalRunner::new()),
            timeout: DEFAULT_ANSIBLE_TIMEOUT,
        }
    }
}

impl AnsibleExecutor {
    /// Executor running `ansible-playbook` locally with the default timeout
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `ansible-playbook` through another runner
    pub fn with_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.runner = runner;
        self
    }

    /// Override the per-run deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Per-run deadline
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a playbook that already exists on disk
    pub async fn execute(&self, opts: &ExecuteOptions, run: &RunOptions) -> Result<ExecuteResult> {
        let command = Command::builder(ANSIBLE_PLAYBOOK)
            .args(opts.build_args())
            .build();
        debug!("Running {}", command.to_shell_string());

        let output = match self.runner.run_command(&command, run).await {
            Ok(output) => output,
            Err(e) if e.is_spawn_failure() => {
                return Err(Error::backend(format!(
                    "{} not found in PATH - please install Ansible",
                    ANSIBLE_PLAYBOOK
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let combined = output.combined();
        let stats = parse_recap(&combined);
        let success = match &stats {
            Some(stats) => stats.succeeded(),
            None => output.success(),
        };
        if stats.is_some() && success != output.success() {
            warn!(
                "ansible-playbook exit code {} disagrees with recap, using recap",
                output.exit_code()
            );
        }

        Ok(ExecuteResult {
            success,
            stats,
            exit_code: output.exit_code(),
            output: combined,
        })
    }

    /// Write playbook and inventory to a temporary directory and run them
    pub async fn execute_playbook(
        &self,
        playbook: &Playbook,
        inventory: &Inventory,
        mut opts: ExecuteOptions,
        run: &RunOptions,
    ) -> Result<ExecuteResult> {
        let dir = tempfile::Builder::new()
            .prefix("frameworks-ansible-")
            .tempdir()?;

        let playbook_path = dir.path().join("playbook.yml");
        tokio::fs::write(&playbook_path, playbook.to_yaml()?).await?;
        let inventory_path = dir.path().join("inventory.ini");
        tokio::fs::write(&inventory_path, inventory.to_ini()).await?;

        info!("{}", playbook.summary());
        opts.playbook = playbook_path;
        opts.inventory = Some(inventory_path);
        self.execute(&opts, run).await
    }

    /// Installed Ansible version
    pub async fn ansible_version(&self) -> Result<String> {
        let command = Command::builder(ANSIBLE_PLAYBOOK).arg("--version").build();
        let output = self
            .runner
            .run_command(&command, &RunOptions::with_timeout(Duration::from_secs(30)))
            .await?;
        parse_version(&output.stdout)
            .ok_or_else(|| Error::backend("could not parse ansible version from output"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECAP: &str = "\
PLAY [Install and configure Kafka] *********************************************

TASK [sleighzy.kafka : Install] ************************************************
changed: [db]

PLAY RECAP *********************************************************************
db                         : ok=12   changed=3    unreachable=0    failed=0    skipped=2    rescued=0    ignored=0
web                        : ok=4    changed=0    unreachable=1    failed=1    skipped=0    rescued=0    ignored=0
";

    #[test]
    fn test_parse_recap_sums_hosts() {
        let stats = parse_recap(RECAP).unwrap();
        assert_eq!(
            stats,
            PlaybookRunStats {
                ok: 16,
                changed: 3,
                unreachable: 1,
                failures: 1,
                skipped: 2,
            }
        );
        assert!(!stats.succeeded());
        assert!(parse_recap("fatal: could not connect").is_none());
    }

    #[test]
    fn test_build_args_order() {
        let opts = ExecuteOptions {
            playbook: "/tmp/p.yml".into(),
            inventory: Some("/tmp/i.ini".into()),
            verbose: true,
            check: true,
            diff: true,
            limit: Some("db".into()),
            become_user: Some("postgres".into()),
            user: Some("root".into()),
            private_key: Some("/keys/id".into()),
            tags: vec!["a".into(), "b".into()],
            skip_tags: vec!["c".into()],
            extra_vars: [("x".to_string(), "1".to_string())].into(),
        };
        assert_eq!(
            opts.build_args().join(" "),
            "/tmp/p.yml -i /tmp/i.ini -vvv --check --diff --limit db --become-user postgres \
             --user root --private-key /keys/id --tags a,b --skip-tags c -e x=1"
        );

        let bare = ExecuteOptions {
            playbook: "p.yml".into(),
            limit: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(bare.build_args(), vec!["p.yml"]);
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("ansible-playbook [core 2.16.3]\n  config file = None").as_deref(),
            Some("2.16.3")
        );
        assert_eq!(parse_version("ansible-playbook 2.9.27").as_deref(), Some("2.9.27"));
        assert_eq!(parse_version("something else"), None);
    }
}
