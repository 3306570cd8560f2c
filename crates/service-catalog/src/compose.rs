//! `docker compose` invocations over generated fragments

use command_executor::Command;
use std::path::Path;

use crate::fragments::{ENV_FILE, fragment_file_name};

/// What to do with the selected fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeAction {
    /// `up -d`
    Up,
    /// `down`
    Down,
    /// `ps`
    Ps,
    /// `logs`
    Logs {
        /// Stream new output
        follow: bool,
        /// Only the last N lines
        tail: Option<u32>,
        /// Restrict to these compose services
        services: Vec<String>,
    },
}

fn file_args(services: &[String]) -> Vec<String> {
    let mut args = vec!["compose".to_string()];
    for service in services {
        args.push("-f".into());
        args.push(fragment_file_name(service));
    }
    args.push("--env-file".into());
    args.push(ENV_FILE.into());
    args
}

/// Arguments to `docker` for an action over a set of fragments
pub fn compose_args(services: &[String], action: &ComposeAction) -> Vec<String> {
    let mut args = file_args(services);
    match action {
        ComposeAction::Up => args.extend(["up".into(), "-d".into()]),
        ComposeAction::Down => args.push("down".into()),
        ComposeAction::Ps => args.push("ps".into()),
        ComposeAction::Logs {
            follow,
            tail,
            services,
        } => {
            args.push("logs".into());
            if *follow {
                args.push("-f".into());
            }
            if let Some(n) = tail {
                args.push("--tail".into());
                args.push(n.to_string());
            }
            args.extend(services.iter().cloned());
        }
    }
    args
}

/// `docker compose ...` run from `dir`
pub fn compose_command(dir: impl AsRef<Path>, services: &[String], action: &ComposeAction) -> Command {
    let mut cmd = Command::new("docker");
    cmd.args(compose_args(services, action)).current_dir(dir);
    cmd
}

/// One `docker compose ... stop <svc>` per service, run from `dir`
pub fn stop_commands(dir: impl AsRef<Path>, services: &[String]) -> Vec<Command> {
    let dir = dir.as_ref();
    services
        .iter()
        .map(|service| {
            let mut cmd = Command::new("docker");
            cmd.args(file_args(std::slice::from_ref(service)))
                .arg("stop")
                .arg(service)
                .current_dir(dir);
            cmd
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn svcs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_up_down_ps() {
        let services = svcs(&["bridge", "purser"]);
        assert_eq!(
            compose_args(&services, &ComposeAction::Up).join(" "),
            "compose -f svc-bridge.yml -f svc-purser.yml --env-file .central.env up -d"
        );
        assert_eq!(
            compose_args(&services, &ComposeAction::Down).last().map(String::as_str),
            Some("down")
        );
        assert_eq!(
            compose_args(&services, &ComposeAction::Ps).last().map(String::as_str),
            Some("ps")
        );
    }

    #[test]
    fn test_logs_flags() {
        let action = ComposeAction::Logs {
            follow: true,
            tail: Some(50),
            services: svcs(&["bridge"]),
        };
        assert_eq!(
            compose_args(&svcs(&["bridge"]), &action).join(" "),
            "compose -f svc-bridge.yml --env-file .central.env logs -f --tail 50 bridge"
        );
    }

    #[test]
    fn test_command_runs_in_dir() {
        let cmd = compose_command("/srv/frameworks", &svcs(&["bridge"]), &ComposeAction::Up);
        assert_eq!(cmd.get_program(), "docker");
        assert_eq!(cmd.get_current_dir(), Some(Path::new("/srv/frameworks")));
    }

    #[test]
    fn test_stop_commands_per_service() {
        let cmds = stop_commands("/srv", &svcs(&["bridge", "purser"]));
        assert_eq!(cmds.len(), 2);
        assert_eq!(
            cmds[1].to_shell_string(),
            "cd /srv && docker compose -f svc-purser.yml --env-file .central.env stop purser"
        );
    }
}
