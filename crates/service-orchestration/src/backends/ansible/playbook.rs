//! Playbook model and YAML rendering

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use std::fmt;

use crate::Result;

/// Variables attached to a play or role
pub type Vars = IndexMap<String, Value>;

/// A playbook: a named list of plays
#[derive(Debug, Clone, Default)]
pub struct Playbook {
    /// Display name
    pub name: String,
    /// Host pattern the playbook targets
    pub hosts: String,
    /// Plays in execution order
    pub plays: Vec<Play>,
}

/// One play of a playbook
#[derive(Debug, Clone, Default)]
pub struct Play {
    pub name: String,
    pub hosts: String,
    pub r#become: bool,
    pub become_user: Option<String>,
    pub gather_facts: bool,
    pub vars: Vars,
    pub pre_tasks: Vec<AnsibleTask>,
    pub roles: Vec<Role>,
    pub tasks: Vec<AnsibleTask>,
    pub post_tasks: Vec<AnsibleTask>,
    pub handlers: Vec<Handler>,
}

/// A module invocation inside a play
#[derive(Debug, Clone, Default)]
pub struct AnsibleTask {
    pub name: String,
    /// Module name, e.g. `apt` or `ansible.builtin.service`
    pub module: String,
    pub args: Value,
    pub when: Option<String>,
    pub register: Option<String>,
    pub notify: Vec<String>,
    pub tags: Vec<String>,
    pub ignore_errors: bool,
}

/// A role applied by a play
#[derive(Debug, Clone, Default)]
pub struct Role {
    pub name: String,
    pub vars: Vars,
}

/// A handler triggered through `notify`
#[derive(Debug, Clone, Default)]
pub struct Handler {
    pub name: String,
    pub module: String,
    pub args: Value,
}

impl Role {
    /// Role without variables
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vars: Vars::new(),
        }
    }

    /// Set a role variable
    pub fn var(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }
}

impl AnsibleTask {
    /// Task calling `module` with `args`
    pub fn new(name: impl Into<String>, module: impl Into<String>, args: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            args: args.into(),
            ..Default::default()
        }
    }
}

fn key(k: &str) -> Value {
    Value::String(k.to_string())
}

fn vars_value(vars: &Vars) -> Value {
    let mut map = Mapping::new();
    for (k, v) in vars {
        map.insert(key(k), v.clone());
    }
    Value::Mapping(map)
}

fn strings(items: &[String]) -> Value {
    Value::Sequence(items.iter().cloned().map(Value::String).collect())
}

fn task_value(task: &AnsibleTask) -> Value {
    let mut map = Mapping::new();
    map.insert(key("name"), key(&task.name));
    if !task.module.is_empty() {
        map.insert(key(&task.module), task.args.clone());
    }
    if let Some(when) = &task.when {
        map.insert(key("when"), key(when));
    }
    if let Some(register) = &task.register {
        map.insert(key("register"), key(register));
    }
    if !task.notify.is_empty() {
        map.insert(key("notify"), strings(&task.notify));
    }
    if !task.tags.is_empty() {
        map.insert(key("tags"), strings(&task.tags));
    }
    if task.ignore_errors {
        map.insert(key("ignore_errors"), Value::Bool(true));
    }
    Value::Mapping(map)
}

fn tasks_value(tasks: &[AnsibleTask]) -> Value {
    Value::Sequence(tasks.iter().map(task_value).collect())
}

fn role_value(role: &Role) -> Value {
    if role.vars.is_empty() {
        return key(&role.name);
    }
    let mut map = Mapping::new();
    map.insert(key("role"), key(&role.name));
    map.insert(key("vars"), vars_value(&role.vars));
    Value::Mapping(map)
}

fn handler_value(handler: &Handler) -> Value {
    let mut map = Mapping::new();
    map.insert(key("name"), key(&handler.name));
    map.insert(key(&handler.module), handler.args.clone());
    Value::Mapping(map)
}

impl Play {
    fn to_value(&self) -> Value {
        let mut map = Mapping::new();
        map.insert(key("name"), key(&self.name));
        map.insert(key("hosts"), key(&self.hosts));
        match &self.become_user {
            Some(user) => {
                map.insert(key("become"), Value::Bool(self.r#become));
                map.insert(key("become_user"), key(user));
            }
            None if self.r#become => {
                map.insert(key("become"), Value::Bool(true));
            }
            None => {}
        }
        map.insert(key("gather_facts"), Value::Bool(self.gather_facts));
        if !self.vars.is_empty() {
            map.insert(key("vars"), vars_value(&self.vars));
        }
        if !self.pre_tasks.is_empty() {
            map.insert(key("pre_tasks"), tasks_value(&self.pre_tasks));
        }
        if !self.roles.is_empty() {
            map.insert(
                key("roles"),
                Value::Sequence(self.roles.iter().map(role_value).collect()),
            );
        }
        if !self.tasks.is_empty() {
            map.insert(key("tasks"), tasks_value(&self.tasks));
        }
        if !self.post_tasks.is_empty() {
            map.insert(key("post_tasks"), tasks_value(&self.post_tasks));
        }
        if !self.handlers.is_empty() {
            map.insert(
                key("handlers"),
                Value::Sequence(self.handlers.iter().map(handler_value).collect()),
            );
        }
        Value::Mapping(map)
    }
}

impl Playbook {
    /// Empty playbook targeting `hosts`
    pub fn new(name: impl Into<String>, hosts: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hosts: hosts.into(),
            plays: Vec::new(),
        }
    }

    /// Append a play
    pub fn add_play(&mut self, play: Play) {
        self.plays.push(play);
    }

    /// Render as an `ansible-playbook` document
    pub fn to_yaml(&self) -> Result<String> {
        let plays = Value::Sequence(self.plays.iter().map(Play::to_value).collect());
        Ok(serde_yaml::to_string(&plays)?)
    }

    /// One-line description
    pub fn summary(&self) -> String {
        format!(
            "Playbook: {}, Hosts: {}, Plays: {}",
            self.name,
            self.hosts,
            self.plays.len()
        )
    }
}

impl fmt::Display for Playbook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_yaml() {
            Ok(yaml) => f.write_str(&yaml),
            Err(e) => write!(f, "Error generating YAML: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Playbook {
        let mut playbook = Playbook::new("Provision cache", "db");
        let mut restart = AnsibleTask::new(
            "Install redis",
            "apt",
            serde_yaml::from_str::<Value>("{name: redis-server, state: present}").unwrap(),
        );
        restart.notify = vec!["restart redis".into()];
        restart.tags = vec!["redis".into()];
        restart.ignore_errors = true;

        playbook.add_play(Play {
            name: "Cache".into(),
            hosts: "db".into(),
            r#become: true,
            gather_facts: true,
            roles: vec![Role::new("common"), Role::new("tuned").var("profile", "throughput")],
            tasks: vec![restart],
            handlers: vec![Handler {
                name: "restart redis".into(),
                module: "service".into(),
                args: serde_yaml::from_str("{name: redis-server, state: restarted}").unwrap(),
            }],
            ..Default::default()
        });
        playbook
    }

    #[test]
    fn test_play_key_order() {
        let doc: Value = serde_yaml::from_str(&sample().to_yaml().unwrap()).unwrap();
        let keys: Vec<&str> = doc[0]
            .as_mapping()
            .unwrap()
            .keys()
            .map(|k| k.as_str().unwrap())
            .collect();
        assert_eq!(
            keys,
            vec!["name", "hosts", "become", "gather_facts", "roles", "tasks", "handlers"]
        );
    }

    #[test]
    fn test_roles_and_tasks_shape() {
        let doc: Value = serde_yaml::from_str(&sample().to_yaml().unwrap()).unwrap();
        let play = &doc[0];
        assert_eq!(play["become"], Value::Bool(true));
        assert!(play.get("become_user").is_none());
        assert_eq!(play["roles"][0], "common");
        assert_eq!(play["roles"][1]["role"], "tuned");
        assert_eq!(play["roles"][1]["vars"]["profile"], "throughput");

        let task = &play["tasks"][0];
        assert_eq!(task["apt"]["name"], "redis-server");
        assert_eq!(task["notify"][0], "restart redis");
        assert_eq!(task["ignore_errors"], Value::Bool(true));
        assert!(task.get("when").is_none());
        assert_eq!(play["handlers"][0]["service"]["state"], "restarted");
    }

    #[test]
    fn test_become_user_keeps_flag() {
        let mut playbook = Playbook::new("x", "all");
        playbook.add_play(Play {
            name: "as postgres".into(),
            hosts: "all".into(),
            r#become: false,
            become_user: Some("postgres".into()),
            ..Default::default()
        });
        let doc: Value = serde_yaml::from_str(&playbook.to_yaml().unwrap()).unwrap();
        assert_eq!(doc[0]["become"], Value::Bool(false));
        assert_eq!(doc[0]["become_user"], "postgres");
        assert_eq!(doc[0]["gather_facts"], Value::Bool(false));
    }

    #[test]
    fn test_summary() {
        assert_eq!(sample().summary(), "Playbook: Provision cache, Hosts: db, Plays: 1");
    }
}
