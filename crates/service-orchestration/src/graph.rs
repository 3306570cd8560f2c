//! Dependency graph and batch layering

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

use crate::task::Task;
use crate::{Error, Result};

/// Directed acyclic graph of tasks keyed by name
#[derive(Debug, Default, Clone)]
pub struct DependencyGraph {
    tasks: BTreeMap<String, Task>,
}

impl DependencyGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; names must be unique
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(&task.name) {
            return Err(Error::planning(format!("duplicate task name: {}", task.name)));
        }
        self.tasks.insert(task.name.clone(), task);
        Ok(())
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the graph has no tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Look up a task
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.get(name)
    }

    /// Whether a task exists
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    /// Keep only tasks matching `keep` and drop edges to removed tasks
    pub fn retain(&mut self, mut keep: impl FnMut(&Task) -> bool) {
        self.tasks.retain(|_, task| keep(task));
        let names: HashSet<String> = self.tasks.keys().cloned().collect();
        for task in self.tasks.values_mut() {
            task.depends_on.retain(|dep| names.contains(dep));
        }
    }

    fn deps_of(&self, name: &str) -> BTreeSet<&str> {
        self.tasks
            .get(name)
            .map(|t| t.depends_on.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check that every dependency names a task in the graph
    pub fn validate(&self) -> Result<()> {
        for (name, task) in &self.tasks {
            if let Some(missing) = task.depends_on.iter().find(|d| !self.tasks.contains_key(*d)) {
                return Err(Error::planning(format!(
                    "task {} depends on missing task {}",
                    name, missing
                )));
            }
        }
        Ok(())
    }

    /// Layer the graph into batches.
    ///
    /// Every task lands in the first batch after all of its dependencies.
    /// Tasks within a batch are sorted by name.
    pub fn batches(&self) -> Result<Vec<Vec<Task>>> {
        self.validate()?;

        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for name in self.tasks.keys() {
            let deps = self.deps_of(name);
            in_degree.insert(name, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(name);
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut batches = Vec::new();
        let mut placed = 0;

        while !ready.is_empty() {
            let mut next = Vec::new();
            for name in &ready {
                for dependent in dependents.get(name).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
            next.sort_unstable();

            placed += ready.len();
            debug!("Batch {}: {}", batches.len() + 1, ready.join(", "));
            batches.push(ready.iter().map(|n| self.tasks[*n].clone()).collect());
            ready = next;
        }

        if placed < self.tasks.len() {
            let remaining: BTreeSet<&str> = in_degree
                .iter()
                .filter(|(_, d)| **d > 0)
                .map(|(n, _)| *n)
                .collect();
            let cycle = self.find_cycle(&remaining);
            return Err(Error::planning(format!(
                "circular dependency detected: {}",
                cycle.join(" -> ")
            )));
        }

        Ok(batches)
    }

    fn find_cycle<'a>(&'a self, remaining: &BTreeSet<&'a str>) -> Vec<&'a str> {
        fn visit<'a>(
            graph: &'a DependencyGraph,
            name: &'a str,
            remaining: &BTreeSet<&'a str>,
            visited: &mut HashSet<&'a str>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<&'a str>> {
            if let Some(start) = path.iter().position(|n| *n == name) {
                let mut cycle = path[start..].to_vec();
                cycle.push(name);
                return Some(cycle);
            }
            if !visited.insert(name) {
                return None;
            }
            path.push(name);
            for dep in graph.deps_of(name) {
                if !remaining.contains(dep) {
                    continue;
                }
                if let Some(cycle) = visit(graph, dep, remaining, visited, path) {
                    return Some(cycle);
                }
            }
            path.pop();
            None
        }

        let mut visited = HashSet::new();
        for name in remaining {
            let mut path = Vec::new();
            if let Some(cycle) = visit(self, *name, remaining, &mut visited, &mut path) {
                return cycle;
            }
        }
        remaining.iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Phase;

    fn task(name: &str, deps: &[&str]) -> Task {
        Task::new(name, "x", "h", Phase::Applications).depends_on(deps.iter().copied())
    }

    fn names(batches: &[Vec<Task>]) -> Vec<Vec<&str>> {
        batches
            .iter()
            .map(|b| b.iter().map(|t| t.name.as_str()).collect())
            .collect()
    }

    #[test]
    fn test_layering_is_deterministic() {
        let mut graph = DependencyGraph::new();
        for t in [
            task("zeta", &[]),
            task("app", &["db", "cache"]),
            task("db", &[]),
            task("cache", &[]),
            task("web", &["app"]),
            task("worker", &["db", "db"]),
        ] {
            graph.add_task(t).unwrap();
        }

        let batches = graph.batches().unwrap();
        assert_eq!(
            names(&batches),
            vec![
                vec!["cache", "db", "zeta"],
                vec!["app", "worker"],
                vec!["web"]
            ]
        );
        assert_eq!(names(&graph.batches().unwrap()), names(&batches));
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let mut graph = DependencyGraph::new();
        graph.add_task(task("a", &["b"])).unwrap();
        graph.add_task(task("b", &["a"])).unwrap();
        graph.add_task(task("c", &[])).unwrap();

        let err = graph.batches().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Planning error: circular dependency detected: a -> b -> a"
        );
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_task(task("a", &["a"])).unwrap();
        let err = graph.batches().unwrap_err();
        assert!(err.to_string().ends_with("circular dependency detected: a -> a"));
    }

    #[test]
    fn test_missing_dependency() {
        let mut graph = DependencyGraph::new();
        graph.add_task(task("api", &["ghost"])).unwrap();
        let err = graph.batches().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Planning error: task api depends on missing task ghost"
        );
    }

    #[test]
    fn test_retain_drops_dangling_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_task(task("db", &[])).unwrap();
        graph.add_task(task("api", &["db"])).unwrap();
        graph.retain(|t| t.name != "db");

        assert_eq!(graph.len(), 1);
        assert!(graph.get("api").unwrap().depends_on.is_empty());
        assert_eq!(names(&graph.batches().unwrap()), vec![vec!["api"]]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_task(task("a", &[])).unwrap();
        assert!(graph.add_task(task("a", &[])).is_err());
    }
}
