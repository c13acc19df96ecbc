//! Dependency graph built from validated tasks
//!
//! Nodes are task names, edges run dependency → dependent. Construction
//! verifies referential integrity; cycle detection is a three-color DFS
//! that reports the full cycle path; ordering is a stable Kahn variant
//! that breaks ties by declaration order, so output is deterministic.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::CompileError;
use crate::spec::TaskSpec;

/// White/gray/black marking for the cycle DFS
#[derive(Clone, Copy, PartialEq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

#[derive(Debug)]
pub struct DependencyGraph {
    /// Task names in declaration order
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// node -> its dependencies (upstream)
    deps: Vec<Vec<usize>>,
    /// node -> its dependents (downstream)
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build from validated tasks, failing on any dependency that names a
    /// task not declared in the workflow.
    pub fn build(tasks: &[TaskSpec]) -> Result<Self, CompileError> {
        let names: Vec<String> = tasks.iter().map(|t| t.name.clone()).collect();
        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        let mut deps = vec![Vec::new(); names.len()];
        let mut dependents = vec![Vec::new(); names.len()];

        for (i, task) in tasks.iter().enumerate() {
            for dep in &task.depends_on {
                let Some(&j) = index.get(dep.as_str()) else {
                    return Err(CompileError::UnknownDependency {
                        task: task.name.clone(),
                        dependency: dep.clone(),
                    });
                };
                deps[i].push(j);
                dependents[j].push(i);
            }
        }

        Ok(Self {
            names,
            index,
            deps,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Whether any task declares a dependency
    pub fn has_edges(&self) -> bool {
        self.deps.iter().any(|d| !d.is_empty())
    }

    /// Names of the tasks `name` depends on, in declaration order
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.index
            .get(name)
            .map(|&i| self.deps[i].iter().map(|&j| self.names[j].as_str()).collect())
            .unwrap_or_default()
    }

    /// Detect a cycle, returning its ordered path starting and ending at
    /// the repeated task. Traversal follows dependency edges.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut colors = vec![Color::Unvisited; self.names.len()];
        let mut path: Vec<usize> = Vec::new();

        for start in 0..self.names.len() {
            if colors[start] == Color::Unvisited {
                if let Some(cycle) = self.dfs(start, &mut colors, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        node: usize,
        colors: &mut Vec<Color>,
        path: &mut Vec<usize>,
    ) -> Option<Vec<String>> {
        match colors[node] {
            Color::InProgress => {
                // Back edge closes the cycle: everything on the path from
                // the repeated node onward, plus the repeat itself
                let start = path.iter().position(|&n| n == node).unwrap_or(0);
                let mut cycle: Vec<String> =
                    path[start..].iter().map(|&n| self.names[n].clone()).collect();
                cycle.push(self.names[node].clone());
                return Some(cycle);
            }
            Color::Done => return None,
            Color::Unvisited => {}
        }

        colors[node] = Color::InProgress;
        path.push(node);

        for i in 0..self.deps[node].len() {
            let dep = self.deps[node][i];
            if let Some(cycle) = self.dfs(dep, colors, path) {
                return Some(cycle);
            }
        }

        path.pop();
        colors[node] = Color::Done;
        None
    }

    /// Stable Kahn's algorithm: among simultaneously eligible tasks the one
    /// declared first wins, so the order is independent of traversal
    /// incidentals. Every task's dependencies appear strictly before it.
    pub fn topological_order(&self) -> Result<Vec<String>, CompileError> {
        Ok(self
            .topological_indices()?
            .into_iter()
            .map(|i| self.names[i].clone())
            .collect())
    }

    fn topological_indices(&self) -> Result<Vec<usize>, CompileError> {
        let mut in_degree: Vec<usize> = self.deps.iter().map(|d| d.len()).collect();
        let mut ready: BTreeSet<usize> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, &d)| d == 0)
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.names.len());
        while let Some(&node) = ready.iter().next() {
            ready.remove(&node);
            order.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.insert(dependent);
                }
            }
        }

        if order.len() < self.names.len() {
            // Leftover nodes sit on a cycle; the DFS names it
            let path = self
                .detect_cycle()
                .unwrap_or_default();
            return Err(CompileError::Cycle { path });
        }
        Ok(order)
    }

    /// Execution level per task: 0 for tasks with no dependencies, else
    /// 1 + max level of its dependencies. Longest path via topological
    /// order plus dynamic relaxation.
    pub fn task_levels(&self) -> Result<BTreeMap<String, usize>, CompileError> {
        let order = self.topological_indices()?;
        let mut level = vec![0usize; self.names.len()];
        for &node in &order {
            for &dep in &self.deps[node] {
                level[node] = level[node].max(level[dep] + 1);
            }
        }
        Ok(self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), level[i]))
            .collect())
    }

    /// Length in edges of the longest dependency chain
    pub fn max_depth(&self) -> Result<usize, CompileError> {
        Ok(self.task_levels()?.values().copied().max().unwrap_or(0))
    }

    /// Tasks grouped by level; tasks within one group have no ordering
    /// constraint between them. Groups come out in execution order, tasks
    /// within a group in declaration order.
    pub fn parallel_groups(&self) -> Result<Vec<Vec<String>>, CompileError> {
        let order = self.topological_indices()?;
        let mut level = vec![0usize; self.names.len()];
        for &node in &order {
            for &dep in &self.deps[node] {
                level[node] = level[node].max(level[dep] + 1);
            }
        }

        let mut groups: BTreeMap<usize, Vec<String>> = BTreeMap::new();
        for (i, name) in self.names.iter().enumerate() {
            groups.entry(level[i]).or_default().push(name.clone());
        }
        Ok(groups.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::TaskOverrides;

    fn task(name: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            name: name.to_string(),
            operator: "DummyOperator".to_string(),
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            params: Default::default(),
            overrides: TaskOverrides::default(),
        }
    }

    #[test]
    fn unknown_dependency_names_both_tasks() {
        let err = DependencyGraph::build(&[task("a", &[]), task("b", &["ghost"])]).unwrap_err();
        match err {
            CompileError::UnknownDependency { task, dependency } => {
                assert_eq!(task, "b");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn acyclic_graph_has_no_cycle() {
        let g = DependencyGraph::build(&[
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a", "b"]),
        ])
        .unwrap();
        assert!(g.detect_cycle().is_none());
    }

    #[test]
    fn cycle_path_starts_and_ends_at_repeated_task() {
        let g = DependencyGraph::build(&[
            task("a", &["c"]),
            task("b", &["a"]),
            task("c", &["b"]),
        ])
        .unwrap();
        let cycle = g.detect_cycle().expect("cycle expected");
        assert_eq!(cycle.first(), cycle.last());
        // each task appears exactly once plus the closing repeat
        assert_eq!(cycle.len(), 4);
        for name in ["a", "b", "c"] {
            assert_eq!(cycle.iter().filter(|n| n.as_str() == name).count(), if cycle[0] == name { 2 } else { 1 });
        }
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let g = DependencyGraph::build(&[task("a", &["a"])]).unwrap();
        assert_eq!(g.detect_cycle().unwrap(), vec!["a", "a"]);
    }

    #[test]
    fn topological_order_respects_edges() {
        let g = DependencyGraph::build(&[
            task("load", &["transform"]),
            task("extract", &[]),
            task("transform", &["extract"]),
        ])
        .unwrap();
        let order = g.topological_order().unwrap();
        assert_eq!(order, vec!["extract", "transform", "load"]);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        // b and c both become eligible after a; declaration order wins
        let g = DependencyGraph::build(&[
            task("a", &[]),
            task("c", &["a"]),
            task("b", &["a"]),
            task("d", &["b", "c"]),
        ])
        .unwrap();
        assert_eq!(g.topological_order().unwrap(), vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn topological_order_on_cycle_reports_path() {
        let g = DependencyGraph::build(&[task("x", &["y"]), task("y", &["x"])]).unwrap();
        let err = g.topological_order().unwrap_err();
        let path = err.cycle_path().expect("cycle error");
        assert_eq!(path.first(), path.last());
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn linear_chain_depth_counts_edges() {
        let g = DependencyGraph::build(&[
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["b"]),
            task("d", &["c"]),
        ])
        .unwrap();
        assert_eq!(g.max_depth().unwrap(), 3);
    }

    #[test]
    fn diamond_depth_and_groups() {
        let g = DependencyGraph::build(&[
            task("a", &[]),
            task("b", &["a"]),
            task("c", &["a"]),
            task("d", &["b", "c"]),
        ])
        .unwrap();
        assert_eq!(g.max_depth().unwrap(), 2);

        let groups = g.parallel_groups().unwrap();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0], vec!["a"]);
        assert_eq!(groups[1], vec!["b", "c"]);
        assert_eq!(groups[2], vec!["d"]);

        let levels = g.task_levels().unwrap();
        assert_eq!(levels["a"], 0);
        assert_eq!(levels["b"], 1);
        assert_eq!(levels["d"], 2);
    }

    #[test]
    fn empty_dependency_sets_have_depth_zero() {
        let g = DependencyGraph::build(&[task("a", &[]), task("b", &[])]).unwrap();
        assert_eq!(g.max_depth().unwrap(), 0);
        assert!(!g.has_edges());
        assert!(g.contains("a"));
        assert_eq!(g.dependencies_of("a"), Vec::<&str>::new());
    }
}
