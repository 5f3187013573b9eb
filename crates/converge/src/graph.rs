//! Dependency graph builder
//!
//! An edge A → B means "A renders before B" (B depends on A). Every ordering
//! produced here is a function of the task keys only, so the same task set
//! always yields the same order.

use crate::error::{Error, Result};
use crate::task::BoxedTask;
use crate::value::TaskKey;
use std::collections::{BTreeMap, BTreeSet};

/// Acyclic dependency graph over task keys
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// key → tasks it depends on
    dependencies: BTreeMap<TaskKey, BTreeSet<TaskKey>>,
    /// key → tasks depending on it
    dependents: BTreeMap<TaskKey, BTreeSet<TaskKey>>,
    order: Vec<TaskKey>,
}

impl TaskGraph {
    /// Build the graph of a task set
    pub fn build<C>(tasks: &[BoxedTask<C>]) -> Result<Self> {
        let mut nodes = Vec::with_capacity(tasks.len());
        for task in tasks {
            let key = task.key();
            let deps = task.dependencies().map_err(|source| Error::Desired {
                key: key.clone(),
                source,
            })?;
            nodes.push((key, deps));
        }
        Self::from_edges(nodes)
    }

    /// Build the graph from `(task, dependencies)` pairs
    pub fn from_edges(nodes: impl IntoIterator<Item = (TaskKey, Vec<TaskKey>)>) -> Result<Self> {
        let mut dependencies: BTreeMap<TaskKey, BTreeSet<TaskKey>> = BTreeMap::new();
        for (key, deps) in nodes {
            if dependencies.contains_key(&key) {
                return Err(Error::DuplicateTask(key));
            }
            dependencies.insert(key, deps.into_iter().collect());
        }

        let mut dependents: BTreeMap<TaskKey, BTreeSet<TaskKey>> = dependencies
            .keys()
            .map(|k| (k.clone(), BTreeSet::new()))
            .collect();
        for (key, deps) in &dependencies {
            for dep in deps {
                let Some(entry) = dependents.get_mut(dep) else {
                    return Err(Error::UnresolvedReference {
                        from: key.clone(),
                        to: dep.clone(),
                    });
                };
                entry.insert(key.clone());
            }
        }

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(Error::Cycle(cycle));
        }

        let order = topological_order(&dependencies, &dependents);
        Ok(Self {
            dependencies,
            dependents,
            order,
        })
    }

    /// Keys in render order; ties break lexicographically
    pub fn order(&self) -> &[TaskKey] {
        &self.order
    }

    /// Tasks grouped by dependency depth
    ///
    /// Level 0 has no dependencies; every task sits one level below its
    /// deepest dependency. Each level is sorted by key.
    pub fn levels(&self) -> Vec<Vec<TaskKey>> {
        let mut depth: BTreeMap<&TaskKey, usize> = BTreeMap::new();
        let mut levels: Vec<Vec<TaskKey>> = Vec::new();

        for key in &self.order {
            let level = self
                .dependencies(key)
                .filter_map(|dep| depth.get(dep))
                .map(|d| d + 1)
                .max()
                .unwrap_or(0);
            depth.insert(key, level);
            if levels.len() <= level {
                levels.resize_with(level + 1, Vec::new);
            }
            levels[level].push(key.clone());
        }

        for level in &mut levels {
            level.sort();
        }
        levels
    }

    /// Direct dependencies of `key`
    pub fn dependencies(&self, key: &TaskKey) -> impl Iterator<Item = &TaskKey> {
        self.dependencies.get(key).into_iter().flatten()
    }

    /// Tasks directly depending on `key`
    pub fn dependents(&self, key: &TaskKey) -> impl Iterator<Item = &TaskKey> {
        self.dependents.get(key).into_iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Kahn's algorithm with a sorted ready queue
fn topological_order(
    dependencies: &BTreeMap<TaskKey, BTreeSet<TaskKey>>,
    dependents: &BTreeMap<TaskKey, BTreeSet<TaskKey>>,
) -> Vec<TaskKey> {
    let mut remaining: BTreeMap<&TaskKey, usize> =
        dependencies.iter().map(|(k, deps)| (k, deps.len())).collect();
    let mut ready: BTreeSet<&TaskKey> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(k, _)| *k)
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(key) = ready.pop_first() {
        order.push(key.clone());
        for next in dependents.get(key).into_iter().flatten() {
            if let Some(n) = remaining.get_mut(next) {
                *n -= 1;
                if *n == 0 {
                    ready.insert(next);
                }
            }
        }
    }
    order
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search in key order; returns the first cycle found
fn find_cycle(dependencies: &BTreeMap<TaskKey, BTreeSet<TaskKey>>) -> Option<Vec<TaskKey>> {
    let mut marks = BTreeMap::new();
    let mut path = Vec::new();
    dependencies
        .keys()
        .find_map(|key| visit(key, dependencies, &mut marks, &mut path))
}

fn visit<'a>(
    key: &'a TaskKey,
    dependencies: &'a BTreeMap<TaskKey, BTreeSet<TaskKey>>,
    marks: &mut BTreeMap<&'a TaskKey, Mark>,
    path: &mut Vec<&'a TaskKey>,
) -> Option<Vec<TaskKey>> {
    match marks.get(key) {
        Some(Mark::Done) => return None,
        Some(Mark::Visiting) => {
            let start = path.iter().position(|k| *k == key)?;
            let mut cycle: Vec<TaskKey> = path[start..].iter().map(|k| (*k).clone()).collect();
            cycle.push(key.clone());
            return Some(cycle);
        }
        None => {}
    }

    marks.insert(key, Mark::Visiting);
    path.push(key);
    for dep in dependencies.get(key).into_iter().flatten() {
        if let Some(cycle) = visit(dep, dependencies, marks, path) {
            return Some(cycle);
        }
    }
    path.pop();
    marks.insert(key, Mark::Done);
    None
}
