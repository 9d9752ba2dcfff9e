//! Dependency graph engine.
//!
//! Builds a directed graph over a team's task set (edge task -> dependency),
//! validates acyclicity before every mutation, and derives the views the
//! agents consume: topological order, transitive blocked-by/blocking
//! closures, the actionable-now set, and the effort-weighted critical path.
//!
//! Full recomputation is O(V+E) and happens once per agent cycle, not on
//! every task mutation.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

use uuid::Uuid;

use crate::domain::error::{DomainError, DomainResult};
use crate::domain::models::{Task, TaskStatus};

#[derive(Debug, Clone, Copy)]
struct Node {
    status: TaskStatus,
    effort: f64,
}

/// Directed dependency graph over one team's tasks.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<Uuid, Node>,
    /// task -> tasks it depends on
    deps: BTreeMap<Uuid, BTreeSet<Uuid>>,
    /// task -> tasks that depend on it (derived inverse)
    dependents: BTreeMap<Uuid, BTreeSet<Uuid>>,
}

impl DependencyGraph {
    /// Build a graph from a task set.
    ///
    /// Fails with `ValidationFailed` on a negative or non-finite effort,
    /// with `UnknownDependency` if an edge points outside the set, and
    /// with `CycleDetected` if the fetched edges already contain a cycle.
    pub fn build(tasks: &[Task]) -> DomainResult<Self> {
        let mut graph = Self::default();

        for task in tasks {
            // Critical-path weights require well-formed effort values.
            if !task.effort.is_finite() || task.effort < 0.0 {
                return Err(DomainError::ValidationFailed(format!(
                    "task {} has invalid effort {}",
                    task.id, task.effort
                )));
            }
            graph.nodes.insert(
                task.id,
                Node {
                    status: task.status,
                    effort: task.effort,
                },
            );
            graph.deps.entry(task.id).or_default();
            graph.dependents.entry(task.id).or_default();
        }

        for task in tasks {
            for &dep in &task.depends_on {
                if !graph.nodes.contains_key(&dep) {
                    return Err(DomainError::UnknownDependency {
                        task: task.id,
                        dependency: dep,
                    });
                }
                if let Some(deps) = graph.deps.get_mut(&task.id) {
                    deps.insert(dep);
                }
                if let Some(dependents) = graph.dependents.get_mut(&dep) {
                    dependents.insert(task.id);
                }
            }
        }

        if let Some((from, to)) = graph.find_cycle_edge() {
            return Err(DomainError::CycleDetected { from, to });
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Direct dependencies of a task.
    pub fn dependencies_of(&self, id: Uuid) -> Option<&BTreeSet<Uuid>> {
        self.deps.get(&id)
    }

    /// Add the edge `from` depends on `to`, validating acyclicity first.
    ///
    /// On `CycleDetected` the graph is byte-identical to its pre-call state:
    /// the check runs before any mutation.
    pub fn add_dependency(&mut self, from: Uuid, to: Uuid) -> DomainResult<()> {
        if !self.nodes.contains_key(&from) {
            return Err(DomainError::TaskNotFound(from));
        }
        if !self.nodes.contains_key(&to) {
            return Err(DomainError::UnknownDependency {
                task: from,
                dependency: to,
            });
        }
        if from == to || self.reaches(to, from) {
            return Err(DomainError::CycleDetected { from, to });
        }

        self.deps.entry(from).or_default().insert(to);
        self.dependents.entry(to).or_default().insert(from);
        Ok(())
    }

    /// Whether `start` can reach `target` by following dependency edges.
    fn reaches(&self, start: Uuid, target: Uuid) -> bool {
        let mut stack = vec![start];
        let mut seen: HashSet<Uuid> = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == target {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(deps) = self.deps.get(&node) {
                stack.extend(deps.iter().copied());
            }
        }
        false
    }

    /// Locate one back edge of a cycle via iterative DFS with a recursion
    /// stack, or None if the graph is acyclic.
    fn find_cycle_edge(&self) -> Option<(Uuid, Uuid)> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut on_stack: HashSet<Uuid> = HashSet::new();

        for &root in self.nodes.keys() {
            if visited.contains(&root) {
                continue;
            }
            // (node, iterator position into its deps)
            let mut stack: Vec<(Uuid, Vec<Uuid>, usize)> = vec![(
                root,
                self.deps.get(&root).map(|d| d.iter().copied().collect()).unwrap_or_default(),
                0,
            )];
            visited.insert(root);
            on_stack.insert(root);

            while let Some((node, deps, idx)) = stack.last_mut() {
                if *idx < deps.len() {
                    let next = deps[*idx];
                    *idx += 1;
                    if on_stack.contains(&next) {
                        return Some((*node, next));
                    }
                    if visited.insert(next) {
                        on_stack.insert(next);
                        let next_deps = self
                            .deps
                            .get(&next)
                            .map(|d| d.iter().copied().collect())
                            .unwrap_or_default();
                        stack.push((next, next_deps, 0));
                    }
                } else {
                    on_stack.remove(node);
                    stack.pop();
                }
            }
        }
        None
    }

    /// Topological order: dependencies before dependents, ties broken
    /// toward the lower task id. Kahn's algorithm with a min-heap.
    pub fn topo_order(&self) -> Vec<Uuid> {
        let mut in_degree: HashMap<Uuid, usize> = self
            .nodes
            .keys()
            .map(|&id| (id, self.deps.get(&id).map_or(0, BTreeSet::len)))
            .collect();

        let mut ready: BinaryHeap<Reverse<Uuid>> = in_degree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            if let Some(dependents) = self.dependents.get(&id) {
                for &dependent in dependents {
                    if let Some(deg) = in_degree.get_mut(&dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            ready.push(Reverse(dependent));
                        }
                    }
                }
            }
        }

        debug_assert_eq!(order.len(), self.nodes.len(), "graph must stay acyclic");
        order
    }

    /// Full transitive set of tasks that `id` waits on.
    pub fn blocked_by(&self, id: Uuid) -> BTreeSet<Uuid> {
        self.closure(id, &self.deps)
    }

    /// Full transitive set of tasks waiting on `id`.
    pub fn blocking(&self, id: Uuid) -> BTreeSet<Uuid> {
        self.closure(id, &self.dependents)
    }

    fn closure(&self, id: Uuid, edges: &BTreeMap<Uuid, BTreeSet<Uuid>>) -> BTreeSet<Uuid> {
        let mut result = BTreeSet::new();
        let mut stack: Vec<Uuid> = edges.get(&id).map(|s| s.iter().copied().collect()).unwrap_or_default();

        while let Some(node) = stack.pop() {
            if result.insert(node) {
                if let Some(next) = edges.get(&node) {
                    stack.extend(next.iter().copied());
                }
            }
        }
        result
    }

    /// Tasks that can be picked up now: not Done, with every direct
    /// dependency Done.
    pub fn actionable_now(&self) -> BTreeSet<Uuid> {
        self.nodes
            .iter()
            .filter(|(_, node)| !node.status.is_done())
            .filter(|(id, _)| {
                self.deps
                    .get(id)
                    .is_none_or(|deps| deps.iter().all(|d| self.is_done(*d)))
            })
            .map(|(&id, _)| id)
            .collect()
    }

    fn is_done(&self, id: Uuid) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.status.is_done())
    }

    /// Longest effort-weighted dependency chain, dependencies first.
    ///
    /// Done tasks contribute zero weight (their cost is already sunk), so
    /// the path reflects remaining completion time.
    pub fn critical_path(&self) -> Vec<Uuid> {
        let order = self.topo_order();
        let mut best: HashMap<Uuid, f64> = HashMap::with_capacity(order.len());
        let mut pred: HashMap<Uuid, Uuid> = HashMap::new();

        for &id in &order {
            let own = self
                .nodes
                .get(&id)
                .map_or(0.0, |n| if n.status.is_done() { 0.0 } else { n.effort });
            let mut max_dep = 0.0_f64;
            let mut chosen: Option<Uuid> = None;
            if let Some(deps) = self.deps.get(&id) {
                // BTreeSet iteration is ascending, so strict > keeps the
                // lowest id on ties.
                for &dep in deps {
                    let score = best.get(&dep).copied().unwrap_or(0.0);
                    if score > max_dep {
                        max_dep = score;
                        chosen = Some(dep);
                    }
                }
            }
            best.insert(id, own + max_dep);
            if let Some(dep) = chosen {
                pred.insert(id, dep);
            }
        }

        let mut end: Option<Uuid> = None;
        let mut end_score = f64::NEG_INFINITY;
        for &id in &order {
            let score = best.get(&id).copied().unwrap_or(0.0);
            if score > end_score {
                end_score = score;
                end = Some(id);
            }
        }

        let mut path = Vec::new();
        let mut cursor = end;
        while let Some(id) = cursor {
            path.push(id);
            cursor = pred.get(&id).copied();
        }
        path.reverse();
        path
    }
}
