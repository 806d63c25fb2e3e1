use super::cycle::find_cycle;
use crate::component::ComponentDescriptor;
use crate::error::DependencyError;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Order in which simultaneously startable components are taken.
///
/// Only components with no dependency relationship are affected; callers
/// must not rely on their relative order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Position in the descriptor list
    #[default]
    DiscoveryOrder,
    /// Lower priority first, then discovery order
    Priority,
    /// Lexicographic by name
    Name,
}

/// Directed graph over component names, edges pointing from dependent to
/// dependency. Every edge target is a known node.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    priorities: Vec<i32>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph, rejecting repeated names and unknown dependencies
    pub fn build(descriptors: &[ComponentDescriptor]) -> Result<Self, DependencyError> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.name().to_string(), position).is_some() {
                return Err(DependencyError::DuplicateComponent {
                    name: descriptor.name().to_string(),
                });
            }
        }

        let mut dependencies = vec![Vec::new(); descriptors.len()];
        let mut dependents = vec![Vec::new(); descriptors.len()];

        for (node, descriptor) in descriptors.iter().enumerate() {
            for dependency in descriptor.dependencies() {
                let target = *index.get(dependency).ok_or_else(|| {
                    DependencyError::UnknownDependency {
                        component: descriptor.name().to_string(),
                        dependency: dependency.clone(),
                    }
                })?;
                dependencies[node].push(target);
                dependents[target].push(node);
            }
        }

        Ok(Self {
            nodes: descriptors.iter().map(|d| d.name().to_string()).collect(),
            index,
            priorities: descriptors.iter().map(|d| d.priority()).collect(),
            dependencies,
            dependents,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Direct dependencies of `name`, in declaration order
    pub fn dependencies_of(&self, name: &str) -> Option<Vec<&str>> {
        let node = *self.index.get(name)?;
        Some(self.names(&self.dependencies[node]))
    }

    /// Components that directly depend on `name`
    pub fn dependents_of(&self, name: &str) -> Option<Vec<&str>> {
        let node = *self.index.get(name)?;
        Some(self.names(&self.dependents[node]))
    }

    /// Whether `dependent` reaches `dependency` through one or more edges
    pub fn depends_transitively(&self, dependent: &str, dependency: &str) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(dependent), self.index.get(dependency))
        else {
            return false;
        };

        let mut seen = vec![false; self.nodes.len()];
        let mut pending = self.dependencies[from].clone();
        while let Some(node) = pending.pop() {
            if node == to {
                return true;
            }
            if !seen[node] {
                seen[node] = true;
                pending.extend(&self.dependencies[node]);
            }
        }
        false
    }

    /// Topologically sort with Kahn's algorithm
    pub fn resolve(&self, tie_break: TieBreak) -> Result<ResolvedOrder, DependencyError> {
        let ranks = self.ranks(tie_break);
        let mut in_degree: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();

        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| Reverse((ranks[node], node)))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, node))) = ready.pop() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(Reverse((ranks[dependent], dependent)));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let remaining: Vec<bool> = in_degree.iter().map(|degree| *degree > 0).collect();
            let mut by_rank: Vec<usize> = (0..self.nodes.len()).collect();
            by_rank.sort_by_key(|node| ranks[*node]);

            let cycle = find_cycle(&self.dependencies, &remaining, &by_rank).unwrap_or_else(|| {
                by_rank.iter().copied().filter(|node| remaining[*node]).collect()
            });
            return Err(DependencyError::CircularDependency {
                cycle: cycle.into_iter().map(|node| self.nodes[node].clone()).collect(),
            });
        }

        Ok(self.ordered(order))
    }

    fn ordered(&self, order: Vec<usize>) -> ResolvedOrder {
        let mut depth = vec![0usize; self.nodes.len()];
        let mut layers: Vec<Vec<String>> = Vec::new();
        for &node in &order {
            depth[node] = self.dependencies[node]
                .iter()
                .map(|dependency| depth[*dependency] + 1)
                .max()
                .unwrap_or(0);
            if layers.len() <= depth[node] {
                layers.resize_with(depth[node] + 1, Vec::new);
            }
            layers[depth[node]].push(self.nodes[node].clone());
        }

        let start: Vec<String> = order.iter().map(|node| self.nodes[*node].clone()).collect();
        let stop = start.iter().rev().cloned().collect();
        ResolvedOrder {
            start,
            stop,
            layers,
        }
    }

    /// Position of each node once sorted by the tie-break
    fn ranks(&self, tie_break: TieBreak) -> Vec<usize> {
        let mut sorted: Vec<usize> = (0..self.nodes.len()).collect();
        match tie_break {
            TieBreak::DiscoveryOrder => {}
            TieBreak::Priority => sorted.sort_by_key(|node| (self.priorities[*node], *node)),
            TieBreak::Name => sorted.sort_by(|a, b| self.nodes[*a].cmp(&self.nodes[*b])),
        }

        let mut ranks = vec![0; self.nodes.len()];
        for (rank, node) in sorted.into_iter().enumerate() {
            ranks[node] = rank;
        }
        ranks
    }

    fn names(&self, nodes: &[usize]) -> Vec<&str> {
        nodes.iter().map(|node| self.nodes[*node].as_str()).collect()
    }
}

/// Start order, its exact reverse, and dependency depth layers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedOrder {
    start: Vec<String>,
    stop: Vec<String>,
    layers: Vec<Vec<String>>,
}

impl ResolvedOrder {
    pub fn start_order(&self) -> &[String] {
        &self.start
    }

    /// Always the reverse of `start_order`
    pub fn stop_order(&self) -> &[String] {
        &self.stop
    }

    /// Components grouped by dependency depth; within a layer, start order
    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.start.iter().position(|n| n == name)
    }
}

/// Resolve using discovery order as the tie-break
pub fn resolve(descriptors: &[ComponentDescriptor]) -> Result<ResolvedOrder, DependencyError> {
    resolve_with(descriptors, TieBreak::DiscoveryOrder)
}

/// Validate the descriptors and compute start/stop order
pub fn resolve_with(
    descriptors: &[ComponentDescriptor],
    tie_break: TieBreak,
) -> Result<ResolvedOrder, DependencyError> {
    DependencyGraph::build(descriptors)?.resolve(tie_break)
}
