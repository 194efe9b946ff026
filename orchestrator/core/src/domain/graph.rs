// SPDX-License-Identifier: Apache-2.0
//! The dependency graph derived from every activity's declared reference
//! edges, cycle detection, and the "ready front" the scheduler walks.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::domain::identity::ActivityIdentity;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GraphError {
    #[error("circular dependency: {}", cycle.iter().map(|i| i.short_string()).collect::<Vec<_>>().join(" -> "))]
    CircularDependency { cycle: Vec<ActivityIdentity> },
}

/// `dependent -> [dependencies]`: edges point from an activity to the
/// activities it must wait for.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<ActivityIdentity>,
    edges: HashMap<ActivityIdentity, Vec<ActivityIdentity>>,
}

impl DependencyGraph {
    pub fn new(nodes: Vec<ActivityIdentity>, edges: HashMap<ActivityIdentity, Vec<ActivityIdentity>>) -> Self {
        Self { nodes, edges }
    }

    pub fn nodes(&self) -> &[ActivityIdentity] {
        &self.nodes
    }

    pub fn dependencies_of(&self, id: &ActivityIdentity) -> &[ActivityIdentity] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Activities that directly name `id` as a dependency.
    pub fn dependents_of(&self, id: &ActivityIdentity) -> Vec<ActivityIdentity> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(id))
            .map(|(dependent, _)| dependent.clone())
            .collect()
    }

    /// All activities transitively reachable by following "depends on me" edges
    /// from `id` — used to propagate `Skipped` through every downstream
    /// branch when `id` fails.
    pub fn descendants_of(&self, id: &ActivityIdentity) -> HashSet<ActivityIdentity> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from(self.dependents_of(id));
        while let Some(next) = queue.pop_front() {
            if seen.insert(next.clone()) {
                queue.extend(self.dependents_of(&next));
            }
        }
        seen
    }

    /// DFS cycle detection over the whole graph using the standard
    /// white/gray/black coloring. Returns the first cycle found, with the
    /// repeated node at both ends of the path for a readable error message.
    pub fn detect_cycle(&self) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        let mut color: HashMap<&ActivityIdentity, Color> =
            self.nodes.iter().map(|n| (n, Color::White)).collect();
        let mut stack: Vec<ActivityIdentity> = Vec::new();

        fn visit<'a>(
            node: &'a ActivityIdentity,
            graph: &'a DependencyGraph,
            color: &mut HashMap<&'a ActivityIdentity, Color>,
            stack: &mut Vec<ActivityIdentity>,
        ) -> Result<(), GraphError> {
            color.insert(node, Color::Gray);
            stack.push(node.clone());
            for dep in graph.dependencies_of(node) {
                match color.get(dep).copied().unwrap_or(Color::White) {
                    Color::White => visit(dep, graph, color, stack)?,
                    Color::Gray => {
                        let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                        let mut cycle: Vec<ActivityIdentity> = stack[start..].to_vec();
                        cycle.push(dep.clone());
                        return Err(GraphError::CircularDependency { cycle });
                    }
                    Color::Black => {}
                }
            }
            stack.pop();
            color.insert(node, Color::Black);
            Ok(())
        }

        for node in &self.nodes {
            if color.get(node).copied().unwrap_or(Color::White) == Color::White {
                visit(node, self, &mut color, &mut stack)?;
            }
        }
        Ok(())
    }

    /// Activities whose dependencies are all either completed or skipped,
    /// and that are themselves neither completed, skipped, nor already
    /// in flight. A dependency that was skipped propagates skip to its
    /// dependents elsewhere (see `Orchestrator`); this just reports
    /// structural readiness.
    pub fn ready_front(
        &self,
        settled: &HashSet<ActivityIdentity>,
        in_flight: &HashSet<ActivityIdentity>,
    ) -> Vec<ActivityIdentity> {
        self.nodes
            .iter()
            .filter(|id| !settled.contains(*id) && !in_flight.contains(*id))
            .filter(|id| {
                self.dependencies_of(id)
                    .iter()
                    .all(|dep| settled.contains(dep))
            })
            .cloned()
            .collect()
    }
}
