//! Dependency graph over upgrade units.
//!
//! An edge `A → B` means "B depends on A". The graph keeps both directions:
//! `incoming[B]` holds B's pending dependencies and `outgoing[A]` holds A's
//! dependents. It is rebuilt from the registry on every run and never
//! persisted.
//!
//! Two query paths exist. The pending path starts from the applied history
//! and prunes every applied unit together with everything it depends on. The
//! full path ignores history and is used to find end-points.

use std::collections::{BTreeMap, BTreeSet};

use upgrader_state::AppliedHistory;

use crate::discovery::Registry;
use crate::error::{CrossRepositoryEdge, DanglingEdge, GraphError};

/// Incoming/outgoing edge maps plus each known node's repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// `id → {dependency, ...}`; keys are exactly the remaining nodes.
    incoming: BTreeMap<String, BTreeSet<String>>,
    /// `id → {dependent, ...}`
    outgoing: BTreeMap<String, BTreeSet<String>>,
    /// `id → repository` for every registry unit.
    repositories: BTreeMap<String, String>,
}

impl DependencyGraph {
    /// Full graph over every registry unit, history ignored.
    pub fn full(registry: &Registry) -> Self {
        Self::build(registry, &AppliedHistory::new())
    }

    /// Graph of units still pending against `history`.
    ///
    /// Returns the pruned graph and the ghost ids: applied ids that no unit
    /// definition matches.
    pub fn pending(registry: &Registry, history: &AppliedHistory) -> (Self, Vec<String>) {
        let mut graph = Self::build(registry, history);
        let ghosts = graph.prune_applied(history);
        (graph, ghosts)
    }

    /// Edge maps with applied ids filtered out of every dependency set.
    fn build(registry: &Registry, history: &AppliedHistory) -> Self {
        let mut graph = Self::default();
        for unit in registry.units() {
            let id = unit.id().to_string();
            let deps: BTreeSet<String> = unit
                .depends_on()
                .iter()
                .filter(|d| !history.contains_key(*d))
                .cloned()
                .collect();

            graph.outgoing.entry(id.clone()).or_default();
            for dep in &deps {
                graph
                    .outgoing
                    .entry(dep.clone())
                    .or_default()
                    .insert(id.clone());
            }
            graph
                .repositories
                .insert(id.clone(), unit.repository().to_string());
            graph.incoming.insert(id, deps);
        }
        graph
    }

    /// Remove applied units and, walking backward, everything they depend on.
    ///
    /// Dependencies of an applied unit are taken as applied, which lets a
    /// graph grow new branches after partial history exists.
    fn prune_applied(&mut self, history: &AppliedHistory) -> Vec<String> {
        let mut ghosts = Vec::new();
        for applied in history.keys() {
            if !self.repositories.contains_key(applied) {
                ghosts.push(applied.clone());
            }

            let mut stack = vec![applied.clone()];
            while let Some(node) = stack.pop() {
                if let Some(dependents) = self.outgoing.get(&node) {
                    for dependent in dependents {
                        if let Some(deps) = self.incoming.get_mut(dependent) {
                            deps.remove(&node);
                        }
                    }
                }

                let Some(deps) = self.incoming.remove(&node) else {
                    continue;
                };
                for dep in deps {
                    if let Some(dependents) = self.outgoing.get_mut(&dep) {
                        dependents.remove(&node);
                    }
                    stack.push(dep);
                }
            }
        }

        let remaining = &self.incoming;
        self.outgoing.retain(|id, _| remaining.contains_key(id));
        ghosts
    }

    /// Check every remaining edge points at a known unit of the same
    /// repository. Dangling edges are reported before cross-repository ones.
    pub fn validate(&self) -> Result<(), GraphError> {
        let mut dangling = Vec::new();
        let mut crossing = Vec::new();

        for (id, deps) in &self.incoming {
            let repository = self.repositories.get(id);
            for dep in deps {
                match self.repositories.get(dep) {
                    None => dangling.push(DanglingEdge {
                        upgrade_id: id.clone(),
                        dependency: dep.clone(),
                    }),
                    Some(dep_repository) if Some(dep_repository) != repository => {
                        crossing.push(CrossRepositoryEdge {
                            upgrade_id: id.clone(),
                            repository: repository.cloned().unwrap_or_default(),
                            dependency: dep.clone(),
                            dependency_repository: dep_repository.clone(),
                        })
                    }
                    Some(_) => {}
                }
            }
        }

        if !dangling.is_empty() {
            return Err(GraphError::MissingDependency { edges: dangling });
        }
        if !crossing.is_empty() {
            return Err(GraphError::CrossRepositoryDependency { edges: crossing });
        }
        Ok(())
    }

    /// Nodes nothing depends on, grouped by repository.
    pub fn endpoints(&self) -> BTreeMap<String, Vec<String>> {
        let mut endpoints: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for id in self.incoming.keys() {
            let has_dependents = self.outgoing.get(id).is_some_and(|d| !d.is_empty());
            if has_dependents {
                continue;
            }
            if let Some(repository) = self.repositories.get(id) {
                endpoints
                    .entry(repository.clone())
                    .or_default()
                    .push(id.clone());
            }
        }
        endpoints
    }

    pub fn incoming(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.incoming
    }

    pub fn outgoing(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.outgoing
    }

    pub fn repository(&self, id: &str) -> Option<&str> {
        self.repositories.get(id).map(String::as_str)
    }

    /// Number of remaining nodes.
    pub fn len(&self) -> usize {
        self.incoming.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incoming.is_empty()
    }
}
