//! Topological scheduling of pending upgrade units.
//!
//! Kahn's algorithm over a [`DependencyGraph`]. Among nodes that are ready at
//! the same time the smallest id runs first, so the order is deterministic;
//! the relative order of unrelated units carries no meaning.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use upgrader_state::AppliedHistory;

use crate::discovery::Registry;
use crate::error::GraphError;
use crate::estimate::Estimate;
use crate::graph::DependencyGraph;
use crate::unit::UpgradeUnit;

/// Order the graph's nodes so that every dependency precedes its dependents.
///
/// Fails with [`GraphError::CyclicDependency`] naming every node still waiting
/// on a dependency once no node is ready.
pub fn topological_order(graph: &DependencyGraph) -> Result<Vec<String>, GraphError> {
    let mut incoming = graph.incoming().clone();
    let outgoing = graph.outgoing();

    let mut ready: BTreeSet<String> = incoming
        .iter()
        .filter(|(_, deps)| deps.is_empty())
        .map(|(id, _)| id.clone())
        .collect();

    let mut order = Vec::with_capacity(incoming.len());
    while let Some(node) = ready.pop_first() {
        if let Some(dependents) = outgoing.get(&node) {
            for dependent in dependents {
                if let Some(deps) = incoming.get_mut(dependent) {
                    deps.remove(&node);
                    if deps.is_empty() {
                        ready.insert(dependent.clone());
                    }
                }
            }
        }
        order.push(node);
    }

    let unresolved: Vec<String> = incoming
        .into_iter()
        .filter(|(_, deps)| !deps.is_empty())
        .map(|(id, _)| id)
        .collect();
    if !unresolved.is_empty() {
        return Err(GraphError::CyclicDependency { ids: unresolved });
    }
    Ok(order)
}

/// Ordered pending units for one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    units: Vec<Arc<UpgradeUnit>>,
    ghosts: Vec<String>,
}

impl ExecutionPlan {
    pub fn units(&self) -> &[Arc<UpgradeUnit>] {
        &self.units
    }

    pub fn ids(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.id()).collect()
    }

    /// Applied ids with no matching unit definition.
    pub fn ghosts(&self) -> &[String] {
        &self.ghosts
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn estimate(&self) -> Estimate {
        Estimate::for_units(self.units.iter().map(Arc::as_ref))
    }

    /// Serializable listing, for `show pending --json`.
    pub fn entries(&self) -> Vec<PlanEntry> {
        self.units
            .iter()
            .map(|u| PlanEntry {
                id: u.id().to_string(),
                repository: u.repository().to_string(),
                summary: u.summary().to_string(),
                depends_on: u.depends_on().iter().cloned().collect(),
                estimate: u.estimate(),
            })
            .collect()
    }
}

/// One planned unit in machine-readable form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    pub id: String,
    pub repository: String,
    pub summary: String,
    pub depends_on: Vec<String>,
    pub estimate: Option<u64>,
}

/// Pending path: prune `history`, validate, then order what is left.
pub fn plan_pending(
    registry: &Registry,
    history: &AppliedHistory,
) -> Result<ExecutionPlan, GraphError> {
    let (graph, ghosts) = DependencyGraph::pending(registry, history);
    graph.validate()?;
    let order = topological_order(&graph)?;

    let units = order
        .iter()
        .filter_map(|id| registry.get(id).cloned())
        .collect();
    Ok(ExecutionPlan { units, ghosts })
}

/// Full path: end-points of the whole graph (history ignored), by repository.
pub fn find_endpoints(registry: &Registry) -> BTreeMap<String, Vec<String>> {
    DependencyGraph::full(registry).endpoints()
}
