//! Error types for the upgrade engine.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use upgrader_state::StorageError;

use crate::executor::ExecutorState;

/// One unit definition that failed validation, with every defect found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokenUnit {
    pub id: String,
    pub defects: Vec<String>,
}

/// Errors raised while loading unit definitions.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// One or more definitions are invalid. Lists all of them.
    #[error("{}", render_broken(.units))]
    BrokenUnits { units: Vec<BrokenUnit> },

    /// No repository could be derived from an upgrade id.
    #[error("repository could not be determined from the upgrade identifier: {id}")]
    UnparsableId { id: String },

    /// A search location exists but could not be read.
    #[error("cannot read upgrade location {}: {source}", .location.display())]
    Location {
        location: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn render_broken(units: &[BrokenUnit]) -> String {
    let mut out = format!("{} broken upgrade definition(s):", units.len());
    for unit in units {
        out.push_str(&format!("\n  {}: {}", unit.id, unit.defects.join("; ")));
    }
    out
}

/// A dependency on an id the registry does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingEdge {
    pub upgrade_id: String,
    pub dependency: String,
}

/// A dependency pointing into another repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossRepositoryEdge {
    pub upgrade_id: String,
    pub repository: String,
    pub dependency: String,
    pub dependency_repository: String,
}

/// Errors raised while building or ordering the dependency graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{}", render_dangling(.edges))]
    MissingDependency { edges: Vec<DanglingEdge> },

    #[error("{}", render_cross(.edges))]
    CrossRepositoryDependency { edges: Vec<CrossRepositoryEdge> },

    /// Every id still waiting on a dependency once the worklist emptied.
    #[error("the upgrades have at least one cyclic dependency involving: {}", .ids.join(", "))]
    CyclicDependency { ids: Vec<String> },
}

fn render_dangling(edges: &[DanglingEdge]) -> String {
    edges
        .iter()
        .map(|e| {
            format!(
                "upgrade {} depends on an unknown upgrade {}",
                e.upgrade_id, e.dependency
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_cross(edges: &[CrossRepositoryEdge]) -> String {
    edges
        .iter()
        .map(|e| {
            format!(
                "upgrade {} (repository {}) depends on {} from another repository ({})",
                e.upgrade_id, e.repository, e.dependency, e.dependency_repository
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Which side of the apply phase a check ran on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStage {
    Pre,
    Post,
}

impl fmt::Display for CheckStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckStage::Pre => write!(f, "Pre-upgrade"),
            CheckStage::Post => write!(f, "Post-upgrade"),
        }
    }
}

/// Failure messages reported by one check source (a unit or a global check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckFailure {
    pub source_id: String,
    pub messages: Vec<String>,
}

impl CheckFailure {
    /// Operator-facing rendering, one ` (-) ` line per message.
    pub fn render(&self, stage: CheckStage) -> String {
        let mut out = format!(
            "{} check for {} failed with the following errors:",
            stage, self.source_id
        );
        for message in &self.messages {
            out.push_str("\n (-) ");
            out.push_str(message);
        }
        out
    }
}

/// Every failing check of one stage, raised together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct AggregatedCheckFailure {
    pub stage: CheckStage,
    pub failures: Vec<CheckFailure>,
}

impl fmt::Display for AggregatedCheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.failures.iter().map(|c| c.render(self.stage)).collect();
        write!(f, "{}", rendered.join("\n"))
    }
}

/// A unit's `do_upgrade` reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
    "Upgrade '{upgrade_id}' failed. Your installation is in an inconsistent state. \
     Please manually review the upgrade and resolve inconsistencies."
)]
pub struct ExecutionError {
    pub upgrade_id: String,
    pub messages: Vec<String>,
}

/// Errors raised by the recipe generator.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error(
        "could not create upgrade recipe: {} already exists (use --force to overwrite)",
        .path.display()
    )]
    Exists { path: PathBuf },

    #[error(
        "generated upgrade id {id} does not parse back to repository {repository}; \
         please specify the repository with --repository"
    )]
    UnparsableGeneratedId { id: String, repository: String },

    #[error(
        "could not determine repository name from {}; please specify it with --repository",
        .path.display()
    )]
    NoRepository { path: PathBuf },

    #[error("no upgrade end-points found for repository {repository}")]
    NoEndpoints { repository: String },

    #[error("recipe I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors raised while loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed configuration file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Top-level error for an upgrade invocation.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Checks(#[from] AggregatedCheckFailure),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// `do_upgrade` succeeded but the history row could not be written.
    #[error(
        "upgrade '{upgrade_id}' was applied but could not be recorded: {source}. \
         Record it manually or make sure it is safe to re-run."
    )]
    Unrecorded {
        upgrade_id: String,
        #[source]
        source: StorageError,
    },

    #[error(transparent)]
    Recipe(#[from] RecipeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("upgrade cancelled by operator")]
    Cancelled,

    #[error("invalid executor transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: ExecutorState,
        to: ExecutorState,
    },
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, UpgradeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broken_units_lists_every_unit() {
        let err = DiscoveryError::BrokenUnits {
            units: vec![
                BrokenUnit {
                    id: "demo_2024_01_01_a".to_string(),
                    defects: vec!["missing info".to_string(), "missing do_upgrade".to_string()],
                },
                BrokenUnit {
                    id: "noseparator".to_string(),
                    defects: vec!["unparsable id".to_string()],
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("2 broken"));
        assert!(msg.contains("demo_2024_01_01_a: missing info; missing do_upgrade"));
        assert!(msg.contains("noseparator"));
    }

    #[test]
    fn test_check_failure_render_format() {
        let failure = CheckFailure {
            source_id: "demo_2024_01_01_a".to_string(),
            messages: vec!["table missing".to_string(), "index missing".to_string()],
        };
        assert_eq!(
            failure.render(CheckStage::Pre),
            "Pre-upgrade check for demo_2024_01_01_a failed with the following errors:\n \
             (-) table missing\n (-) index missing"
        );
    }

    #[test]
    fn test_aggregated_failure_contains_all_sources() {
        let err = AggregatedCheckFailure {
            stage: CheckStage::Post,
            failures: vec![
                CheckFailure {
                    source_id: "a".to_string(),
                    messages: vec!["one".to_string()],
                },
                CheckFailure {
                    source_id: "b".to_string(),
                    messages: vec!["two".to_string()],
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("Post-upgrade check for a"));
        assert!(msg.contains("Post-upgrade check for b"));
        assert!(msg.contains(" (-) one"));
        assert!(msg.contains(" (-) two"));
    }

    #[test]
    fn test_cycle_error_names_ids() {
        let err = GraphError::CyclicDependency {
            ids: vec!["demo_a".to_string(), "demo_b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("demo_a"));
        assert!(msg.contains("demo_b"));
    }

    #[test]
    fn test_execution_error_mentions_inconsistent_state() {
        let err = ExecutionError {
            upgrade_id: "demo_x".to_string(),
            messages: vec![],
        };
        let msg = err.to_string();
        assert!(msg.contains("Upgrade 'demo_x' failed"));
        assert!(msg.contains("inconsistent state"));
    }
}
