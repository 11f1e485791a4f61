//! Upgrader Core Library
//!
//! Upgrade orchestration engine: discovers upgrade units, orders them by
//! their declared dependencies, skips what the history store already holds,
//! runs pre/post checks and applies pending units one at a time.
//!
//! ## Key Components
//!
//! - `Discovery` / `Registry`: unit sources and the validated unit index
//! - `DependencyGraph` / `plan_pending`: history pruning and Kahn ordering
//! - `CheckRunner`: aggregated pre-flight and post-flight checks
//! - `Executor`: the run state machine
//! - `Reporter`: console + log file output with per-unit context
//! - `recipe`: scaffolding for new unit manifests

pub mod checks;
pub mod config;
pub mod discovery;
pub mod error;
pub mod estimate;
pub mod executor;
pub mod graph;
pub mod obs;
pub mod recipe;
pub mod reporter;
pub mod scheduler;
pub mod telemetry;
pub mod unit;

pub use checks::{CheckRunner, GlobalCheck, ResumeWorkersReminder, WorkerLockCheck};
pub use config::UpgraderConfig;
pub use discovery::{
    Discovery, ManifestDirectory, Registry, ShellProcedure, StaticSource, UnitManifest,
    UnitSource,
};
pub use error::{
    AggregatedCheckFailure, BrokenUnit, CheckFailure, CheckStage, ConfigError, DiscoveryError,
    ExecutionError, GraphError, RecipeError, Result, UpgradeError,
};
pub use estimate::Estimate;
pub use executor::{AssumeYes, Confirm, Executor, ExecutorState, RunOutcome};
pub use graph::DependencyGraph;
pub use recipe::{
    create_recipe, create_release, repository_from_path, GeneratedRecipe, RecipeKind,
    RecipeRequest,
};
pub use reporter::{ConsoleBuffer, ContextGuard, Level, Reporter};
pub use scheduler::{find_endpoints, plan_pending, topological_order, ExecutionPlan, PlanEntry};
pub use unit::{
    parse_repository, procedure_fn, FnProcedure, Procedure, StepResult, UnitDefinition,
    UpgradeUnit,
};

pub use upgrader_state::{
    AppliedHistory, AppliedRecord, HistoryStore, MemoryHistoryStore, StorageError, StoreConfig,
    SurrealHistoryStore,
};
