//! Upgrade executor: the run state machine.
//!
//! [`Executor`] plans the pending units, runs pre-flight checks, asks for
//! confirmation, applies each unit in order (recording it before the next one
//! starts), then runs post-flight checks. A unit failure stops the batch;
//! units already recorded stay recorded.
//!
//! ```text
//! Planning ─┬─> Checking ─┬─> Applying ─┬─> PostChecking ─> Done
//!           │             │             │
//!           └─> Done      └─> Failed    └─> Failed
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::Instrument;
use upgrader_state::HistoryStore;

use crate::checks::CheckRunner;
use crate::discovery::Registry;
use crate::error::{ExecutionError, Result, UpgradeError};
use crate::obs;
use crate::reporter::Reporter;
use crate::scheduler::{plan_pending, ExecutionPlan};
use crate::unit::UpgradeUnit;

/// Lifecycle state of one executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorState {
    Planning,
    Checking,
    Applying,
    PostChecking,
    Done,
    Failed,
}

impl ExecutorState {
    pub fn can_transition_to(self, next: ExecutorState) -> bool {
        use ExecutorState::*;
        matches!(
            (self, next),
            (Planning, Checking)
                | (Planning, Done)
                | (Checking, Applying)
                | (Checking, Failed)
                | (Applying, PostChecking)
                | (Applying, Failed)
                | (PostChecking, Done)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutorState::Done | ExecutorState::Failed)
    }
}

/// Operator confirmation asked once checks have passed.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, plan: &ExecutionPlan) -> bool;
}

/// Unattended runs: always proceeds.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

#[async_trait]
impl Confirm for AssumeYes {
    async fn confirm(&self, _plan: &ExecutionPlan) -> bool {
        true
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    pub run_id: String,
    /// Ids applied and recorded by this run, in order.
    pub applied: Vec<String>,
    /// Warnings emitted during this run.
    pub warnings: usize,
}

/// Applies pending units against one history store.
///
/// Single use: once it left `Planning`, a second `run` or `check` is rejected
/// as an invalid transition.
pub struct Executor<'a> {
    registry: &'a Registry,
    store: &'a dyn HistoryStore,
    reporter: &'a Reporter,
    checks: CheckRunner,
    state: ExecutorState,
}

impl<'a> Executor<'a> {
    pub fn new(
        registry: &'a Registry,
        store: &'a dyn HistoryStore,
        reporter: &'a Reporter,
    ) -> Self {
        Self {
            registry,
            store,
            reporter,
            checks: CheckRunner::new(),
            state: ExecutorState::Planning,
        }
    }

    pub fn with_checks(mut self, checks: CheckRunner) -> Self {
        self.checks = checks;
        self
    }

    pub fn state(&self) -> ExecutorState {
        self.state
    }

    fn transition(&mut self, next: ExecutorState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(UpgradeError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = ?self.state, to = ?next, "executor transition");
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, err: UpgradeError) -> UpgradeError {
        if let Err(invalid) = self.transition(ExecutorState::Failed) {
            return invalid;
        }
        err
    }

    /// Pending units in execution order. Does not change state.
    ///
    /// An unreachable store is an error, never an empty history.
    pub async fn plan(&self) -> Result<ExecutionPlan> {
        let history = self.store.load_history().await?;
        let plan = plan_pending(self.registry, &history)?;

        obs::emit_ghosts(plan.ghosts());
        for ghost in plan.ghosts() {
            self.reporter.warning(format!("Ghost upgrade {ghost} detected"));
        }
        Ok(plan)
    }

    fn report_plan(&self, plan: &ExecutionPlan) {
        self.reporter.info("Following upgrade(s) will be applied:");
        for unit in plan.units() {
            self.reporter
                .info(format!(" * {} ({})", unit.id(), unit.summary()));
        }
    }

    /// Planning and pre-flight checks only. Nothing is applied.
    pub async fn check(&mut self) -> Result<ExecutionPlan> {
        let plan = self.plan().await?;
        if plan.is_empty() {
            self.transition(ExecutorState::Done)?;
            self.reporter.info("All upgrades have been applied.");
            return Ok(plan);
        }

        self.transition(ExecutorState::Checking)?;
        self.report_plan(&plan);
        self.reporter.info("Running pre-upgrade checks...");
        if let Err(failure) = self.checks.pre_flight(plan.units(), self.reporter).await {
            return Err(self.fail(failure.into()));
        }
        self.reporter.info(format!(
            "Upgrade check successful - estimated time for upgrading is {}.",
            plan.estimate()
        ));
        Ok(plan)
    }

    /// Full run: plan, check, confirm, apply, post-check.
    pub async fn run(&mut self, confirm: &dyn Confirm) -> Result<RunOutcome> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.run_inner(run_id, confirm).instrument(span).await
    }

    async fn run_inner(&mut self, run_id: String, confirm: &dyn Confirm) -> Result<RunOutcome> {
        let warnings_before = self.reporter.warning_count();

        let plan = self.check().await?;
        obs::emit_run_started(&run_id, plan.len());
        if plan.is_empty() {
            obs::emit_run_finished(&run_id, 0, 0, true);
            return Ok(RunOutcome {
                run_id,
                applied: Vec::new(),
                warnings: self.reporter.warning_count() - warnings_before,
            });
        }

        if !confirm.confirm(&plan).await {
            self.reporter.info("Upgrade cancelled, nothing was applied.");
            obs::emit_run_finished(&run_id, 0, 0, false);
            return Err(self.fail(UpgradeError::Cancelled));
        }

        self.transition(ExecutorState::Applying)?;
        let mut applied = Vec::with_capacity(plan.len());
        for unit in plan.units() {
            if let Err(err) = self.apply(unit).await {
                obs::emit_run_finished(&run_id, applied.len(), 0, false);
                return Err(self.fail(err));
            }
            applied.push(unit.id().to_string());
        }

        self.transition(ExecutorState::PostChecking)?;
        self.reporter.info("Running post-upgrade checks...");
        self.checks.post_flight(plan.units(), self.reporter).await;
        self.transition(ExecutorState::Done)?;

        let warnings = self.reporter.warning_count() - warnings_before;
        if warnings == 0 {
            self.reporter.info("Upgrade completed successfully.");
        } else {
            let log_hint = self
                .reporter
                .log_file()
                .map(|p| format!(": {}", p.display()))
                .unwrap_or_default();
            self.reporter.warning(format!(
                "Upgrade completed with {warnings} warnings - please check log-file for further information{log_hint}"
            ));
        }
        obs::emit_run_finished(&run_id, applied.len(), warnings, true);

        Ok(RunOutcome {
            run_id,
            applied,
            warnings,
        })
    }

    /// Apply one unit and record it before returning.
    async fn apply(&self, unit: &Arc<UpgradeUnit>) -> Result<()> {
        let _ctx = self.reporter.context(unit.id());
        self.reporter
            .info(format!("Applying {} ({})", unit.id(), unit.summary()));

        let started = Instant::now();
        if let Err(messages) = unit.do_upgrade().call(self.reporter).await {
            let mut report = String::from("Upgrade error(s):");
            for message in &messages {
                report.push_str("\n (-) ");
                report.push_str(message);
            }
            self.reporter.error(report);
            obs::emit_unit_failed(unit.id(), messages.len());
            return Err(ExecutionError {
                upgrade_id: unit.id().to_string(),
                messages,
            }
            .into());
        }

        self.store
            .record_success(unit.id())
            .await
            .map_err(|source| UpgradeError::Unrecorded {
                upgrade_id: unit.id().to_string(),
                source,
            })?;
        obs::emit_unit_applied(unit.id(), started.elapsed().as_millis() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        use ExecutorState::*;
        assert!(Planning.can_transition_to(Checking));
        assert!(Planning.can_transition_to(Done));
        assert!(Checking.can_transition_to(Failed));
        assert!(Applying.can_transition_to(Failed));
        assert!(PostChecking.can_transition_to(Done));
    }

    #[test]
    fn test_rejected_transitions() {
        use ExecutorState::*;
        assert!(!Planning.can_transition_to(Applying));
        assert!(!Planning.can_transition_to(Failed));
        assert!(!PostChecking.can_transition_to(Failed));
        assert!(!Done.can_transition_to(Planning));
        assert!(!Failed.can_transition_to(Checking));
        assert!(Done.is_terminal() && Failed.is_terminal());
    }
}
