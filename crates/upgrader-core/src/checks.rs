//! Pre-flight and post-flight checks.
//!
//! Every check runs even when an earlier one fails; failures are collected and
//! raised together. Pre-flight failures abort the run before anything is
//! applied, post-flight failures are reported as warnings only.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AggregatedCheckFailure, CheckFailure, CheckStage};
use crate::obs;
use crate::reporter::Reporter;
use crate::unit::{StepResult, UpgradeUnit};

/// A check that is not tied to a particular unit.
#[async_trait]
pub trait GlobalCheck: Send + Sync {
    /// Id used as reporter context and in failure messages.
    fn id(&self) -> &str;

    fn stage(&self) -> CheckStage;

    async fn run(&self, reporter: &Reporter) -> StepResult;
}

/// Fails while a background worker lock/pid file exists.
#[derive(Debug, Clone)]
pub struct WorkerLockCheck {
    lock_file: PathBuf,
}

impl WorkerLockCheck {
    pub fn new(lock_file: impl Into<PathBuf>) -> Self {
        Self {
            lock_file: lock_file.into(),
        }
    }
}

#[async_trait]
impl GlobalCheck for WorkerLockCheck {
    fn id(&self) -> &str {
        "worker_lock"
    }

    fn stage(&self) -> CheckStage {
        CheckStage::Pre
    }

    async fn run(&self, _reporter: &Reporter) -> StepResult {
        if self.lock_file.exists() {
            return Err(vec![format!(
                "background workers appear to be running (lock file {} exists); \
                 stop them before upgrading",
                self.lock_file.display()
            )]);
        }
        Ok(())
    }
}

/// Reminds the operator to resume background workers after the batch.
#[derive(Debug, Clone, Default)]
pub struct ResumeWorkersReminder;

#[async_trait]
impl GlobalCheck for ResumeWorkersReminder {
    fn id(&self) -> &str {
        "resume_workers"
    }

    fn stage(&self) -> CheckStage {
        CheckStage::Post
    }

    async fn run(&self, reporter: &Reporter) -> StepResult {
        reporter.warning("Remember to resume background workers stopped before the upgrade.");
        Ok(())
    }
}

/// Runs global checks and unit pre/post procedures for one stage.
#[derive(Clone, Default)]
pub struct CheckRunner {
    checks: Vec<Arc<dyn GlobalCheck>>,
}

impl CheckRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_check(mut self, check: impl GlobalCheck + 'static) -> Self {
        self.checks.push(Arc::new(check));
        self
    }

    /// Built-in checks: the worker lock (when configured) and the resume reminder.
    pub fn with_defaults(worker_lock: Option<PathBuf>) -> Self {
        let runner = match worker_lock {
            Some(path) => Self::new().with_check(WorkerLockCheck::new(path)),
            None => Self::new(),
        };
        runner.with_check(ResumeWorkersReminder)
    }

    /// Global pre checks, then every unit's `pre_upgrade`.
    pub async fn pre_flight(
        &self,
        units: &[Arc<UpgradeUnit>],
        reporter: &Reporter,
    ) -> Result<(), AggregatedCheckFailure> {
        let mut failures = self.run_global(CheckStage::Pre, reporter).await;
        for unit in units {
            if let Some(check) = unit.pre_upgrade() {
                let _ctx = reporter.context(unit.id());
                if let Err(messages) = check.call(reporter).await {
                    failures.push(failed(CheckStage::Pre, unit.id(), messages));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregatedCheckFailure {
                stage: CheckStage::Pre,
                failures,
            })
        }
    }

    /// Every unit's `post_upgrade`, then global post checks. Each failing
    /// source becomes one warning.
    pub async fn post_flight(
        &self,
        units: &[Arc<UpgradeUnit>],
        reporter: &Reporter,
    ) -> Vec<CheckFailure> {
        let mut failures = Vec::new();
        for unit in units {
            if let Some(check) = unit.post_upgrade() {
                let _ctx = reporter.context(unit.id());
                if let Err(messages) = check.call(reporter).await {
                    failures.push(failed(CheckStage::Post, unit.id(), messages));
                }
            }
        }
        failures.extend(self.run_global(CheckStage::Post, reporter).await);

        for failure in &failures {
            reporter.warning(failure.render(CheckStage::Post));
        }
        failures
    }

    async fn run_global(&self, stage: CheckStage, reporter: &Reporter) -> Vec<CheckFailure> {
        let mut failures = Vec::new();
        for check in self.checks.iter().filter(|c| c.stage() == stage) {
            let _ctx = reporter.context(check.id());
            if let Err(messages) = check.run(reporter).await {
                failures.push(failed(stage, check.id(), messages));
            }
        }
        failures
    }
}

fn failed(stage: CheckStage, source_id: &str, messages: Vec<String>) -> CheckFailure {
    obs::emit_check_failed(stage, source_id, messages.len());
    CheckFailure {
        source_id: source_id.to_string(),
        messages,
    }
}
