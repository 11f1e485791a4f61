//! Structured observability hooks for upgrade run lifecycle events.
//!
//! This module provides:
//! - A run-scoped tracing span via `run_span`
//! - Emission functions for key lifecycle events: start, unit applied/failed,
//!   check failures, finish
//!
//! Events are emitted at `info!` level; failures at `warn!`.

use tracing::{info, warn};

use crate::error::CheckStage;

/// Run-scoped span carrying the generated run id.
///
/// Attach it to the run future with `Instrument::instrument` so that every
/// event emitted while the run is polled carries `run_id`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("upgrade.run", run_id = %run_id)
}

/// Emit event: run started with the number of pending units.
pub fn emit_run_started(run_id: &str, pending: usize) {
    info!(event = "upgrade.run.started", run_id = %run_id, pending = pending);
}

/// Emit event: one unit applied and recorded.
pub fn emit_unit_applied(upgrade_id: &str, duration_ms: u64) {
    info!(event = "upgrade.unit.applied", upgrade_id = %upgrade_id, duration_ms = duration_ms);
}

/// Emit event: a unit's `do_upgrade` failed.
pub fn emit_unit_failed(upgrade_id: &str, messages: usize) {
    warn!(event = "upgrade.unit.failed", upgrade_id = %upgrade_id, messages = messages);
}

/// Emit event: a check source reported failure.
pub fn emit_check_failed(stage: CheckStage, source_id: &str, messages: usize) {
    warn!(
        event = "upgrade.check.failed",
        stage = %stage,
        source_id = %source_id,
        messages = messages,
    );
}

/// Emit event: applied ids with no matching definition.
pub fn emit_ghosts(ghosts: &[String]) {
    if !ghosts.is_empty() {
        warn!(event = "upgrade.ghosts", ghosts = ?ghosts);
    }
}

/// Emit event: run finished.
pub fn emit_run_finished(run_id: &str, applied: usize, warnings: usize, success: bool) {
    info!(
        event = "upgrade.run.finished",
        run_id = %run_id,
        applied = applied,
        warnings = warnings,
        success = success,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        let _entered = run_span("test-run-id").entered();
        emit_run_started("test-run-id", 0);
        emit_ghosts(&[]);
    }
}
