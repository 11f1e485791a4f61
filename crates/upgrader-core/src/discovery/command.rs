//! Shell-command procedures declared in unit manifests.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::reporter::Reporter;
use crate::unit::{Procedure, StepResult};

/// Runs `sh -c <command>` inside the unit's `upgrades/` directory.
///
/// The child sees `UPGRADE_ID` in its environment. Stdout lines are forwarded
/// to the reporter as info; on a non-zero exit the stderr lines (or the exit
/// status when stderr is empty) become the failure messages.
#[derive(Debug, Clone)]
pub struct ShellProcedure {
    upgrade_id: String,
    command: String,
    workdir: PathBuf,
}

impl ShellProcedure {
    pub fn new(
        upgrade_id: impl Into<String>,
        command: impl Into<String>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upgrade_id: upgrade_id.into(),
            command: command.into(),
            workdir: workdir.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

fn non_empty_lines(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl Procedure for ShellProcedure {
    async fn call(&self, reporter: &Reporter) -> StepResult {
        tracing::debug!(
            upgrade_id = %self.upgrade_id,
            command = %self.command,
            "running shell procedure"
        );

        let child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.workdir)
            .env("UPGRADE_ID", &self.upgrade_id)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| vec![format!("failed to start `{}`: {}", self.command, e)])?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| vec![format!("failed to wait for `{}`: {}", self.command, e)])?;

        for line in non_empty_lines(&output.stdout) {
            reporter.info(line);
        }

        if output.status.success() {
            return Ok(());
        }

        let messages = non_empty_lines(&output.stderr);
        if messages.is_empty() {
            Err(vec![format!("`{}` exited with {}", self.command, output.status)])
        } else {
            Err(messages)
        }
    }
}
