//! Upgrader CLI
//!
//! Command-line interface for discovering, checking and applying upgrades.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::Level;

use upgrader_core::{
    create_recipe, create_release, AssumeYes, CheckRunner, Confirm, Discovery, ExecutionPlan,
    Executor, PlanEntry, RecipeKind, RecipeRequest, Registry, Reporter, UpgradeError,
    UpgraderConfig,
};
use upgrader_state::{AppliedRecord, HistoryStore, SurrealHistoryStore};

/// Upgrader - dependency-ordered upgrades with durable history
#[derive(Parser)]
#[command(name = "upgrade")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Discover, check and apply pending upgrades", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true, env = "UPGRADER_CONFIG")]
    config: Option<PathBuf>,

    /// Directory scanned for upgrades/*.toml (repeatable)
    #[arg(
        long = "search-root",
        global = true,
        env = "UPGRADER_SEARCH_ROOTS",
        value_delimiter = ','
    )]
    search_roots: Vec<PathBuf>,

    /// Append operator output to this file
    #[arg(long, global = true, env = "UPGRADER_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// History store URL (mem://, surrealkv://PATH, ws://HOST:PORT)
    #[arg(long, global = true, env = "UPGRADER_STORE")]
    store: Option<String>,

    /// Background worker lock file checked before upgrading
    #[arg(long, global = true, env = "UPGRADER_WORKER_LOCK")]
    worker_lock: Option<PathBuf>,

    /// Enable verbose diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit diagnostics as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply all pending upgrades
    Run {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Run pre-upgrade checks without applying anything
    Check,

    /// List upgrades
    Show {
        #[command(subcommand)]
        what: ShowAction,
    },

    /// Scaffold a new upgrade manifest
    Create {
        #[command(subcommand)]
        kind: CreateAction,
    },
}

#[derive(Subcommand)]
enum ShowAction {
    /// Upgrades that would be applied, in order
    Pending {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
    /// Upgrades recorded in the history store, newest first
    Applied {
        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CreateAction {
    /// Dated recipe depending on the newest applied upgrade
    Recipe {
        /// Module directory that receives upgrades/
        #[arg(long)]
        path: PathBuf,

        /// Repository name (default: derived from the directory name)
        #[arg(long)]
        repository: Option<String>,

        /// Explicit dependencies
        #[arg(long, value_delimiter = ',')]
        depends_on: Vec<String>,

        /// Overwrite an existing recipe
        #[arg(long)]
        force: bool,
    },
    /// Release recipe depending on every end-point of the repository
    Release {
        /// Module directory that receives upgrades/
        #[arg(long)]
        path: PathBuf,

        /// Repository name (default: derived from the directory name)
        #[arg(long)]
        repository: Option<String>,

        /// Overwrite an existing recipe
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    upgrader_core::telemetry::init_tracing(cli.json_logs, level);

    let reporter = Reporter::new();
    match dispatch(cli, &reporter).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Already reported by the executor.
            if !matches!(err.downcast_ref::<UpgradeError>(), Some(UpgradeError::Cancelled)) {
                reporter.error(format!("{err:#}"));
            }
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli, reporter: &Reporter) -> Result<()> {
    let config = resolve_config(&cli)?;
    tracing::debug!(?config, "effective configuration");

    if let Some(log_file) = &config.log_file {
        reporter
            .attach_log_file(log_file)
            .with_context(|| format!("Failed to open log file {}", log_file.display()))?;
    }

    let store = SurrealHistoryStore::connect(&config.store)
        .await
        .context("Failed to connect to upgrade history store")?;

    match cli.command {
        Commands::Run { yes } => {
            let registry = load_registry(&config.discovery())?;
            let confirm: &dyn Confirm = if yes { &AssumeYes } else { &StdinConfirm };
            cmd_run(&registry, &store, reporter, config.check_runner(), confirm).await
        }
        Commands::Check => {
            let registry = load_registry(&config.discovery())?;
            cmd_check(&registry, &store, reporter, config.check_runner()).await
        }
        Commands::Show { what } => match what {
            ShowAction::Pending { json } => {
                let registry = load_registry(&config.discovery())?;
                cmd_show_pending(&registry, &store, reporter, json, &mut std::io::stdout()).await
            }
            ShowAction::Applied { json } => {
                cmd_show_applied(&store, reporter, json, &mut std::io::stdout()).await
            }
        },
        Commands::Create { kind } => {
            let (kind, request) = match kind {
                CreateAction::Recipe {
                    path,
                    repository,
                    depends_on,
                    force,
                } => {
                    let mut request = RecipeRequest::new(path);
                    request.repository = repository;
                    request.depends_on = depends_on;
                    request.force = force;
                    (RecipeKind::Dated, request)
                }
                CreateAction::Release {
                    path,
                    repository,
                    force,
                } => {
                    let mut request = RecipeRequest::new(path);
                    request.repository = repository;
                    request.force = force;
                    (RecipeKind::Release, request)
                }
            };
            cmd_create(kind, &request, &config, &store, reporter).await
        }
    }
}

/// File values first, then flags and their environment variables.
fn resolve_config(cli: &Cli) -> Result<UpgraderConfig> {
    let mut config = UpgraderConfig::load_or_default(cli.config.as_deref())?;
    if !cli.search_roots.is_empty() {
        config.search_roots = cli.search_roots.clone();
    }
    if let Some(log_file) = &cli.log_file {
        config.log_file = Some(log_file.clone());
    }
    if let Some(url) = &cli.store {
        config.store.url = url.clone();
    }
    if let Some(lock) = &cli.worker_lock {
        config.worker_lock = Some(lock.clone());
    }
    Ok(config)
}

fn load_registry(discovery: &Discovery) -> Result<Registry> {
    let registry = discovery
        .load()
        .context("Failed to discover upgrade units")?;
    tracing::debug!(units = registry.len(), "registry loaded");
    Ok(registry)
}

/// Interactive confirmation on stdin; anything but `y`/`yes` declines.
struct StdinConfirm;

#[async_trait]
impl Confirm for StdinConfirm {
    async fn confirm(&self, _plan: &ExecutionPlan) -> bool {
        {
            let mut stdout = std::io::stdout();
            let _ = write!(stdout, "Do you want to continue? [y/N] ");
            let _ = stdout.flush();
        }

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => is_affirmative(&line),
            Err(err) => {
                tracing::warn!(error = %err, "failed to read confirmation");
                false
            }
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Apply all pending upgrades
async fn cmd_run(
    registry: &Registry,
    store: &dyn HistoryStore,
    reporter: &Reporter,
    checks: CheckRunner,
    confirm: &dyn Confirm,
) -> Result<()> {
    let mut executor = Executor::new(registry, store, reporter).with_checks(checks);
    let outcome = executor.run(confirm).await?;
    tracing::info!(
        run_id = %outcome.run_id,
        applied = outcome.applied.len(),
        warnings = outcome.warnings,
        "upgrade run finished"
    );
    Ok(())
}

/// Plan and pre-check only
async fn cmd_check(
    registry: &Registry,
    store: &dyn HistoryStore,
    reporter: &Reporter,
    checks: CheckRunner,
) -> Result<()> {
    let mut executor = Executor::new(registry, store, reporter).with_checks(checks);
    executor.check().await?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct PendingReport {
    pending: Vec<PlanEntry>,
    ghosts: Vec<String>,
    estimate_seconds: u64,
}

/// List pending upgrades in execution order
async fn cmd_show_pending(
    registry: &Registry,
    store: &dyn HistoryStore,
    reporter: &Reporter,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let executor = Executor::new(registry, store, reporter);
    let plan = executor.plan().await?;

    if json {
        let report = PendingReport {
            pending: plan.entries(),
            ghosts: plan.ghosts().to_vec(),
            estimate_seconds: plan.estimate().seconds,
        };
        writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }

    if plan.is_empty() {
        reporter.info("All upgrades have been applied.");
        return Ok(());
    }
    reporter.info("Following upgrade(s) are ready to be applied:");
    for unit in plan.units() {
        reporter.info(format!(" * {} ({})", unit.id(), unit.summary()));
    }
    reporter.info(format!("Estimated time for upgrading is {}.", plan.estimate()));
    Ok(())
}

/// List applied upgrades, newest first
async fn cmd_show_applied(
    store: &dyn HistoryStore,
    reporter: &Reporter,
    json: bool,
    out: &mut dyn Write,
) -> Result<()> {
    let records: Vec<AppliedRecord> = store.applied().await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
        return Ok(());
    }

    if records.is_empty() {
        reporter.info("No upgrades have been applied.");
        return Ok(());
    }
    reporter.info("Following upgrade(s) have been applied:");
    for record in &records {
        reporter.info(format!(
            " * {} ({})",
            record.upgrade_id,
            record.applied_at.format("%Y-%m-%d %H:%M:%S")
        ));
    }
    Ok(())
}

/// Roots scanned for a release recipe: configured roots plus the target path.
fn release_roots(config: &UpgraderConfig, path: &Path) -> Vec<PathBuf> {
    let canonical = |p: &Path| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    let target = canonical(path);
    let mut roots = config.effective_search_roots();
    if !roots.iter().any(|root| canonical(root) == target) {
        roots.push(path.to_path_buf());
    }
    roots
}

/// Scaffold a recipe
async fn cmd_create(
    kind: RecipeKind,
    request: &RecipeRequest,
    config: &UpgraderConfig,
    store: &dyn HistoryStore,
    reporter: &Reporter,
) -> Result<()> {
    let recipe = match kind {
        RecipeKind::Dated => create_recipe(request, store).await?,
        RecipeKind::Release => {
            let discovery = Discovery::from_search_roots(release_roots(config, &request.path));
            let registry = load_registry(&discovery)?;
            create_release(request, &registry)?
        }
    };

    reporter.info(format!("Created new upgrade {}", recipe.path.display()));
    reporter.info(format!("Depends on: {}", recipe.depends_on.join(", ")));
    if recipe
        .depends_on
        .iter()
        .any(|dep| dep == upgrader_core::recipe::DEPENDS_ON_PLACEHOLDER)
    {
        reporter.warning("No applied upgrade found for this repository; edit depends_on.");
    }
    Ok(())
}
