//! Recipe generator: scaffolds new unit manifests.
//!
//! Two variants exist. A dated recipe depends on the newest applied unit of
//! its repository. A release recipe depends on every end-point of the
//! repository's full graph, history ignored, so that it anchors branches that
//! are already applied as well as pending ones.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use tempfile::NamedTempFile;
use upgrader_state::HistoryStore;

use crate::discovery::{Registry, UPGRADES_DIR};
use crate::error::RecipeError;
use crate::scheduler::find_endpoints;
use crate::unit::parse_repository;

/// `depends_on` placeholder when nothing has been applied yet.
pub const DEPENDS_ON_PLACEHOLDER: &str = "CHANGE_ME";

/// Which template to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeKind {
    /// `<repository>_<YYYY_MM_DD>_rename_me.toml`
    Dated,
    /// `<repository>_release_x_y_z.toml`
    Release,
}

/// Parameters for one generated recipe.
#[derive(Debug, Clone)]
pub struct RecipeRequest {
    /// Directory that receives (or already has) an `upgrades/` sub-directory.
    pub path: PathBuf,
    /// Repository override; inferred from `path` when absent.
    pub repository: Option<String>,
    /// Explicit dependencies (dated recipes only).
    pub depends_on: Vec<String>,
    /// Overwrite an existing file.
    pub force: bool,
    /// Date used in the dated filename.
    pub date: NaiveDate,
}

impl RecipeRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            repository: None,
            depends_on: Vec::new(),
            force: false,
            date: Local::now().date_naive(),
        }
    }
}

/// A written recipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedRecipe {
    pub id: String,
    pub path: PathBuf,
    pub depends_on: Vec<String>,
}

/// Repository name derived from a directory name: lowercased, every
/// non-alphanumeric character mapped to `_`.
pub fn repository_from_path(path: &Path) -> Option<String> {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let name = resolved.file_name()?.to_str()?;
    let repository: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = repository.trim_matches('_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn resolve_repository(request: &RecipeRequest) -> Result<String, RecipeError> {
    match &request.repository {
        Some(repository) => Ok(repository.clone()),
        None => repository_from_path(&request.path).ok_or_else(|| RecipeError::NoRepository {
            path: request.path.clone(),
        }),
    }
}

/// The generated id must map back to the requested repository.
fn checked_id(id: String, repository: &str) -> Result<String, RecipeError> {
    match parse_repository(&id) {
        Ok(parsed) if parsed == repository => Ok(id),
        _ => Err(RecipeError::UnparsableGeneratedId {
            id,
            repository: repository.to_string(),
        }),
    }
}

fn toml_array(ids: &[String]) -> String {
    let items: Vec<String> = ids
        .iter()
        .map(|id| toml::Value::String(id.clone()).to_string())
        .collect();
    format!("[{}]", items.join(", "))
}

fn dated_template(id: &str, repository: &str, depends_on: &[String]) -> String {
    format!(
        r#"# Upgrade recipe {id}
#
# Rename this file to {repository}_<YYYY_MM_DD>_<short_name>.toml; the file
# name is the upgrade id.

# Short description; the first line is shown in upgrade plans.
info = "Describe the upgrade"

depends_on = {depends_on}

# Estimated run time in seconds.
# estimate = 1

# Shell command run from the upgrades/ directory with UPGRADE_ID set.
# A non-zero exit fails the upgrade; stderr lines are the error messages.
do_upgrade = "echo 'upgrade not implemented' >&2; exit 1"

# Optional check run before any upgrade is applied. Failures block the batch.
# pre_upgrade = "true"

# Optional check run after the batch. Failures are reported as warnings.
# post_upgrade = "true"
"#,
        depends_on = toml_array(depends_on),
    )
}

fn release_template(id: &str, repository: &str, depends_on: &[String]) -> String {
    format!(
        r#"# Release recipe {id}
#
# Rename this file to {repository}_release_<major>_<minor>_<patch>.toml.

info = "Release x.y.z"

depends_on = {depends_on}

do_upgrade = "true"
"#,
        depends_on = toml_array(depends_on),
    )
}

fn write_recipe(
    request: &RecipeRequest,
    id: String,
    depends_on: Vec<String>,
    body: String,
) -> Result<GeneratedRecipe, RecipeError> {
    let dir = request.path.join(UPGRADES_DIR);
    std::fs::create_dir_all(&dir)?;

    let path = dir.join(format!("{id}.toml"));
    if path.exists() && !request.force {
        return Err(RecipeError::Exists { path });
    }

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(body.as_bytes())?;
    tmp.persist(&path).map_err(|e| e.error)?;

    tracing::info!(upgrade_id = %id, path = %path.display(), "recipe written");
    Ok(GeneratedRecipe {
        id,
        path,
        depends_on,
    })
}

/// Dated recipe depending on `request.depends_on`, or on the newest applied
/// unit of the repository, or on the placeholder.
pub async fn create_recipe(
    request: &RecipeRequest,
    store: &dyn HistoryStore,
) -> Result<GeneratedRecipe, RecipeError> {
    let repository = resolve_repository(request)?;
    let id = checked_id(
        format!("{repository}_{}_rename_me", request.date.format("%Y_%m_%d")),
        &repository,
    )?;

    let depends_on = if request.depends_on.is_empty() {
        let latest = store.latest_applied(&repository).await?;
        vec![latest.unwrap_or_else(|| DEPENDS_ON_PLACEHOLDER.to_string())]
    } else {
        request.depends_on.clone()
    };

    let body = dated_template(&id, &repository, &depends_on);
    write_recipe(request, id, depends_on, body)
}

/// Release recipe depending on every end-point of the repository.
///
/// A release with the generated id that is already registered (a previous
/// scaffold about to be replaced with `force`) is left out of the end-point
/// computation, so the new file never depends on itself.
pub fn create_release(
    request: &RecipeRequest,
    registry: &Registry,
) -> Result<GeneratedRecipe, RecipeError> {
    let repository = resolve_repository(request)?;
    let id = checked_id(format!("{repository}_release_x_y_z"), &repository)?;

    let depends_on = find_endpoints(&registry.without(&id))
        .remove(&repository)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| RecipeError::NoEndpoints {
            repository: repository.clone(),
        })?;

    let body = release_template(&id, &repository, &depends_on);
    write_recipe(request, id, depends_on, body)
}
