//! Upgrade unit model: procedures, candidate definitions and validated units.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use upgrader_state::storage_traits::repository_of;

use crate::error::DiscoveryError;
use crate::reporter::Reporter;

/// Outcome of a procedure: `Err` carries every failure message.
pub type StepResult = std::result::Result<(), Vec<String>>;

/// A callable step of an upgrade unit (`do_upgrade`, `pre_upgrade`, `post_upgrade`).
///
/// Procedures report progress and warnings through the reporter they are handed;
/// the reporter already carries the unit id as its context.
#[async_trait]
pub trait Procedure: Send + Sync {
    async fn call(&self, reporter: &Reporter) -> StepResult;
}

/// Adapter turning a plain closure into a [`Procedure`].
pub struct FnProcedure<F>(F);

#[async_trait]
impl<F> Procedure for FnProcedure<F>
where
    F: Fn(&Reporter) -> StepResult + Send + Sync,
{
    async fn call(&self, reporter: &Reporter) -> StepResult {
        (self.0)(reporter)
    }
}

/// Wrap a closure as a shareable procedure.
pub fn procedure_fn<F>(f: F) -> Arc<dyn Procedure>
where
    F: Fn(&Reporter) -> StepResult + Send + Sync + 'static,
{
    Arc::new(FnProcedure(f))
}

/// Derive the repository from an upgrade id.
///
/// `demo_2024_05_01_add_index` and `demo_release_1_0_0` both belong to `demo`.
/// The first dated or `release` separator wins. The history store applies the
/// same rule when it looks up the newest applied id of a repository.
pub fn parse_repository(id: &str) -> std::result::Result<String, DiscoveryError> {
    repository_of(id)
        .map(str::to_string)
        .ok_or_else(|| DiscoveryError::UnparsableId { id: id.to_string() })
}

/// A candidate unit definition as produced by a source, before validation.
///
/// Every capability is optional here; discovery decides which gaps are fatal.
#[derive(Clone, Default)]
pub struct UnitDefinition {
    pub id: String,
    pub info: Option<String>,
    pub depends_on: Vec<String>,
    pub estimate: Option<i64>,
    pub do_upgrade: Option<Arc<dyn Procedure>>,
    pub pre_upgrade: Option<Arc<dyn Procedure>>,
    pub post_upgrade: Option<Arc<dyn Procedure>>,
    /// Problems found by the source itself (malformed file, unknown keys).
    pub load_defects: Vec<String>,
}

impl UnitDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn info(mut self, info: impl Into<String>) -> Self {
        self.info = Some(info.into());
        self
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn estimate(mut self, seconds: i64) -> Self {
        self.estimate = Some(seconds);
        self
    }

    pub fn do_upgrade(mut self, procedure: Arc<dyn Procedure>) -> Self {
        self.do_upgrade = Some(procedure);
        self
    }

    pub fn pre_upgrade(mut self, procedure: Arc<dyn Procedure>) -> Self {
        self.pre_upgrade = Some(procedure);
        self
    }

    pub fn post_upgrade(mut self, procedure: Arc<dyn Procedure>) -> Self {
        self.post_upgrade = Some(procedure);
        self
    }

    /// Validate into an [`UpgradeUnit`], or return every defect found.
    pub fn validate(self) -> std::result::Result<UpgradeUnit, Vec<String>> {
        let mut defects = self.load_defects;

        let repository = match parse_repository(&self.id) {
            Ok(repository) => Some(repository),
            Err(err) => {
                defects.push(err.to_string());
                None
            }
        };
        if self.info.is_none() {
            defects.push("missing mandatory capability 'info'".to_string());
        }
        if self.do_upgrade.is_none() {
            defects.push("missing mandatory capability 'do_upgrade'".to_string());
        }
        let estimate = match self.estimate {
            Some(seconds) if seconds <= 0 => {
                defects.push(format!("estimate must be positive, got {seconds}"));
                None
            }
            Some(seconds) => Some(seconds as u64),
            None => None,
        };

        match (repository, self.info, self.do_upgrade) {
            (Some(repository), Some(info), Some(do_upgrade)) if defects.is_empty() => {
                Ok(UpgradeUnit {
                    id: self.id,
                    repository,
                    depends_on: self.depends_on.into_iter().collect(),
                    info,
                    estimate,
                    do_upgrade,
                    pre_upgrade: self.pre_upgrade,
                    post_upgrade: self.post_upgrade,
                })
            }
            _ => Err(defects),
        }
    }
}

impl fmt::Debug for UnitDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDefinition")
            .field("id", &self.id)
            .field("info", &self.info)
            .field("depends_on", &self.depends_on)
            .field("estimate", &self.estimate)
            .field("do_upgrade", &self.do_upgrade.is_some())
            .field("pre_upgrade", &self.pre_upgrade.is_some())
            .field("post_upgrade", &self.post_upgrade.is_some())
            .field("load_defects", &self.load_defects)
            .finish()
    }
}

/// A validated upgrade unit. Immutable once discovered.
#[derive(Clone)]
pub struct UpgradeUnit {
    id: String,
    repository: String,
    depends_on: BTreeSet<String>,
    info: String,
    estimate: Option<u64>,
    do_upgrade: Arc<dyn Procedure>,
    pre_upgrade: Option<Arc<dyn Procedure>>,
    post_upgrade: Option<Arc<dyn Procedure>>,
}

impl UpgradeUnit {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn depends_on(&self) -> &BTreeSet<String> {
        &self.depends_on
    }

    pub fn info(&self) -> &str {
        &self.info
    }

    /// First non-empty line of `info`, trimmed.
    pub fn summary(&self) -> &str {
        self.info
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }

    /// Declared estimate in seconds, if any.
    pub fn estimate(&self) -> Option<u64> {
        self.estimate
    }

    pub fn do_upgrade(&self) -> &Arc<dyn Procedure> {
        &self.do_upgrade
    }

    pub fn pre_upgrade(&self) -> Option<&Arc<dyn Procedure>> {
        self.pre_upgrade.as_ref()
    }

    pub fn post_upgrade(&self) -> Option<&Arc<dyn Procedure>> {
        self.post_upgrade.as_ref()
    }
}

impl fmt::Debug for UpgradeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeUnit")
            .field("id", &self.id)
            .field("repository", &self.repository)
            .field("depends_on", &self.depends_on)
            .field("estimate", &self.estimate)
            .finish_non_exhaustive()
    }
}
