//! Discovery: loads unit definitions from an ordered list of sources into an
//! immutable registry.
//!
//! Validation collects every broken definition (missing mandatory capability,
//! unparsable id, non-positive estimate, duplicate id, malformed manifest) and
//! raises them together as one `DiscoveryError::BrokenUnits`.

pub mod command;
pub mod manifest;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{BrokenUnit, DiscoveryError};
use crate::unit::{UnitDefinition, UpgradeUnit};

pub use command::ShellProcedure;
pub use manifest::{ManifestDirectory, UnitManifest, UPGRADES_DIR};

/// A search location producing candidate unit definitions.
pub trait UnitSource: Send + Sync {
    /// Human-readable location, used in diagnostics.
    fn describe(&self) -> String;

    /// Load every candidate definition. Only unreadable locations fail here;
    /// invalid definitions are returned and rejected by [`Discovery::load`].
    fn load(&self) -> Result<Vec<UnitDefinition>, DiscoveryError>;
}

/// Unit definitions constructed in code.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    name: String,
    definitions: Vec<UnitDefinition>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definitions: Vec::new(),
        }
    }

    pub fn with(mut self, definition: UnitDefinition) -> Self {
        self.definitions.push(definition);
        self
    }
}

impl UnitSource for StaticSource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<Vec<UnitDefinition>, DiscoveryError> {
        Ok(self.definitions.clone())
    }
}

/// Immutable `id -> UpgradeUnit` mapping.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    units: BTreeMap<String, Arc<UpgradeUnit>>,
}

impl Registry {
    pub fn get(&self, id: &str) -> Option<&Arc<UpgradeUnit>> {
        self.units.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Units in ascending id order.
    pub fn units(&self) -> impl Iterator<Item = &Arc<UpgradeUnit>> {
        self.units.values()
    }

    /// Copy of the registry with `id` removed.
    pub fn without(&self, id: &str) -> Self {
        let mut units = self.units.clone();
        units.remove(id);
        Self { units }
    }
}

impl FromIterator<UpgradeUnit> for Registry {
    fn from_iter<I: IntoIterator<Item = UpgradeUnit>>(iter: I) -> Self {
        Self {
            units: iter
                .into_iter()
                .map(|u| (u.id().to_string(), Arc::new(u)))
                .collect(),
        }
    }
}

/// Ordered set of unit sources.
#[derive(Default)]
pub struct Discovery {
    sources: Vec<Box<dyn UnitSource>>,
}

impl Discovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// One [`ManifestDirectory`] per search root, in order.
    pub fn from_search_roots<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        roots
            .into_iter()
            .fold(Self::new(), |d, root| d.with_source(ManifestDirectory::new(root)))
    }

    pub fn with_source(mut self, source: impl UnitSource + 'static) -> Self {
        self.sources.push(Box::new(source));
        self
    }

    /// Load, validate and index every unit.
    pub fn load(&self) -> Result<Registry, DiscoveryError> {
        let mut candidates: BTreeMap<String, Vec<(String, UnitDefinition)>> = BTreeMap::new();
        for source in &self.sources {
            let location = source.describe();
            let definitions = source.load()?;
            tracing::debug!(
                location = %location,
                count = definitions.len(),
                "loaded unit definitions"
            );
            for def in definitions {
                candidates
                    .entry(def.id.clone())
                    .or_default()
                    .push((location.clone(), def));
            }
        }

        let mut units = BTreeMap::new();
        let mut broken = Vec::new();
        for (id, mut defs) in candidates {
            if defs.len() > 1 {
                let locations: Vec<String> = defs.into_iter().map(|(loc, _)| loc).collect();
                broken.push(BrokenUnit {
                    id,
                    defects: vec![format!(
                        "duplicate upgrade id defined in: {}",
                        locations.join(", ")
                    )],
                });
                continue;
            }
            let Some((_, def)) = defs.pop() else {
                continue;
            };
            match def.validate() {
                Ok(unit) => {
                    units.insert(id, Arc::new(unit));
                }
                Err(defects) => broken.push(BrokenUnit { id, defects }),
            }
        }

        if !broken.is_empty() {
            return Err(DiscoveryError::BrokenUnits { units: broken });
        }
        Ok(Registry { units })
    }
}
