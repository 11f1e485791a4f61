//! TOML unit manifests under `<search root>/upgrades/`.
//!
//! One file per unit, named `<id>.toml`:
//!
//! ```toml
//! info = "Add an index on records"
//! depends_on = ["demo_2024_01_01_init"]
//! estimate = 120
//! do_upgrade = "psql -f add_index.sql"
//! pre_upgrade = "test -f add_index.sql"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::command::ShellProcedure;
use super::UnitSource;
use crate::error::DiscoveryError;
use crate::unit::{Procedure, UnitDefinition};

/// Name of the sub-directory holding manifests inside a search root.
pub const UPGRADES_DIR: &str = "upgrades";

/// Extension of manifest files.
pub const MANIFEST_EXTENSION: &str = "toml";

/// On-disk manifest layout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitManifest {
    pub info: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub estimate: Option<i64>,
    pub do_upgrade: Option<String>,
    pub pre_upgrade: Option<String>,
    pub post_upgrade: Option<String>,
}

/// A search root scanned for `upgrades/*.toml`.
#[derive(Debug, Clone)]
pub struct ManifestDirectory {
    root: PathBuf,
}

impl ManifestDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn upgrades_dir(&self) -> PathBuf {
        self.root.join(UPGRADES_DIR)
    }

    fn definition(&self, id: String, path: &Path) -> Result<UnitDefinition, DiscoveryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DiscoveryError::Location {
            location: path.to_path_buf(),
            source,
        })?;

        let manifest: UnitManifest = match toml::from_str(&raw) {
            Ok(m) => m,
            Err(e) => {
                let mut def = UnitDefinition::new(id);
                def.load_defects
                    .push(format!("malformed manifest {}: {}", path.display(), e.message()));
                return Ok(def);
            }
        };

        let workdir = self.upgrades_dir();
        let shell = |command: Option<String>| -> Option<Arc<dyn Procedure>> {
            command.map(|c| {
                Arc::new(ShellProcedure::new(id.clone(), c, workdir.clone())) as Arc<dyn Procedure>
            })
        };

        let do_upgrade = shell(manifest.do_upgrade);
        let pre_upgrade = shell(manifest.pre_upgrade);
        let post_upgrade = shell(manifest.post_upgrade);

        Ok(UnitDefinition {
            id,
            info: manifest.info,
            depends_on: manifest.depends_on,
            estimate: manifest.estimate,
            do_upgrade,
            pre_upgrade,
            post_upgrade,
            load_defects: Vec::new(),
        })
    }
}

impl UnitSource for ManifestDirectory {
    fn describe(&self) -> String {
        self.upgrades_dir().display().to_string()
    }

    fn load(&self) -> Result<Vec<UnitDefinition>, DiscoveryError> {
        let dir = self.upgrades_dir();
        if !dir.is_dir() {
            tracing::debug!(location = %dir.display(), "no upgrades directory, skipping");
            return Ok(Vec::new());
        }

        let location_err = |source| DiscoveryError::Location {
            location: dir.clone(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(location_err)? {
            let path = entry.map_err(location_err)?.path();
            if path.is_file()
                && path.extension().and_then(|e| e.to_str()) == Some(MANIFEST_EXTENSION)
            {
                paths.push(path);
            }
        }
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            definitions.push(self.definition(id.to_string(), &path)?);
        }
        Ok(definitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::create_dir_all(dir.join(UPGRADES_DIR)).unwrap();
        std::fs::write(dir.join(UPGRADES_DIR).join(name), body).unwrap();
    }

    #[test]
    fn test_missing_upgrades_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let defs = ManifestDirectory::new(dir.path()).load().unwrap();
        assert!(defs.is_empty());
    }

    #[test]
    fn test_loads_manifest_fields() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "demo_2024_01_02_b.toml",
            r#"
info = "Second"
depends_on = ["demo_2024_01_01_a"]
estimate = 30
do_upgrade = "true"
post_upgrade = "true"
"#,
        );
        write(dir.path(), "README.md", "not a manifest");

        let defs = ManifestDirectory::new(dir.path()).load().unwrap();
        assert_eq!(defs.len(), 1);
        let def = &defs[0];
        assert_eq!(def.id, "demo_2024_01_02_b");
        assert_eq!(def.info.as_deref(), Some("Second"));
        assert_eq!(def.depends_on, vec!["demo_2024_01_01_a"]);
        assert_eq!(def.estimate, Some(30));
        assert!(def.do_upgrade.is_some());
        assert!(def.pre_upgrade.is_none());
        assert!(def.post_upgrade.is_some());
        assert!(def.load_defects.is_empty());
    }

    #[test]
    fn test_unknown_key_is_load_defect() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "demo_2024_01_01_a.toml",
            "info = \"x\"\ndo_upgrade = \"true\"\nrollback = \"false\"\n",
        );

        let defs = ManifestDirectory::new(dir.path()).load().unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].load_defects.len(), 1);
        assert!(defs[0].load_defects[0].contains("rollback"));
    }

    #[test]
    fn test_malformed_toml_is_load_defect() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "demo_2024_01_01_a.toml", "info = \n");

        let defs = ManifestDirectory::new(dir.path()).load().unwrap();
        assert!(defs[0].load_defects[0].starts_with("malformed manifest"));
    }
}
