//! Upgrader configuration file.
//!
//! ```toml
//! search_roots = ["./modules/core", "./modules/search"]
//! log_file = "var/log/upgrade.log"
//! worker_lock = "var/run/worker.pid"
//!
//! [store]
//! url = "surrealkv://.upgrader/db"
//! namespace = "upgrader"
//! database = "main"
//! ```
//!
//! Command-line flags and their environment variables override file values.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use upgrader_state::StoreConfig;

use crate::checks::CheckRunner;
use crate::discovery::Discovery;
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpgraderConfig {
    /// Roots scanned for `upgrades/*.toml`, in order.
    pub search_roots: Vec<PathBuf>,
    /// Durable log destination.
    pub log_file: Option<PathBuf>,
    /// History store connection.
    pub store: StoreConfig,
    /// Background worker lock/pid file checked before upgrading.
    pub worker_lock: Option<PathBuf>,
}

impl UpgraderConfig {
    /// Read and parse a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// [`load`](Self::load) when a path is given, defaults otherwise.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Configured roots, or the current directory when none are set.
    pub fn effective_search_roots(&self) -> Vec<PathBuf> {
        if self.search_roots.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.search_roots.clone()
        }
    }

    pub fn discovery(&self) -> Discovery {
        Discovery::from_search_roots(self.effective_search_roots())
    }

    pub fn check_runner(&self) -> CheckRunner {
        CheckRunner::with_defaults(self.worker_lock.clone())
    }
}
