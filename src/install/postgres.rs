//! PostgreSQL installation selection
//!
//! Package-manager PostgreSQL installs live under
//! `<prefix>/opt/postgresql@<major>`. The selector walks a descending list of
//! supported majors and picks the newest one whose `bin` directory exists.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{InstallerError, Result};

/// A PostgreSQL major version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PgVersion(pub u16);

impl PgVersion {
    pub const fn major(self) -> u16 {
        self.0
    }

    /// Formula name for this major, e.g. `postgresql@16`
    pub fn formula_name(self) -> String {
        format!("postgresql@{}", self.0)
    }
}

impl fmt::Display for PgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PgVersion {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim().trim_start_matches("postgresql@");
        trimmed
            .parse::<u16>()
            .map(PgVersion)
            .map_err(|_| InstallerError::InvalidVersion(s.to_string()))
    }
}

/// Supported majors, newest first
pub const SUPPORTED_VERSIONS: [PgVersion; 6] = [
    PgVersion(16),
    PgVersion(15),
    PgVersion(14),
    PgVersion(13),
    PgVersion(12),
    PgVersion(11),
];

/// Major pulled in as a build dependency when nothing is installed
pub const FALLBACK_VERSION: PgVersion = PgVersion(15);

/// What to do when no candidate is installed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnMissing {
    /// Report absence and let the caller fall back
    #[default]
    ReturnNone,
    /// Abort immediately
    Fail,
}

impl FromStr for OnMissing {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "return-none" | "none" => Ok(Self::ReturnNone),
            "fail" => Ok(Self::Fail),
            other => Err(InstallerError::Config(format!(
                "unknown on-missing policy `{other}` (expected `return-none` or `fail`)"
            ))),
        }
    }
}

/// A discovered PostgreSQL installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresInstall {
    pub version: PgVersion,
    pub root: PathBuf,
}

impl PostgresInstall {
    pub fn at(prefix: &Path, version: PgVersion) -> Self {
        Self {
            version,
            root: prefix.join("opt").join(version.formula_name()),
        }
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn pg_config(&self) -> PathBuf {
        self.bin_dir().join("pg_config")
    }

    /// Installed means the `bin` directory is present
    pub fn is_present(&self) -> bool {
        self.bin_dir().exists()
    }
}

/// Picks the newest installed PostgreSQL from an ordered candidate list
#[derive(Debug, Clone)]
pub struct PostgresSelector {
    package_prefix: PathBuf,
    candidates: Vec<PgVersion>,
}

impl PostgresSelector {
    /// `candidates` are checked in the order given
    pub fn new(package_prefix: impl Into<PathBuf>, candidates: Vec<PgVersion>) -> Self {
        Self {
            package_prefix: package_prefix.into(),
            candidates,
        }
    }

    pub fn with_supported_versions(package_prefix: impl Into<PathBuf>) -> Self {
        Self::new(package_prefix, SUPPORTED_VERSIONS.to_vec())
    }

    pub fn package_prefix(&self) -> &Path {
        &self.package_prefix
    }

    pub fn candidates(&self) -> &[PgVersion] {
        &self.candidates
    }

    /// Return the first present candidate, applying `policy` when none is
    pub fn select(&self, policy: OnMissing) -> Result<Option<PostgresInstall>> {
        for &version in &self.candidates {
            let install = PostgresInstall::at(&self.package_prefix, version);
            if install.is_present() {
                info!(
                    "Selected PostgreSQL {} at {}",
                    version,
                    install.root.display()
                );
                return Ok(Some(install));
            }
            debug!("PostgreSQL {} not found at {}", version, install.root.display());
        }

        match policy {
            OnMissing::ReturnNone => Ok(None),
            OnMissing::Fail => Err(InstallerError::PostgresNotFound {
                candidates: self.candidates.clone(),
            }),
        }
    }
}
