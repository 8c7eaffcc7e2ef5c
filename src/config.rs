//! Installer configuration
//!
//! Loaded from TOML (`--config` or `<config_dir>/lantern-install/config.toml`),
//! then overridden by the environment hooks the build has always honored:
//! `PG_CONFIG`, `PGROOT`, `HOMEBREW_PREFIX`, `C_INCLUDE_PATH` and
//! `CPLUS_INCLUDE_PATH`.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{InstallerError, Result};
use crate::install::postgres::{FALLBACK_VERSION, OnMissing, PgVersion, SUPPORTED_VERSIONS};

const CONFIG_DIR_NAME: &str = "lantern-install";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Top-level installer configuration (defaults match the 0.0.4 formula)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Extension name; drives every artifact file name
    pub extension: String,
    /// Unpacked source tree
    pub source_dir: PathBuf,
    /// Build output directory, relative to `source_dir`
    pub build_dir: PathBuf,
    /// Update scripts directory, relative to `source_dir`
    pub updates_dir: PathBuf,
    /// Install prefix; defaults to `<package_prefix>/opt/<extension>`
    pub prefix: Option<PathBuf>,
    /// Package manager prefix that holds `opt/postgresql@N`
    pub package_prefix: PathBuf,
    /// Name of the generated finishing script under `<prefix>/bin`
    pub script_name: String,
    pub postgres: PostgresConfig,
    pub build: BuildConfig,
    pub source: SourceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresConfig {
    /// Candidate majors, checked in order
    pub versions: Vec<PgVersion>,
    /// Major used when nothing is installed and the policy is `return-none`
    pub fallback_version: PgVersion,
    pub on_missing: OnMissing,
    /// Checked after the search path, before the selector
    pub fallback_pg_config: PathBuf,
    /// Explicit pg_config (`PG_CONFIG`)
    pub pg_config: Option<PathBuf>,
    /// Explicit installation root (`PGROOT`)
    pub pg_root: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub cmake: PathBuf,
    pub make: PathBuf,
    pub cmake_args: Vec<String>,
    /// Prepended to `C_INCLUDE_PATH` / `CPLUS_INCLUDE_PATH`
    pub include_dir: PathBuf,
    /// Per-command limit in seconds
    pub timeout_secs: u64,
    #[serde(skip)]
    pub inherited_c_include_path: Option<OsString>,
    #[serde(skip)]
    pub inherited_cplus_include_path: Option<OsString>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub url: String,
    pub version: String,
    pub sha256: String,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            extension: "lantern".into(),
            source_dir: PathBuf::from("."),
            build_dir: PathBuf::from("build"),
            updates_dir: PathBuf::from("sql/updates"),
            prefix: None,
            package_prefix: default_package_prefix(),
            script_name: "lantern_install".into(),
            postgres: PostgresConfig::default(),
            build: BuildConfig::default(),
            source: SourceConfig::default(),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            versions: SUPPORTED_VERSIONS.to_vec(),
            fallback_version: FALLBACK_VERSION,
            on_missing: OnMissing::ReturnNone,
            fallback_pg_config: PathBuf::from("/usr/local/bin/pg_config"),
            pg_config: None,
            pg_root: None,
        }
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cmake: PathBuf::from("cmake"),
            make: PathBuf::from("make"),
            cmake_args: vec!["-DUSEARCH_NO_MARCH_NATIVE=ON".into()],
            include_dir: PathBuf::from("/usr/local/include"),
            timeout_secs: 1800,
            inherited_c_include_path: None,
            inherited_cplus_include_path: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "https://github.com/var77/lantern/releases/download/v0.0.4/lantern-v0.0.4-source.tar.gz"
                .into(),
            version: "0.0.4".into(),
            sha256: "3ca776f0a23ad53e1a0949c509d68019b753a1e39167840e9df82bd3c5dadabf".into(),
        }
    }
}

impl BuildConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Homebrew's default prefix for the current platform
fn default_package_prefix() -> PathBuf {
    if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        PathBuf::from("/opt/homebrew")
    } else if cfg!(target_os = "macos") {
        PathBuf::from("/usr/local")
    } else {
        PathBuf::from("/home/linuxbrew/.linuxbrew")
    }
}

/// Default config file location, if a config directory exists for this user
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl InstallerConfig {
    /// Load from `path`, or the default location when it exists, then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match default_config_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path)?,
                None => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env_from(|key| std::env::var_os(key));
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| InstallerError::io(path, e))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| InstallerError::Config(format!("{}: {e}", path.display())))?;
        info!("Using config from: {}", path.display());
        Ok(config)
    }

    /// Apply environment overrides using `lookup` (empty values are ignored)
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(prefix) = get("HOMEBREW_PREFIX") {
            self.package_prefix = PathBuf::from(prefix);
        }
        if let Some(pg_config) = get("PG_CONFIG") {
            self.postgres.pg_config = Some(PathBuf::from(pg_config));
        }
        if let Some(root) = get("PGROOT") {
            self.postgres.pg_root = Some(PathBuf::from(root));
        }
        self.build.inherited_c_include_path = get("C_INCLUDE_PATH");
        self.build.inherited_cplus_include_path = get("CPLUS_INCLUDE_PATH");
    }

    pub fn validate(&self) -> Result<()> {
        if self.extension.is_empty() {
            return Err(InstallerError::Config("extension name is empty".into()));
        }
        if self.postgres.versions.is_empty() {
            return Err(InstallerError::Config(
                "postgres.versions must list at least one major".into(),
            ));
        }
        if self.script_name.contains('/') {
            return Err(InstallerError::Config(format!(
                "script_name `{}` must be a bare file name",
                self.script_name
            )));
        }
        Ok(())
    }

    pub fn prefix(&self) -> PathBuf {
        self.prefix
            .clone()
            .unwrap_or_else(|| self.package_prefix.join("opt").join(&self.extension))
    }

    pub fn build_path(&self) -> PathBuf {
        self.source_dir.join(&self.build_dir)
    }

    pub fn updates_path(&self) -> PathBuf {
        self.source_dir.join(&self.updates_dir)
    }

    pub fn script_path(&self) -> PathBuf {
        self.prefix().join("bin").join(&self.script_name)
    }

    /// Persisted privileged plan, kept out of `share/`
    pub fn plan_path(&self) -> PathBuf {
        self.prefix().join(format!("{}.json", self.script_name))
    }
}
