//! `pg_config` resolution and queries

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use log::{debug, info, warn};
use regex::Regex;

use crate::config::InstallerConfig;
use crate::error::{InstallerError, Result};
use crate::process::{CommandRunner, CommandSpec};

use super::locator::{ExecutableLocator, is_executable_file};
use super::postgres::{PgVersion, PostgresInstall, PostgresSelector};

const PG_CONFIG: &str = "pg_config";
const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

static VERSION_RE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"PostgreSQL\s+(\d+)"));

/// Where a `pg_config` path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgConfigSource {
    Explicit,
    PgRoot,
    SearchPath,
    Fallback,
    Selected(PgVersion),
    BuildDependency(PgVersion),
}

/// A resolved `pg_config` executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    path: PathBuf,
    source: PgConfigSource,
}

impl PgConfig {
    pub fn new(path: impl Into<PathBuf>, source: PgConfigSource) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> PgConfigSource {
        self.source
    }

    /// Resolve `pg_config` in priority order:
    /// explicit path, `PGROOT`, search path, fixed fallback, then the newest
    /// package-manager install (subject to the configured missing policy)
    pub fn resolve(config: &InstallerConfig, locator: &ExecutableLocator) -> Result<Self> {
        if let Some(path) = &config.postgres.pg_config {
            info!("Using explicit pg_config: {}", path.display());
            return Ok(Self::new(path, PgConfigSource::Explicit));
        }

        if let Some(root) = &config.postgres.pg_root {
            let path = root.join("bin").join(PG_CONFIG);
            info!("Using pg_config under PGROOT: {}", path.display());
            return Ok(Self::new(path, PgConfigSource::PgRoot));
        }

        if let Some(path) = locator.find(PG_CONFIG) {
            info!("Found pg_config on search path: {}", path.display());
            return Ok(Self::new(path, PgConfigSource::SearchPath));
        }

        let fallback = &config.postgres.fallback_pg_config;
        if fallback.is_file() {
            info!("Using fallback pg_config: {}", fallback.display());
            return Ok(Self::new(fallback, PgConfigSource::Fallback));
        }

        let selector =
            PostgresSelector::new(&config.package_prefix, config.postgres.versions.clone());
        match selector.select(config.postgres.on_missing)? {
            Some(install) => Ok(Self::new(
                install.pg_config(),
                PgConfigSource::Selected(install.version),
            )),
            None => {
                let version = config.postgres.fallback_version;
                let install = PostgresInstall::at(&config.package_prefix, version);
                let path = install.pg_config();
                warn!(
                    "No installed PostgreSQL found, falling back to build dependency {}",
                    version.formula_name()
                );
                if !is_executable_file(&path) {
                    return Err(InstallerError::PgConfigNotFound(format!(
                        "no pg_config on PATH, at {}, or under {} (install {} first)",
                        fallback.display(),
                        install.root.display(),
                        version.formula_name()
                    )));
                }
                Ok(Self::new(path, PgConfigSource::BuildDependency(version)))
            }
        }
    }

    async fn query<R: CommandRunner>(&self, runner: &R, flag: &str) -> Result<String> {
        let spec = CommandSpec::new(&self.path)
            .arg(flag)
            .timeout(QUERY_TIMEOUT);
        let out = runner.run(&spec).await?;
        let value = out.stdout.trim().to_string();
        debug!("pg_config {flag} = {value}");
        Ok(value)
    }

    /// Directory for loadable modules (`--pkglibdir`)
    pub async fn pkglibdir<R: CommandRunner>(&self, runner: &R) -> Result<PathBuf> {
        self.query(runner, "--pkglibdir").await.map(PathBuf::from)
    }

    /// Architecture-independent support files (`--sharedir`)
    pub async fn sharedir<R: CommandRunner>(&self, runner: &R) -> Result<PathBuf> {
        self.query(runner, "--sharedir").await.map(PathBuf::from)
    }

    /// User executables (`--bindir`)
    pub async fn bindir<R: CommandRunner>(&self, runner: &R) -> Result<PathBuf> {
        self.query(runner, "--bindir").await.map(PathBuf::from)
    }

    /// Server major version from `--version` (`PostgreSQL 16.2` → 16)
    pub async fn version<R: CommandRunner>(&self, runner: &R) -> Result<PgVersion> {
        let raw = self.query(runner, "--version").await?;
        parse_version(&raw)
    }
}

/// Extract the major version from `pg_config --version` output
pub fn parse_version(raw: &str) -> Result<PgVersion> {
    let re = VERSION_RE
        .as_ref()
        .map_err(|e| InstallerError::InvalidVersion(e.to_string()))?;
    re.captures(raw)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u16>().ok())
        .map(PgVersion)
        .ok_or_else(|| InstallerError::InvalidVersion(raw.trim().to_string()))
}

/// Extension directory inside a PostgreSQL share dir
pub fn extension_dir(sharedir: &Path) -> PathBuf {
    sharedir.join("extension")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use std::fs;

    struct Answers;

    impl CommandRunner for Answers {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let stdout = match spec.args[0].to_str().unwrap() {
                "--pkglibdir" => "/usr/lib/postgresql/16/lib\n",
                "--sharedir" => "/usr/share/postgresql/16\n",
                "--version" => "PostgreSQL 16.2 (Homebrew)\n",
                _ => "",
            };
            Ok(CommandOutput {
                stdout: stdout.into(),
                stderr: String::new(),
            })
        }
    }

    fn isolated_config(prefix: &Path) -> InstallerConfig {
        let mut config = InstallerConfig {
            package_prefix: prefix.to_path_buf(),
            ..InstallerConfig::default()
        };
        config.postgres.fallback_pg_config = prefix.join("no/such/pg_config");
        config
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;

        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn explicit_path_wins() {
        let prefix = tempfile::tempdir().unwrap();
        let mut config = isolated_config(prefix.path());
        config.postgres.pg_config = Some("/custom/pg_config".into());
        config.postgres.pg_root = Some("/pgroot".into());

        let pg = PgConfig::resolve(&config, &ExecutableLocator::default()).unwrap();
        assert_eq!(pg.path(), Path::new("/custom/pg_config"));
        assert_eq!(pg.source(), PgConfigSource::Explicit);
    }

    #[test]
    fn pgroot_comes_next() {
        let prefix = tempfile::tempdir().unwrap();
        let mut config = isolated_config(prefix.path());
        config.postgres.pg_root = Some("/pgroot".into());

        let pg = PgConfig::resolve(&config, &ExecutableLocator::default()).unwrap();
        assert_eq!(pg.path(), Path::new("/pgroot/bin/pg_config"));
        assert_eq!(pg.source(), PgConfigSource::PgRoot);
    }

    #[cfg(unix)]
    #[test]
    fn search_path_beats_selector() {
        let prefix = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        make_executable(&bin.path().join("pg_config"));
        fs::create_dir_all(prefix.path().join("opt/postgresql@16/bin")).unwrap();

        let config = isolated_config(prefix.path());
        let locator = ExecutableLocator::new(vec![bin.path().into()], Vec::new());
        let pg = PgConfig::resolve(&config, &locator).unwrap();
        assert_eq!(pg.path(), bin.path().join("pg_config"));
        assert_eq!(pg.source(), PgConfigSource::SearchPath);
    }

    #[test]
    fn fallback_file_is_used_when_present() {
        let prefix = tempfile::tempdir().unwrap();
        let mut config = isolated_config(prefix.path());
        let fallback = prefix.path().join("pg_config");
        fs::write(&fallback, "").unwrap();
        config.postgres.fallback_pg_config = fallback.clone();

        let pg = PgConfig::resolve(&config, &ExecutableLocator::default()).unwrap();
        assert_eq!(pg.path(), fallback);
        assert_eq!(pg.source(), PgConfigSource::Fallback);
    }

    #[test]
    fn selector_picks_newest_install() {
        let prefix = tempfile::tempdir().unwrap();
        fs::create_dir_all(prefix.path().join("opt/postgresql@14/bin")).unwrap();
        fs::create_dir_all(prefix.path().join("opt/postgresql@16/bin")).unwrap();

        let config = isolated_config(prefix.path());
        let pg = PgConfig::resolve(&config, &ExecutableLocator::default()).unwrap();
        assert_eq!(pg.path(), prefix.path().join("opt/postgresql@16/bin/pg_config"));
        assert_eq!(pg.source(), PgConfigSource::Selected(PgVersion(16)));
    }

    #[test]
    fn nothing_installed_fails_under_either_policy() {
        let prefix = tempfile::tempdir().unwrap();
        let mut config = isolated_config(prefix.path());

        let err = PgConfig::resolve(&config, &ExecutableLocator::default()).unwrap_err();
        assert!(matches!(err, InstallerError::PgConfigNotFound(_)));

        config.postgres.on_missing = crate::install::postgres::OnMissing::Fail;
        let err = PgConfig::resolve(&config, &ExecutableLocator::default()).unwrap_err();
        assert!(matches!(err, InstallerError::PostgresNotFound { .. }));
    }

    #[tokio::test]
    async fn queries_trim_output() {
        let pg = PgConfig::new("/x/pg_config", PgConfigSource::Explicit);
        assert_eq!(
            pg.pkglibdir(&Answers).await.unwrap(),
            PathBuf::from("/usr/lib/postgresql/16/lib")
        );
        assert_eq!(
            pg.sharedir(&Answers).await.unwrap(),
            PathBuf::from("/usr/share/postgresql/16")
        );
        assert_eq!(pg.version(&Answers).await.unwrap(), PgVersion(16));
    }

    #[test]
    fn parses_version_strings() {
        assert_eq!(parse_version("PostgreSQL 11.22").unwrap(), PgVersion(11));
        assert_eq!(parse_version("PostgreSQL 16devel").unwrap(), PgVersion(16));
        assert!(parse_version("garbage").is_err());
        // compiled once, still usable on later calls
        assert_eq!(parse_version("pg_config (PostgreSQL) 15.4").unwrap(), PgVersion(15));
    }
}
