//! Configure and build steps for the extension sources

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use log::info;

use crate::config::InstallerConfig;
use crate::error::{InstallerError, Result};
use crate::process::{CommandRunner, CommandSpec};

/// Environment handed to cmake and make
///
/// Only the child processes see these values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildEnv {
    pub c_include_path: OsString,
    pub cplus_include_path: OsString,
    pub pg_config: PathBuf,
}

impl BuildEnv {
    pub fn new(config: &InstallerConfig, pg_config: &Path) -> Result<Self> {
        let include_dir = &config.build.include_dir;
        Ok(Self {
            c_include_path: prepend_path(
                include_dir,
                config.build.inherited_c_include_path.as_ref(),
            )?,
            cplus_include_path: prepend_path(
                include_dir,
                config.build.inherited_cplus_include_path.as_ref(),
            )?,
            pg_config: pg_config.to_path_buf(),
        })
    }

    pub fn vars(&self) -> [(&'static str, OsString); 3] {
        [
            ("C_INCLUDE_PATH", self.c_include_path.clone()),
            ("CPLUS_INCLUDE_PATH", self.cplus_include_path.clone()),
            ("PG_CONFIG", self.pg_config.clone().into_os_string()),
        ]
    }
}

fn prepend_path(first: &Path, inherited: Option<&OsString>) -> Result<OsString> {
    let mut parts = vec![first.to_path_buf()];
    if let Some(rest) = inherited {
        parts.extend(std::env::split_paths(rest));
    }
    std::env::join_paths(parts)
        .map_err(|e| InstallerError::Config(format!("invalid include path: {e}")))
}

/// `cmake <args> -S . -B <build_dir>` in the source dir
pub fn configure_command(config: &InstallerConfig, env: &BuildEnv) -> CommandSpec {
    CommandSpec::new(&config.build.cmake)
        .args(config.build.cmake_args.iter())
        .args(["-S".into(), ".".into(), "-B".into(), config.build_dir.clone().into_os_string()])
        .envs(env.vars())
        .current_dir(&config.source_dir)
        .timeout(config.build.timeout())
}

/// `make -C <build_dir>` in the source dir
pub fn build_command(config: &InstallerConfig, env: &BuildEnv) -> CommandSpec {
    CommandSpec::new(&config.build.make)
        .arg("-C")
        .arg(config.build_dir.clone())
        .envs(env.vars())
        .current_dir(&config.source_dir)
        .timeout(config.build.timeout())
}

/// Run configure then build; the first failure aborts
pub async fn compile<R: CommandRunner>(
    runner: &R,
    config: &InstallerConfig,
    env: &BuildEnv,
) -> Result<()> {
    let configure = configure_command(config, env);
    info!("Configuring: {configure}");
    runner.run(&configure).await?;

    let build = build_command(config, env);
    info!("Building: {build}");
    runner.run(&build).await?;

    Ok(())
}
