//! Installation orchestration
//!
//! One linear pass: resolve `pg_config`, configure and build the sources,
//! copy the outputs into the prefix, then record the privileged steps that
//! move them into the live PostgreSQL directories.

use std::path::PathBuf;

use log::info;

use crate::config::InstallerConfig;
use crate::error::Result;
use crate::process::CommandRunner;

use super::artifacts::ArtifactManifest;
use super::build::{self, BuildEnv};
use super::locator::ExecutableLocator;
use super::pg_config::PgConfig;
use super::privilege::{PrivilegedPlan, ShellDialect, write_file};
use super::progress::StepReporter;

/// What one orchestrator run resolved and produced
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub pg_config: PgConfig,
    pub pkglibdir: PathBuf,
    pub sharedir: PathBuf,
    pub manifest: ArtifactManifest,
    /// Files written under the prefix (empty on dry runs)
    pub installed: Vec<PathBuf>,
    pub plan: PrivilegedPlan,
    pub script_path: PathBuf,
    pub plan_path: PathBuf,
    pub dry_run: bool,
}

/// Drives a full install against a [`CommandRunner`]
pub struct InstallOrchestrator<'a, R> {
    config: &'a InstallerConfig,
    locator: ExecutableLocator,
    runner: &'a R,
    reporter: StepReporter,
    dry_run: bool,
}

impl<'a, R: CommandRunner> InstallOrchestrator<'a, R> {
    pub fn new(config: &'a InstallerConfig, locator: ExecutableLocator, runner: &'a R) -> Self {
        Self {
            config,
            locator,
            runner,
            reporter: StepReporter::hidden(),
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn reporter(mut self, reporter: StepReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub async fn run(&self) -> Result<InstallReport> {
        let config = self.config;
        let prefix = config.prefix();

        let pg_config = self
            .reporter
            .step("Locating pg_config", || {
                PgConfig::resolve(config, &self.locator)
            })?;
        let env = BuildEnv::new(config, pg_config.path())?;

        let manifest = if self.dry_run {
            info!("[dry-run] would run: {}", build::configure_command(config, &env));
            info!("[dry-run] would run: {}", build::build_command(config, &env));
            ArtifactManifest::planned(&config.extension, &config.build_path())
        } else {
            self.reporter
                .step_async("Building extension", build::compile(self.runner, config, &env))
                .await?;
            ArtifactManifest::collect(&config.extension, &config.build_path(), &config.updates_path())?
        };

        let installed = if self.dry_run {
            Vec::new()
        } else {
            self.reporter
                .step("Copying build outputs", || manifest.install_into(&prefix))?
                .files
        };

        let pkglibdir = pg_config.pkglibdir(self.runner).await?;
        let sharedir = pg_config.sharedir(self.runner).await?;

        let plan = PrivilegedPlan::for_extension(
            &config.extension,
            &prefix.join("lib").join(&manifest.library.install_name),
            &prefix.join("share"),
            &pkglibdir,
            &sharedir,
        );

        let script_path = config.script_path();
        let plan_path = config.plan_path();
        if self.dry_run {
            info!("[dry-run] would write {}", script_path.display());
        } else {
            write_file(&script_path, &plan.render(ShellDialect::Bash), 0o755)?;
            write_file(&plan_path, &plan.to_json()?, 0o644)?;
            info!("Wrote finishing script {}", script_path.display());
        }

        Ok(InstallReport {
            pg_config,
            pkglibdir,
            sharedir,
            manifest,
            installed,
            plan,
            script_path,
            plan_path,
            dry_run: self.dry_run,
        })
    }
}

/// Post-install notice shown to the operator
pub fn caveats(config: &InstallerConfig) -> String {
    let display = capitalize(&config.extension);
    format!(
        "Thank you for installing {display}!\n\
         \n\
         Run `{script}` to finish installation\n\
         \n\
         After that you can enable {display} extension from psql:\n  \
         CREATE EXTENSION {ext};\n",
        script = config.script_name,
        ext = config.extension,
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
