//! Top-level runners behind each CLI subcommand

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;
use termcolor::Color;

use crate::cli::PlanFormat;
use crate::config::InstallerConfig;
use crate::process::SystemRunner;

use super::detection::check_installation_state;
use super::locator::ExecutableLocator;
use super::orchestration::{InstallOrchestrator, caveats};
use super::pg_config::PgConfig;
use super::postgres::{OnMissing, PostgresSelector};
use super::privilege::{PrivilegedPlan, ShellDialect};
use super::progress::StepReporter;
use super::smoke::{SmokeTest, free_port};
use super::source::SourceArchive;
use super::wizard;

/// Run configure/build/stage and print the caveats
pub async fn run_install(config: &InstallerConfig, dry_run: bool) -> Result<()> {
    wizard::status(
        Color::Cyan,
        &format!("🔧 {} installation (platform: {})", config.extension, std::env::consts::OS),
    );

    let runner = SystemRunner;
    let report = InstallOrchestrator::new(config, ExecutableLocator::from_env(), &runner)
        .dry_run(dry_run)
        .reporter(StepReporter::spinner())
        .run()
        .await
        .context("Installation failed")?;

    wizard::show_completion(&report, &caveats(config));
    Ok(())
}

/// Execute the persisted privileged plan
pub async fn run_finish(config: &InstallerConfig, yes: bool, direct: bool) -> Result<()> {
    let plan_path = config.plan_path();
    let plan = PrivilegedPlan::load(&plan_path).with_context(|| {
        format!(
            "No finishing plan at {} (run `lantern-install install` first)",
            plan_path.display()
        )
    })?;

    let direct = direct || running_as_root();
    wizard::show_plan(&plan);
    if !yes && !wizard::confirm_privileged(!direct)? {
        anyhow::bail!("Finishing step cancelled by user");
    }

    if direct {
        plan.execute_direct()
            .context("Copying into PostgreSQL directories failed")?;
    } else {
        plan.execute_elevated(&SystemRunner)
            .await
            .context("Privileged installation failed")?;
    }
    wizard::status(Color::Green, "✓ Success.");

    wizard::status(
        Color::Cyan,
        &format!(
            "\nYou can now enable the extension from psql:\n  CREATE EXTENSION {};",
            config.extension
        ),
    );
    Ok(())
}

/// Print the persisted plan
pub fn run_plan(config: &InstallerConfig, format: PlanFormat) -> Result<()> {
    let plan = PrivilegedPlan::load(&config.plan_path())?;
    let text = match format {
        PlanFormat::Bash => plan.render(ShellDialect::Bash),
        PlanFormat::Posix => plan.render(ShellDialect::Posix),
        PlanFormat::Json => plan.to_json()? + "\n",
    };
    print!("{text}");
    Ok(())
}

/// Returns whether the command was found
pub fn run_locate(command: &str) -> bool {
    match ExecutableLocator::from_env().find(command) {
        Some(path) => {
            println!("{}", path.display());
            true
        }
        None => {
            eprintln!("{command} not found");
            false
        }
    }
}

pub fn run_select_postgres(config: &InstallerConfig, policy: OnMissing) -> Result<()> {
    let selector =
        PostgresSelector::new(&config.package_prefix, config.postgres.versions.clone());
    match selector.select(policy)? {
        Some(install) => println!("{} {}", install.version, install.root.display()),
        None => println!(
            "none (fallback build dependency: {})",
            config.postgres.fallback_version.formula_name()
        ),
    }
    Ok(())
}

pub async fn run_status(config: &InstallerConfig) -> Result<()> {
    let runner = SystemRunner;
    let pg_config = PgConfig::resolve(config, &ExecutableLocator::from_env())?;
    let pkglibdir = pg_config.pkglibdir(&runner).await?;
    let sharedir = pg_config.sharedir(&runner).await?;

    info!(
        "Checking {} in {} and {}",
        config.extension,
        pkglibdir.display(),
        sharedir.display()
    );
    let state = check_installation_state(&config.extension, &pkglibdir, &sharedir);
    wizard::show_state(&config.extension, state);
    Ok(())
}

pub async fn run_fetch(config: &InstallerConfig, dest: &Path) -> Result<PathBuf> {
    let archive = SourceArchive::from(&config.source);
    let root = archive
        .fetch(dest)
        .await
        .with_context(|| format!("Fetching {} failed", archive.url))?;
    wizard::status(
        Color::Green,
        &format!("✓ Source {} unpacked at {}", archive.version, root.display()),
    );
    Ok(root)
}

pub async fn run_smoke_test(config: &InstallerConfig) -> Result<()> {
    let runner = SystemRunner;
    let pg_config = PgConfig::resolve(config, &ExecutableLocator::from_env())?;
    let bindir = pg_config.bindir(&runner).await?;

    let workdir = tempfile::tempdir().context("Failed to create smoke test directory")?;
    let port = free_port()?;
    SmokeTest::new(&config.extension, &bindir)
        .run(&runner, workdir.path(), port)
        .await
        .context("Smoke test failed")?;

    wizard::status(Color::Green, "✓ Smoke test passed");
    Ok(())
}

#[cfg(unix)]
fn running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    false
}
