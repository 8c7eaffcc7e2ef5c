use std::path::PathBuf;

use anyhow::{Context, Result};
use lantern_install::cli::{Args, Cmd};
use lantern_install::config::InstallerConfig;
use lantern_install::install::{OnMissing, caveats, runners};
use log::error;

fn main() {
    // Initialize logger with custom format
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "[{} {} {}:{}] {}",
                buf.timestamp_millis(),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("FATAL: Failed to create Tokio runtime: {e}");
            std::process::exit(1);
        }
    };
    match rt.block_on(real_main()) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}

/// Returns `false` when the command ran but reported a negative answer
async fn real_main() -> Result<bool> {
    let args = Args::parse_args();
    let mut config =
        InstallerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.sub {
        Cmd::Install {
            source_dir,
            prefix,
            pg_config,
            on_missing,
            dry_run,
        } => {
            if let Some(dir) = source_dir {
                config.source_dir = dir;
            }
            override_prefix(&mut config, prefix);
            if let Some(path) = pg_config {
                config.postgres.pg_config = Some(path);
            }
            if let Some(policy) = on_missing {
                config.postgres.on_missing = policy;
            }
            runners::run_install(&config, dry_run).await?;
        }
        Cmd::Finish {
            prefix,
            yes,
            direct,
        } => {
            override_prefix(&mut config, prefix);
            runners::run_finish(&config, yes, direct).await?;
        }
        Cmd::Plan { prefix, format } => {
            override_prefix(&mut config, prefix);
            runners::run_plan(&config, format)?;
        }
        Cmd::Locate { command } => return Ok(runners::run_locate(&command)),
        Cmd::SelectPostgres { on_missing } => {
            let policy: OnMissing = on_missing.unwrap_or(config.postgres.on_missing);
            runners::run_select_postgres(&config, policy)?;
        }
        Cmd::Status => runners::run_status(&config).await?,
        Cmd::Fetch { dest, url, sha256 } => {
            if let (Some(url), Some(sha256)) = (url, sha256) {
                config.source.url = url;
                config.source.sha256 = sha256;
            }
            runners::run_fetch(&config, &dest).await?;
        }
        Cmd::SmokeTest => runners::run_smoke_test(&config).await?,
        Cmd::Caveats => println!("{}", caveats(&config)),
    }
    Ok(true)
}

fn override_prefix(config: &mut InstallerConfig, prefix: Option<PathBuf>) {
    if prefix.is_some() {
        config.prefix = prefix;
    }
}
