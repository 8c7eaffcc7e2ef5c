//! Command-line arguments for lantern-install

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::install::postgres::OnMissing;

#[derive(Parser, Debug)]
#[command(name = "lantern-install")]
#[command(version, about = "Build the Lantern extension and install it into PostgreSQL")]
pub struct Args {
    /// Path to configuration file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub sub: Cmd,
}

#[derive(Subcommand, Debug)]
pub enum Cmd {
    /// Configure, build and stage the extension under the prefix
    Install {
        /// Unpacked source tree (default: current directory)
        #[arg(long)]
        source_dir: Option<PathBuf>,

        /// Install prefix (default: <package prefix>/opt/lantern)
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Use this pg_config instead of searching for one
        #[arg(long)]
        pg_config: Option<PathBuf>,

        /// What to do when no PostgreSQL install is found: return-none | fail
        #[arg(long)]
        on_missing: Option<OnMissing>,

        /// Show what would be done without doing it
        #[arg(long)]
        dry_run: bool,
    },
    /// Copy the staged files into the live PostgreSQL directories
    Finish {
        #[arg(long)]
        prefix: Option<PathBuf>,

        /// Skip the confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,

        /// Copy in-process instead of through sudo
        #[arg(long)]
        direct: bool,
    },
    /// Print the privileged finishing plan
    Plan {
        #[arg(long)]
        prefix: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = PlanFormat::Bash)]
        format: PlanFormat,
    },
    /// Find an executable on PATH (exit 1 if not found)
    Locate { command: String },
    /// Show which PostgreSQL install would be used
    SelectPostgres {
        #[arg(long)]
        on_missing: Option<OnMissing>,
    },
    /// Check whether the extension is installed into PostgreSQL
    Status,
    /// Download, verify and unpack the release source
    Fetch {
        /// Directory to unpack into
        #[arg(long, default_value = ".")]
        dest: PathBuf,

        /// Override the release URL
        #[arg(long, requires = "sha256")]
        url: Option<String>,

        /// Expected SHA-256 of the archive
        #[arg(long, requires = "url")]
        sha256: Option<String>,
    },
    /// Start a throwaway server and run CREATE EXTENSION
    SmokeTest,
    /// Print the post-install notice
    Caveats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlanFormat {
    Bash,
    Posix,
    Json,
}

impl Args {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
