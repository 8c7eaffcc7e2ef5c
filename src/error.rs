//! Installer error type

use std::io;
use std::path::PathBuf;

use crate::install::postgres::PgVersion;

/// Errors surfaced by the installer library.
///
/// None of these are recovered locally; the binary reports them and exits.
#[derive(Debug, thiserror::Error)]
pub enum InstallerError {
    #[error("no supported PostgreSQL installation found (checked {})", format_versions(.candidates))]
    PostgresNotFound { candidates: Vec<PgVersion> },

    #[error("pg_config not found: {0}")]
    PgConfigNotFound(String),

    #[error("failed to spawn `{program}`: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {}: {stderr}", format_exit(.code))]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("`{program}` timed out after {secs} seconds")]
    CommandTimeout { program: String, secs: u64 },

    #[error("expected build artifact missing: {}", .0.display())]
    MissingArtifact(PathBuf),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid PostgreSQL version: {0}")]
    InvalidVersion(String),

    #[error("checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("download failed: {0}")]
    Download(String),
}

impl InstallerError {
    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_versions(versions: &[PgVersion]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("code {c}"),
        None => "signal".to_string(),
    }
}

pub type Result<T, E = InstallerError> = std::result::Result<T, E>;
