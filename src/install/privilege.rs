//! Privileged finishing operations
//!
//! Copying into the live PostgreSQL directories usually needs root, which the
//! build step does not have. The build therefore produces a [`PrivilegedPlan`]:
//! a list of copy operations that can be executed directly (when already
//! privileged), executed through `sudo`, or rendered as a shell script for the
//! operator to run later.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{InstallerError, Result};
use crate::process::{CommandRunner, CommandSpec};

use super::artifacts::copy_with_mode;

const INSTALL_BIN: &str = "/usr/bin/install";

/// What a single operation copies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum OpSource {
    /// One file
    File(PathBuf),
    /// Every regular file directly inside a directory
    DirContents(PathBuf),
}

/// Copy `source` into `dest_dir` with permission `mode`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedOp {
    pub source: OpSource,
    pub dest_dir: PathBuf,
    pub mode: u32,
}

/// Output dialect for [`PrivilegedPlan::render`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShellDialect {
    /// The historical `lantern_install` format: bash, unquoted, no `set -e`
    #[default]
    Bash,
    /// `/bin/sh` with `set -e` and single-quoted paths
    Posix,
}

impl std::str::FromStr for ShellDialect {
    type Err = InstallerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bash" => Ok(Self::Bash),
            "posix" | "sh" => Ok(Self::Posix),
            other => Err(InstallerError::Config(format!("unknown shell dialect `{other}`"))),
        }
    }
}

/// Ordered privileged operations for one extension install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedPlan {
    pub extension: String,
    pub ops: Vec<PrivilegedOp>,
}

impl PrivilegedPlan {
    /// Library into `pkglibdir`, then every share file into `<sharedir>/extension`
    pub fn for_extension(
        extension: &str,
        library: &Path,
        share_dir: &Path,
        pkglibdir: &Path,
        sharedir: &Path,
    ) -> Self {
        Self {
            extension: extension.to_string(),
            ops: vec![
                PrivilegedOp {
                    source: OpSource::File(library.to_path_buf()),
                    dest_dir: pkglibdir.to_path_buf(),
                    mode: 0o755,
                },
                PrivilegedOp {
                    source: OpSource::DirContents(share_dir.to_path_buf()),
                    dest_dir: super::pg_config::extension_dir(sharedir),
                    mode: 0o644,
                },
            ],
        }
    }

    /// Render the plan as a shell script
    pub fn render(&self, dialect: ShellDialect) -> String {
        let mut out = String::new();
        match dialect {
            ShellDialect::Bash => {
                out.push_str("#!/bin/bash\n");
                let _ = writeln!(
                    out,
                    "echo 'Moving {} files into postgres extension folder...'",
                    self.extension
                );
                for op in &self.ops {
                    let src = match &op.source {
                        OpSource::File(p) => p.display().to_string(),
                        OpSource::DirContents(p) => format!("{}/*", p.display()),
                    };
                    let _ = writeln!(
                        out,
                        "{INSTALL_BIN} -c -m {:o} {src} {}/",
                        op.mode,
                        op.dest_dir.display()
                    );
                }
                out.push_str("echo 'Success.'\n");
            }
            ShellDialect::Posix => {
                out.push_str("#!/bin/sh\nset -e\n\n");
                let _ = writeln!(
                    out,
                    "echo 'Moving {} files into postgres extension folder...'",
                    self.extension
                );
                for op in &self.ops {
                    let _ = writeln!(out, "mkdir -p {}", quote(&op.dest_dir));
                    let src = match &op.source {
                        OpSource::File(p) => quote(p),
                        OpSource::DirContents(p) => format!("{}/*", quote(p)),
                    };
                    let _ = writeln!(
                        out,
                        "{INSTALL_BIN} -c -m {:o} {src} {}/",
                        op.mode,
                        quote(&op.dest_dir)
                    );
                }
                out.push_str("echo 'Success.'\n");
            }
        }
        out
    }

    /// Expand every op into concrete `(source, destination, mode)` copies
    pub fn expand(&self) -> Result<Vec<(PathBuf, PathBuf, u32)>> {
        let mut copies = Vec::new();
        for op in &self.ops {
            match &op.source {
                OpSource::File(path) => {
                    let name = path
                        .file_name()
                        .ok_or_else(|| InstallerError::MissingArtifact(path.clone()))?;
                    copies.push((path.clone(), op.dest_dir.join(name), op.mode));
                }
                OpSource::DirContents(dir) => {
                    let mut entries = Vec::new();
                    for entry in fs::read_dir(dir).map_err(|e| InstallerError::io(dir, e))? {
                        let entry = entry.map_err(|e| InstallerError::io(dir, e))?;
                        let path = entry.path();
                        if path.is_file() {
                            entries.push(path);
                        }
                    }
                    entries.sort();
                    for path in entries {
                        if let Some(name) = path.file_name() {
                            let dest = op.dest_dir.join(name);
                            copies.push((path, dest, op.mode));
                        }
                    }
                }
            }
        }
        Ok(copies)
    }

    /// Perform the copies in-process; the caller must already have the rights
    pub fn execute_direct(&self) -> Result<Vec<PathBuf>> {
        let mut written = Vec::new();
        for (src, dest, mode) in self.expand()? {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, e))?;
            }
            debug!("install -m {mode:o} {} {}", src.display(), dest.display());
            copy_with_mode(&src, &dest, mode)?;
            written.push(dest);
        }
        info!("Copied {} files for {}", written.len(), self.extension);
        Ok(written)
    }

    /// Run the plan through `sudo sh -c`, one process for all operations
    pub async fn execute_elevated<R: CommandRunner>(&self, runner: &R) -> Result<()> {
        let script = self.render(ShellDialect::Posix);
        let spec = CommandSpec::new("sudo").args(["sh", "-c", script.as_str()]);
        info!("Running privileged install for {} via sudo", self.extension);
        runner.run(&spec).await?;
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| InstallerError::Config(format!("serializing plan: {e}")))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| InstallerError::Config(format!("reading plan: {e}")))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| InstallerError::io(path, e))?;
        Self::from_json(&raw)
    }
}

/// Write `contents` to `path` with permission `mode`, replacing any old file
pub fn write_file(path: &Path, contents: &str, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| InstallerError::io(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| InstallerError::io(path, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| InstallerError::io(path, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

fn quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}
