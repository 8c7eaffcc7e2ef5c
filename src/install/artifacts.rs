//! Build outputs and their placement under the install prefix

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{InstallerError, Result};

/// Platform flavour of the compiled module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    So,
    Dylib,
}

impl LibraryKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::So => "so",
            Self::Dylib => "dylib",
        }
    }

    /// What the toolchain produces on this platform
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::Dylib
        } else {
            Self::So
        }
    }

    pub fn file_name(self, extension_name: &str) -> String {
        format!("{extension_name}.{}", self.extension())
    }
}

/// One file to copy into the prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub source: PathBuf,
    /// File name under the destination directory
    pub install_name: String,
}

impl Artifact {
    fn same_name(source: PathBuf) -> Option<Self> {
        let install_name = source.file_name()?.to_str()?.to_string();
        Some(Self {
            source,
            install_name,
        })
    }
}

/// Everything a build produced that belongs in the prefix
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub extension: String,
    pub control: Artifact,
    /// `<ext>--*.sql` from the build dir plus renamed update scripts, sorted
    pub sql: Vec<Artifact>,
    pub library: Artifact,
    pub library_kind: LibraryKind,
}

/// Where each manifest entry landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFiles {
    pub share_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub library: PathBuf,
    pub files: Vec<PathBuf>,
}

impl ArtifactManifest {
    /// Scan `build_dir` and `updates_dir` for the extension's outputs
    ///
    /// The shared library is `<ext>.so` when present, otherwise `<ext>.dylib`.
    pub fn collect(extension: &str, build_dir: &Path, updates_dir: &Path) -> Result<Self> {
        let control_path = build_dir.join(format!("{extension}.control"));
        if !control_path.is_file() {
            return Err(InstallerError::MissingArtifact(control_path));
        }
        let control = Artifact::same_name(control_path.clone())
            .ok_or(InstallerError::MissingArtifact(control_path))?;

        let (library_kind, library_path) = find_library(extension, build_dir)?;
        let library = Artifact::same_name(library_path.clone())
            .ok_or(InstallerError::MissingArtifact(library_path))?;

        let prefix = format!("{extension}--");
        let mut sql: Vec<Artifact> = sql_files(build_dir)?
            .into_iter()
            .filter(|p| file_name(p).is_some_and(|n| n.starts_with(&prefix)))
            .filter_map(Artifact::same_name)
            .collect();

        if updates_dir.is_dir() {
            for path in sql_files(updates_dir)? {
                let Some(base) = file_name(&path) else {
                    continue;
                };
                let install_name = format!("{prefix}{base}");
                debug!("Update script {} -> {install_name}", path.display());
                sql.push(Artifact {
                    source: path,
                    install_name,
                });
            }
        }

        sql.sort_by(|a, b| a.install_name.cmp(&b.install_name));
        // a renamed update wins over a build output of the same name, as the later copy would
        sql.reverse();
        sql.dedup_by(|a, b| a.install_name == b.install_name);
        sql.reverse();

        info!(
            "Collected {} artifacts ({} SQL scripts, {})",
            sql.len() + 2,
            sql.len(),
            library.install_name
        );

        Ok(Self {
            extension: extension.to_string(),
            control,
            sql,
            library,
            library_kind,
        })
    }

    /// Expected layout without a build, used by dry runs
    pub fn planned(extension: &str, build_dir: &Path) -> Self {
        let library_kind = LibraryKind::platform_default();
        let control_name = format!("{extension}.control");
        let library_name = library_kind.file_name(extension);
        Self {
            extension: extension.to_string(),
            control: Artifact {
                source: build_dir.join(&control_name),
                install_name: control_name,
            },
            sql: Vec::new(),
            library: Artifact {
                source: build_dir.join(&library_name),
                install_name: library_name,
            },
            library_kind,
        }
    }

    /// Files destined for `<prefix>/share`
    pub fn share_files(&self) -> impl Iterator<Item = &Artifact> {
        std::iter::once(&self.control).chain(self.sql.iter())
    }

    /// Copy into `<prefix>/share` and `<prefix>/lib`
    pub fn install_into(&self, prefix: &Path) -> Result<InstalledFiles> {
        let share_dir = prefix.join("share");
        let lib_dir = prefix.join("lib");
        create_dir(&share_dir)?;
        create_dir(&lib_dir)?;

        let mut files = Vec::new();
        for artifact in self.share_files() {
            let dest = share_dir.join(&artifact.install_name);
            copy_with_mode(&artifact.source, &dest, 0o644)?;
            files.push(dest);
        }

        let library = lib_dir.join(&self.library.install_name);
        copy_with_mode(&self.library.source, &library, 0o755)?;
        files.push(library.clone());

        info!("Installed {} files into {}", files.len(), prefix.display());
        Ok(InstalledFiles {
            share_dir,
            lib_dir,
            library,
            files,
        })
    }
}

fn find_library(extension: &str, build_dir: &Path) -> Result<(LibraryKind, PathBuf)> {
    let so = build_dir.join(LibraryKind::So.file_name(extension));
    if so.is_file() {
        return Ok((LibraryKind::So, so));
    }
    let dylib = build_dir.join(LibraryKind::Dylib.file_name(extension));
    if dylib.is_file() {
        return Ok((LibraryKind::Dylib, dylib));
    }
    Err(InstallerError::MissingArtifact(dylib))
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

/// Regular `*.sql` files directly inside `dir`, sorted by name
fn sql_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            InstallerError::io(path, e.into())
        })?;
        if entry.file_type().is_file()
            && entry.path().extension().is_some_and(|ext| ext == "sql")
        {
            out.push(entry.into_path());
        }
    }
    Ok(out)
}

fn create_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| InstallerError::io(dir, e))
}

/// Copy `src` to `dest` and set its permission bits
pub(crate) fn copy_with_mode(src: &Path, dest: &Path, mode: u32) -> Result<()> {
    fs::copy(src, dest).map_err(|e| InstallerError::io(src, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(dest, fs::Permissions::from_mode(mode))
            .map_err(|e| InstallerError::io(dest, e))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, path.to_string_lossy().as_bytes()).unwrap();
    }

    fn fake_build(root: &Path, library: &str) -> (PathBuf, PathBuf) {
        let build = root.join("build");
        let updates = root.join("sql/updates");
        touch(&build.join("lantern.control"));
        touch(&build.join("lantern--0.0.4.sql"));
        touch(&build.join("lantern--0.0.3.sql"));
        touch(&build.join("other--1.0.sql"));
        touch(&build.join(library));
        touch(&updates.join("0.0.3--0.0.4.sql"));
        touch(&updates.join("README.md"));
        (build, updates)
    }

    #[test]
    fn collects_so_build() {
        let root = tempfile::tempdir().unwrap();
        let (build, updates) = fake_build(root.path(), "lantern.so");

        let manifest = ArtifactManifest::collect("lantern", &build, &updates).unwrap();
        assert_eq!(manifest.library_kind, LibraryKind::So);
        assert_eq!(manifest.library.install_name, "lantern.so");
        let names: Vec<_> = manifest.sql.iter().map(|a| a.install_name.as_str()).collect();
        assert_eq!(
            names,
            ["lantern--0.0.3--0.0.4.sql", "lantern--0.0.3.sql", "lantern--0.0.4.sql"]
        );
        assert_eq!(manifest.sql[0].source, updates.join("0.0.3--0.0.4.sql"));
    }

    #[test]
    fn falls_back_to_dylib() {
        let root = tempfile::tempdir().unwrap();
        let (build, updates) = fake_build(root.path(), "lantern.dylib");

        let manifest = ArtifactManifest::collect("lantern", &build, &updates).unwrap();
        assert_eq!(manifest.library_kind, LibraryKind::Dylib);
        assert_eq!(manifest.library.source, build.join("lantern.dylib"));
    }

    #[test]
    fn prefers_so_when_both_exist() {
        let root = tempfile::tempdir().unwrap();
        let (build, updates) = fake_build(root.path(), "lantern.so");
        touch(&build.join("lantern.dylib"));

        let manifest = ArtifactManifest::collect("lantern", &build, &updates).unwrap();
        assert_eq!(manifest.library_kind, LibraryKind::So);
    }

    #[test]
    fn missing_library_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let build = root.path().join("build");
        touch(&build.join("lantern.control"));

        let err = ArtifactManifest::collect("lantern", &build, &root.path().join("none"))
            .unwrap_err();
        assert!(matches!(err, InstallerError::MissingArtifact(p) if p.ends_with("lantern.dylib")));
    }

    #[test]
    fn missing_control_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let build = root.path().join("build");
        touch(&build.join("lantern.so"));

        let err = ArtifactManifest::collect("lantern", &build, &root.path().join("none"))
            .unwrap_err();
        assert!(matches!(err, InstallerError::MissingArtifact(p) if p.ends_with("lantern.control")));
    }

    #[test]
    fn installs_into_prefix_layout() {
        let root = tempfile::tempdir().unwrap();
        let (build, updates) = fake_build(root.path(), "lantern.so");
        let prefix = root.path().join("prefix");

        let manifest = ArtifactManifest::collect("lantern", &build, &updates).unwrap();
        let installed = manifest.install_into(&prefix).unwrap();

        assert_eq!(installed.library, prefix.join("lib/lantern.so"));
        assert!(prefix.join("share/lantern.control").is_file());
        assert!(prefix.join("share/lantern--0.0.3--0.0.4.sql").is_file());
        assert!(!prefix.join("share/other--1.0.sql").exists());
        assert_eq!(installed.files.len(), 5);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&installed.library).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn planned_uses_platform_suffix() {
        let manifest = ArtifactManifest::planned("lantern", Path::new("/b"));
        assert_eq!(
            manifest.library.install_name,
            format!("lantern.{}", LibraryKind::platform_default().extension())
        );
        assert_eq!(manifest.share_files().count(), 1);
    }
}
