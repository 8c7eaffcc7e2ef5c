//! Executable discovery on a search path
//!
//! Mirrors what a shell does for a bare command name: walk the search
//! directories in order, try each executable suffix, and return the first
//! candidate that is a regular file the current user may execute.

use std::env;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

/// Searches a fixed list of directories for named executables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutableLocator {
    dirs: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl ExecutableLocator {
    /// Create a locator over explicit directories and suffixes
    ///
    /// An empty suffix list behaves like `[""]`.
    pub fn new(dirs: Vec<PathBuf>, extensions: Vec<String>) -> Self {
        let extensions = if extensions.is_empty() {
            vec![String::new()]
        } else {
            extensions
        };
        Self { dirs, extensions }
    }

    /// Build a locator from the process `PATH` and `PATHEXT`
    pub fn from_env() -> Self {
        Self::from_vars(env::var_os("PATH"), env::var("PATHEXT").ok())
    }

    /// Build a locator from raw `PATH` / `PATHEXT` values
    pub fn from_vars(path: Option<OsString>, pathext: Option<String>) -> Self {
        let dirs = path
            .map(|p| env::split_paths(&p).collect())
            .unwrap_or_default();
        let extensions = pathext
            .map(|e| e.split(';').map(str::to_string).collect())
            .unwrap_or_default();
        Self::new(dirs, extensions)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Return the first executable named `cmd`, or `None`
    ///
    /// `cmd` must be a bare file name; anything with a directory part is
    /// never looked up.
    pub fn find(&self, cmd: &str) -> Option<PathBuf> {
        if !is_bare_name(cmd) {
            return None;
        }
        self.dirs.iter().find_map(|dir| {
            self.extensions
                .iter()
                .map(|ext| dir.join(format!("{cmd}{ext}")))
                .find(|candidate| is_executable_file(candidate))
        })
    }
}

fn is_bare_name(cmd: &str) -> bool {
    let mut components = Path::new(cmd).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// True when `path` exists, is not a directory, and is executable
pub fn is_executable_file(path: &Path) -> bool {
    match path.metadata() {
        Ok(meta) if meta.is_file() => has_execute_access(path),
        _ => false,
    }
}

#[cfg(unix)]
fn has_execute_access(path: &Path) -> bool {
    use nix::unistd::{AccessFlags, access};

    access(path, AccessFlags::X_OK).is_ok()
}

#[cfg(not(unix))]
fn has_execute_access(_path: &Path) -> bool {
    // Windows has no execute bit; PATHEXT is what marks a file runnable
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[cfg(unix)]
    fn write_with_mode(path: &Path, mode: u32) {
        use std::os::unix::fs::PermissionsExt;

        fs::write(path, "#!/bin/sh\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn finds_executable_in_first_matching_dir() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_with_mode(&a.path().join("pg_config"), 0o755);
        write_with_mode(&b.path().join("pg_config"), 0o755);

        let locator =
            ExecutableLocator::new(vec![a.path().into(), b.path().into()], Vec::new());
        assert_eq!(locator.find("pg_config"), Some(a.path().join("pg_config")));
    }

    #[cfg(unix)]
    #[test]
    fn skips_non_executable_files() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        write_with_mode(&a.path().join("pg_config"), 0o644);
        write_with_mode(&b.path().join("pg_config"), 0o755);

        let locator =
            ExecutableLocator::new(vec![a.path().into(), b.path().into()], Vec::new());
        assert_eq!(locator.find("pg_config"), Some(b.path().join("pg_config")));
    }

    #[cfg(unix)]
    #[test]
    fn skips_directories_with_the_command_name() {
        use std::os::unix::fs::PermissionsExt;

        let a = tempfile::tempdir().unwrap();
        let dir = a.path().join("pg_config");
        fs::create_dir(&dir).unwrap();
        fs::set_permissions(&dir, fs::Permissions::from_mode(0o755)).unwrap();

        let locator = ExecutableLocator::new(vec![a.path().into()], Vec::new());
        assert_eq!(locator.find("pg_config"), None);
    }

    #[test]
    fn commands_with_a_directory_part_are_not_searched() {
        let a = tempfile::tempdir().unwrap();
        let locator = ExecutableLocator::new(vec![a.path().into()], Vec::new());
        assert_eq!(locator.find("/bin/sh"), None);
        assert_eq!(locator.find("bin/sh"), None);
        assert_eq!(locator.find("../sh"), None);
        assert_eq!(locator.find(""), None);
    }

    #[test]
    fn missing_command_is_not_found() {
        let a = tempfile::tempdir().unwrap();
        let locator = ExecutableLocator::new(vec![a.path().into()], Vec::new());
        assert_eq!(locator.find("pg_config"), None);
    }

    #[cfg(unix)]
    #[test]
    fn honors_suffixes_in_order() {
        let a = tempfile::tempdir().unwrap();
        write_with_mode(&a.path().join("cmake.bat"), 0o755);
        write_with_mode(&a.path().join("cmake.exe"), 0o755);

        let locator = ExecutableLocator::new(
            vec![a.path().into()],
            vec![".exe".into(), ".bat".into()],
        );
        assert_eq!(locator.find("cmake"), Some(a.path().join("cmake.exe")));
    }

    #[test]
    fn pathext_is_split_on_semicolons() {
        let locator = ExecutableLocator::from_vars(None, Some(".COM;.EXE".into()));
        assert_eq!(locator.extensions(), [".COM", ".EXE"]);
        assert!(locator.dirs().is_empty());
    }

    #[test]
    fn missing_pathext_means_bare_names() {
        let locator = ExecutableLocator::from_vars(None, None);
        assert_eq!(locator.extensions(), [""]);
    }

    #[cfg(unix)]
    #[test]
    fn path_is_split_with_platform_separator() {
        let locator = ExecutableLocator::from_vars(Some("/usr/bin:/bin".into()), None);
        assert_eq!(
            locator.dirs(),
            [PathBuf::from("/usr/bin"), PathBuf::from("/bin")]
        );
    }
}
