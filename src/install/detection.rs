//! Installation state detection
//!
//! Determines whether the extension is present in the live PostgreSQL
//! directories by checking each required component:
//! - shared library in `pkglibdir`
//! - control file in `<sharedir>/extension`
//! - at least one `<ext>--*.sql` script in `<sharedir>/extension`

use std::fs;
use std::path::Path;

use super::artifacts::LibraryKind;

/// Installation state enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallationState {
    /// Nothing found
    NotInstalled,
    /// Some components present (the finishing step was interrupted or skipped)
    PartiallyInstalled,
    /// Library, control file and SQL scripts all present
    FullyInstalled,
}

/// Check which components of `extension` are in the live directories
pub fn check_installation_state(
    extension: &str,
    pkglibdir: &Path,
    sharedir: &Path,
) -> InstallationState {
    let extension_dir = super::pg_config::extension_dir(sharedir);
    let library_ok = check_library_installed(extension, pkglibdir);
    let control_ok = extension_dir.join(format!("{extension}.control")).is_file();
    let scripts_ok = check_scripts_installed(extension, &extension_dir);

    match (library_ok, control_ok, scripts_ok) {
        (false, false, false) => InstallationState::NotInstalled,
        (true, true, true) => InstallationState::FullyInstalled,
        _ => InstallationState::PartiallyInstalled,
    }
}

fn check_library_installed(extension: &str, pkglibdir: &Path) -> bool {
    [LibraryKind::So, LibraryKind::Dylib]
        .iter()
        .any(|kind| pkglibdir.join(kind.file_name(extension)).is_file())
}

fn check_scripts_installed(extension: &str, extension_dir: &Path) -> bool {
    let prefix = format!("{extension}--");
    fs::read_dir(extension_dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.starts_with(&prefix) && name.ends_with(".sql")
            })
        })
        .unwrap_or(false)
}
