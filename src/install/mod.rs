//! Lantern installation library
//!
//! Resolves PostgreSQL, builds the extension, stages it under the install
//! prefix and prepares the privileged copy into the live server directories.

pub mod artifacts;
pub mod build;
pub mod detection;
pub mod locator;
pub mod orchestration;
pub mod pg_config;
pub mod postgres;
pub mod privilege;
pub mod progress;
pub mod runners;
pub mod smoke;
pub mod source;
pub mod wizard;

// Public exports
pub use artifacts::{ArtifactManifest, InstalledFiles, LibraryKind};
pub use build::BuildEnv;
pub use detection::{InstallationState, check_installation_state};
pub use locator::{ExecutableLocator, is_executable_file};
pub use orchestration::{InstallOrchestrator, InstallReport, caveats};
pub use pg_config::{PgConfig, PgConfigSource};
pub use postgres::{OnMissing, PgVersion, PostgresInstall, PostgresSelector};
pub use privilege::{PrivilegedOp, PrivilegedPlan, ShellDialect};
pub use smoke::SmokeTest;
pub use source::SourceArchive;
