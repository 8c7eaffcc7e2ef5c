//! Build and install the Lantern vector-search extension into PostgreSQL

pub mod cli;
pub mod config;
pub mod error;
pub mod install;
pub mod process;

pub use config::InstallerConfig;
pub use error::{InstallerError, Result};
pub use process::{CommandOutput, CommandRunner, CommandSpec, SystemRunner};
