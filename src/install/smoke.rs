//! Post-install smoke test
//!
//! Creates a throwaway cluster, preloads the extension, runs
//! `CREATE EXTENSION` and stops the server again.

use std::fs::OpenOptions;
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};

use crate::error::{InstallerError, Result};
use crate::process::{CommandRunner, CommandSpec};

const SERVER_TIMEOUT: Duration = Duration::from_secs(120);

/// PostgreSQL client tools used by the smoke test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeTest {
    pub extension: String,
    pub pg_ctl: PathBuf,
    pub psql: PathBuf,
}

impl SmokeTest {
    pub fn new(extension: impl Into<String>, bindir: &Path) -> Self {
        Self {
            extension: extension.into(),
            pg_ctl: bindir.join("pg_ctl"),
            psql: bindir.join("psql"),
        }
    }

    /// Lines appended to `postgresql.conf`
    pub fn conf_snippet(&self, port: u16) -> String {
        format!(
            "\nshared_preload_libraries = '{}'\nport = {port}\n",
            self.extension
        )
    }

    /// Run the test inside `workdir` on `port`
    pub async fn run<R: CommandRunner>(&self, runner: &R, workdir: &Path, port: u16) -> Result<()> {
        let data_dir = workdir.join("test");
        let log_file = workdir.join("log");

        info!("Initializing test cluster in {}", data_dir.display());
        runner
            .run(
                &CommandSpec::new(&self.pg_ctl)
                    .arg("initdb")
                    .arg("-D")
                    .arg(&data_dir)
                    .timeout(SERVER_TIMEOUT),
            )
            .await?;

        let conf = data_dir.join("postgresql.conf");
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&conf)
            .map_err(|e| InstallerError::io(&conf, e))?;
        file.write_all(self.conf_snippet(port).as_bytes())
            .map_err(|e| InstallerError::io(&conf, e))?;

        runner
            .run(
                &CommandSpec::new(&self.pg_ctl)
                    .args(["start", "-w", "-D"])
                    .arg(&data_dir)
                    .arg("-l")
                    .arg(&log_file)
                    .timeout(SERVER_TIMEOUT),
            )
            .await?;

        let statement = format!("CREATE EXTENSION \"{}\";", self.extension);
        let create = runner
            .run(
                &CommandSpec::new(&self.psql)
                    .args(["-p".to_string(), port.to_string(), "-c".to_string(), statement])
                    .arg("postgres")
                    .timeout(SERVER_TIMEOUT),
            )
            .await;

        let stop = runner
            .run(
                &CommandSpec::new(&self.pg_ctl)
                    .arg("stop")
                    .arg("-D")
                    .arg(&data_dir)
                    .timeout(SERVER_TIMEOUT),
            )
            .await;
        if let Err(e) = &stop {
            warn!("Failed to stop test cluster: {e}");
        }

        create?;
        stop?;
        info!("CREATE EXTENSION {} succeeded", self.extension);
        Ok(())
    }
}

/// Ask the OS for an unused local port
pub fn free_port() -> Result<u16> {
    let listener =
        TcpListener::bind(("127.0.0.1", 0)).map_err(|e| InstallerError::io("127.0.0.1:0", e))?;
    let port = listener
        .local_addr()
        .map_err(|e| InstallerError::io("127.0.0.1:0", e))?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        fail_psql: bool,
    }

    impl CommandRunner for Recorder {
        async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
            let line = spec.to_string();
            self.calls.lock().unwrap().push(line);
            if spec.args.first().is_some_and(|a| a == "initdb") {
                let data_dir = PathBuf::from(&spec.args[2]);
                std::fs::create_dir_all(&data_dir).unwrap();
                std::fs::write(data_dir.join("postgresql.conf"), "# base\n").unwrap();
            }
            if self.fail_psql && spec.program.ends_with("psql") {
                return Err(InstallerError::CommandFailed {
                    program: "psql".into(),
                    code: Some(1),
                    stderr: "could not open extension control file".into(),
                });
            }
            Ok(CommandOutput::default())
        }
    }

    #[tokio::test]
    async fn runs_initdb_start_create_stop() {
        let work = tempfile::tempdir().unwrap();
        let smoke = SmokeTest::new("lantern", Path::new("/pg/bin"));
        let recorder = Recorder::default();

        smoke.run(&recorder, work.path(), 55432).await.unwrap();

        let calls = recorder.calls.lock().unwrap().clone();
        let data = work.path().join("test");
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], format!("/pg/bin/pg_ctl initdb -D {}", data.display()));
        assert_eq!(
            calls[1],
            format!(
                "/pg/bin/pg_ctl start -w -D {} -l {}",
                data.display(),
                work.path().join("log").display()
            )
        );
        assert_eq!(
            calls[2],
            "/pg/bin/psql -p 55432 -c CREATE EXTENSION \"lantern\"; postgres"
        );
        assert_eq!(calls[3], format!("/pg/bin/pg_ctl stop -D {}", data.display()));

        let conf = std::fs::read_to_string(data.join("postgresql.conf")).unwrap();
        assert_eq!(
            conf,
            "# base\n\nshared_preload_libraries = 'lantern'\nport = 55432\n"
        );
    }

    #[tokio::test]
    async fn server_is_stopped_when_create_fails() {
        let work = tempfile::tempdir().unwrap();
        let smoke = SmokeTest::new("lantern", Path::new("/pg/bin"));
        let recorder = Recorder {
            fail_psql: true,
            ..Recorder::default()
        };

        let err = smoke.run(&recorder, work.path(), 55433).await.unwrap_err();
        assert!(matches!(err, InstallerError::CommandFailed { .. }));
        let calls = recorder.calls.lock().unwrap();
        assert!(calls.last().unwrap().contains("pg_ctl stop"));
    }

    #[test]
    fn free_port_is_nonzero() {
        assert_ne!(free_port().unwrap(), 0);
    }
}
