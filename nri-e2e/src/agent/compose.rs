//! Thin wrapper over the `docker compose` CLI.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use nri_e2e_common::command::{CommandError, run_captured};
use tracing::debug;

const SHORT_CONTAINER_ID_LEN: usize = 12;

/// A compose project identified by its file.
#[derive(Debug, Clone)]
pub struct DockerCompose {
    docker: PathBuf,
    file: PathBuf,
}

impl DockerCompose {
    pub fn with_docker(docker: impl Into<PathBuf>, file: impl Into<PathBuf>) -> Self {
        Self {
            docker: docker.into(),
            file: file.into(),
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// `docker compose build --no-cache`, passing `env` as build arguments.
    pub fn build(
        &self,
        service: &str,
        env: &BTreeMap<String, String>,
        process_env: &[(&str, OsString)],
    ) -> Result<(), CommandError> {
        let mut args = vec!["build".to_string(), "--no-cache".to_string()];
        for (key, value) in env {
            args.push("--build-arg".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(service.to_string());
        self.compose(&args, process_env)?;
        Ok(())
    }

    /// `docker compose run -d` with `env` set in the container.
    ///
    /// `process_env` is exported to the compose process itself so the compose
    /// file can interpolate it.
    pub fn run(
        &self,
        service: &str,
        env: &BTreeMap<String, String>,
        process_env: &[(&str, OsString)],
    ) -> Result<(), CommandError> {
        let mut args = vec!["run".to_string()];
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push("-d".to_string());
        args.push(service.to_string());
        self.compose(&args, process_env)?;
        Ok(())
    }

    /// `docker compose down -v`.
    pub fn down(&self, process_env: &[(&str, OsString)]) -> Result<(), CommandError> {
        self.compose(&["down".to_string(), "-v".to_string()], process_env)?;
        Ok(())
    }

    /// Container logs of `service`, or `None` when they cannot be read.
    pub fn logs(&self, service: &str, process_env: &[(&str, OsString)]) -> Option<String> {
        let ids = self
            .compose(&["ps".to_string(), "-q".to_string(), service.to_string()], process_env)
            .ok()?;
        let id: String = ids.trim().chars().take(SHORT_CONTAINER_ID_LEN).collect();
        if id.is_empty() {
            return None;
        }

        let mut command = Command::new(&self.docker);
        command.arg("logs").arg(&id);
        match run_captured("docker logs", &mut command) {
            Ok(output) => Some(format!("{}{}", output.stdout, output.stderr)),
            Err(err) => {
                debug!(container = %id, error = %err, "Failed to read container logs");
                None
            }
        }
    }

    fn compose(&self, args: &[String], process_env: &[(&str, OsString)]) -> Result<String, CommandError> {
        let mut command = Command::new(&self.docker);
        command.arg("compose").arg("-f").arg(&self.file).args(args);
        for (key, value) in process_env {
            command.env(key, value);
        }

        let label = format!("docker compose {}", args.first().map_or("", String::as_str));
        debug!(file = %self.file.display(), args = ?args, "Running docker compose");
        run_captured(&label, &mut command).map(|output| output.stdout)
    }
}
