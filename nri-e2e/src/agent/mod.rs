//! The infrastructure agent under test.
//!
//! [`DockerComposeAgent`] runs the agent as a `docker compose` service. For each
//! scenario it stages the integration binaries, exporter binaries and the
//! generated integration config in temporary directories next to the compose
//! file, and hands their paths to compose through `E2E_*` variables.

mod compose;
mod integration;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use nri_e2e_common::command::CommandError;
use nri_e2e_common::spec::{AgentExtensions, Integration, Scenario};
use nri_e2e_common::Settings;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{Level, debug, info};

pub use compose::DockerCompose;
pub use integration::{IntegrationList, copy_file};

const DOCKER_BIN: &str = "docker";
const SERVICE: &str = "agent";
const COMPOSE_FILE: &str = "docker-compose.yml";
const INTEGRATIONS_CONFIG_FILE: &str = "nri-config.yml";

const INTEGRATIONS_CFG_DIR: &str = "integrations.d";
const EXPORTERS_DIR: &str = "exporters";
const INTEGRATIONS_BIN_DIR: &str = "bin";

const INTEGRATIONS_CFG_DIR_ENV: &str = "E2E_NRI_CONFIG";
const EXPORTERS_DIR_ENV: &str = "E2E_EXPORTER_BIN";
const INTEGRATIONS_BIN_DIR_ENV: &str = "E2E_NRI_BIN";

const DEFAULT_COMPOSE: &str = include_str!("resources/docker-compose.yml");

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("creating {what}: {source}")]
    Workspace {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("copying '{}' to '{}': {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("rendering integrations config: {0}")]
    Config(#[from] serde_yaml_ng::Error),

    #[error(transparent)]
    Compose(#[from] CommandError),

    #[error("removing {what}: {source}")]
    Cleanup {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("agent has not been set up")]
    NotSetUp,
}

/// Lifecycle of the agent across one scenario.
pub trait Agent {
    /// Stage everything the scenario's integrations need.
    fn set_up(&mut self, scenario: &Scenario) -> Result<(), AgentError>;

    /// Start the agent, tagging its telemetry with `scenario_tag`.
    fn run(&mut self, scenario_tag: &str) -> Result<(), AgentError>;

    /// Tear the agent down and remove staged files.
    fn stop(&mut self) -> Result<(), AgentError>;
}

/// Settings the docker-compose agent needs.
#[derive(Debug, Clone, Default)]
pub struct AgentOptions {
    pub spec_dir: PathBuf,
    pub license_key: String,
    pub custom_test_key: String,
    pub extensions: AgentExtensions,
}

impl AgentOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            spec_dir: settings.spec_dir.clone(),
            license_key: settings.license_key.clone(),
            custom_test_key: settings.custom_test_key().to_string(),
            extensions: settings
                .definition
                .agent_extensions
                .clone()
                .unwrap_or_default(),
        }
    }
}

/// Directories staged for one scenario. Dropping it removes them.
struct Workspace {
    compose: DockerCompose,
    default_compose_dir: Option<TempDir>,
    configs: TempDir,
    exporters: TempDir,
    bins: TempDir,
}

impl Workspace {
    fn process_env(&self) -> Vec<(&'static str, OsString)> {
        vec![
            (INTEGRATIONS_CFG_DIR_ENV, self.configs.path().into()),
            (INTEGRATIONS_BIN_DIR_ENV, self.bins.path().into()),
            (EXPORTERS_DIR_ENV, self.exporters.path().into()),
        ]
    }

    fn close(self) -> Result<(), AgentError> {
        self.bins.close().map_err(cleanup("integration bin dir"))?;
        self.exporters.close().map_err(cleanup("exporters dir"))?;
        self.configs.close().map_err(cleanup("configs dir"))?;
        if let Some(dir) = self.default_compose_dir {
            dir.close().map_err(cleanup("default docker-compose dir"))?;
        }
        Ok(())
    }
}

fn cleanup(what: &'static str) -> impl FnOnce(io::Error) -> AgentError {
    move |source| AgentError::Cleanup { what, source }
}

/// [`Agent`] running as a `docker compose` service named `agent`.
pub struct DockerComposeAgent {
    options: AgentOptions,
    docker: PathBuf,
    workspace: Option<Workspace>,
}

impl DockerComposeAgent {
    pub fn new(options: AgentOptions) -> Self {
        Self::with_docker(options, DOCKER_BIN)
    }

    /// Use a specific `docker` executable.
    pub fn with_docker(options: AgentOptions, docker: impl Into<PathBuf>) -> Self {
        Self {
            options,
            docker: docker.into(),
            workspace: None,
        }
    }

    fn compose_file(&self) -> Result<(PathBuf, Option<TempDir>), AgentError> {
        let build_context = &self.options.extensions.build_context;
        if !build_context.is_empty() {
            let file = self.options.spec_dir.join(build_context).join(COMPOSE_FILE);
            return Ok((file, None));
        }

        let dir = tempfile::Builder::new()
            .prefix("agent-docker-compose")
            .tempdir()
            .map_err(|source| AgentError::Workspace {
                what: "default docker-compose dir",
                source,
            })?;
        let file = dir.path().join(COMPOSE_FILE);
        std::fs::write(&file, DEFAULT_COMPOSE).map_err(|source| AgentError::Workspace {
            what: "default docker-compose file",
            source,
        })?;
        debug!(path = %file.display(), "Using default docker-compose");
        Ok((file, Some(dir)))
    }

    fn copy(&self, relative_source: &str, destination: PathBuf) -> Result<(), AgentError> {
        let source = self.options.spec_dir.join(relative_source);
        debug!(from = %source.display(), to = %destination.display(), "Copying file");
        copy_file(&source, &destination).map_err(|err| AgentError::Copy {
            from: source,
            to: destination,
            source: err,
        })
    }

    fn stage_integration(&self, workspace: &Workspace, integration: &Integration) -> Result<(), AgentError> {
        if !integration.binary_path.is_empty() {
            self.copy(
                &integration.binary_path,
                workspace.bins.path().join(&integration.name),
            )?;
        }

        if !integration.exporter_binary_path.is_empty() {
            let exporter_name = Path::new(&integration.exporter_binary_path)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(&integration.exporter_binary_path));
            self.copy(
                &integration.exporter_binary_path,
                workspace.exporters.path().join(exporter_name),
            )?;
        }
        Ok(())
    }

    fn environment(&self, scenario_tag: &str) -> BTreeMap<String, String> {
        let mut env = BTreeMap::from([
            ("NRIA_VERBOSE".to_string(), "1".to_string()),
            (
                "NRIA_LICENSE_KEY".to_string(),
                self.options.license_key.clone(),
            ),
        ]);

        let mut attributes = serde_json::Map::new();
        attributes.insert(self.options.custom_test_key.clone(), scenario_tag.into());
        env.insert(
            "NRIA_CUSTOM_ATTRIBUTES".to_string(),
            serde_json::Value::Object(attributes).to_string(),
        );
        env.extend(self.options.extensions.env_vars.clone());
        env
    }
}

fn temp_dir_in(parent: &Path, prefix: &str, what: &'static str) -> Result<TempDir, AgentError> {
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(parent)
        .map_err(|source| AgentError::Workspace { what, source })?;
    debug!(path = %dir.path().display(), "Created {what}");
    Ok(dir)
}

impl Agent for DockerComposeAgent {
    fn set_up(&mut self, scenario: &Scenario) -> Result<(), AgentError> {
        let (file, default_compose_dir) = self.compose_file()?;
        let parent = file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let workspace = Workspace {
            configs: temp_dir_in(&parent, INTEGRATIONS_CFG_DIR, "configs dir")?,
            exporters: temp_dir_in(&parent, EXPORTERS_DIR, "exporters dir")?,
            bins: temp_dir_in(&parent, INTEGRATIONS_BIN_DIR, "integration bin dir")?,
            compose: DockerCompose::with_docker(&self.docker, file),
            default_compose_dir,
        };

        debug!(integrations = scenario.integrations.len(), "Staging integrations");
        for integration in &scenario.integrations {
            self.stage_integration(&workspace, integration)?;
        }

        let config = IntegrationList::new(&scenario.integrations).to_yaml()?;
        let config_path = workspace.configs.path().join(INTEGRATIONS_CONFIG_FILE);
        std::fs::write(&config_path, config).map_err(|source| AgentError::Workspace {
            what: "integrations config file",
            source,
        })?;
        debug!(path = %config_path.display(), "Wrote integrations config");

        for (name, binary) in &self.options.extensions.integrations {
            self.copy(binary, workspace.bins.path().join(name))?;
        }

        self.workspace = Some(workspace);
        Ok(())
    }

    fn run(&mut self, scenario_tag: &str) -> Result<(), AgentError> {
        let workspace = self.workspace.as_ref().ok_or(AgentError::NotSetUp)?;
        let env = self.environment(scenario_tag);

        info!(
            compose = %workspace.compose.file().display(),
            scenario_tag,
            "Starting agent"
        );
        let process_env = workspace.process_env();
        workspace.compose.build(SERVICE, &env, &process_env)?;
        workspace.compose.run(SERVICE, &env, &process_env)?;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AgentError> {
        let workspace = self.workspace.take().ok_or(AgentError::NotSetUp)?;
        let process_env = workspace.process_env();

        if tracing::enabled!(Level::DEBUG)
            && let Some(logs) = workspace.compose.logs(SERVICE, &process_env)
        {
            debug!(container = SERVICE, "Agent logs:\n{logs}");
        }

        info!(compose = %workspace.compose.file().display(), "Stopping agent");
        workspace.compose.down(&process_env)?;
        workspace.close()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// A `docker` stand-in that appends its arguments and the staged
    /// directories to `calls.log` next to itself.
    fn fake_docker(dir: &Path, exit_code: i32) -> PathBuf {
        let path = dir.join("docker");
        let log = dir.join("calls.log");
        fs::write(
            &path,
            format!(
                "#!/bin/bash\necho \"$* | cfg=$E2E_NRI_CONFIG bin=$E2E_NRI_BIN exp=$E2E_EXPORTER_BIN\" >> '{}'\nexit {exit_code}\n",
                log.display()
            ),
        )
        .expect("write fake docker");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    fn calls(dir: &Path) -> Vec<String> {
        fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    struct Fixture {
        spec_dir: TempDir,
        tools: TempDir,
    }

    fn fixture() -> Fixture {
        let spec_dir = tempfile::tempdir().expect("spec dir");
        fs::create_dir_all(spec_dir.path().join("bin")).expect("bin dir");
        fs::create_dir_all(spec_dir.path().join("agent_dir")).expect("agent dir");
        fs::write(spec_dir.path().join("agent_dir").join(COMPOSE_FILE), DEFAULT_COMPOSE)
            .expect("compose");
        for name in ["nri-redis", "redis-exporter", "nri-flex"] {
            let path = spec_dir.path().join("bin").join(name);
            fs::write(&path, "#!/bin/sh\n").expect("binary");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        }
        Fixture {
            spec_dir,
            tools: tempfile::tempdir().expect("tools dir"),
        }
    }

    fn options(fixture: &Fixture, build_context: &str) -> AgentOptions {
        AgentOptions {
            spec_dir: fixture.spec_dir.path().to_path_buf(),
            license_key: "license-123".into(),
            custom_test_key: "testKey".into(),
            extensions: AgentExtensions {
                build_context: build_context.into(),
                integrations: BTreeMap::from([("nri-flex".into(), "bin/nri-flex".into())]),
                env_vars: BTreeMap::from([("NRIA_LOG_LEVEL".into(), "debug".into())]),
            },
        }
    }

    fn scenario() -> Scenario {
        serde_yaml_ng::from_str(
            r#"
description: redis
integrations:
  - name: nri-redis
    binary_path: bin/nri-redis
    exporter_binary_path: bin/redis-exporter
    config:
      hostname: localhost
"#,
        )
        .expect("scenario")
    }

    #[test]
    fn test_set_up_stages_binaries_and_config() {
        let fx = fixture();
        let docker = fake_docker(fx.tools.path(), 0);
        let mut agent = DockerComposeAgent::with_docker(options(&fx, "agent_dir"), docker);

        agent.set_up(&scenario()).expect("set up");

        let workspace = agent.workspace.as_ref().expect("workspace");
        assert!(workspace.bins.path().join("nri-redis").is_file());
        assert!(workspace.bins.path().join("nri-flex").is_file());
        assert!(workspace.exporters.path().join("redis-exporter").is_file());
        let mode = fs::metadata(workspace.bins.path().join("nri-redis"))
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);

        let config = fs::read_to_string(workspace.configs.path().join(INTEGRATIONS_CONFIG_FILE))
            .expect("config");
        assert!(config.contains("name: nri-redis"));
        assert!(config.contains("hostname: localhost"));

        // Staged next to the custom compose file.
        let agent_dir = fx.spec_dir.path().join("agent_dir");
        assert_eq!(workspace.bins.path().parent(), Some(agent_dir.as_path()));
        assert!(workspace.default_compose_dir.is_none());
    }

    #[test]
    fn test_run_builds_then_runs_with_tag() {
        let fx = fixture();
        let docker = fake_docker(fx.tools.path(), 0);
        let mut agent = DockerComposeAgent::with_docker(options(&fx, "agent_dir"), docker);
        agent.set_up(&scenario()).expect("set up");

        agent.run("e2e-abc1234-qwert").expect("run");

        let calls = calls(fx.tools.path());
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("compose -f "));
        assert!(calls[0].contains(" build --no-cache --build-arg NRIA_CUSTOM_ATTRIBUTES="));
        assert!(calls[0].contains("--build-arg NRIA_LOG_LEVEL=debug"));
        assert!(calls[0].contains(" agent | cfg=/"));
        assert!(calls[1].contains(" run -e "));
        assert!(calls[1].contains(r#"-e NRIA_CUSTOM_ATTRIBUTES={"testKey":"e2e-abc1234-qwert"}"#));
        assert!(calls[1].contains("-e NRIA_LICENSE_KEY=license-123"));
        assert!(calls[1].contains("-e NRIA_VERBOSE=1"));
        assert!(calls[1].contains("-d agent |"));

        let workspace = agent.workspace.as_ref().expect("workspace");
        assert!(calls[1].contains(&format!("cfg={}", workspace.configs.path().display())));
        assert!(calls[1].contains(&format!("bin={}", workspace.bins.path().display())));
        assert!(calls[1].contains(&format!("exp={}", workspace.exporters.path().display())));
    }

    #[test]
    fn test_stop_removes_staged_directories() {
        let fx = fixture();
        let docker = fake_docker(fx.tools.path(), 0);
        let mut agent = DockerComposeAgent::with_docker(options(&fx, ""), docker);
        agent.set_up(&scenario()).expect("set up");

        let workspace = agent.workspace.as_ref().expect("workspace");
        let staged = [
            workspace.bins.path().to_path_buf(),
            workspace.configs.path().to_path_buf(),
            workspace.exporters.path().to_path_buf(),
        ];
        let compose_file = workspace.compose.file().to_path_buf();
        assert_eq!(fs::read_to_string(&compose_file).expect("compose"), DEFAULT_COMPOSE);

        agent.stop().expect("stop");

        assert!(calls(fx.tools.path()).iter().any(|c| c.contains(" down -v |")));
        for dir in &staged {
            assert!(!dir.exists(), "{} should be removed", dir.display());
        }
        assert!(!compose_file.exists());
        assert!(matches!(agent.stop(), Err(AgentError::NotSetUp)));
    }

    #[test]
    fn test_compose_failure_is_reported() {
        let fx = fixture();
        let docker = fake_docker(fx.tools.path(), 1);
        let mut agent = DockerComposeAgent::with_docker(options(&fx, "agent_dir"), docker);
        agent.set_up(&scenario()).expect("set up");

        let err = agent.run("tag").unwrap_err();
        assert!(matches!(err, AgentError::Compose(_)));
        assert!(err.to_string().contains("docker compose build"));
    }

    #[test]
    fn test_missing_binary_fails_set_up() {
        let fx = fixture();
        let docker = fake_docker(fx.tools.path(), 0);
        let mut agent = DockerComposeAgent::with_docker(options(&fx, "agent_dir"), docker);
        let mut scenario = scenario();
        scenario.integrations[0].binary_path = "bin/missing".into();

        let err = agent.set_up(&scenario).unwrap_err();
        assert!(matches!(err, AgentError::Copy { .. }));
        assert!(agent.workspace.is_none());
    }

    #[test]
    fn test_run_without_set_up() {
        let fx = fixture();
        let mut agent = DockerComposeAgent::with_docker(options(&fx, ""), fake_docker(fx.tools.path(), 0));
        assert!(matches!(agent.run("tag"), Err(AgentError::NotSetUp)));
    }
}
