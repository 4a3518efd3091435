//! Scenario execution.
//!
//! Each scenario runs strictly in sequence:
//! pre-commands, agent set-up and start, retried assertions, post-commands,
//! agent stop. The first failing scenario ends the run.

use std::path::PathBuf;

use nri_e2e_common::spec::Scenario;
use nri_e2e_common::{CommandError, CommandRunner, Definition, RetryError, RetryPolicy, retry};
use nri_e2e_telemetry::{TestError, Tester};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::agent::{Agent, AgentError};

const TAG_PREFIX: &str = "e2e-";
const SHORT_SHA_LEN: usize = 7;
const TAG_SUFFIX_LEN: usize = 5;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("scenario '{scenario}': pre-command failed")]
    PreCommand {
        scenario: String,
        #[source]
        source: CommandError,
    },

    #[error("setting up agent")]
    AgentSetUp(#[source] AgentError),

    #[error("running agent")]
    AgentRun(#[source] AgentError),

    #[error("stopping agent")]
    AgentStop(#[source] AgentError),

    #[error("scenario '{scenario}': {tester} assertions failed")]
    Assertions {
        scenario: String,
        tester: &'static str,
        #[source]
        source: RetryError<TestError>,
    },
}

/// Produces unique tags for scenarios of one run.
///
/// Tags look like `e2e-<short sha>-<5 lowercase letters>`.
pub struct ScenarioTagGenerator {
    short_sha: String,
    rng: fastrand::Rng,
}

impl ScenarioTagGenerator {
    pub fn new(commit_sha: &str, rng: fastrand::Rng) -> Self {
        let padded = format!("{commit_sha}0000000");
        Self {
            short_sha: padded.chars().take(SHORT_SHA_LEN).collect(),
            rng,
        }
    }

    pub fn next_tag(&mut self) -> String {
        let suffix: String = (0..TAG_SUFFIX_LEN).map(|_| self.rng.lowercase()).collect();
        format!("{TAG_PREFIX}{}-{suffix}", self.short_sha)
    }
}

pub struct ScenarioRunner {
    agent: Option<Box<dyn Agent>>,
    testers: Vec<Box<dyn Tester>>,
    commands: Box<dyn CommandRunner>,
    tags: ScenarioTagGenerator,
    retry_policy: RetryPolicy,
    spec_dir: PathBuf,
}

impl ScenarioRunner {
    pub fn new(
        testers: Vec<Box<dyn Tester>>,
        commands: Box<dyn CommandRunner>,
        tags: ScenarioTagGenerator,
        retry_policy: RetryPolicy,
        spec_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            agent: None,
            testers,
            commands,
            tags,
            retry_policy,
            spec_dir: spec_dir.into(),
        }
    }

    /// Drive `agent` around each scenario. Without one the agent steps are skipped.
    pub fn with_agent(mut self, agent: Box<dyn Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Run every scenario in order, stopping at the first failure.
    pub fn run(&mut self, definition: &Definition) -> Result<(), RunError> {
        for scenario in &definition.scenarios {
            let tag = self.tags.next_tag();
            info!(scenario = %scenario.description.trim(), scenario_tag = %tag, "Running scenario");
            self.run_scenario(scenario, &definition.custom_test_key, &tag)?;
        }
        Ok(())
    }

    fn run_scenario(&mut self, scenario: &Scenario, tag_key: &str, tag: &str) -> Result<(), RunError> {
        for statement in &scenario.before {
            self.commands
                .run(statement, &self.spec_dir, tag)
                .map_err(|source| RunError::PreCommand {
                    scenario: scenario.description.trim().to_string(),
                    source,
                })?;
        }

        if let Some(agent) = self.agent.as_mut() {
            agent.set_up(scenario).map_err(RunError::AgentSetUp)?;
            agent.run(tag).map_err(RunError::AgentRun)?;
        }

        let assertions = self.assert(scenario, tag_key, tag);

        for statement in &scenario.after {
            if let Err(err) = self.commands.run(statement, &self.spec_dir, tag) {
                error!(command = %statement, error = %err, "Post-command failed");
            }
        }

        if let Some(agent) = self.agent.as_mut()
            && let Err(err) = agent.stop()
        {
            if let Err(pending) = &assertions {
                error!(error = %pending, "Assertions failed before agent stop");
            }
            return Err(RunError::AgentStop(err));
        }

        assertions
    }

    fn assert(&self, scenario: &Scenario, tag_key: &str, tag: &str) -> Result<(), RunError> {
        for tester in &self.testers {
            debug!(tester = tester.name(), "Running tester");
            retry(tester.name(), &self.retry_policy, || {
                tester.test(&scenario.tests, tag_key, tag)
            })
            .map_err(|source| RunError::Assertions {
                scenario: scenario.description.trim().to_string(),
                tester: tester.name(),
                source,
            })?;
        }
        Ok(())
    }
}
