//! End-to-end test runner for infrastructure agent integrations.
#![forbid(unsafe_code)]

mod agent;
mod runner;

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use nri_e2e_common::{
    CommandLogStyle, LogConfig, Settings, SettingsOptions, ShellCommandRunner, init_logging,
};
use nri_e2e_telemetry::{
    EntitiesTester, MetricsTester, NerdGraphClient, NrqlTester, QueryClient, Tester,
};
use tracing::{debug, info};

use crate::agent::{AgentOptions, DockerComposeAgent};
use crate::runner::{ScenarioRunner, ScenarioTagGenerator};

#[derive(Parser)]
#[command(
    name = "nri-e2e",
    version,
    about = "Run end-to-end scenarios against the infrastructure agent and assert on ingested telemetry"
)]
struct Cli {
    /// Path to the spec file
    #[arg(long, alias = "spec_path", env = "NRI_E2E_SPEC_PATH")]
    spec_path: PathBuf,

    /// New Relic license key used by the agent
    #[arg(long, alias = "license_key", env = "NRI_E2E_LICENSE_KEY", hide_env_values = true)]
    license_key: String,

    /// New Relic user API key used for NerdGraph queries
    #[arg(long, alias = "api_key", env = "NRI_E2E_API_KEY", hide_env_values = true)]
    api_key: String,

    /// New Relic account to query
    #[arg(long, alias = "account_id", env = "NRI_E2E_ACCOUNT_ID")]
    account_id: u64,

    /// Run the agent for each scenario
    #[arg(
        long,
        alias = "agent_enabled",
        env = "NRI_E2E_AGENT_ENABLED",
        default_value_t = true,
        action = ArgAction::Set
    )]
    agent_enabled: bool,

    /// Attempts per tester before a scenario fails
    #[arg(long, alias = "retry_attempts", env = "NRI_E2E_RETRY_ATTEMPTS", default_value_t = 10)]
    retry_attempts: u32,

    /// Seconds to wait between attempts
    #[arg(long, alias = "retry_seconds", env = "NRI_E2E_RETRY_SECONDS", default_value_t = 30)]
    retry_seconds: u64,

    /// Commit SHA used in scenario tags
    #[arg(long, alias = "commit_sha", env = "NRI_E2E_COMMIT_SHA", default_value = "")]
    commit_sha: String,

    /// Account region (US, EU or Staging)
    #[arg(long, env = "NRI_E2E_REGION", default_value = "US")]
    region: String,

    /// Enable verbose logging
    #[arg(short, long, alias = "verbose_mode", env = "NRI_E2E_VERBOSE")]
    verbose: bool,
}

impl Cli {
    fn settings_options(self) -> SettingsOptions {
        SettingsOptions {
            spec_path: self.spec_path,
            license_key: self.license_key,
            api_key: self.api_key,
            account_id: self.account_id,
            agent_enabled: self.agent_enabled,
            retry_attempts: self.retry_attempts,
            retry_seconds: self.retry_seconds,
            commit_sha: self.commit_sha,
            region: self.region,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("info");
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    init_logging(&log_config)?;

    info!("running e2e");
    let settings = Settings::load(cli.settings_options()).context("loading settings")?;

    let mut runner = build_runner(&settings);
    runner
        .run(&settings.definition)
        .context("running scenarios")?;

    info!("execution completed successfully!");
    Ok(())
}

fn build_runner(settings: &Settings) -> ScenarioRunner {
    debug!(region = %settings.region, "Creating NerdGraph client");
    let client: Rc<dyn QueryClient> =
        Rc::new(NerdGraphClient::new(&settings.api_key, settings.region));

    let testers: Vec<Box<dyn Tester>> = vec![
        Box::new(EntitiesTester::new(client.clone(), settings.account_id)),
        Box::new(MetricsTester::new(
            client.clone(),
            settings.account_id,
            &settings.spec_dir,
        )),
        Box::new(NrqlTester::new(client, settings.account_id)),
    ];

    let commands = ShellCommandRunner::new(CommandLogStyle::from_plain_logs(
        settings.definition.plain_logs,
    ));

    let runner = ScenarioRunner::new(
        testers,
        Box::new(commands),
        ScenarioTagGenerator::new(&settings.commit_sha, fastrand::Rng::new()),
        settings.retry_policy,
        &settings.spec_dir,
    );

    if settings.agent_enabled {
        runner.with_agent(Box::new(DockerComposeAgent::new(AgentOptions::from_settings(
            settings,
        ))))
    } else {
        info!("agent disabled, skipping agent lifecycle");
        runner
    }
}
