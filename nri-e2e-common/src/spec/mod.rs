//! Scenario spec documents.
//!
//! A spec file declares the scenarios to run, the integrations the agent must
//! execute for each one, shell commands to run around the agent, and the
//! assertions to check against the ingested telemetry.

pub mod metrics;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::value::Value;

pub use metrics::{EntityMetrics, Exceptions, MetricSpec, MetricsCatalog};

/// Custom attribute used to tag agent telemetry when the spec does not set one.
pub const DEFAULT_CUSTOM_TEST_KEY: &str = "testKey";

/// Errors raised while loading or validating spec documents.
#[derive(Debug, Error)]
pub enum SpecError {
    #[error("invalid NRQL test config: {message}")]
    InvalidConfig { message: String },

    #[error("failed to parse {what}: {source}")]
    Parse {
        what: &'static str,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpecError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Top-level spec document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scenarios: Vec<Scenario>,
    #[serde(default, rename = "agent")]
    pub agent_extensions: Option<AgentExtensions>,
    /// Log command output as plain log lines instead of CI log groups.
    #[serde(default)]
    pub plain_logs: bool,
    #[serde(default = "default_custom_test_key")]
    pub custom_test_key: String,
}

fn default_custom_test_key() -> String {
    DEFAULT_CUSTOM_TEST_KEY.to_string()
}

impl Definition {
    /// Parse and validate a spec document.
    pub fn parse(content: &[u8]) -> Result<Self, SpecError> {
        let mut definition: Definition =
            serde_yaml_ng::from_slice(content).map_err(|source| SpecError::Parse {
                what: "spec definition",
                source,
            })?;

        definition.validate()?;

        if definition.custom_test_key.trim().is_empty() {
            definition.custom_test_key = default_custom_test_key();
        }

        debug!(
            scenarios = definition.scenarios.len(),
            custom_test_key = %definition.custom_test_key,
            "Parsed spec definition"
        );
        Ok(definition)
    }

    /// Read, parse and validate a spec file.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let content = std::fs::read(path).map_err(|source| SpecError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Validate every NRQL assertion of every scenario.
    pub fn validate(&self) -> Result<(), SpecError> {
        for scenario in &self.scenarios {
            for nrql in &scenario.tests.nrqls {
                nrql.validate()?;
            }
        }
        Ok(())
    }
}

/// Extra agent configuration shared by every scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentExtensions {
    /// Directory (relative to the spec) holding a custom agent docker-compose file.
    #[serde(default)]
    pub build_context: String,
    /// Extra integration binaries: name in the agent → path relative to the spec.
    #[serde(default)]
    pub integrations: BTreeMap<String, String>,
    #[serde(default)]
    pub env_vars: BTreeMap<String, String>,
}

/// One isolated end-to-end test case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub integrations: Vec<Integration>,
    /// Commands run before the agent starts.
    #[serde(default)]
    pub before: Vec<String>,
    /// Commands run after assertions, before the agent stops.
    #[serde(default)]
    pub after: Vec<String>,
    #[serde(default)]
    pub tests: Tests,
}

/// An integration the agent runs during a scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub name: String,
    #[serde(default)]
    pub binary_path: String,
    #[serde(default)]
    pub exporter_binary_path: String,
    #[serde(default)]
    pub config: BTreeMap<String, serde_yaml_ng::Value>,
    #[serde(default)]
    pub env: BTreeMap<String, serde_yaml_ng::Value>,
}

/// The assertions of a scenario, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tests {
    #[serde(default)]
    pub nrqls: Vec<NrqlAssertion>,
    #[serde(default)]
    pub entities: Vec<EntityAssertion>,
    #[serde(default)]
    pub metrics: Vec<MetricAssertion>,
}

impl Tests {
    pub fn is_empty(&self) -> bool {
        self.nrqls.is_empty() && self.entities.is_empty() && self.metrics.is_empty()
    }
}

/// An NRQL query whose results are checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NrqlAssertion {
    pub query: String,
    #[serde(default)]
    pub error_expected: bool,
    #[serde(default)]
    pub expected_results: Vec<ExpectedResult>,
}

impl NrqlAssertion {
    /// Check the mutually exclusive fields of the assertion.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.query.trim().is_empty() {
            return Err(SpecError::invalid("missing query param"));
        }

        if self.error_expected && !self.expected_results.is_empty() {
            return Err(SpecError::invalid(
                "expected_results cannot be used with error_expected",
            ));
        }

        for (i, expected) in self.expected_results.iter().enumerate() {
            expected.expectation().map_err(|err| match err {
                ExpectationError::ValueWithBounds => SpecError::invalid(format!(
                    "expected_results[{i}].value cannot be used with bounded expected values"
                )),
                ExpectationError::Missing => SpecError::invalid(format!(
                    "at least 1 expected value bound is required when not using expected_results[{i}].value"
                )),
            })?;
        }

        Ok(())
    }
}

/// Expected value of one key in one result row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectedResult {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(
        default,
        rename = "lowerBoundedValue",
        skip_serializing_if = "Option::is_none"
    )]
    pub lower_bounded_value: Option<f64>,
    #[serde(
        default,
        rename = "upperBoundedValue",
        skip_serializing_if = "Option::is_none"
    )]
    pub upper_bounded_value: Option<f64>,
}

/// How an expected result is checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Expectation {
    Exact(Value),
    Bounded { lower: Option<f64>, upper: Option<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectationError {
    ValueWithBounds,
    Missing,
}

impl ExpectedResult {
    /// Resolve the result into exactly one kind of check.
    pub fn expectation(&self) -> Result<Expectation, ExpectationError> {
        let has_bounds = self.lower_bounded_value.is_some() || self.upper_bounded_value.is_some();
        match (&self.value, has_bounds) {
            (Some(_), true) => Err(ExpectationError::ValueWithBounds),
            (Some(value), false) => Ok(Expectation::Exact(Value::from(value))),
            (None, true) => Ok(Expectation::Bounded {
                lower: self.lower_bounded_value,
                upper: self.upper_bounded_value,
            }),
            (None, false) => Err(ExpectationError::Missing),
        }
    }
}

/// Entities that must have been created from the scenario's telemetry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityAssertion {
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub metric_name: String,
    #[serde(default)]
    pub expected_number: u32,
}

impl EntityAssertion {
    /// Minimum number of entity GUIDs required; unset means one.
    pub fn min_count(&self) -> u32 {
        self.expected_number.max(1)
    }
}

/// Metrics that must have been reported, described by an external catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricAssertion {
    pub source: String,
    #[serde(default)]
    pub exceptions_source: String,
    #[serde(flatten)]
    pub exceptions: Exceptions,
}
