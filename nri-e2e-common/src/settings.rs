//! Runtime settings resolved from command-line options.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::retry::RetryPolicy;
use crate::spec::{Definition, SpecError};

/// Commit SHA used for scenario tags when none is supplied.
const DEFAULT_COMMIT_SHA: &str = "0000000";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("account id must be a non-zero integer")]
    InvalidAccountId,

    #[error("unknown region '{0}' (expected one of: US, EU, Staging)")]
    UnknownRegion(String),

    #[error("failed to load spec {}", path.display())]
    Spec {
        path: PathBuf,
        #[source]
        source: SpecError,
    },
}

/// NerdGraph region the account lives in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Region {
    #[default]
    Us,
    Eu,
    Staging,
}

impl Region {
    /// GraphQL endpoint for the region.
    pub fn nerdgraph_url(&self) -> &'static str {
        match self {
            Self::Us => "https://api.newrelic.com/graphql",
            Self::Eu => "https://api.eu.newrelic.com/graphql",
            Self::Staging => "https://staging-api.newrelic.com/graphql",
        }
    }
}

impl FromStr for Region {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "us" => Ok(Self::Us),
            "eu" => Ok(Self::Eu),
            "staging" => Ok(Self::Staging),
            _ => Err(SettingsError::UnknownRegion(s.to_string())),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Us => write!(f, "US"),
            Self::Eu => write!(f, "EU"),
            Self::Staging => write!(f, "Staging"),
        }
    }
}

/// Raw options as provided on the command line.
#[derive(Debug, Clone, Default)]
pub struct SettingsOptions {
    pub spec_path: PathBuf,
    pub license_key: String,
    pub api_key: String,
    pub account_id: u64,
    pub agent_enabled: bool,
    pub retry_attempts: u32,
    pub retry_seconds: u64,
    pub commit_sha: String,
    pub region: String,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub definition: Definition,
    pub spec_path: PathBuf,
    /// Directory containing the spec; relative paths in the spec resolve here.
    pub spec_dir: PathBuf,
    pub license_key: String,
    pub api_key: String,
    pub account_id: u64,
    pub agent_enabled: bool,
    pub retry_policy: RetryPolicy,
    pub commit_sha: String,
    pub region: Region,
}

impl Settings {
    /// Validate options and load the spec they point at.
    pub fn load(options: SettingsOptions) -> Result<Self, SettingsError> {
        if options.license_key.trim().is_empty() {
            return Err(SettingsError::Missing("license key"));
        }
        if options.api_key.trim().is_empty() {
            return Err(SettingsError::Missing("api key"));
        }
        if options.spec_path.as_os_str().is_empty() {
            return Err(SettingsError::Missing("spec path"));
        }
        if options.account_id == 0 {
            return Err(SettingsError::InvalidAccountId);
        }
        let region: Region = options.region.parse()?;

        let definition =
            Definition::load(&options.spec_path).map_err(|source| SettingsError::Spec {
                path: options.spec_path.clone(),
                source,
            })?;

        let spec_dir = spec_dir(&options.spec_path);
        let commit_sha = if options.commit_sha.trim().is_empty() {
            DEFAULT_COMMIT_SHA.to_string()
        } else {
            options.commit_sha.trim().to_string()
        };

        let settings = Self {
            definition,
            spec_dir,
            spec_path: options.spec_path,
            license_key: options.license_key,
            api_key: options.api_key,
            account_id: options.account_id,
            agent_enabled: options.agent_enabled,
            retry_policy: RetryPolicy::new(
                options.retry_attempts,
                Duration::from_secs(options.retry_seconds),
            ),
            commit_sha,
            region,
        };

        debug!(
            spec_path = %settings.spec_path.display(),
            spec_dir = %settings.spec_dir.display(),
            account_id = settings.account_id,
            region = %settings.region,
            agent_enabled = settings.agent_enabled,
            retry_attempts = settings.retry_policy.max_attempts,
            retry_seconds = settings.retry_policy.delay.as_secs(),
            "Settings loaded"
        );
        Ok(settings)
    }

    pub fn custom_test_key(&self) -> &str {
        &self.definition.custom_test_key
    }
}

fn spec_dir(spec_path: &Path) -> PathBuf {
    match spec_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_spec(dir: &Path) -> PathBuf {
        let path = dir.join("e2e_spec.yml");
        std::fs::write(
            &path,
            "scenarios:\n  - description: smoke\n    tests:\n      nrqls:\n        - query: SELECT 1 FROM Metric\n",
        )
        .expect("write spec");
        path
    }

    fn options(spec_path: PathBuf) -> SettingsOptions {
        SettingsOptions {
            spec_path,
            license_key: "license".into(),
            api_key: "api".into(),
            account_id: 12345,
            agent_enabled: true,
            retry_attempts: 3,
            retry_seconds: 5,
            commit_sha: String::new(),
            region: "US".into(),
        }
    }

    // ---
    // Region
    // ---

    #[test]
    fn test_region_parse() {
        assert_eq!("US".parse::<Region>().unwrap(), Region::Us);
        assert_eq!("eu".parse::<Region>().unwrap(), Region::Eu);
        assert_eq!("Staging".parse::<Region>().unwrap(), Region::Staging);
        assert_eq!("".parse::<Region>().unwrap(), Region::Us);
        assert!(matches!(
            "APAC".parse::<Region>(),
            Err(SettingsError::UnknownRegion(_))
        ));
    }

    #[test]
    fn test_region_endpoints() {
        assert_eq!(Region::Us.nerdgraph_url(), "https://api.newrelic.com/graphql");
        assert_eq!(Region::Eu.nerdgraph_url(), "https://api.eu.newrelic.com/graphql");
        assert_eq!(
            Region::Staging.nerdgraph_url(),
            "https://staging-api.newrelic.com/graphql"
        );
    }

    // ---
    // Settings::load
    // ---

    #[test]
    fn test_load_valid_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec_path = write_spec(dir.path());

        let settings = Settings::load(options(spec_path)).expect("load settings");
        assert_eq!(settings.spec_dir, dir.path());
        assert_eq!(settings.definition.scenarios.len(), 1);
        assert_eq!(settings.retry_policy.max_attempts, 3);
        assert_eq!(settings.retry_policy.delay, Duration::from_secs(5));
        assert_eq!(settings.commit_sha, DEFAULT_COMMIT_SHA);
        assert_eq!(settings.custom_test_key(), "testKey");
    }

    #[test]
    fn test_missing_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let spec_path = write_spec(dir.path());

        let mut opts = options(spec_path.clone());
        opts.license_key.clear();
        assert!(matches!(
            Settings::load(opts),
            Err(SettingsError::Missing("license key"))
        ));

        let mut opts = options(spec_path);
        opts.api_key = "  ".into();
        assert!(matches!(
            Settings::load(opts),
            Err(SettingsError::Missing("api key"))
        ));
    }

    #[test]
    fn test_zero_account_id_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut opts = options(write_spec(dir.path()));
        opts.account_id = 0;
        assert!(matches!(
            Settings::load(opts),
            Err(SettingsError::InvalidAccountId)
        ));
    }

    #[test]
    fn test_invalid_spec_is_reported_with_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.yml");
        std::fs::write(
            &path,
            "scenarios:\n  - tests:\n      nrqls:\n        - query: ''\n",
        )
        .expect("write");

        let err = Settings::load(options(path)).unwrap_err();
        assert!(matches!(err, SettingsError::Spec { .. }));
        assert!(err.to_string().contains("bad.yml"));
    }

    #[test]
    fn test_spec_dir_of_bare_file_name() {
        assert_eq!(spec_dir(Path::new("spec.yml")), PathBuf::from("."));
        assert_eq!(spec_dir(Path::new("a/b/spec.yml")), PathBuf::from("a/b"));
    }
}
