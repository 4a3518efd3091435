use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_test_logging() {
    let _ = fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .try_init();
}

#[macro_export]
macro_rules! test_log {
    ($($arg:tt)*) => {
        tracing::info!(target: "test", $($arg)*);
    };
}

pub fn assert_contains(haystack: &str, needle: &str) {
    assert!(
        haystack.contains(needle),
        "Expected to find '{needle}' in output, got: {haystack}"
    );
}

/// A spec file in its own directory.
pub struct SpecFixture {
    // Owns the directory; dropping it removes the spec file.
    _dir: TempDir,
    pub spec_path: PathBuf,
}

impl SpecFixture {
    pub fn new(content: &str) -> Self {
        crate::test_log!("FIXTURE: Writing spec file");

        let dir = TempDir::new().expect("Failed to create temp dir");
        let spec_path = dir.path().join("e2e_spec.yml");
        fs::write(&spec_path, content).expect("Failed to write spec");
        Self {
            _dir: dir,
            spec_path,
        }
    }
}
