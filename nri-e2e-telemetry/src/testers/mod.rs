//! Assertion testers, one per telemetry aspect.
//!
//! A tester checks every assertion of its kind and returns one error per
//! failing assertion. It never stops at the first failure, so a single
//! attempt reports everything that is still missing.

mod entities;
mod error;
mod metrics;
mod nrql;

use nri_e2e_common::Tests;

pub use entities::EntitiesTester;
pub use error::TestError;
pub use metrics::MetricsTester;
pub use nrql::NrqlTester;

pub trait Tester {
    fn name(&self) -> &'static str;

    /// Check the tester's assertions against telemetry tagged `tag_key = tag_value`.
    fn test(&self, tests: &Tests, tag_key: &str, tag_value: &str) -> Vec<TestError>;
}
