//! Telemetry queries and assertion testers for the integration e2e runner.

pub mod client;
pub mod testers;

pub use client::{ClientError, Entity, NerdGraphClient, QueryClient, Row};
pub use testers::{EntitiesTester, MetricsTester, NrqlTester, TestError, Tester};
