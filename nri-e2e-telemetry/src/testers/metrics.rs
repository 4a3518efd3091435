use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use nri_e2e_common::Tests;
use nri_e2e_common::spec::{Exceptions, MetricAssertion, MetricsCatalog};
use tracing::debug;

use super::{TestError, Tester};
use crate::client::QueryClient;
use crate::client::queries::metric_keyset_query;

const KEYSET_FIELD: &str = "key";

/// Checks that every catalog metric was reported, minus the exceptions.
pub struct MetricsTester {
    client: Rc<dyn QueryClient>,
    account_id: u64,
    spec_dir: PathBuf,
}

impl MetricsTester {
    pub fn new(client: Rc<dyn QueryClient>, account_id: u64, spec_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            account_id,
            spec_dir: spec_dir.into(),
        }
    }

    fn exceptions(&self, metrics: &MetricAssertion) -> Result<Exceptions, TestError> {
        let mut exceptions = metrics.exceptions.clone();
        if metrics.exceptions_source.is_empty() {
            return Ok(exceptions);
        }

        let joined = self.spec_dir.join(&metrics.exceptions_source);
        let joined = joined.to_string_lossy();
        let expanded = shellexpand::env(&joined).map_err(|err| TestError::ExpandPath {
            path: joined.to_string(),
            message: err.to_string(),
        })?;
        let path = Path::new(expanded.as_ref());

        let from_file = Exceptions::load(path).map_err(|source| TestError::Source {
            path: path.to_path_buf(),
            source,
        })?;
        exceptions.merge(from_file);
        Ok(exceptions)
    }

    fn check(&self, metrics: &MetricAssertion, tag_key: &str, tag_value: &str, errors: &mut Vec<TestError>) {
        let catalog_path = self.spec_dir.join(&metrics.source);
        let catalog = match MetricsCatalog::load(&catalog_path) {
            Ok(catalog) => catalog,
            Err(source) => {
                errors.push(TestError::Source {
                    path: catalog_path,
                    source,
                });
                return;
            }
        };

        let exceptions = match self.exceptions(metrics) {
            Ok(exceptions) => exceptions,
            Err(err) => {
                errors.push(err);
                return;
            }
        };

        let query = metric_keyset_query(tag_key, tag_value);
        let rows = match self.client.query(self.account_id, &query) {
            Ok(rows) if rows.is_empty() => {
                errors.push(TestError::NoResult { query });
                return;
            }
            Ok(rows) => rows,
            Err(source) => {
                errors.push(TestError::Query { query, source });
                return;
            }
        };

        let reported: HashSet<&str> = rows
            .iter()
            .filter_map(|row| row.get(KEYSET_FIELD).and_then(|key| key.as_str()))
            .collect();
        debug!(
            source = %metrics.source,
            reported = reported.len(),
            "Checking catalog metrics"
        );

        for (entity_type, metric) in catalog.pairs() {
            if exceptions.excludes_entity(entity_type) || exceptions.excludes_metric(metric) {
                debug!(entity_type, metric, "Skipping excepted metric");
                continue;
            }
            if !reported.contains(metric) {
                errors.push(TestError::MissingMetric {
                    entity_type: entity_type.to_string(),
                    metric: metric.to_string(),
                });
            }
        }
    }
}

impl Tester for MetricsTester {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn test(&self, tests: &Tests, tag_key: &str, tag_value: &str) -> Vec<TestError> {
        let mut errors = Vec::new();
        for metrics in &tests.metrics {
            self.check(metrics, tag_key, tag_value, &mut errors);
        }
        errors
    }
}
