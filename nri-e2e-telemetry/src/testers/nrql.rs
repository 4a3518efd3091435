use std::rc::Rc;

use nri_e2e_common::spec::{Expectation, NrqlAssertion};
use nri_e2e_common::{Tests, Value, compare_bounded, compare_exact};
use tracing::debug;

use super::{TestError, Tester};
use crate::client::queries::scoped_query;
use crate::client::{QueryClient, Row};

/// Column ignored by the liveness check.
const TIMESTAMP_FIELD: &str = "timestamp";

/// Runs the scenario's NRQL assertions.
pub struct NrqlTester {
    client: Rc<dyn QueryClient>,
    account_id: u64,
}

impl NrqlTester {
    pub fn new(client: Rc<dyn QueryClient>, account_id: u64) -> Self {
        Self { client, account_id }
    }

    fn check(&self, nrql: &NrqlAssertion, tag_key: &str, tag_value: &str) -> Result<(), TestError> {
        nrql.validate().map_err(TestError::InvalidAssertion)?;

        let query = scoped_query(&nrql.query, tag_key, tag_value);
        debug!(query = %query, error_expected = nrql.error_expected, "Checking NRQL assertion");
        let result = self.client.query(self.account_id, &query);

        if nrql.error_expected {
            return match result {
                Ok(rows) if has_live_row(&rows) => Err(TestError::ErrorExpected { query }),
                _ => Ok(()),
            };
        }

        let rows = result.map_err(|source| TestError::Query {
            query: query.clone(),
            source,
        })?;

        if nrql.expected_results.is_empty() {
            return match rows.first() {
                None => Err(TestError::NoResult { query }),
                Some(row) if !is_live(row) => Err(TestError::NotValid { query }),
                Some(_) => Ok(()),
            };
        }

        if rows.len() != nrql.expected_results.len() {
            return Err(TestError::ResultNumber {
                query,
                expected: nrql.expected_results.len(),
                got: rows.len(),
            });
        }

        for (expected, row) in nrql.expected_results.iter().zip(&rows) {
            let actual = row.get(&expected.key).map(Value::from).unwrap_or(Value::Null);
            let outcome = match expected.expectation() {
                Ok(Expectation::Exact(value)) => compare_exact(&value, &actual),
                Ok(Expectation::Bounded { lower, upper }) => compare_bounded(&actual, lower, upper),
                // Rejected by validation above; surfaces as a missing-bounds configuration error.
                Err(_) => compare_bounded(&actual, None, None),
            };
            if let Err(source) = outcome {
                return Err(TestError::NotExpectedResult {
                    query,
                    key: expected.key.clone(),
                    source,
                });
            }
        }

        Ok(())
    }
}

impl Tester for NrqlTester {
    fn name(&self) -> &'static str {
        "nrql"
    }

    fn test(&self, tests: &Tests, tag_key: &str, tag_value: &str) -> Vec<TestError> {
        tests
            .nrqls
            .iter()
            .filter_map(|nrql| self.check(nrql, tag_key, tag_value).err())
            .collect()
    }
}

/// Every non-timestamp field of the row carries a value.
fn is_live(row: &Row) -> bool {
    row.iter()
        .filter(|(key, _)| key.as_str() != TIMESTAMP_FIELD)
        .all(|(_, value)| !value.is_null())
}

fn has_live_row(rows: &[Row]) -> bool {
    rows.first().is_some_and(is_live)
}
