use std::rc::Rc;

use nri_e2e_common::Tests;
use nri_e2e_common::spec::EntityAssertion;
use tracing::debug;

use super::{TestError, Tester};
use crate::client::queries::entity_guids_query;
use crate::client::{QueryClient, Row};

const GUIDS_FIELD: &str = "uniques.entity.guid";

/// Checks that the expected entities were synthesized from scenario metrics.
pub struct EntitiesTester {
    client: Rc<dyn QueryClient>,
    account_id: u64,
}

impl EntitiesTester {
    pub fn new(client: Rc<dyn QueryClient>, account_id: u64) -> Self {
        Self { client, account_id }
    }

    fn check(&self, entity: &EntityAssertion, tag_key: &str, tag_value: &str, errors: &mut Vec<TestError>) {
        let query = entity_guids_query(&entity.data_type, &entity.metric_name, tag_key, tag_value);
        debug!(query = %query, entity_type = %entity.entity_type, "Checking entity assertion");

        let rows = match self.client.query(self.account_id, &query) {
            Ok(rows) => rows,
            Err(source) => {
                errors.push(TestError::Query { query, source });
                return;
            }
        };

        let guids = guids(rows.first());
        let expected = entity.min_count();
        if guids.len() < expected as usize {
            errors.push(TestError::EntityCount {
                query,
                expected,
                got: guids.len(),
            });
            return;
        }

        for guid in guids {
            match self.client.get_entity(&guid) {
                Err(source) => errors.push(TestError::EntityLookup { guid, source }),
                Ok(None) => debug!(guid = %guid, "Entity not found yet"),
                Ok(Some(found)) if found.entity_type != entity.entity_type => {
                    errors.push(TestError::EntityType {
                        got: found.entity_type,
                        expected: entity.entity_type.clone(),
                    });
                }
                Ok(Some(_)) => {}
            }
        }
    }
}

impl Tester for EntitiesTester {
    fn name(&self) -> &'static str {
        "entities"
    }

    fn test(&self, tests: &Tests, tag_key: &str, tag_value: &str) -> Vec<TestError> {
        let mut errors = Vec::new();
        for entity in &tests.entities {
            self.check(entity, tag_key, tag_value, &mut errors);
        }
        errors
    }
}

/// GUIDs listed in the first result row.
fn guids(row: Option<&Row>) -> Vec<String> {
    row.and_then(|row| row.get(GUIDS_FIELD))
        .and_then(|value| value.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
