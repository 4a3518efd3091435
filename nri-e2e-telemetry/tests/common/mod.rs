use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Once;

use nri_e2e_telemetry::{ClientError, Entity, QueryClient, Row};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_test_writer()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .with(filter)
            .init();
    });
}

/// In-memory query backend whose rows can change between attempts.
#[derive(Default)]
pub struct MockQueryClient {
    rows: RefCell<HashMap<String, Vec<Row>>>,
    entities: RefCell<HashMap<String, Entity>>,
    calls: Cell<usize>,
}

#[allow(dead_code)]
impl MockQueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rows(&self, nrql: &str, rows: Vec<serde_json::Value>) {
        let rows = rows
            .into_iter()
            .map(|row| match row {
                serde_json::Value::Object(map) => map,
                other => panic!("row must be an object, got {other}"),
            })
            .collect();
        self.rows.borrow_mut().insert(nrql.to_string(), rows);
    }

    pub fn set_entity(&self, guid: &str, entity_type: &str) {
        self.entities.borrow_mut().insert(
            guid.to_string(),
            Entity {
                guid: guid.to_string(),
                name: format!("entity-{guid}"),
                entity_type: entity_type.to_string(),
                domain: "INFRA".to_string(),
            },
        );
    }

    /// Number of NRQL queries executed so far.
    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl QueryClient for MockQueryClient {
    fn query(&self, _account_id: u64, nrql: &str) -> Result<Vec<Row>, ClientError> {
        self.calls.set(self.calls.get() + 1);
        Ok(self.rows.borrow().get(nrql).cloned().unwrap_or_default())
    }

    fn get_entity(&self, guid: &str) -> Result<Option<Entity>, ClientError> {
        Ok(self.entities.borrow().get(guid).cloned())
    }
}
