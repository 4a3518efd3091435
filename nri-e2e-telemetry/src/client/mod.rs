//! Query client for the telemetry backend.

pub mod nerdgraph;
pub mod queries;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use nerdgraph::NerdGraphClient;

/// One NRQL result row, keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// An entity as returned by an entity lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub guid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("graphql error: {}", messages.join("; "))]
    GraphQl { messages: Vec<String> },

    #[error("unexpected response: {0}")]
    Decode(String),
}

/// Executes NRQL queries and entity lookups.
///
/// Implementations block until the backend answers.
pub trait QueryClient {
    fn query(&self, account_id: u64, nrql: &str) -> Result<Vec<Row>, ClientError>;

    /// Look up an entity by GUID. `Ok(None)` when the GUID does not resolve.
    fn get_entity(&self, guid: &str) -> Result<Option<Entity>, ClientError>;
}
