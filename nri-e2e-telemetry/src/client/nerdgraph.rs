//! Blocking NerdGraph (GraphQL) client.

use std::time::Duration;

use nri_e2e_common::Region;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use super::{ClientError, Entity, QueryClient, Row};

const NRQL_QUERY: &str = "query($accountId: Int!, $nrql: Nrql!) { actor { account(id: $accountId) { nrql(query: $nrql) { results } } } }";
const ENTITY_QUERY: &str =
    "query($guid: EntityGuid!) { actor { entity(guid: $guid) { guid name type domain entityType } } }";

const API_KEY_HEADER: &str = "API-Key";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// [`QueryClient`] talking to the NerdGraph endpoint of a region.
pub struct NerdGraphClient {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
}

impl NerdGraphClient {
    pub fn new(api_key: impl Into<String>, region: Region) -> Self {
        Self::with_endpoint(api_key, region.nerdgraph_url())
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(DEFAULT_TIMEOUT))
            .build()
            .into();
        Self {
            agent,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn execute<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, ClientError> {
        let body = json!({ "query": query, "variables": variables });
        let mut response = self
            .agent
            .post(&self.endpoint)
            .header(API_KEY_HEADER, &self.api_key)
            .send_json(&body)?;
        let payload: GraphQlResponse<T> = response.body_mut().read_json()?;
        payload.into_data()
    }
}

impl QueryClient for NerdGraphClient {
    fn query(&self, account_id: u64, nrql: &str) -> Result<Vec<Row>, ClientError> {
        debug!(account_id, nrql, "Executing NRQL query");
        let data: NrqlData =
            self.execute(NRQL_QUERY, json!({ "accountId": account_id, "nrql": nrql }))?;
        let rows = data.into_rows()?;
        debug!(nrql, rows = rows.len(), "NRQL query returned");
        Ok(rows)
    }

    fn get_entity(&self, guid: &str) -> Result<Option<Entity>, ClientError> {
        debug!(guid, "Looking up entity");
        let data: EntityData = self.execute(ENTITY_QUERY, json!({ "guid": guid }))?;
        Ok(data.actor.and_then(|actor| actor.entity))
    }
}

// ---
// Response shapes
// ---

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self) -> Result<T, ClientError> {
        if !self.errors.is_empty() {
            return Err(ClientError::GraphQl {
                messages: self.errors.into_iter().map(|e| e.message).collect(),
            });
        }
        self.data
            .ok_or_else(|| ClientError::Decode("response carried no data".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct NrqlData {
    actor: Option<NrqlActor>,
}

#[derive(Debug, Deserialize)]
struct NrqlActor {
    account: Option<NrqlAccount>,
}

#[derive(Debug, Deserialize)]
struct NrqlAccount {
    nrql: Option<NrqlResults>,
}

#[derive(Debug, Deserialize)]
struct NrqlResults {
    #[serde(default)]
    results: Vec<Row>,
}

impl NrqlData {
    fn into_rows(self) -> Result<Vec<Row>, ClientError> {
        self.actor
            .and_then(|actor| actor.account)
            .and_then(|account| account.nrql)
            .map(|nrql| nrql.results)
            .ok_or_else(|| ClientError::Decode("missing actor.account.nrql".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct EntityData {
    actor: Option<EntityActor>,
}

#[derive(Debug, Deserialize)]
struct EntityActor {
    entity: Option<Entity>,
}
