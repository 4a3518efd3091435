use std::path::PathBuf;

use nri_e2e_common::{CompareError, RetryableError, SpecError};
use thiserror::Error;

use crate::client::ClientError;

/// A single failed assertion.
#[derive(Debug, Error)]
pub enum TestError {
    #[error(transparent)]
    InvalidAssertion(SpecError),

    #[error("querying: {query}: {source}")]
    Query {
        query: String,
        #[source]
        source: ClientError,
    },

    #[error("query did not return any results: {query}")]
    NoResult { query: String },

    #[error("query did not return valid results (null fields): {query}")]
    NotValid { query: String },

    #[error("an error was expected: {query}")]
    ErrorExpected { query: String },

    #[error("query did not return expected number of results: {query}\n - expected {expected} got {got}")]
    ResultNumber {
        query: String,
        expected: usize,
        got: usize,
    },

    #[error("query did not return expected results: {query}\n - for key '{key}': {source}")]
    NotExpectedResult {
        query: String,
        key: String,
        #[source]
        source: CompareError,
    },

    #[error("query did not return expected number of entities: {query}\n - expected {expected} got {got}")]
    EntityCount {
        query: String,
        expected: u32,
        got: usize,
    },

    #[error("getting entity {guid}: {source}")]
    EntityLookup {
        guid: String,
        #[source]
        source: ClientError,
    },

    #[error("entity type is not matching: {got}!={expected}")]
    EntityType { got: String, expected: String },

    #[error("finding Metric: {metric}")]
    MissingMetric { entity_type: String, metric: String },

    #[error("reading {}: {source}", path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: SpecError,
    },

    #[error("expanding path '{path}': {message}")]
    ExpandPath { path: String, message: String },
}

impl RetryableError for TestError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidAssertion(_) | Self::Source { .. } | Self::ExpandPath { .. } => false,
            Self::NotExpectedResult { source, .. } => !source.is_configuration(),
            _ => true,
        }
    }
}
