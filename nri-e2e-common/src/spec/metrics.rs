//! Metric catalogs and exception lists referenced by metric assertions.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::SpecError;

/// Metrics an integration is expected to report, grouped by entity type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsCatalog {
    #[serde(default)]
    pub entities: Vec<EntityMetrics>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityMetrics {
    #[serde(rename = "entityType")]
    pub entity_type: String,
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

/// One catalog metric. Fields other than the name are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub name: String,
}

impl MetricsCatalog {
    pub fn parse(content: &[u8]) -> Result<Self, SpecError> {
        serde_yaml_ng::from_slice(content).map_err(|source| SpecError::Parse {
            what: "metrics catalog",
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SpecError> {
        Self::parse(&read(path)?)
    }

    /// Every `(entity type, metric name)` pair in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entities.iter().flat_map(|entity| {
            entity
                .metrics
                .iter()
                .map(move |metric| (entity.entity_type.as_str(), metric.name.as_str()))
        })
    }
}

/// Entity types and metrics that are not required to be reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Exceptions {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub except_entities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub except_metrics: Vec<String>,
}

impl Exceptions {
    pub fn parse(content: &[u8]) -> Result<Self, SpecError> {
        serde_yaml_ng::from_slice(content).map_err(|source| SpecError::Parse {
            what: "metrics exceptions",
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SpecError> {
        Self::parse(&read(path)?)
    }

    /// Union with another exception list.
    pub fn merge(&mut self, other: Exceptions) {
        self.except_entities.extend(other.except_entities);
        self.except_metrics.extend(other.except_metrics);
    }

    pub fn excludes_entity(&self, entity_type: &str) -> bool {
        self.except_entities.iter().any(|e| e == entity_type)
    }

    pub fn excludes_metric(&self, metric: &str) -> bool {
        self.except_metrics.iter().any(|m| m == metric)
    }
}

fn read(path: &Path) -> Result<Vec<u8>, SpecError> {
    std::fs::read(path).map_err(|source| SpecError::Io {
        path: path.to_path_buf(),
        source,
    })
}
