//! NRQL statements scoped to a scenario tag.

/// Placeholder replaced by the scenario tag inside spec queries.
pub const SCENARIO_TAG_PLACEHOLDER: &str = "${SCENARIO_TAG}";

/// Scope a spec query to the scenario and substitute the tag placeholder.
pub fn scoped_query(query: &str, tag_key: &str, tag_value: &str) -> String {
    format!("{query} WHERE {tag_key} = '{tag_value}'").replace(SCENARIO_TAG_PLACEHOLDER, tag_value)
}

/// Query returning the GUIDs of entities synthesized from a metric.
pub fn entity_guids_query(data_type: &str, metric_name: &str, tag_key: &str, tag_value: &str) -> String {
    format!(
        "SELECT uniques(entity.guid) from {data_type} where metricName = '{metric_name}' where {tag_key} = '{tag_value}' limit 1"
    )
}

/// Query returning every metric name reported for the scenario.
pub fn metric_keyset_query(tag_key: &str, tag_value: &str) -> String {
    format!("SELECT keyset() from Metric where {tag_key} = '{tag_value}'")
}
