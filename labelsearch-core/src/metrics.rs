//! Per-property metrics computed with backend aggregations.
//!
//! Metrics always cover the whole index: the request is a `size: 0`
//! `match_all` search carrying only the aggregations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::model::{MetadataProperty, MetadataType};

const TERMS_AGG: &str = "terms";
const COUNT_AGG: &str = "total";
const MIN_AGG: &str = "min";
const MAX_AGG: &str = "max";

/// Occurrences of one term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermCount {
    pub term: String,
    pub count: u64,
}

/// Distribution of a terms property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermsMetrics {
    /// Number of indexed values, counting each value of multi-valued records.
    pub total: u64,
    /// Sorted by count desc, then term asc.
    pub values: Vec<TermCount>,
}

/// Bounds of an integer or float property. `None` when no record has a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericMetrics {
    pub min: Option<Value>,
    pub max: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetadataMetrics {
    Terms(TermsMetrics),
    Integer(NumericMetrics),
    Float(NumericMetrics),
}

/// Builds the aggregation-only search body for a property.
///
/// Terms buckets are sized by the property's configured values when present,
/// otherwise by `default_terms_size`.
pub fn metrics_request(property: &MetadataProperty, default_terms_size: usize) -> Value {
    let field = format!("metadata.{}", property.name);
    let aggs = match &property.metadata_type {
        MetadataType::Terms { values } => {
            let size = values
                .as_ref()
                .map(|v| v.len())
                .filter(|n| *n > 0)
                .unwrap_or(default_terms_size);
            json!({
                TERMS_AGG: {"terms": {"field": field, "size": size}},
                COUNT_AGG: {"value_count": {"field": field}},
            })
        }
        MetadataType::Integer { .. } | MetadataType::Float { .. } => json!({
            MIN_AGG: {"min": {"field": field}},
            MAX_AGG: {"max": {"field": field}},
        }),
    };
    json!({
        "size": 0,
        "query": {"match_all": {}},
        "aggs": aggs,
    })
}

/// Parses the `aggregations` section of a metrics search response.
pub fn parse_metrics(property: &MetadataProperty, body: &Value) -> Result<MetadataMetrics> {
    let aggregations = body.get("aggregations");
    match &property.metadata_type {
        MetadataType::Terms { .. } => Ok(MetadataMetrics::Terms(parse_terms(aggregations)?)),
        MetadataType::Integer { .. } => Ok(MetadataMetrics::Integer(parse_numeric(
            aggregations,
            true,
        ))),
        MetadataType::Float { .. } => Ok(MetadataMetrics::Float(parse_numeric(
            aggregations,
            false,
        ))),
    }
}

fn parse_terms(aggregations: Option<&Value>) -> Result<TermsMetrics> {
    let Some(aggregations) = aggregations else {
        return Ok(TermsMetrics::default());
    };
    let total = aggregations
        .pointer(&format!("/{}/value", COUNT_AGG))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let buckets = aggregations
        .pointer(&format!("/{}/buckets", TERMS_AGG))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut values = buckets
        .iter()
        .map(|bucket| {
            let term = match bucket.get("key") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    return Err(Error::UnexpectedResponse {
                        operation: "compute_metrics_for",
                        reason: format!("terms bucket without key: {}", bucket),
                    })
                }
            };
            let count = bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
            Ok(TermCount { term, count })
        })
        .collect::<Result<Vec<_>>>()?;
    values.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.term.cmp(&b.term)));

    Ok(TermsMetrics { total, values })
}

fn parse_numeric(aggregations: Option<&Value>, integer: bool) -> NumericMetrics {
    let bound = |name: &str| {
        let value = aggregations?.get(name)?.get("value")?;
        let number = value.as_f64()?;
        if integer {
            Some(json!(number as i64))
        } else {
            Some(json!(number))
        }
    };
    NumericMetrics {
        min: bound(MIN_AGG),
        max: bound(MAX_AGG),
    }
}
