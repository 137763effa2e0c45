//! Vector similarity search.
//!
//! Nearest neighbors use the backend's approximate k-NN; least-similar
//! searches rank the filtered candidates by L2 distance with a script.
//! Metadata filters and text queries are applied as pre-filters in both
//! directions.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::model::{Dataset, Record, VectorSettings};
use crate::query::{Filter, QueryCompiler, TextQuery};

/// Lower bound of the k-NN candidate pool.
pub const MIN_NUM_CANDIDATES: usize = 100;

/// Upper bound of the k-NN candidate pool and of `max_results`.
pub const MAX_NUM_CANDIDATES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityOrder {
    #[default]
    MostSimilar,
    LeastSimilar,
}

/// Parameters of a similarity search.
///
/// Exactly one of `value` and `record` must be set.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityParams {
    pub vector_settings: VectorSettings,
    pub value: Option<Vec<f32>>,
    pub record: Option<Record>,
    pub order: SimilarityOrder,
    pub max_results: usize,
    pub query: Option<TextQuery>,
    pub filter: Option<Filter>,
}

impl SimilarityParams {
    pub fn new(vector_settings: VectorSettings) -> Self {
        Self {
            vector_settings,
            value: None,
            record: None,
            order: SimilarityOrder::MostSimilar,
            max_results: 10,
            query: None,
            filter: None,
        }
    }

    /// Searches around an explicit vector. Chainable.
    pub fn by_value(mut self, value: Vec<f32>) -> Self {
        self.value = Some(value);
        self
    }

    /// Searches around a record's own vector, excluding the record. Chainable.
    pub fn by_record(mut self, record: Record) -> Self {
        self.record = Some(record);
        self
    }

    pub fn with_order(mut self, order: SimilarityOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn with_query(mut self, query: TextQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Query vector after validating the exclusivity and dimension rules.
    fn query_vector(&self, dataset: &Dataset) -> Result<&[f32]> {
        let settings = &self.vector_settings;
        if dataset.vector_settings(&settings.id).is_none() {
            return Err(Error::precondition(
                "similarity_search",
                format!("vector settings {:?} do not belong to the dataset", settings.name),
            ));
        }

        let vector = match (&self.value, &self.record) {
            (Some(value), None) => value.as_slice(),
            (None, Some(record)) => record
                .vectors
                .get(&settings.id)
                .map(Vec::as_slice)
                .ok_or_else(|| {
                    Error::precondition(
                        "similarity_search",
                        format!(
                            "record {} has no vector for {:?}",
                            record.id, settings.name
                        ),
                    )
                })?,
            _ => {
                return Err(Error::precondition(
                    "similarity_search",
                    "exactly one of value or record must be provided",
                ))
            }
        };

        if vector.len() != settings.dimensions {
            return Err(Error::precondition(
                "similarity_search",
                format!(
                    "vector has {} dimensions, {:?} expects {}",
                    vector.len(),
                    settings.name,
                    settings.dimensions
                ),
            ));
        }
        Ok(vector)
    }
}

/// Candidate pool size for approximate k-NN.
pub fn num_candidates(max_results: usize) -> usize {
    max_results
        .saturating_mul(2)
        .max(MIN_NUM_CANDIDATES)
        .min(MAX_NUM_CANDIDATES)
}

/// Builds the search body for a similarity search.
///
/// All preconditions are checked here, before anything is sent.
pub fn similarity_request(
    dataset: &Dataset,
    dialect: Dialect,
    params: &SimilarityParams,
) -> Result<Value> {
    let vector = params.query_vector(dataset)?;
    if params.max_results == 0 || params.max_results > MAX_NUM_CANDIDATES {
        return Err(Error::precondition(
            "similarity_search",
            format!(
                "max_results must be between 1 and {}, got {}",
                MAX_NUM_CANDIDATES, params.max_results
            ),
        ));
    }

    let field = format!("vectors.{}", params.vector_settings.field_name());
    let prefilter = prefilter(dataset, dialect, params, &field)?;
    let k = params.max_results;

    let mut body = match (params.order, dialect) {
        (SimilarityOrder::MostSimilar, Dialect::Elasticsearch) => json!({
            "knn": {
                "field": field,
                "query_vector": vector,
                "k": k,
                "num_candidates": num_candidates(k),
                "filter": prefilter,
            }
        }),
        (SimilarityOrder::MostSimilar, Dialect::OpenSearch) => json!({
            "query": {
                "knn": {
                    field.clone(): {
                        "vector": vector,
                        "k": k,
                        "filter": prefilter,
                    }
                }
            }
        }),
        (SimilarityOrder::LeastSimilar, _) => json!({
            "query": {
                "script_score": {
                    "query": prefilter,
                    "script": {
                        "source": dialect.l2_distance_script(&field),
                        "params": {"query_vector": vector},
                    }
                }
            }
        }),
    };

    body["size"] = json!(k);
    body["_source"] = json!(false);
    body["track_total_hits"] = json!(true);
    Ok(body)
}

/// Filter, text query, vector presence and self-exclusion as one clause.
fn prefilter(
    dataset: &Dataset,
    dialect: Dialect,
    params: &SimilarityParams,
    field: &str,
) -> Result<Value> {
    let compiler = QueryCompiler::new(dataset, dialect.response_layout());
    let mut filters = vec![json!({"exists": {"field": field}})];
    if let Some(query) = &params.query {
        filters.push(compiler.compile_text(query)?);
    }
    if let Some(filter) = &params.filter {
        filters.push(compiler.compile_filter(filter)?);
    }

    let mut clause = json!({"bool": {"filter": filters}});
    if let Some(record) = &params.record {
        clause["bool"]["must_not"] = json!([{"ids": {"values": [record.id]}}]);
    }
    Ok(clause)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Field, MetadataProperty};
    use crate::query::FilterScope;
    use uuid::Uuid;

    fn test_dataset() -> (Dataset, VectorSettings) {
        let id = Uuid::new_v4();
        let dataset = Dataset::with_id(id)
            .with_field(Field::text("text"))
            .with_metadata_property(MetadataProperty::terms(id, "split"))
            .with_vector_settings(VectorSettings::new(id, "emb", 3));
        let settings = dataset.vectors_settings[0].clone();
        (dataset, settings)
    }

    #[test]
    fn test_num_candidates() {
        assert_eq!(num_candidates(1), 100);
        assert_eq!(num_candidates(60), 120);
        assert_eq!(num_candidates(9_000), 10_000);
    }

    #[test]
    fn test_exactly_one_source() {
        let (dataset, settings) = test_dataset();
        let record = Record::new(dataset.id).with_vector(settings.id, vec![1.0, 2.0, 3.0]);

        let neither = SimilarityParams::new(settings.clone());
        let both = SimilarityParams::new(settings.clone())
            .by_value(vec![1.0, 2.0, 3.0])
            .by_record(record);
        for params in [neither, both] {
            let err = similarity_request(&dataset, Dialect::Elasticsearch, &params).unwrap_err();
            assert!(err.is_precondition());
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let (dataset, settings) = test_dataset();
        let params = SimilarityParams::new(settings.clone()).by_value(vec![1.0, 2.0]);
        assert!(similarity_request(&dataset, Dialect::OpenSearch, &params)
            .unwrap_err()
            .is_precondition());

        let record = Record::new(dataset.id);
        let params = SimilarityParams::new(settings).by_record(record);
        assert!(similarity_request(&dataset, Dialect::OpenSearch, &params)
            .unwrap_err()
            .is_precondition());
    }

    #[test]
    fn test_foreign_vector_settings() {
        let (dataset, _) = test_dataset();
        let foreign = VectorSettings::new(Uuid::new_v4(), "other", 3);
        let params = SimilarityParams::new(foreign).by_value(vec![0.0; 3]);
        assert!(similarity_request(&dataset, Dialect::Elasticsearch, &params).is_err());
    }

    #[test]
    fn test_most_similar_elasticsearch() {
        let (dataset, settings) = test_dataset();
        let params = SimilarityParams::new(settings.clone())
            .by_value(vec![1.0, 0.0, 0.0])
            .with_max_results(5)
            .with_filter(Filter::on(FilterScope::metadata("split")).eq("train"));
        let body = similarity_request(&dataset, Dialect::Elasticsearch, &params).unwrap();

        let field = format!("vectors.{}", settings.id);
        assert_eq!(body["knn"]["field"], field.as_str());
        assert_eq!(body["knn"]["k"], 5);
        assert_eq!(body["knn"]["num_candidates"], 100);
        let filters = body["knn"]["filter"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters[0], json!({"exists": {"field": field}}));
        assert_eq!(filters[1], json!({"terms": {"metadata.split": ["train"]}}));
        assert_eq!(body["size"], 5);
        assert_eq!(body["track_total_hits"], true);
    }

    #[test]
    fn test_most_similar_opensearch_by_record() {
        let (dataset, settings) = test_dataset();
        let record = Record::new(dataset.id).with_vector(settings.id, vec![1.0, 2.0, 3.0]);
        let params = SimilarityParams::new(settings.clone()).by_record(record.clone());
        let body = similarity_request(&dataset, Dialect::OpenSearch, &params).unwrap();

        let knn = &body["query"]["knn"][format!("vectors.{}", settings.id)];
        assert_eq!(knn["vector"], json!([1.0, 2.0, 3.0]));
        assert_eq!(knn["k"], 10);
        assert_eq!(
            knn["filter"]["bool"]["must_not"],
            json!([{"ids": {"values": [record.id]}}])
        );
    }

    #[test]
    fn test_least_similar_uses_distance_script() {
        let (dataset, settings) = test_dataset();
        for dialect in [Dialect::Elasticsearch, Dialect::OpenSearch] {
            let params = SimilarityParams::new(settings.clone())
                .by_value(vec![0.0, 0.0, 1.0])
                .with_order(SimilarityOrder::LeastSimilar)
                .with_query(TextQuery::new("cash"));
            let body = similarity_request(&dataset, dialect, &params).unwrap();
            let script_score = &body["query"]["script_score"];
            assert_eq!(
                script_score["script"]["source"],
                dialect.l2_distance_script(&format!("vectors.{}", settings.id))
            );
            assert_eq!(script_score["script"]["params"]["query_vector"], json!([0.0, 0.0, 1.0]));
            let filters = script_score["query"]["bool"]["filter"].as_array().unwrap();
            assert!(filters[1].get("multi_match").is_some());
        }
    }

    #[test]
    fn test_max_results_bounds() {
        let (dataset, settings) = test_dataset();
        for max_results in [0, 10_001] {
            let params = SimilarityParams::new(settings.clone())
                .by_value(vec![0.0; 3])
                .with_max_results(max_results);
            assert!(similarity_request(&dataset, Dialect::Elasticsearch, &params).is_err());
        }
    }
}
