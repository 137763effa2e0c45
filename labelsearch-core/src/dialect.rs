//! Backend dialects.
//!
//! Elasticsearch and OpenSearch share the query DSL but diverge on vector
//! fields, k-NN requests and index settings. Every dialect-specific decision
//! lives behind [`Dialect`]; the filter AST and the domain model never see it.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Supported search backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Dialect {
    /// Elasticsearch 8.x. Responses stored per user under a dynamic object.
    #[default]
    #[serde(rename = "elasticsearch")]
    Elasticsearch,
    /// OpenSearch 2.x with the k-NN plugin. Responses stored as a nested array.
    #[serde(rename = "opensearch")]
    OpenSearch,
}

/// Physical shape of the `responses` container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseLayout {
    /// `responses` is a nested array of `{id, status, user_id, <question>...}`.
    Nested,
    /// `responses.<username>` holds `{status, values.<question>}`, with every
    /// status copied into [`ALL_RESPONSES_STATUSES`](crate::schema::ALL_RESPONSES_STATUSES).
    PerUser,
}

impl Dialect {
    #[inline]
    pub fn response_layout(&self) -> ResponseLayout {
        match self {
            Dialect::Elasticsearch => ResponseLayout::PerUser,
            Dialect::OpenSearch => ResponseLayout::Nested,
        }
    }

    /// Mapping of one vector field with L2 distance and an HNSW graph.
    pub fn vector_mapping(&self, dimensions: usize) -> Value {
        match self {
            Dialect::Elasticsearch => json!({
                "type": "dense_vector",
                "dims": dimensions,
                "index": true,
                "similarity": "l2_norm",
                "index_options": {"type": "hnsw"},
            }),
            Dialect::OpenSearch => json!({
                "type": "knn_vector",
                "dimension": dimensions,
                "method": {
                    "name": "hnsw",
                    "space_type": "l2",
                    "engine": "lucene",
                },
            }),
        }
    }

    /// Index settings required by this dialect on top of the common ones.
    pub fn extra_index_settings(&self) -> Map<String, Value> {
        let mut settings = Map::new();
        if let Dialect::OpenSearch = self {
            settings.insert("index.knn".to_string(), Value::Bool(true));
        }
        settings
    }

    /// Painless source computing the L2 distance to `params.query_vector`.
    ///
    /// Used to rank by dissimilarity: higher score means farther away.
    pub fn l2_distance_script(&self, field_path: &str) -> String {
        match self {
            Dialect::Elasticsearch => format!("l2norm(params.query_vector, '{field_path}')"),
            Dialect::OpenSearch => format!("l2Squared(params.query_vector, doc['{field_path}'])"),
        }
    }
}
