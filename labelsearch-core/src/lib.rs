//! # labelsearch Core
//!
//! Core library for labelsearch: search-index management for annotation
//! datasets on Elasticsearch 8.x and OpenSearch 2.x.
//!
//! The crate turns dataset definitions into index mappings, records into
//! index documents, and a backend-agnostic filter model into query DSL. The
//! [`SearchEngine`] facade runs those against a cluster.
//!
//! ## Core Types
//!
//! ### Model
//!
//! - [`Dataset`] - Fields, questions, metadata properties and vector settings
//! - [`Record`] - The indexed unit, with responses, suggestions and vectors
//!
//! ### Compilation
//!
//! - [`schema::compile_index`] - Dataset to settings and mappings
//! - [`document::record_document`] - Record to index document
//! - [`QueryCompiler`] - [`Filter`], [`TextQuery`] and [`Sort`] to query DSL
//!
//! ### Engine
//!
//! - [`SearchEngine`] - Index lifecycle, bulk writes, search, similarity
//!   search and metrics
//! - [`Transport`] - Pluggable HTTP transport, [`HttpTransport`] by default
//! - [`Dialect`] - Backend differences (response layout, k-NN, settings)

pub mod bulk;
pub mod config;
pub mod dialect;
pub mod document;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod query;
pub mod schema;
pub mod similarity;
pub mod transport;

// Re-exports for convenient access
pub use bulk::{BulkFailure, BulkOutcome, BulkReport};
pub use config::{EngineConfig, RefreshPolicy};
pub use dialect::{Dialect, ResponseLayout};
pub use engine::{SearchEngine, SearchParams, SearchResponseItem, SearchResponses};
pub use error::{Error, Result};
pub use metrics::{MetadataMetrics, NumericMetrics, TermCount, TermsMetrics};
pub use model::{
    Dataset, Field, FieldType, MetadataProperty, MetadataType, Question, QuestionType, Record,
    RecordStatus, Response, ResponseStatus, Suggestion, SuggestionType, User, VectorSettings,
};
pub use query::{
    Filter, FilterScope, QueryCompiler, RecordProperty, ResponseStatusFilter, Sort, SortOrder,
    SuggestionProperty, TextExpr, TextQuery,
};
pub use similarity::{SimilarityOrder, SimilarityParams};
pub use transport::{HttpTransport, Transport};

/// Re-export commonly used types for convenience.
///
/// # Example
///
/// ```rust
/// use labelsearch_core::prelude::*;
///
/// let dataset = Dataset::new()
///     .with_field(Field::text("text"))
///     .with_question(Question::new(
///         "label",
///         QuestionType::LabelSelection { labels: vec!["positive".into(), "negative".into()] },
///     ));
/// let record = Record::new(dataset.id).with_field("text", "I lost my card");
///
/// let filter = Filter::on(FilterScope::response_status()).eq("pending");
/// let compiler = QueryCompiler::new(&dataset, Dialect::OpenSearch.response_layout());
/// assert!(compiler.compile_filter(&filter).is_ok());
/// assert_eq!(record.dataset_id, dataset.id);
/// ```
pub mod prelude {
    pub use crate::{
        BulkOutcome, BulkReport, Dataset, Dialect, EngineConfig, Error, Field, FieldType, Filter,
        FilterScope, MetadataMetrics, MetadataProperty, MetadataType, Question, QuestionType,
        QueryCompiler, Record, Response, ResponseStatus, Result, SearchEngine, SearchParams,
        SearchResponses, SimilarityOrder, SimilarityParams, Sort, Suggestion, TextQuery, User,
        VectorSettings,
    };
}
