//! # labelsearch
//!
//! **Search, filtering and vector similarity for annotation datasets.**
//!
//! labelsearch keeps one search index per annotation dataset on an
//! Elasticsearch 8.x or OpenSearch 2.x cluster and hides the differences
//! between the two behind one API:
//!
//! - **Dynamic schemas**: each dataset's fields, questions, metadata
//!   properties and vector settings compile into an index mapping
//! - **Response filtering**: filter by any annotator's response status or
//!   answer, including the derived `pending` status
//! - **Full-text search** with a small boolean grammar (`|`, `+`, `-`, parentheses)
//! - **Bulk indexing** with per-record failure reports
//! - **Similarity search** over k-NN vector fields, nearest or farthest first
//! - **Metrics** for metadata properties
//!
//! ## Quick Start
//!
//! ### Compiling Queries
//!
//! Queries can be compiled without a cluster:
//!
//! ```rust
//! use labelsearch::prelude::*;
//! use labelsearch::ResponseLayout;
//!
//! let dataset = Dataset::new()
//!     .with_field(Field::text("text"))
//!     .with_question(Question::new(
//!         "sentiment",
//!         QuestionType::LabelSelection { labels: vec!["positive".into(), "negative".into()] },
//!     ));
//! let dataset = {
//!     let id = dataset.id;
//!     dataset.with_metadata_property(MetadataProperty::integer(id, "textId"))
//! };
//!
//! let filter = Filter::on(FilterScope::metadata("textId"))
//!     .between(3, 4)
//!     .and(Filter::on(FilterScope::response_status()).any_of(vec!["submitted", "pending"]));
//!
//! let compiler = QueryCompiler::new(&dataset, ResponseLayout::Nested);
//! let query = compiler
//!     .compile_query(Some(&TextQuery::new("cash | negative")), Some(&filter))
//!     .unwrap();
//! assert!(query["bool"]["must"].is_array());
//! ```
//!
//! ### Indexing and Searching
//!
//! ```no_run
//! use labelsearch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = EngineConfig::new("http://localhost:9200", Dialect::Elasticsearch);
//!     let engine = SearchEngine::new(config)?;
//!
//!     let dataset = Dataset::new().with_field(Field::text("text"));
//!     engine.ensure_index(&dataset).await?;
//!
//!     let record = Record::new(dataset.id).with_field("text", "My card was declined");
//!     let report = engine.index_records(&dataset, &[record]).await?;
//!     assert_eq!(report.outcome(), BulkOutcome::Applied);
//!
//!     engine.refresh_index(&dataset).await?;
//!     let results = engine
//!         .search(&dataset, SearchParams::new().with_query(TextQuery::new("card -atm")))
//!         .await?;
//!     println!("{} matching records", results.total);
//!     Ok(())
//! }
//! ```
//!
//! ### Similarity Search
//!
//! ```no_run
//! use labelsearch::prelude::*;
//!
//! # async fn run(engine: SearchEngine, dataset: Dataset) -> Result<()> {
//! let settings = dataset.vectors_settings[0].clone();
//! engine.configure_index_vectors(&settings).await?;
//!
//! let params = SimilarityParams::new(settings)
//!     .by_value(vec![0.1, 0.2, 0.3])
//!     .with_order(SimilarityOrder::MostSimilar)
//!     .with_max_results(20);
//! let similar = engine.similarity_search(&dataset, params).await?;
//! # let _ = similar;
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! | Dialect | Responses | Vectors |
//! |---------|-----------|---------|
//! | Elasticsearch 8.x | per-user object + `all_responses_statuses` | `dense_vector`, top-level `knn` |
//! | OpenSearch 2.x | nested array | `knn_vector` (lucene HNSW), `knn` query |
//!
//! ## Architecture
//!
//! labelsearch is organized into two crates:
//!
//! - **`labelsearch-core`**: schema, document and query compilers, bulk
//!   coordinator, transport and the engine
//! - **`labelsearch`**: main crate that re-exports everything
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T>`](crate::Result), which uses
//! the [`Error`] enum. Partial bulk failures are not errors: they are listed
//! in the returned [`BulkReport`].
//!
//! ## Logging
//!
//! The crate emits [`tracing`](https://docs.rs/tracing) events and never
//! installs a subscriber.
//!
//! ## Thread Safety
//!
//! [`SearchEngine`] is `Send + Sync` and meant to be shared behind an `Arc`.

// Re-export everything from core
pub use labelsearch_core::*;
