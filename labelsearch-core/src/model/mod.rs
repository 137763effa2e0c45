//! Domain value objects consumed by the engine.
//!
//! These are read-only inputs: the engine never mutates or persists them, it
//! only derives index mappings, documents and queries from them.

pub mod dataset;
pub mod record;

pub use dataset::{
    Dataset, Field, FieldType, MetadataProperty, MetadataType, Question, QuestionType,
    VectorSettings,
};
pub use record::{
    Record, RecordStatus, Response, ResponseStatus, Suggestion, SuggestionType, User,
};
