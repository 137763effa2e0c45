//! Filter model, text grammar and the compiler that turns them into backend
//! query clauses.

pub mod compile;
pub mod filter;
pub mod text;

pub use compile::{check_window, QueryCompiler};
pub use filter::{
    AndFilter, Filter, FilterScope, RangeFilter, RecordProperty, ResponseProperty,
    ResponseStatusFilter, ScopeFilter, Sort, SortOrder, SuggestionProperty, TermsFilter,
    TextQuery,
};
pub use text::TextExpr;
