//! Backend-agnostic filter, text query and sort model.
//!
//! Nodes carry a [`FilterScope`] pointing into the logical record model; the
//! physical field paths are only resolved by the
//! [`QueryCompiler`](crate::query::QueryCompiler).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{ResponseStatus, User};

/// Top-level record properties that can be filtered or sorted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordProperty {
    Id,
    Status,
    InsertedAt,
    UpdatedAt,
}

impl RecordProperty {
    pub fn path(&self) -> &'static str {
        match self {
            RecordProperty::Id => "id",
            RecordProperty::Status => "status",
            RecordProperty::InsertedAt => "inserted_at",
            RecordProperty::UpdatedAt => "updated_at",
        }
    }
}

/// What part of a response a scope points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseProperty {
    Status,
    Question(String),
}

/// Suggestion attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionProperty {
    Value,
    Score,
    Agent,
    Type,
}

impl SuggestionProperty {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionProperty::Value => "value",
            SuggestionProperty::Score => "score",
            SuggestionProperty::Agent => "agent",
            SuggestionProperty::Type => "type",
        }
    }
}

/// Status values accepted by response status filters.
///
/// `Pending` is never stored: it is derived as "no stored response status".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatusFilter {
    Pending,
    Draft,
    Submitted,
    Discarded,
}

impl ResponseStatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatusFilter::Pending => "pending",
            ResponseStatusFilter::Draft => "draft",
            ResponseStatusFilter::Submitted => "submitted",
            ResponseStatusFilter::Discarded => "discarded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" | "missing" => Some(ResponseStatusFilter::Pending),
            "draft" => Some(ResponseStatusFilter::Draft),
            "submitted" => Some(ResponseStatusFilter::Submitted),
            "discarded" => Some(ResponseStatusFilter::Discarded),
            _ => None,
        }
    }
}

impl From<ResponseStatus> for ResponseStatusFilter {
    fn from(status: ResponseStatus) -> Self {
        match status {
            ResponseStatus::Draft => ResponseStatusFilter::Draft,
            ResponseStatus::Submitted => ResponseStatusFilter::Submitted,
            ResponseStatus::Discarded => ResponseStatusFilter::Discarded,
        }
    }
}

impl From<ResponseStatusFilter> for Value {
    fn from(status: ResponseStatusFilter) -> Self {
        Value::String(status.as_str().to_string())
    }
}

/// Pointer into the record model a filter or sort is evaluated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity", rename_all = "snake_case")]
pub enum FilterScope {
    Record {
        property: RecordProperty,
    },
    Metadata {
        name: String,
    },
    Response {
        property: ResponseProperty,
        #[serde(default)]
        user: Option<User>,
    },
    Suggestion {
        question: String,
        property: SuggestionProperty,
    },
}

impl FilterScope {
    pub fn record(property: RecordProperty) -> Self {
        FilterScope::Record { property }
    }

    pub fn metadata(name: impl Into<String>) -> Self {
        FilterScope::Metadata { name: name.into() }
    }

    /// Response status of any user.
    pub fn response_status() -> Self {
        FilterScope::Response {
            property: ResponseProperty::Status,
            user: None,
        }
    }

    /// Answer to a question by any user.
    pub fn response_question(question: impl Into<String>) -> Self {
        FilterScope::Response {
            property: ResponseProperty::Question(question.into()),
            user: None,
        }
    }

    pub fn suggestion(question: impl Into<String>, property: SuggestionProperty) -> Self {
        FilterScope::Suggestion {
            question: question.into(),
            property,
        }
    }

    /// Restricts a response scope to one user. Other scopes are unchanged.
    pub fn for_user(self, user: User) -> Self {
        match self {
            FilterScope::Response { property, .. } => FilterScope::Response {
                property,
                user: Some(user),
            },
            other => other,
        }
    }
}

/// Exact set membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermsFilter {
    pub scope: FilterScope,
    pub values: Vec<Value>,
}

/// Inclusive numeric bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeFilter {
    pub scope: FilterScope,
    #[serde(default)]
    pub ge: Option<Value>,
    #[serde(default)]
    pub le: Option<Value>,
}

/// Conjunction of filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AndFilter {
    pub filters: Vec<Filter>,
}

/// A filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Filter {
    Terms(TermsFilter),
    Range(RangeFilter),
    And(AndFilter),
}

impl Filter {
    /// Starts a filter on the given scope.
    ///
    /// # Example
    ///
    /// ```
    /// use labelsearch_core::query::{Filter, FilterScope};
    ///
    /// let filter = Filter::on(FilterScope::metadata("textId"))
    ///     .between(3, 4)
    ///     .and(Filter::on(FilterScope::metadata("split")).any_of(vec!["train"]));
    /// assert_eq!(filter.flatten().len(), 2);
    /// ```
    pub fn on(scope: FilterScope) -> ScopeFilter {
        ScopeFilter { scope }
    }

    /// Conjunction of all given filters.
    pub fn all(filters: Vec<Filter>) -> Self {
        Filter::And(AndFilter { filters })
    }

    /// Combines this filter with another using AND.
    pub fn and(self, other: Filter) -> Self {
        let mut filters = self.flatten();
        filters.extend(other.flatten());
        Filter::And(AndFilter { filters })
    }

    /// Leaf filters of this expression with nested conjunctions flattened.
    pub fn flatten(self) -> Vec<Filter> {
        match self {
            Filter::And(and) => and.filters.into_iter().flat_map(Filter::flatten).collect(),
            leaf => vec![leaf],
        }
    }
}

/// Builder for scope-specific filter nodes.
#[derive(Debug)]
pub struct ScopeFilter {
    scope: FilterScope,
}

impl ScopeFilter {
    /// Scope value is one of `values`.
    pub fn any_of<V: Into<Value>>(self, values: Vec<V>) -> Filter {
        Filter::Terms(TermsFilter {
            scope: self.scope,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// Scope value is `value`.
    pub fn eq<V: Into<Value>>(self, value: V) -> Filter {
        self.any_of(vec![value])
    }

    /// Scope value is greater than or equal to `value`.
    pub fn ge<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Range(RangeFilter {
            scope: self.scope,
            ge: Some(value.into()),
            le: None,
        })
    }

    /// Scope value is less than or equal to `value`.
    pub fn le<V: Into<Value>>(self, value: V) -> Filter {
        Filter::Range(RangeFilter {
            scope: self.scope,
            ge: None,
            le: Some(value.into()),
        })
    }

    /// Scope value lies in `[ge, le]`.
    pub fn between<V: Into<Value>>(self, ge: V, le: V) -> Filter {
        Filter::Range(RangeFilter {
            scope: self.scope,
            ge: Some(ge.into()),
            le: Some(le.into()),
        })
    }
}

/// Full-text query, optionally restricted to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextQuery {
    pub q: String,
    #[serde(default)]
    pub field: Option<String>,
}

impl TextQuery {
    pub fn new(q: impl Into<String>) -> Self {
        Self {
            q: q.into(),
            field: None,
        }
    }

    /// Restricts the query to one field. Chainable.
    pub fn in_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One sort criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sort {
    pub scope: FilterScope,
    #[serde(default)]
    pub order: SortOrder,
}

impl Sort {
    pub fn asc(scope: FilterScope) -> Self {
        Self {
            scope,
            order: SortOrder::Asc,
        }
    }

    pub fn desc(scope: FilterScope) -> Self {
        Self {
            scope,
            order: SortOrder::Desc,
        }
    }
}
