//! Query compiler: filter AST, text queries and sorts to backend query DSL.

use serde_json::{json, Value};

use crate::dialect::ResponseLayout;
use crate::error::{Error, Result};
use crate::model::{Dataset, FieldType, QuestionType, ResponseStatus, User};
use crate::query::filter::{
    Filter, FilterScope, RangeFilter, ResponseProperty, ResponseStatusFilter, Sort, TermsFilter,
    TextQuery,
};
use crate::query::text::TextExpr;
use crate::schema::ALL_RESPONSES_STATUSES;

/// Stored statuses as filter values; "pending" means none of these.
fn stored_statuses() -> Vec<&'static str> {
    ResponseStatus::STORED.iter().map(|s| s.as_str()).collect()
}

/// Compiles filters, text queries and sorts against one dataset's schema.
#[derive(Debug, Clone, Copy)]
pub struct QueryCompiler<'a> {
    dataset: &'a Dataset,
    layout: ResponseLayout,
}

impl<'a> QueryCompiler<'a> {
    pub fn new(dataset: &'a Dataset, layout: ResponseLayout) -> Self {
        Self { dataset, layout }
    }

    /// Combines an optional text query and an optional filter into one query.
    ///
    /// The text query scores; the filter only restricts.
    pub fn compile_query(&self, text: Option<&TextQuery>, filter: Option<&Filter>) -> Result<Value> {
        let must = text.map(|t| self.compile_text(t)).transpose()?;
        let filter = filter.map(|f| self.compile_filter(f)).transpose()?;

        Ok(match (must, filter) {
            (None, None) => json!({"match_all": {}}),
            (Some(must), None) => must,
            (None, Some(filter)) => json!({"bool": {"filter": [filter]}}),
            (Some(must), Some(filter)) => json!({"bool": {"must": [must], "filter": [filter]}}),
        })
    }

    /// Compiles a filter expression into a non-scoring clause.
    pub fn compile_filter(&self, filter: &Filter) -> Result<Value> {
        match filter {
            Filter::Terms(terms) => self.compile_terms(terms),
            Filter::Range(range) => self.compile_range(range),
            Filter::And(_) => {
                let leaves = filter.clone().flatten();
                match leaves.len() {
                    0 => Ok(json!({"match_all": {}})),
                    1 => self.compile_filter(&leaves[0]),
                    _ => {
                        let clauses = leaves
                            .iter()
                            .map(|f| self.compile_filter(f))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(json!({"bool": {"filter": clauses}}))
                    }
                }
            }
        }
    }

    fn compile_terms(&self, terms: &TermsFilter) -> Result<Value> {
        if terms.values.is_empty() {
            return Err(Error::InvalidFilter("terms filter needs at least one value".into()));
        }
        match &terms.scope {
            FilterScope::Response {
                property: ResponseProperty::Status,
                user,
            } => self.response_status_clause(&terms.values, user.as_ref()),
            FilterScope::Response {
                property: ResponseProperty::Question(question),
                user,
            } => self.response_value_clause(question, &terms.values, user.as_ref()),
            scope => {
                let path = self.simple_path(scope)?;
                Ok(json!({"terms": {path: terms.values}}))
            }
        }
    }

    fn compile_range(&self, range: &RangeFilter) -> Result<Value> {
        let name = match &range.scope {
            FilterScope::Metadata { name } => name,
            other => {
                return Err(Error::InvalidFilter(format!(
                    "range filters only apply to numeric metadata, got {:?}",
                    other
                )))
            }
        };
        let property = self.dataset.metadata_property(name).ok_or_else(|| {
            Error::InvalidFilter(format!("metadata property {:?} is not configured", name))
        })?;
        if !property.metadata_type.is_numeric() {
            return Err(Error::InvalidFilter(format!(
                "metadata property {:?} is not numeric",
                name
            )));
        }

        let mut bounds = serde_json::Map::new();
        for (key, bound) in [("gte", &range.ge), ("lte", &range.le)] {
            if let Some(value) = bound {
                if !value.is_number() {
                    return Err(Error::InvalidFilter(format!(
                        "range bound {} for {:?} must be a number",
                        value, name
                    )));
                }
                bounds.insert(key.to_string(), value.clone());
            }
        }
        if bounds.is_empty() {
            return Err(Error::InvalidFilter(format!(
                "range filter on {:?} needs at least one bound",
                name
            )));
        }
        Ok(json!({"range": {format!("metadata.{}", name): bounds}}))
    }

    /// Physical path of scopes that map to a single field.
    fn simple_path(&self, scope: &FilterScope) -> Result<String> {
        match scope {
            FilterScope::Record { property } => Ok(property.path().to_string()),
            FilterScope::Metadata { name } => {
                if self.dataset.metadata_property(name).is_none() {
                    return Err(Error::InvalidFilter(format!(
                        "metadata property {:?} is not configured",
                        name
                    )));
                }
                Ok(format!("metadata.{}", name))
            }
            FilterScope::Suggestion { question, property } => {
                let question_type = self.question_type(question)?;
                let mut path = format!("suggestions.{}.{}", question, property.as_str());
                if matches!(question_type, QuestionType::Ranking { .. })
                    && property.as_str() == "value"
                {
                    path.push_str(".value");
                }
                Ok(path)
            }
            FilterScope::Response { .. } => Err(Error::InvalidFilter(
                "response scopes have no single field path".into(),
            )),
        }
    }

    fn question_type(&self, question: &str) -> Result<&'a QuestionType> {
        self.dataset
            .question(question)
            .map(|q| &q.question_type)
            .ok_or_else(|| Error::InvalidFilter(format!("unknown question {:?}", question)))
    }

    /// Path of a question's answer inside one response entry.
    fn answer_path(&self, question: &str) -> Result<String> {
        Ok(match self.question_type(question)? {
            QuestionType::Ranking { .. } => format!("{}.value", question),
            _ => question.to_string(),
        })
    }

    fn response_status_clause(&self, values: &[Value], user: Option<&User>) -> Result<Value> {
        let mut pending = false;
        let mut stored: Vec<&'static str> = Vec::new();
        for value in values {
            let status = value
                .as_str()
                .and_then(ResponseStatusFilter::parse)
                .ok_or_else(|| Error::InvalidFilter(format!("unknown response status {}", value)))?;
            match status {
                ResponseStatusFilter::Pending => pending = true,
                other => {
                    if !stored.contains(&other.as_str()) {
                        stored.push(other.as_str());
                    }
                }
            }
        }

        let mut clauses = Vec::new();
        if !stored.is_empty() {
            clauses.push(self.status_in(&stored, user));
        }
        if pending {
            let any_stored = self.status_in(&stored_statuses(), user);
            clauses.push(json!({"bool": {"must_not": [any_stored]}}));
        }
        Ok(any_of(clauses))
    }

    /// Records with at least one matching response status (optionally by user).
    fn status_in(&self, statuses: &[&str], user: Option<&User>) -> Value {
        match (self.layout, user) {
            (ResponseLayout::PerUser, None) => json!({"terms": {ALL_RESPONSES_STATUSES: statuses}}),
            (ResponseLayout::PerUser, Some(user)) => json!({
                "terms": {format!("responses.{}.status", user.username): statuses}
            }),
            (ResponseLayout::Nested, user) => {
                let mut filters = vec![json!({"terms": {"responses.status": statuses}})];
                if let Some(user) = user {
                    filters.push(json!({"term": {"responses.user_id": user.id}}));
                }
                nested(json!({"bool": {"filter": filters}}))
            }
        }
    }

    fn response_value_clause(
        &self,
        question: &str,
        values: &[Value],
        user: Option<&User>,
    ) -> Result<Value> {
        let answer = self.answer_path(question)?;
        Ok(match (self.layout, user) {
            (ResponseLayout::PerUser, Some(user)) => json!({
                "terms": {format!("responses.{}.values.{}", user.username, answer): values}
            }),
            (ResponseLayout::PerUser, None) => json!({
                "query_string": {
                    "query": values.iter().map(query_string_literal).collect::<Vec<_>>().join(" OR "),
                    "fields": [format!("responses.*.values.{}", answer)],
                }
            }),
            (ResponseLayout::Nested, user) => {
                let mut filters = vec![json!({"terms": {format!("responses.{}", answer): values}})];
                if let Some(user) = user {
                    filters.push(json!({"term": {"responses.user_id": user.id}}));
                }
                nested(json!({"bool": {"filter": filters}}))
            }
        })
    }

    /// Compiles a text query into a scoring clause.
    pub fn compile_text(&self, text: &TextQuery) -> Result<Value> {
        let fields = self.text_fields(text.field.as_deref())?;
        let expr = TextExpr::parse(&text.q)?;
        Ok(self.compile_text_expr(&expr, &fields))
    }

    fn text_fields(&self, field: Option<&str>) -> Result<Vec<String>> {
        let Some(name) = field else {
            return Ok(vec!["fields.*".to_string()]);
        };
        let field = self
            .dataset
            .field(name)
            .ok_or_else(|| Error::InvalidQuery(format!("unknown field {:?}", name)))?;
        match field.field_type {
            FieldType::Text => Ok(vec![format!("fields.{}", name)]),
            FieldType::Chat => Ok(vec![format!("fields.{}.content", name)]),
            FieldType::Image | FieldType::Custom => Err(Error::InvalidQuery(format!(
                "field {:?} is not searchable",
                name
            ))),
        }
    }

    fn compile_text_expr(&self, expr: &TextExpr, fields: &[String]) -> Value {
        match expr {
            TextExpr::Term(term) => json!({
                "multi_match": {
                    "query": term,
                    "fields": fields,
                    "type": "best_fields",
                    "operator": "and",
                }
            }),
            TextExpr::Phrase(phrase) => json!({
                "multi_match": {
                    "query": phrase,
                    "fields": fields,
                    "type": "phrase",
                }
            }),
            TextExpr::And(items) => json!({
                "bool": {"must": items.iter().map(|i| self.compile_text_expr(i, fields)).collect::<Vec<_>>()}
            }),
            TextExpr::Or(items) => json!({
                "bool": {
                    "should": items.iter().map(|i| self.compile_text_expr(i, fields)).collect::<Vec<_>>(),
                    "minimum_should_match": 1,
                }
            }),
            TextExpr::Not(inner) => json!({
                "bool": {
                    "must": [{"match_all": {}}],
                    "must_not": [self.compile_text_expr(inner, fields)],
                }
            }),
        }
    }

    /// Compiles sort criteria, always ending with an `id` tie-break.
    ///
    /// With no criteria, sorts by relevance then insertion order.
    pub fn compile_sort(&self, sort: &[Sort]) -> Result<Value> {
        let mut clauses = Vec::with_capacity(sort.len() + 3);
        if sort.is_empty() {
            clauses.push(json!({"_score": {"order": "desc"}}));
            clauses.push(json!({"inserted_at": {"order": "asc"}}));
        }
        for criterion in sort {
            clauses.push(self.sort_clause(criterion)?);
        }
        clauses.push(json!({"id": {"order": "asc"}}));
        Ok(Value::Array(clauses))
    }

    fn sort_clause(&self, sort: &Sort) -> Result<Value> {
        let order = sort.order.as_str();
        match &sort.scope {
            FilterScope::Response { property, user } => {
                let leaf = match property {
                    ResponseProperty::Status => None,
                    ResponseProperty::Question(q) => Some(self.answer_path(q)?),
                };
                match (self.layout, user) {
                    (ResponseLayout::PerUser, Some(user)) => {
                        let path = match leaf {
                            None => format!("responses.{}.status", user.username),
                            Some(answer) => format!("responses.{}.values.{}", user.username, answer),
                        };
                        Ok(json!({path: {"order": order, "unmapped_type": "keyword"}}))
                    }
                    (ResponseLayout::PerUser, None) => match leaf {
                        None => Ok(json!({ALL_RESPONSES_STATUSES: {"order": order}})),
                        Some(_) => Err(Error::InvalidFilter(
                            "sorting by a response value needs a user".into(),
                        )),
                    },
                    (ResponseLayout::Nested, user) => {
                        let path = match leaf {
                            None => "responses.status".to_string(),
                            Some(answer) => format!("responses.{}", answer),
                        };
                        let mut nested_sort = json!({"path": "responses"});
                        if let Some(user) = user {
                            nested_sort["filter"] = json!({"term": {"responses.user_id": user.id}});
                        }
                        Ok(json!({path: {"order": order, "nested": nested_sort}}))
                    }
                }
            }
            scope => {
                let path = self.simple_path(scope)?;
                Ok(json!({path: {"order": order}}))
            }
        }
    }
}

/// Fails fast when a page would reach past the backend's result window.
pub fn check_window(offset: usize, limit: usize, max_result_window: usize) -> Result<()> {
    let end = offset
        .checked_add(limit)
        .ok_or_else(|| Error::precondition("search", "offset + limit overflows"))?;
    if end > max_result_window {
        return Err(Error::precondition(
            "search",
            format!(
                "offset ({}) + limit ({}) exceeds max_result_window ({})",
                offset, limit, max_result_window
            ),
        ));
    }
    Ok(())
}

fn nested(query: Value) -> Value {
    json!({"nested": {"path": "responses", "query": query}})
}

fn any_of(mut clauses: Vec<Value>) -> Value {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        json!({"bool": {"should": clauses, "minimum_should_match": 1}})
    }
}

fn query_string_literal(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        other => other.to_string(),
    }
}
