//! Document mapper: records, responses and vectors to index documents.
//!
//! Everything here is a pure transformation. Response writes are expressed as
//! painless update scripts so one user's entry is replaced or removed as a
//! unit without touching any other user's data.

use std::collections::{BTreeMap, HashMap};

use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::dialect::ResponseLayout;
use crate::model::{Dataset, Record, Response, Suggestion};

const NESTED_UPSERT_SCRIPT: &str = "if (ctx._source.responses == null) { ctx._source.responses = []; } \
ctx._source.responses.removeIf(r -> r.user_id == params.user_id); \
ctx._source.responses.add(params.response);";

const NESTED_DELETE_SCRIPT: &str = "if (ctx._source.responses != null) { \
ctx._source.responses.removeIf(r -> r.user_id == params.user_id); }";

const PER_USER_UPSERT_SCRIPT: &str = "if (ctx._source.responses == null) { ctx._source.responses = [:]; } \
ctx._source.responses[params.username] = params.response;";

const PER_USER_DELETE_SCRIPT: &str = "if (ctx._source.responses != null) { \
ctx._source.responses.remove(params.username); }";

/// Builds the full index document for a record.
///
/// Only searchable fields declared on the dataset are emitted; image and
/// custom fields stay in the system of record. Null or absent metadata is
/// omitted rather than written as null.
pub fn record_document(dataset: &Dataset, record: &Record, layout: ResponseLayout) -> Value {
    let mut doc = Map::new();
    doc.insert("id".into(), json!(record.id));
    doc.insert("status".into(), json!(record.status.as_str()));
    doc.insert("inserted_at".into(), json!(record.inserted_at));
    doc.insert("updated_at".into(), json!(record.updated_at));

    let fields: Map<String, Value> = dataset
        .fields
        .iter()
        .filter(|f| f.field_type.is_searchable())
        .filter_map(|f| {
            record
                .fields
                .get(&f.name)
                .filter(|v| !v.is_null())
                .map(|v| (f.name.clone(), v.clone()))
        })
        .collect();
    if !fields.is_empty() {
        doc.insert("fields".into(), Value::Object(fields));
    }

    let metadata: BTreeMap<&String, &Value> = record
        .metadata
        .iter()
        .filter(|(_, v)| !v.is_null())
        .collect();
    if !metadata.is_empty() {
        doc.insert("metadata".into(), json!(metadata));
    }

    if !record.responses.is_empty() {
        doc.insert("responses".into(), responses_value(&record.responses, layout));
    }

    if !record.suggestions.is_empty() {
        let suggestions: Map<String, Value> = record
            .suggestions
            .iter()
            .map(|s| (s.question_name.clone(), suggestion_entry(s)))
            .collect();
        doc.insert("suggestions".into(), Value::Object(suggestions));
    }

    if !record.vectors.is_empty() {
        doc.insert("vectors".into(), vectors_value(&record.vectors));
    }

    Value::Object(doc)
}

/// One user's response as stored under the given layout.
pub fn response_entry(response: &Response, layout: ResponseLayout) -> Value {
    let values: BTreeMap<&String, &Value> = response.values.iter().collect();
    match layout {
        ResponseLayout::Nested => {
            let mut entry = Map::new();
            entry.insert("id".into(), json!(response.id));
            entry.insert("status".into(), json!(response.status.as_str()));
            entry.insert("user_id".into(), json!(response.user.id));
            for (question, value) in values {
                entry.insert(question.clone(), value.clone());
            }
            Value::Object(entry)
        }
        ResponseLayout::PerUser => json!({
            "status": response.status.as_str(),
            "values": values,
        }),
    }
}

fn responses_value(responses: &[Response], layout: ResponseLayout) -> Value {
    match layout {
        ResponseLayout::Nested => Value::Array(
            responses
                .iter()
                .map(|r| response_entry(r, layout))
                .collect(),
        ),
        ResponseLayout::PerUser => Value::Object(
            responses
                .iter()
                .map(|r| (r.user.username.clone(), response_entry(r, layout)))
                .collect(),
        ),
    }
}

fn suggestion_entry(suggestion: &Suggestion) -> Value {
    let mut entry = Map::new();
    if let Some(suggestion_type) = suggestion.suggestion_type {
        entry.insert("type".into(), json!(suggestion_type.as_str()));
    }
    if let Some(agent) = &suggestion.agent {
        entry.insert("agent".into(), json!(agent));
    }
    if let Some(score) = suggestion.score {
        entry.insert("score".into(), json!(score));
    }
    entry.insert("value".into(), suggestion.value.clone());
    Value::Object(entry)
}

fn vectors_value(vectors: &HashMap<Uuid, Vec<f32>>) -> Value {
    let sorted: BTreeMap<String, &Vec<f32>> =
        vectors.iter().map(|(id, v)| (id.to_string(), v)).collect();
    json!(sorted)
}

/// Update body replacing exactly this user's response entry.
///
/// Applying the same body twice leaves the document unchanged.
pub fn response_update(response: &Response, layout: ResponseLayout) -> Value {
    let entry = response_entry(response, layout);
    match layout {
        ResponseLayout::Nested => json!({
            "script": {
                "lang": "painless",
                "source": NESTED_UPSERT_SCRIPT,
                "params": {"user_id": response.user.id, "response": entry},
            }
        }),
        ResponseLayout::PerUser => json!({
            "script": {
                "lang": "painless",
                "source": PER_USER_UPSERT_SCRIPT,
                "params": {"username": response.user.username, "response": entry},
            }
        }),
    }
}

/// Update body removing this user's response entry. Mappings are untouched.
pub fn response_delete(response: &Response, layout: ResponseLayout) -> Value {
    match layout {
        ResponseLayout::Nested => json!({
            "script": {
                "lang": "painless",
                "source": NESTED_DELETE_SCRIPT,
                "params": {"user_id": response.user.id},
            }
        }),
        ResponseLayout::PerUser => json!({
            "script": {
                "lang": "painless",
                "source": PER_USER_DELETE_SCRIPT,
                "params": {"username": response.user.username},
            }
        }),
    }
}

/// Partial update setting `vectors.<settings id>` for one record.
pub fn vectors_update(vectors: &HashMap<Uuid, Vec<f32>>) -> Value {
    json!({"doc": {"vectors": vectors_value(vectors)}})
}
