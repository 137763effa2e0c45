//! Bulk indexing: NDJSON `_bulk` requests with per-item failure accounting
//! and on-demand growth of the index field limit.
//!
//! A bulk call never fails as a whole because some items were rejected; the
//! rejected items are listed in the returned [`BulkReport`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RefreshPolicy;
use crate::error::{Error, Result};
use crate::model::{Dataset, Record};
use crate::schema::TOTAL_FIELDS_LIMIT_SETTING;
use crate::transport::{execute, Method, Request, RetryPolicy, Transport};

const FIELD_LIMIT_MARKER: &str = "Limit of total fields";

/// One action of a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Full document write.
    Index { id: Uuid, document: Value },
    /// Partial update (`doc` or `script` body).
    Update { id: Uuid, body: Value },
    Delete { id: Uuid },
}

impl BulkAction {
    #[inline]
    pub fn id(&self) -> Uuid {
        match self {
            BulkAction::Index { id, .. }
            | BulkAction::Update { id, .. }
            | BulkAction::Delete { id } => *id,
        }
    }
}

/// Serializes actions as an NDJSON `_bulk` body.
pub fn bulk_body(actions: &[BulkAction]) -> Result<String> {
    let mut body = String::new();
    for action in actions {
        let (header, source) = match action {
            BulkAction::Index { id, document } => (json!({"index": {"_id": id}}), Some(document)),
            BulkAction::Update { id, body } => (json!({"update": {"_id": id}}), Some(body)),
            BulkAction::Delete { id } => (json!({"delete": {"_id": id}}), None),
        };
        body.push_str(&serde_json::to_string(&header)?);
        body.push('\n');
        if let Some(source) = source {
            body.push_str(&serde_json::to_string(source)?);
            body.push('\n');
        }
    }
    Ok(body)
}

/// A rejected bulk item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub id: Uuid,
    pub status: u16,
    pub kind: String,
    pub reason: String,
}

impl BulkFailure {
    /// Returns true if the item was rejected by the mapping field cap.
    pub fn is_field_limit(&self) -> bool {
        self.reason.contains(FIELD_LIMIT_MARKER)
    }
}

/// Whether every item of a bulk call was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOutcome {
    Applied,
    Partial,
}

/// Per-item result of a bulk call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkReport {
    pub succeeded: Vec<Uuid>,
    pub failed: Vec<BulkFailure>,
}

impl BulkReport {
    pub fn outcome(&self) -> BulkOutcome {
        if self.failed.is_empty() {
            BulkOutcome::Applied
        } else {
            BulkOutcome::Partial
        }
    }

    #[inline]
    pub fn is_applied(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of items processed.
    #[inline]
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends another report's items.
    pub fn merge(&mut self, other: BulkReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }
}

/// Parses a `_bulk` response body into a report.
///
/// `not_found` on delete counts as success: the document is gone either way.
pub fn parse_bulk_response(body: &Value) -> Result<BulkReport> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::UnexpectedResponse {
            operation: "bulk",
            reason: "missing items array".into(),
        })?;

    let mut report = BulkReport::default();
    for item in items {
        let (action, result) = item
            .as_object()
            .and_then(|obj| obj.iter().next())
            .ok_or_else(|| Error::UnexpectedResponse {
                operation: "bulk",
                reason: format!("malformed bulk item: {}", item),
            })?;
        let id = result
            .get("_id")
            .and_then(Value::as_str)
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| Error::UnexpectedResponse {
                operation: "bulk",
                reason: format!("bulk item without record id: {}", item),
            })?;
        let status = result
            .get("status")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u16;

        let deleted_missing = action == "delete" && status == 404;
        match result.get("error") {
            Some(error) if !deleted_missing => report.failed.push(BulkFailure {
                id,
                status,
                kind: error
                    .get("type")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                reason: error
                    .get("reason")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| error.to_string()),
            }),
            _ => report.succeeded.push(id),
        }
    }
    Ok(report)
}

/// Rejects the whole batch if any record is inconsistent with the dataset.
pub fn validate_records(dataset: &Dataset, records: &[Record]) -> Result<()> {
    let fail = |record: &Record, reason: String| {
        Err(Error::precondition(
            "index_records",
            format!("record {}: {}", record.id, reason),
        ))
    };

    for record in records {
        if record.dataset_id != dataset.id {
            return fail(
                record,
                format!("belongs to dataset {}, not {}", record.dataset_id, dataset.id),
            );
        }
        for (settings_id, vector) in &record.vectors {
            let Some(settings) = dataset.vector_settings(settings_id) else {
                return fail(record, format!("unknown vector settings {}", settings_id));
            };
            if vector.len() != settings.dimensions {
                return fail(
                    record,
                    format!(
                        "vector {:?} has {} dimensions, expected {}",
                        settings.name,
                        vector.len(),
                        settings.dimensions
                    ),
                );
            }
        }
        for suggestion in &record.suggestions {
            let Some(question) = dataset.question(&suggestion.question_name) else {
                return fail(
                    record,
                    format!("suggestion for unknown question {:?}", suggestion.question_name),
                );
            };
            if !question.question_type.accepts(&suggestion.value) {
                return fail(
                    record,
                    format!(
                        "suggestion value {} is not valid for question {:?}",
                        suggestion.value, question.name
                    ),
                );
            }
        }
        for response in &record.responses {
            for (name, value) in &response.values {
                let Some(question) = dataset.question(name) else {
                    return fail(
                        record,
                        format!(
                            "response by {:?} answers unknown question {:?}",
                            response.user.username, name
                        ),
                    );
                };
                if !question.question_type.accepts(value) {
                    return fail(
                        record,
                        format!(
                            "response value {} by {:?} is not valid for question {:?}",
                            value, response.user.username, name
                        ),
                    );
                }
            }
        }
    }
    Ok(())
}

/// Distinct responding users across a batch.
pub fn distinct_users(records: &[Record]) -> usize {
    records
        .iter()
        .flat_map(|r| r.responses.iter().map(|resp| resp.user.username.as_str()))
        .collect::<HashSet<_>>()
        .len()
}

/// Known `mapping.total_fields.limit` per index.
///
/// Raises for one index are serialized by that index's async lock; the limit
/// only ever grows.
#[derive(Debug, Default)]
pub struct FieldLimits {
    limits: Mutex<HashMap<String, Arc<tokio::sync::Mutex<u64>>>>,
}

impl FieldLimits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock guarding an index's limit. `0` means not yet known.
    fn slot(&self, index: &str) -> Arc<tokio::sync::Mutex<u64>> {
        self.limits
            .lock()
            .entry(index.to_string())
            .or_default()
            .clone()
    }

    /// Records the limit an index was created with.
    pub fn set_known(&self, index: &str, limit: u64) {
        self.limits
            .lock()
            .insert(index.to_string(), Arc::new(tokio::sync::Mutex::new(limit)));
    }

    /// Forgets a deleted index.
    pub fn forget(&self, index: &str) {
        self.limits.lock().remove(index);
    }

    /// Last known limit, if any.
    pub async fn known(&self, index: &str) -> Option<u64> {
        let slot = self.limits.lock().get(index).cloned()?;
        let current = *slot.lock().await;
        (current > 0).then_some(current)
    }

    /// Number of indexes with limit state.
    pub fn len(&self) -> usize {
        self.limits.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs bulk actions against one engine's backend.
pub(crate) struct BulkCoordinator<'a> {
    pub transport: &'a dyn Transport,
    pub retry: &'a RetryPolicy,
    pub limits: &'a FieldLimits,
    pub chunk_size: usize,
    pub refresh: RefreshPolicy,
}

impl<'a> BulkCoordinator<'a> {
    /// Sends actions in chunks and merges the per-chunk reports.
    pub async fn run(&self, index: &str, actions: &[BulkAction]) -> Result<BulkReport> {
        let mut report = BulkReport::default();
        for chunk in actions.chunks(self.chunk_size.max(1)) {
            let mut path = format!("{}/_bulk", index);
            if let Some(refresh) = self.refresh.as_param() {
                path.push_str("?refresh=");
                path.push_str(refresh);
            }
            let request = Request::new("bulk", Method::Post, path).ndjson(bulk_body(chunk)?);
            let response = execute(self.transport, &request, self.retry).await?;
            if response.is_not_found() {
                return Err(Error::NotFound {
                    index: index.to_string(),
                    id: "_bulk".into(),
                });
            }
            let chunk_report = parse_bulk_response(&response.body)?;
            debug!(
                index,
                items = chunk.len(),
                failed = chunk_report.failed.len(),
                "bulk chunk applied"
            );
            report.merge(chunk_report);
        }
        if !report.is_applied() {
            warn!(
                index,
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "bulk request partially applied"
            );
        }
        Ok(report)
    }

    /// Like [`run`](Self::run), but items rejected by the field limit get the
    /// limit doubled and are retried once.
    pub async fn run_with_limit_retry(
        &self,
        index: &str,
        actions: &[BulkAction],
    ) -> Result<BulkReport> {
        let mut report = self.run(index, actions).await?;
        let limited: HashSet<Uuid> = report
            .failed
            .iter()
            .filter(|f| f.is_field_limit())
            .map(|f| f.id)
            .collect();
        if limited.is_empty() {
            return Ok(report);
        }

        let current = self.current_limit(index).await?;
        self.raise_field_limit(index, current.saturating_mul(2)).await?;

        let retry: Vec<BulkAction> = actions
            .iter()
            .filter(|a| limited.contains(&a.id()))
            .cloned()
            .collect();
        report.failed.retain(|f| !limited.contains(&f.id));
        report.merge(self.run(index, &retry).await?);
        Ok(report)
    }

    /// Current field limit of an index, read from the cluster when this
    /// engine has not seen it yet.
    pub(crate) async fn current_limit(&self, index: &str) -> Result<u64> {
        let slot = self.limits.slot(index);
        let mut current = slot.lock().await;
        if *current == 0 {
            *current = self.fetch_field_limit(index).await?;
        }
        Ok(*current)
    }

    /// Raises the index field limit to at least `required`. Never lowers it.
    ///
    /// Returns true if a raise was sent.
    pub async fn raise_field_limit(&self, index: &str, required: u64) -> Result<bool> {
        let slot = self.limits.slot(index);
        let mut current = slot.lock().await;
        if *current == 0 {
            *current = self.fetch_field_limit(index).await?;
        }
        if required <= *current {
            return Ok(false);
        }

        let request = Request::new("raise_field_limit", Method::Put, format!("{}/_settings", index))
            .json(json!({"index": {TOTAL_FIELDS_LIMIT_SETTING: required}}));
        let response = execute(self.transport, &request, self.retry).await?;
        if response.is_not_found() {
            return Err(Error::NotFound {
                index: index.to_string(),
                id: "_settings".into(),
            });
        }
        info!(index, from = *current, to = required, "raised mapping field limit");
        *current = required;
        Ok(true)
    }

    async fn fetch_field_limit(&self, index: &str) -> Result<u64> {
        let request = Request::new(
            "raise_field_limit",
            Method::Get,
            format!("{}/_settings?flat_settings=true&include_defaults=true", index),
        );
        let response = execute(self.transport, &request, self.retry).await?;
        if response.is_not_found() {
            return Err(Error::NotFound {
                index: index.to_string(),
                id: "_settings".into(),
            });
        }
        Ok(parse_field_limit(&response.body).unwrap_or(0))
    }
}

/// Extracts the field limit from a flat `_settings` response.
fn parse_field_limit(body: &Value) -> Option<u64> {
    let key = format!("index.{}", TOTAL_FIELDS_LIMIT_SETTING);
    body.as_object()?.values().find_map(|index| {
        ["settings", "defaults"].iter().find_map(|section| {
            let value = index.get(*section)?.get(&key)?;
            value
                .as_u64()
                .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        })
    })
}
