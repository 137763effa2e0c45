//! Search engine facade.
//!
//! [`SearchEngine`] is the public contract of the crate: index lifecycle,
//! document writes, search, similarity search and metrics for datasets. It
//! owns one transport (one connection pool) and the per-index field-limit
//! state, and is safe to share behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bulk::{
    distinct_users, validate_records, BulkAction, BulkCoordinator, BulkReport, FieldLimits,
};
use crate::config::EngineConfig;
use crate::dialect::{Dialect, ResponseLayout};
use crate::document::{record_document, response_delete, response_update, vectors_update};
use crate::error::{Error, Result};
use crate::metrics::{metrics_request, parse_metrics, MetadataMetrics};
use crate::model::{Dataset, MetadataProperty, Record, Response, VectorSettings};
use crate::query::{check_window, Filter, QueryCompiler, Sort, TextQuery};
use crate::schema::{
    compile_index, compile_mappings, count_mapping_fields, metadata_property_mapping,
    per_user_field_count,
};
use crate::similarity::{similarity_request, SimilarityParams};
use crate::transport::{execute, HttpTransport, Method, Request, RetryPolicy, Transport};

/// Parameters of a record search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<TextQuery>,
    #[serde(default)]
    pub filter: Option<Filter>,
    /// Explicit sort criteria. Empty means relevance, then insertion order.
    #[serde(default)]
    pub sort: Vec<Sort>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            query: None,
            filter: None,
            sort: Vec::new(),
            offset: 0,
            limit: default_limit(),
        }
    }
}

impl SearchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: TextQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the page window. Chainable.
    pub fn with_page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// One matching record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponseItem {
    pub record_id: Uuid,
    pub score: Option<f64>,
}

/// A page of matching records and the total match count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponses {
    pub items: Vec<SearchResponseItem>,
    pub total: u64,
}

impl SearchResponses {
    /// Record ids in result order.
    pub fn record_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|item| item.record_id).collect()
    }
}

/// Search engine bound to one backend cluster.
pub struct SearchEngine {
    config: EngineConfig,
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    limits: FieldLimits,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine")
            .field("config", &self.config)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl SearchEngine {
    /// Creates an engine talking HTTP to `config.url`.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates an engine over a custom transport.
    pub fn with_transport(config: EngineConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            retry: RetryPolicy::from_config(&config),
            config,
            transport,
            limits: FieldLimits::new(),
        })
    }

    #[inline]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[inline]
    pub fn dialect(&self) -> Dialect {
        self.config.dialect
    }

    /// Name of the index backing a dataset.
    pub fn index_name(&self, dataset: &Dataset) -> String {
        self.config.index_name(&dataset.id)
    }

    fn layout(&self) -> ResponseLayout {
        self.config.dialect.response_layout()
    }

    fn bulk(&self) -> BulkCoordinator<'_> {
        BulkCoordinator {
            transport: self.transport.as_ref(),
            retry: &self.retry,
            limits: &self.limits,
            chunk_size: self.config.bulk_chunk_size,
            refresh: self.config.refresh,
        }
    }

    async fn send(&self, request: Request) -> Result<crate::transport::Response> {
        execute(self.transport.as_ref(), &request, &self.retry).await
    }

    fn with_refresh(&self, path: String) -> String {
        match self.config.refresh.as_param() {
            Some(refresh) if path.contains('?') => format!("{}&refresh={}", path, refresh),
            Some(refresh) => format!("{}?refresh={}", path, refresh),
            None => path,
        }
    }

    // ---------------------------------------------------------------------
    // Index lifecycle
    // ---------------------------------------------------------------------

    /// Creates the dataset's index. Fails with [`Error::SchemaConflict`] if it
    /// already exists.
    pub async fn create_index(&self, dataset: &Dataset) -> Result<()> {
        let index = self.index_name(dataset);
        let schema = compile_index(dataset, self.dialect(), &self.config);
        let request =
            Request::new("create_index", Method::Put, index.as_str()).json(schema.to_body());
        self.send(request).await?;
        self.limits.set_known(&index, self.config.total_fields_limit);
        info!(index = %index, dialect = ?self.dialect(), "created index");
        Ok(())
    }

    /// Creates the dataset's index unless it already exists.
    pub async fn ensure_index(&self, dataset: &Dataset) -> Result<()> {
        let index = self.index_name(dataset);
        if self.index_exists(&index).await? {
            warn!(index = %index, "index already exists, keeping it");
            return Ok(());
        }
        match self.create_index(dataset).await {
            Err(Error::SchemaConflict { .. }) => {
                warn!(index = %index, "index created concurrently, keeping it");
                Ok(())
            }
            other => other,
        }
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        let response = self
            .send(Request::new("ensure_index", Method::Head, index))
            .await?;
        Ok(response.is_success())
    }

    /// Deletes the dataset's index. Missing indexes are a no-op.
    pub async fn delete_index(&self, dataset: &Dataset) -> Result<()> {
        let index = self.index_name(dataset);
        let response = self
            .send(Request::new("delete_index", Method::Delete, index.as_str()))
            .await?;
        self.limits.forget(&index);
        if response.is_not_found() {
            debug!(index = %index, "index already absent");
        } else {
            info!(index = %index, "deleted index");
        }
        Ok(())
    }

    /// Adds a metadata property to the index mapping.
    pub async fn configure_metadata_property(
        &self,
        dataset: &Dataset,
        property: &MetadataProperty,
    ) -> Result<()> {
        if property.dataset_id != dataset.id {
            return Err(Error::precondition(
                "configure_metadata_property",
                format!("property {:?} belongs to another dataset", property.name),
            ));
        }
        let index = self.index_name(dataset);
        let body = json!({"properties": {"metadata": {"properties": {
            property.name.clone(): metadata_property_mapping(property),
        }}}});
        self.put_mapping("configure_metadata_property", &index, body)
            .await?;
        info!(index = %index, property = %property.name, "configured metadata property");
        Ok(())
    }

    /// Adds a vector field to the index of the settings' dataset.
    pub async fn configure_index_vectors(&self, settings: &VectorSettings) -> Result<()> {
        let index = self.config.index_name(&settings.dataset_id);
        let body = json!({"properties": {"vectors": {"properties": {
            settings.field_name(): self.dialect().vector_mapping(settings.dimensions),
        }}}});
        self.put_mapping("configure_index_vectors", &index, body)
            .await?;
        info!(index = %index, vectors = %settings.name, dimensions = settings.dimensions, "configured vector field");
        Ok(())
    }

    async fn put_mapping(&self, operation: &'static str, index: &str, body: Value) -> Result<()> {
        let request = Request::new(operation, Method::Put, format!("{}/_mapping", index)).json(body);
        let response = self.send(request).await?;
        if response.is_not_found() {
            return Err(Error::NotFound {
                index: index.to_string(),
                id: "_mapping".into(),
            });
        }
        Ok(())
    }

    /// Forces a refresh so recent writes become searchable.
    pub async fn refresh_index(&self, dataset: &Dataset) -> Result<()> {
        let index = self.index_name(dataset);
        let response = self
            .send(Request::new(
                "refresh_index",
                Method::Post,
                format!("{}/_refresh", index),
            ))
            .await?;
        if response.is_not_found() {
            return Err(Error::NotFound {
                id: index.clone(),
                index,
            });
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Indexes full record documents.
    ///
    /// The whole batch is validated first; nothing is sent if any record is
    /// invalid. Individual backend rejections are reported, not raised.
    pub async fn index_records(&self, dataset: &Dataset, records: &[Record]) -> Result<BulkReport> {
        validate_records(dataset, records)?;
        if records.is_empty() {
            return Ok(BulkReport::default());
        }
        let index = self.index_name(dataset);
        let layout = self.layout();

        if layout == ResponseLayout::PerUser {
            let users = distinct_users(records) as u64;
            let required = count_mapping_fields(&compile_mappings(dataset, self.dialect()))
                + users * per_user_field_count(dataset);
            if required > self.config.total_fields_limit {
                self.bulk().raise_field_limit(&index, required).await?;
            }
        }

        let actions: Vec<BulkAction> = records
            .iter()
            .map(|record| BulkAction::Index {
                id: record.id,
                document: record_document(dataset, record, layout),
            })
            .collect();
        let report = self.bulk().run_with_limit_retry(&index, &actions).await?;
        info!(
            index = %index,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "indexed records"
        );
        Ok(report)
    }

    /// Deletes record documents. Records that are already gone count as
    /// deleted.
    pub async fn delete_records(&self, dataset: &Dataset, records: &[Record]) -> Result<BulkReport> {
        if records.is_empty() {
            return Ok(BulkReport::default());
        }
        let index = self.index_name(dataset);
        let actions: Vec<BulkAction> = records
            .iter()
            .map(|record| BulkAction::Delete { id: record.id })
            .collect();
        self.bulk().run(&index, &actions).await
    }

    /// Replaces one user's response on an indexed record.
    pub async fn update_record_response(&self, dataset: &Dataset, response: &Response) -> Result<()> {
        for (name, value) in &response.values {
            let valid = dataset
                .question(name)
                .map(|q| q.question_type.accepts(value))
                .unwrap_or(false);
            if !valid {
                return Err(Error::precondition(
                    "update_record_response",
                    format!("value {} is not valid for question {:?}", value, name),
                ));
            }
        }

        let index = self.index_name(dataset);
        let body = response_update(response, self.layout());
        match self
            .update_document("update_record_response", &index, response.record_id, &body)
            .await
        {
            Err(Error::Backend { reason, .. }) if reason.contains("Limit of total fields") => {
                let bulk = self.bulk();
                let current = bulk.current_limit(&index).await?;
                warn!(index = %index, limit = current, "response update hit the mapping field limit");
                bulk.raise_field_limit(&index, current.saturating_mul(2)).await?;
                self.update_document("update_record_response", &index, response.record_id, &body)
                    .await
            }
            other => other,
        }
    }

    /// Removes one user's response from an indexed record. Missing records
    /// are a no-op.
    pub async fn delete_record_response(&self, dataset: &Dataset, response: &Response) -> Result<()> {
        let index = self.index_name(dataset);
        let body = response_delete(response, self.layout());
        match self
            .update_document("delete_record_response", &index, response.record_id, &body)
            .await
        {
            Err(Error::NotFound { .. }) => {
                warn!(index = %index, record = %response.record_id, "record not indexed, nothing to delete");
                Ok(())
            }
            other => other,
        }
    }

    async fn update_document(
        &self,
        operation: &'static str,
        index: &str,
        id: Uuid,
        body: &Value,
    ) -> Result<()> {
        let path = self.with_refresh(format!("{}/_update/{}?retry_on_conflict=3", index, id));
        let response = self
            .send(Request::new(operation, Method::Post, path).json(body.clone()))
            .await?;
        if response.is_not_found() {
            return Err(Error::NotFound {
                index: index.to_string(),
                id: id.to_string(),
            });
        }
        debug!(index, record = %id, operation, "document updated");
        Ok(())
    }

    /// Sets vectors on already indexed records.
    pub async fn set_records_vectors(
        &self,
        dataset: &Dataset,
        vectors: &[(Uuid, HashMap<Uuid, Vec<f32>>)],
    ) -> Result<BulkReport> {
        for (record_id, record_vectors) in vectors {
            for (settings_id, vector) in record_vectors {
                let settings = dataset.vector_settings(settings_id).ok_or_else(|| {
                    Error::precondition(
                        "set_records_vectors",
                        format!("record {}: unknown vector settings {}", record_id, settings_id),
                    )
                })?;
                if vector.len() != settings.dimensions {
                    return Err(Error::precondition(
                        "set_records_vectors",
                        format!(
                            "record {}: vector {:?} has {} dimensions, expected {}",
                            record_id,
                            settings.name,
                            vector.len(),
                            settings.dimensions
                        ),
                    ));
                }
            }
        }
        if vectors.is_empty() {
            return Ok(BulkReport::default());
        }

        let index = self.index_name(dataset);
        let actions: Vec<BulkAction> = vectors
            .iter()
            .map(|(id, record_vectors)| BulkAction::Update {
                id: *id,
                body: vectors_update(record_vectors),
            })
            .collect();
        self.bulk().run(&index, &actions).await
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Searches records by text query and filter.
    pub async fn search(&self, dataset: &Dataset, params: SearchParams) -> Result<SearchResponses> {
        let body = self.search_body(dataset, &params)?;
        let index = self.index_name(dataset);
        self.run_search("search", &index, body).await
    }

    /// Compiles the request body for [`search`](Self::search).
    pub fn search_body(&self, dataset: &Dataset, params: &SearchParams) -> Result<Value> {
        check_window(params.offset, params.limit, self.config.max_result_window)?;
        let compiler = QueryCompiler::new(dataset, self.layout());
        let query = compiler.compile_query(params.query.as_ref(), params.filter.as_ref())?;
        let sort = compiler.compile_sort(&params.sort)?;
        Ok(json!({
            "query": query,
            "sort": sort,
            "from": params.offset,
            "size": params.limit,
            "track_total_hits": true,
            "track_scores": true,
            "_source": false,
        }))
    }

    /// Finds records with vectors closest to (or farthest from) a vector.
    pub async fn similarity_search(
        &self,
        dataset: &Dataset,
        params: SimilarityParams,
    ) -> Result<SearchResponses> {
        let body = similarity_request(dataset, self.dialect(), &params)?;
        let index = self.index_name(dataset);
        self.run_search("similarity_search", &index, body).await
    }

    async fn run_search(&self, operation: &'static str, index: &str, body: Value) -> Result<SearchResponses> {
        let request = Request::new(operation, Method::Post, format!("{}/_search", index)).json(body);
        let response = self.send(request).await?;
        if response.is_not_found() {
            return Err(Error::NotFound {
                index: index.to_string(),
                id: index.to_string(),
            });
        }
        parse_hits(operation, &response.body)
    }

    /// Computes the distribution of a metadata property over its dataset.
    pub async fn compute_metrics_for(&self, property: &MetadataProperty) -> Result<MetadataMetrics> {
        let index = self.config.index_name(&property.dataset_id);
        let body = metrics_request(property, self.config.terms_aggregation_size);
        let request = Request::new(
            "compute_metrics_for",
            Method::Post,
            format!("{}/_search", index),
        )
        .json(body);
        let response = self.send(request).await?;
        if response.is_not_found() {
            return Err(Error::NotFound {
                id: index.clone(),
                index,
            });
        }
        parse_metrics(property, &response.body)
    }

    /// Stored document of a record, if indexed.
    pub async fn get_document(&self, dataset: &Dataset, record_id: Uuid) -> Result<Option<Value>> {
        let index = self.index_name(dataset);
        let response = self
            .send(Request::new(
                "get_document",
                Method::Get,
                format!("{}/_doc/{}", index, record_id),
            ))
            .await?;
        if response.is_not_found() {
            return Ok(None);
        }
        Ok(response.body.get("_source").cloned())
    }
}

fn parse_hits(operation: &'static str, body: &Value) -> Result<SearchResponses> {
    let hits = body.get("hits").ok_or_else(|| Error::UnexpectedResponse {
        operation,
        reason: "missing hits".into(),
    })?;
    let total = match hits.get("total") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(total) => total.get("value").and_then(Value::as_u64).unwrap_or(0),
        None => 0,
    };
    let items = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
        .iter()
        .map(|hit| {
            let record_id = hit
                .get("_id")
                .and_then(Value::as_str)
                .and_then(|id| Uuid::parse_str(id).ok())
                .ok_or_else(|| Error::UnexpectedResponse {
                    operation,
                    reason: format!("hit without record id: {}", hit),
                })?;
            Ok(SearchResponseItem {
                record_id,
                score: hit.get("_score").and_then(Value::as_f64),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(SearchResponses { items, total })
}
