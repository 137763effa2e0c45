//! Engine configuration.
//!
//! All tunables are explicit and passed at engine construction time; there is
//! no process-global state. Defaults match a single-node development cluster.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::error::{Error, Result};

/// When the backend should make indexing results visible to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Let the backend refresh on its own schedule.
    #[default]
    None,
    /// Block the request until the next refresh makes changes visible.
    WaitFor,
    /// Force an immediate refresh (tests, small datasets).
    True,
}

impl RefreshPolicy {
    /// Value of the `refresh` query parameter, if any.
    pub fn as_param(&self) -> Option<&'static str> {
        match self {
            RefreshPolicy::None => None,
            RefreshPolicy::WaitFor => Some("wait_for"),
            RefreshPolicy::True => Some("true"),
        }
    }
}

/// Configuration for a [`SearchEngine`](crate::engine::SearchEngine).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the backend cluster.
    pub url: String,
    /// Backend dialect spoken at `url`.
    pub dialect: Dialect,
    /// Basic auth user.
    pub username: Option<String>,
    /// Basic auth password.
    pub password: Option<String>,
    /// Prefix prepended to dataset ids to build index names.
    pub index_prefix: String,
    pub number_of_shards: u32,
    pub number_of_replicas: u32,
    /// Upper bound for `offset + limit` on searches.
    pub max_result_window: usize,
    /// Initial `mapping.total_fields.limit` for new indexes.
    pub total_fields_limit: u64,
    /// Documents per bulk request.
    pub bulk_chunk_size: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Attempts after the first one for transient failures.
    pub max_retries: u32,
    /// Base backoff between retries in milliseconds, doubled per attempt.
    pub retry_backoff_ms: u64,
    /// Bucket count for terms metrics when the property lists no values.
    pub terms_aggregation_size: usize,
    pub refresh: RefreshPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            dialect: Dialect::default(),
            username: None,
            password: None,
            index_prefix: "ls.".to_string(),
            number_of_shards: 1,
            number_of_replicas: 0,
            max_result_window: 10_000,
            total_fields_limit: 2_000,
            bulk_chunk_size: 500,
            request_timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 200,
            terms_aggregation_size: 1_000,
            refresh: RefreshPolicy::None,
        }
    }
}

impl EngineConfig {
    /// Creates a config for the given cluster URL and dialect.
    pub fn new(url: impl Into<String>, dialect: Dialect) -> Self {
        Self {
            url: url.into(),
            dialect,
            ..Self::default()
        }
    }

    /// Sets basic auth credentials. Chainable.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Sets the index name prefix. Chainable.
    pub fn with_index_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.index_prefix = prefix.into();
        self
    }

    /// Sets shard and replica counts. Chainable.
    pub fn with_shards(mut self, shards: u32, replicas: u32) -> Self {
        self.number_of_shards = shards;
        self.number_of_replicas = replicas;
        self
    }

    /// Sets the maximum result window. Chainable.
    pub fn with_max_result_window(mut self, window: usize) -> Self {
        self.max_result_window = window;
        self
    }

    /// Sets the initial total fields limit. Chainable.
    pub fn with_total_fields_limit(mut self, limit: u64) -> Self {
        self.total_fields_limit = limit;
        self
    }

    /// Sets the bulk chunk size. Chainable.
    pub fn with_bulk_chunk_size(mut self, size: usize) -> Self {
        self.bulk_chunk_size = size;
        self
    }

    /// Sets the retry policy. Chainable.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets the per-request timeout. Chainable.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// Sets the refresh policy for writes. Chainable.
    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[inline]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Index name for a dataset id.
    #[inline]
    pub fn index_name(&self, dataset_id: &uuid::Uuid) -> String {
        format!("{}{}", self.index_prefix, dataset_id)
    }

    /// Rejects values that would make the engine unusable.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("url must not be empty".into()));
        }
        if self.max_result_window == 0 {
            return Err(Error::Config("max_result_window must be positive".into()));
        }
        if self.bulk_chunk_size == 0 {
            return Err(Error::Config("bulk_chunk_size must be positive".into()));
        }
        if self.total_fields_limit == 0 {
            return Err(Error::Config("total_fields_limit must be positive".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config("request_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_result_window, 10_000);
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_builder_chain() {
        let config = EngineConfig::new("http://es:9200", Dialect::OpenSearch)
            .with_index_prefix("test.")
            .with_bulk_chunk_size(10)
            .with_retries(5, Duration::from_millis(50))
            .with_refresh(RefreshPolicy::WaitFor);

        assert_eq!(config.dialect, Dialect::OpenSearch);
        assert_eq!(config.bulk_chunk_size, 10);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_backoff(), Duration::from_millis(50));
        assert_eq!(config.refresh.as_param(), Some("wait_for"));
    }

    #[test]
    fn test_index_name_is_deterministic() {
        let config = EngineConfig::default().with_index_prefix("rg.");
        let id = uuid::Uuid::nil();
        assert_eq!(config.index_name(&id), format!("rg.{}", id));
        assert_eq!(config.index_name(&id), config.index_name(&id));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = EngineConfig::default().with_bulk_chunk_size(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = EngineConfig::default().with_max_result_window(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"url": "http://os:9200", "dialect": "opensearch"}"#).unwrap();
        assert_eq!(config.dialect, Dialect::OpenSearch);
        assert_eq!(config.bulk_chunk_size, 500);
    }
}
