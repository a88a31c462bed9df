//! Per-connection query engine
//!
//! Runs the query state machine: Classify → {SQL path, Document path,
//! Both} → Merge → Respond. Sub-paths degrade independently: a
//! translation, validation, execution, or timeout failure empties that
//! path and lands in the response warnings, never aborting the sibling
//! path. The engine owns the connection's schema snapshot and history;
//! the cache and vector store are shared services namespaced by
//! connection identity.

use crate::classifier::QueryClassifier;
use crate::history::QueryHistory;
use crate::translator::SqlTranslator;
use crate::validator::{enforce_row_limit, validate_read_only};
use querybridge_common::cache::{Fingerprint, ResponseCache};
use querybridge_common::config::QueryConfig;
use querybridge_common::embeddings::Embedder;
use querybridge_common::errors::{AppError, Result};
use querybridge_common::metrics;
use querybridge_common::types::{
    ConnectionId, JsonMap, QueryMetrics, QueryResponse, QueryType, SourceSnippet,
};
use querybridge_discovery::{SchemaDiscovery, SchemaIntrospector, SchemaModel, SqlExecutor};
use querybridge_search::VectorStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Unified query engine for one connection
pub struct QueryEngine {
    connection: ConnectionId,
    schema: RwLock<Arc<SchemaModel>>,
    introspector: Arc<dyn SchemaIntrospector>,
    executor: Arc<dyn SqlExecutor>,
    translator: Arc<dyn SqlTranslator>,
    embedder: Arc<dyn Embedder>,
    store: Arc<VectorStore>,
    cache: Arc<ResponseCache>,
    history: QueryHistory,
    classifier: QueryClassifier,
    discovery: SchemaDiscovery,
    config: QueryConfig,
}

impl QueryEngine {
    /// Run initial discovery and build the engine. Discovery failure
    /// (connectivity included) propagates; no engine exists without a
    /// schema.
    #[allow(clippy::too_many_arguments)]
    pub async fn bootstrap(
        connection: ConnectionId,
        introspector: Arc<dyn SchemaIntrospector>,
        executor: Arc<dyn SqlExecutor>,
        translator: Arc<dyn SqlTranslator>,
        embedder: Arc<dyn Embedder>,
        store: Arc<VectorStore>,
        cache: Arc<ResponseCache>,
        discovery: SchemaDiscovery,
        config: QueryConfig,
    ) -> Result<Self> {
        let model = discovery.discover(introspector.as_ref()).await?;
        info!(connection = %connection, tables = model.tables.len(), "Query engine ready");

        Ok(Self {
            connection,
            schema: RwLock::new(Arc::new(model)),
            introspector,
            executor,
            translator,
            embedder,
            store,
            cache,
            history: QueryHistory::new(config.history_capacity),
            classifier: QueryClassifier::new(),
            discovery,
            config,
        })
    }

    pub fn connection(&self) -> &ConnectionId {
        &self.connection
    }

    /// The current schema snapshot. Callers keep a consistent view for
    /// the whole query even if a refresh lands mid-flight.
    pub async fn schema(&self) -> Arc<SchemaModel> {
        Arc::clone(&*self.schema.read().await)
    }

    /// Force re-discovery, swap the snapshot, and drop the connection's
    /// cache namespace (cached responses were shaped by the old schema).
    pub async fn refresh_schema(&self) -> Result<Arc<SchemaModel>> {
        let model = Arc::new(self.discovery.discover(self.introspector.as_ref()).await?);
        *self.schema.write().await = Arc::clone(&model);
        self.cache.purge_connection(&self.connection).await;
        info!(connection = %self.connection, tables = model.tables.len(), "Schema refreshed");
        Ok(model)
    }

    /// Query history, most recent first
    pub async fn history(&self) -> Vec<querybridge_common::types::QueryHistoryRecord> {
        self.history.list().await
    }

    /// Process one natural-language query.
    ///
    /// Validation errors (empty text) surface before classification and
    /// never touch cache or history. Everything past validation produces
    /// a response: sub-path failures degrade to empty results recorded
    /// in `metrics.warnings`.
    #[instrument(skip(self, query), fields(connection = %self.connection))]
    pub async fn process_query(&self, query: &str, top_k: Option<usize>) -> Result<QueryResponse> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "query text must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let top_k = top_k.unwrap_or(self.config.default_top_k).clamp(1, 100);
        let start = Instant::now();

        let fingerprint = Fingerprint::compute(&self.connection, query, top_k);
        if let Some(mut cached) = self.cache.get(&fingerprint).await {
            cached.metrics.cache_hit = true;
            metrics::record_query(start.elapsed().as_secs_f64(), cached.query_type.as_str(), true);
            // History append is independent of cache hit/miss
            self.history.add(query, cached.query_type).await;
            return Ok(cached);
        }

        let schema = self.schema().await;
        let index_size = self.store.len(&self.connection).await;
        let query_type = self.classifier.classify(query, &schema, index_size > 0);
        debug!(query_type = query_type.as_str(), index_size, "Query classified");

        let mut rows: Vec<JsonMap> = Vec::new();
        let mut sources: Vec<SourceSnippet> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut sql_ms = None;
        let mut sql_rows = None;
        let mut document_ms = None;
        let mut document_matches = None;

        if matches!(query_type, QueryType::Sql | QueryType::Hybrid) {
            let sql_start = Instant::now();
            match self.run_sql_path(query, &schema).await {
                Ok(result) => rows = result,
                Err(e) => {
                    metrics::record_path_failure("sql");
                    warnings.push(format!("sql path: {}", e));
                }
            }
            sql_ms = Some(sql_start.elapsed().as_millis() as u64);
            sql_rows = Some(rows.len());
        }

        if matches!(query_type, QueryType::Document | QueryType::Hybrid) {
            let doc_start = Instant::now();
            match self.run_document_path(query, top_k).await {
                Ok(result) => sources = result,
                Err(e) => {
                    metrics::record_path_failure("document");
                    warnings.push(format!("document path: {}", e));
                }
            }
            document_ms = Some(doc_start.elapsed().as_millis() as u64);
            document_matches = Some(sources.len());
        }

        let response = QueryResponse {
            query: query.to_string(),
            query_type,
            rows,
            sources,
            metrics: QueryMetrics {
                total_ms: start.elapsed().as_millis() as u64,
                cache_hit: false,
                sql_ms,
                sql_rows,
                document_ms,
                document_matches,
                index_size,
                warnings,
            },
        };

        self.cache.put(fingerprint, response.clone()).await;
        self.history.add(query, query_type).await;
        metrics::record_query(start.elapsed().as_secs_f64(), query_type.as_str(), false);

        Ok(response)
    }

    /// SQL sub-path: translate, validate, bound, execute. Any failure
    /// (including a declined translation) becomes this path's error; the
    /// orchestrator converts it into an empty result plus a warning.
    async fn run_sql_path(&self, query: &str, schema: &SchemaModel) -> Result<Vec<JsonMap>> {
        let timeout = Duration::from_secs(self.config.sql_timeout_secs);
        let mapping = schema.map_query(query);
        debug!(likely_tables = ?mapping.likely_tables, "Schema mapping");

        let translated = tokio::time::timeout(
            timeout,
            self.translator.translate(query, schema, &mapping),
        )
        .await
        .map_err(|_| AppError::Timeout {
            operation: "sql translation".to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })??;

        let Some(sql) = translated else {
            return Err(AppError::Translation {
                message: "translator produced no statement for this question".to_string(),
            });
        };

        // The translator is untrusted input
        let sql = validate_read_only(&sql)?;
        let sql = enforce_row_limit(&sql, self.config.max_rows);
        debug!(%sql, "Executing translated statement");

        tokio::time::timeout(timeout, self.executor.execute_read(&sql, self.config.max_rows))
            .await
            .map_err(|_| AppError::Timeout {
                operation: "sql execution".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Document sub-path: embed the query with the session's embedding
    /// model and search the connection's vector partition.
    async fn run_document_path(&self, query: &str, top_k: usize) -> Result<Vec<SourceSnippet>> {
        let timeout = Duration::from_secs(self.config.search_timeout_secs);

        let matches = tokio::time::timeout(timeout, async {
            let embedding = self.embedder.embed(query).await?;
            self.store
                .search(&self.connection, &embedding, top_k, None)
                .await
        })
        .await
        .map_err(|_| AppError::Timeout {
            operation: "document search".to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })??;

        Ok(matches
            .into_iter()
            .map(|m| SourceSnippet {
                chunk_id: m.chunk.id,
                document_id: m.chunk.document_id.clone(),
                content: preview(&m.chunk.content, self.config.preview_chars),
                score: m.score,
                metadata: m.chunk.metadata.clone(),
            })
            .collect())
    }
}

/// Char-boundary-safe content preview
fn preview(content: &str, limit: usize) -> String {
    if content.chars().count() <= limit {
        return content.to_string();
    }
    let mut truncated: String = content.chars().take(limit).collect();
    truncated.push('…');
    truncated
}
