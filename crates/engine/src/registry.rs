//! Per-connection engine registry
//!
//! One engine aggregate per connection identity, created on first
//! successful discovery and owned here for the process lifetime (or
//! until evicted). Identity is passed explicitly; there is no ambient
//! current-connection state.

use crate::orchestrator::QueryEngine;
use crate::translator::SqlTranslator;
use querybridge_common::cache::ResponseCache;
use querybridge_common::config::AppConfig;
use querybridge_common::embeddings::Embedder;
use querybridge_common::errors::Result;
use querybridge_common::types::ConnectionId;
use querybridge_discovery::{connect_source, SchemaDiscovery, SchemaModel};
use querybridge_search::VectorStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Registry of query engines keyed by connection identity
pub struct EngineRegistry {
    engines: RwLock<HashMap<ConnectionId, Arc<QueryEngine>>>,
    config: Arc<AppConfig>,
    cache: Arc<ResponseCache>,
    store: Arc<VectorStore>,
    embedder: Arc<dyn Embedder>,
    translator: Arc<dyn SqlTranslator>,
}

impl EngineRegistry {
    pub fn new(
        config: Arc<AppConfig>,
        cache: Arc<ResponseCache>,
        store: Arc<VectorStore>,
        embedder: Arc<dyn Embedder>,
        translator: Arc<dyn SqlTranslator>,
    ) -> Self {
        Self {
            engines: RwLock::new(HashMap::new()),
            config,
            cache,
            store,
            embedder,
            translator,
        }
    }

    /// Existing engine for a connection, if any
    pub async fn get(&self, connection: &ConnectionId) -> Option<Arc<QueryEngine>> {
        self.engines.read().await.get(connection).cloned()
    }

    /// Engine for a connection, creating it (with a full discovery pass)
    /// on first use. Concurrent first calls race benignly: one engine
    /// wins the slot, the losers are dropped.
    pub async fn get_or_connect(&self, connection: &ConnectionId) -> Result<Arc<QueryEngine>> {
        if let Some(engine) = self.get(connection).await {
            return Ok(engine);
        }

        let (introspector, executor) =
            connect_source(connection, &self.config.database, &self.config.discovery).await?;

        let engine = Arc::new(
            QueryEngine::bootstrap(
                connection.clone(),
                introspector,
                executor,
                Arc::clone(&self.translator),
                Arc::clone(&self.embedder),
                Arc::clone(&self.store),
                Arc::clone(&self.cache),
                SchemaDiscovery::new(&self.config.discovery),
                self.config.query.clone(),
            )
            .await?,
        );

        let mut engines = self.engines.write().await;
        let entry = engines.entry(connection.clone()).or_insert(engine);
        Ok(Arc::clone(entry))
    }

    /// Force re-discovery for a connection, creating the engine first if
    /// needed
    pub async fn refresh(&self, connection: &ConnectionId) -> Result<Arc<SchemaModel>> {
        let engine = self.get_or_connect(connection).await?;
        engine.refresh_schema().await
    }

    /// Drop a connection's aggregate: engine (schema + history), cache
    /// namespace, and vector partition
    pub async fn evict(&self, connection: &ConnectionId) -> bool {
        let removed = self.engines.write().await.remove(connection).is_some();
        if removed {
            self.cache.purge_connection(connection).await;
            self.store.clear(connection).await;
            info!(connection = %connection, "Connection evicted");
        }
        removed
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.engines.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::StaticTranslator;
    use querybridge_common::cache::CacheConfig;
    use querybridge_common::embeddings::HashEmbedder;

    fn registry() -> EngineRegistry {
        let config = Arc::new(AppConfig::default());
        EngineRegistry::new(
            config,
            Arc::new(ResponseCache::new(CacheConfig::default())),
            Arc::new(VectorStore::new()),
            Arc::new(HashEmbedder::new(64)),
            Arc::new(StaticTranslator::new()),
        )
    }

    #[tokio::test]
    async fn test_engine_created_once_per_connection() {
        let registry = registry();
        let connection = ConnectionId::from_connection_string("memory://registry").unwrap();

        let first = registry.get_or_connect(&connection).await.unwrap();
        let second = registry.get_or_connect(&connection).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn test_connections_are_independent() {
        let registry = registry();
        let a = ConnectionId::from_connection_string("memory://a").unwrap();
        let b = ConnectionId::from_connection_string("memory://b").unwrap();

        registry.get_or_connect(&a).await.unwrap();
        registry.get_or_connect(&b).await.unwrap();
        assert_eq!(registry.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_scheme_creates_no_engine() {
        let registry = registry();
        let bad = ConnectionId::from_connection_string("mysql://nope/db").unwrap();
        assert!(registry.get_or_connect(&bad).await.is_err());
        assert_eq!(registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_evict_drops_aggregate() {
        let registry = registry();
        let connection = ConnectionId::from_connection_string("memory://evict").unwrap();

        registry.get_or_connect(&connection).await.unwrap();
        assert!(registry.evict(&connection).await);
        assert_eq!(registry.connection_count().await, 0);
        assert!(!registry.evict(&connection).await);
    }

    #[tokio::test]
    async fn test_refresh_returns_fresh_model() {
        let registry = registry();
        let connection = ConnectionId::from_connection_string("memory://refresh").unwrap();

        let model = registry.refresh(&connection).await.unwrap();
        assert!(!model.tables.is_empty());
    }
}
