//! Response cache with TTL
//!
//! Provides:
//! - Fingerprint computation over (connection identity, query text, shaping parameters)
//! - Get/put with per-entry TTL, lazy expiry on lookup
//! - Background sweep task for expired entries
//! - Bounded size with oldest-expiry eviction
//!
//! Cache content is derivable, not authoritative: concurrent puts for the
//! same fingerprint race and the last writer wins.

use crate::types::{ConnectionId, QueryResponse};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Default TTL in seconds
    pub ttl_secs: u64,
    /// Maximum number of entries
    pub max_entries: usize,
    /// Interval of the background sweep
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 1000,
            sweep_interval_secs: 60,
        }
    }
}

/// Deterministic cache key derived from a query's semantically relevant
/// inputs. Two requests with identical semantic input hit the same entry
/// regardless of incidental formatting differences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Fingerprint {
    /// Connection digest, used as the cache namespace
    connection: String,
    /// Hash over normalized query text + shaping parameters
    hash: String,
}

impl Fingerprint {
    /// Compute a fingerprint for a query request.
    ///
    /// The query text is whitespace-normalized (collapsed and trimmed);
    /// connection identity is already normalized by [`ConnectionId`].
    /// `top_k` participates because it shapes the result.
    pub fn compute(connection: &ConnectionId, query: &str, top_k: usize) -> Self {
        let normalized_query = normalize_query_text(query);

        let mut hasher = Sha256::new();
        hasher.update(connection.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(normalized_query.as_bytes());
        hasher.update([0u8]);
        hasher.update(top_k.to_le_bytes());

        Self {
            connection: connection.digest().to_string(),
            hash: hex::encode(hasher.finalize()),
        }
    }

    /// The connection namespace this fingerprint belongs to
    pub fn connection(&self) -> &str {
        &self.connection
    }
}

/// Collapse runs of whitespace into single spaces and trim the ends
fn normalize_query_text(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

struct CacheEntry {
    value: QueryResponse,
    expires_at: Instant,
}

/// In-process TTL cache for query responses
pub struct ResponseCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
    config: CacheConfig,
}

impl ResponseCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get a value if present and unexpired. An expired entry is evicted
    /// on the spot and reported as a miss.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Option<QueryResponse> {
        {
            let entries = self.entries.read().await;
            match entries.get(fingerprint) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    debug!(connection = %fingerprint.connection, "Cache hit");
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    debug!(connection = %fingerprint.connection, "Cache miss");
                    return None;
                }
            }
        }

        // Entry exists but expired: upgrade to a write lock and evict
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(fingerprint) {
            if entry.expires_at > Instant::now() {
                // A concurrent put refreshed it in between
                return Some(entry.value.clone());
            }
            entries.remove(fingerprint);
        }
        debug!(connection = %fingerprint.connection, "Cache miss (expired)");
        None
    }

    /// Store a value with the default TTL, overwriting any prior entry
    pub async fn put(&self, fingerprint: Fingerprint, value: QueryResponse) {
        self.put_with_ttl(fingerprint, value, Duration::from_secs(self.config.ttl_secs))
            .await;
    }

    /// Store a value with a custom TTL
    pub async fn put_with_ttl(&self, fingerprint: Fingerprint, value: QueryResponse, ttl: Duration) {
        let mut entries = self.entries.write().await;

        if entries.len() >= self.config.max_entries && !entries.contains_key(&fingerprint) {
            evict_oldest(&mut entries);
        }

        debug!(connection = %fingerprint.connection, ttl_secs = ttl.as_secs(), "Cache put");
        entries.insert(
            fingerprint,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove all entries belonging to a connection namespace
    pub async fn purge_connection(&self, connection: &ConnectionId) {
        let mut entries = self.entries.write().await;
        entries.retain(|fp, _| fp.connection != connection.digest());
    }

    /// Drop expired entries; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Current entry count (expired-but-unswept entries included)
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Spawn the periodic sweep task. The task runs for the process
    /// lifetime; dropping the returned handle detaches it.
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let cache = self;
        let interval = Duration::from_secs(cache.config.sweep_interval_secs.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = cache.sweep().await;
                if removed > 0 {
                    debug!(removed, "Cache sweep evicted expired entries");
                }
            }
        })
    }
}

fn evict_oldest(entries: &mut HashMap<Fingerprint, CacheEntry>) {
    if let Some(oldest) = entries
        .iter()
        .min_by_key(|(_, entry)| entry.expires_at)
        .map(|(fp, _)| fp.clone())
    {
        entries.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QueryMetrics, QueryType};

    fn response(query: &str) -> QueryResponse {
        QueryResponse {
            query: query.to_string(),
            query_type: QueryType::Sql,
            rows: vec![],
            sources: vec![],
            metrics: QueryMetrics::default(),
        }
    }

    fn conn() -> ConnectionId {
        ConnectionId::from_connection_string("memory://cache-test").unwrap()
    }

    #[test]
    fn test_fingerprint_ignores_whitespace() {
        let c = conn();
        let a = Fingerprint::compute(&c, "average  salary by department", 10);
        let b = Fingerprint::compute(&c, "  average salary by department ", 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_ignores_scheme_case() {
        let a = ConnectionId::from_connection_string("Memory://x").unwrap();
        let b = ConnectionId::from_connection_string("memory://x").unwrap();
        assert_eq!(
            Fingerprint::compute(&a, "q", 10),
            Fingerprint::compute(&b, "q", 10)
        );
    }

    #[test]
    fn test_fingerprint_varies_with_top_k() {
        let c = conn();
        assert_ne!(
            Fingerprint::compute(&c, "q", 5),
            Fingerprint::compute(&c, "q", 10)
        );
    }

    #[tokio::test]
    async fn test_get_put_roundtrip() {
        let cache = ResponseCache::new(CacheConfig::default());
        let fp = Fingerprint::compute(&conn(), "q", 10);

        assert!(cache.get(&fp).await.is_none());
        cache.put(fp.clone(), response("q")).await;
        let hit = cache.get(&fp).await.unwrap();
        assert_eq!(hit.query, "q");
    }

    #[tokio::test]
    async fn test_expired_entry_not_served() {
        let cache = ResponseCache::new(CacheConfig::default());
        let fp = Fingerprint::compute(&conn(), "q", 10);

        cache
            .put_with_ttl(fp.clone(), response("q"), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get(&fp).await.is_none());
        // Lazy eviction removed it
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_bounded_size_evicts_oldest() {
        let cache = ResponseCache::new(CacheConfig {
            ttl_secs: 300,
            max_entries: 2,
            sweep_interval_secs: 60,
        });
        let c = conn();

        let fp1 = Fingerprint::compute(&c, "one", 10);
        cache
            .put_with_ttl(fp1.clone(), response("one"), Duration::from_secs(1))
            .await;
        let fp2 = Fingerprint::compute(&c, "two", 10);
        cache.put(fp2, response("two")).await;
        let fp3 = Fingerprint::compute(&c, "three", 10);
        cache.put(fp3, response("three")).await;

        assert_eq!(cache.len().await, 2);
        // fp1 had the nearest expiry, so it was the one evicted
        assert!(cache.get(&fp1).await.is_none());
    }

    #[tokio::test]
    async fn test_purge_connection_namespace() {
        let cache = ResponseCache::new(CacheConfig::default());
        let a = ConnectionId::from_connection_string("memory://a").unwrap();
        let b = ConnectionId::from_connection_string("memory://b").unwrap();

        let fpa = Fingerprint::compute(&a, "q", 10);
        let fpb = Fingerprint::compute(&b, "q", 10);
        cache.put(fpa.clone(), response("q")).await;
        cache.put(fpb.clone(), response("q")).await;

        cache.purge_connection(&a).await;
        assert!(cache.get(&fpa).await.is_none());
        assert!(cache.get(&fpb).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let cache = ResponseCache::new(CacheConfig::default());
        let c = conn();
        cache
            .put_with_ttl(
                Fingerprint::compute(&c, "old", 10),
                response("old"),
                Duration::from_millis(5),
            )
            .await;
        cache.put(Fingerprint::compute(&c, "new", 10), response("new")).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.sweep().await, 1);
        assert_eq!(cache.len().await, 1);
    }
}
