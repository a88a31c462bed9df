//! In-memory vector store partitioned by connection
//!
//! Each connection owns a partition that grows incrementally as
//! ingestion jobs complete. Chunks are immutable; upserting an existing
//! chunk id swaps the stored chunk in place, keeping its creation
//! sequence so tie-breaking stays stable.

use crate::similarity::cosine_similarity;
use querybridge_common::errors::{AppError, Result};
use querybridge_common::types::{ConnectionId, DocumentChunk};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Optional predicate narrowing a search
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Only chunks from this document
    pub document_id: Option<String>,
    /// Only chunks whose metadata contains this key/value pair
    pub metadata: Option<(String, serde_json::Value)>,
}

impl SearchFilter {
    fn matches(&self, chunk: &DocumentChunk) -> bool {
        if let Some(ref document_id) = self.document_id {
            if &chunk.document_id != document_id {
                return false;
            }
        }
        if let Some((ref key, ref value)) = self.metadata {
            if chunk.metadata.get(key) != Some(value) {
                return false;
            }
        }
        true
    }
}

/// A chunk matched by a search, with its similarity score
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Arc<DocumentChunk>,
    pub score: f32,
}

struct StoredChunk {
    /// Creation sequence within the partition; the search tiebreaker
    seq: u64,
    chunk: Arc<DocumentChunk>,
}

#[derive(Default)]
struct Partition {
    chunks: Vec<StoredChunk>,
    by_id: HashMap<Uuid, usize>,
    next_seq: u64,
    /// Dimensionality pinned by the first stored chunk
    dimension: Option<usize>,
}

impl Partition {
    fn upsert(&mut self, chunk: DocumentChunk) -> Result<()> {
        match self.dimension {
            None => self.dimension = Some(chunk.embedding.len()),
            Some(dimension) if dimension != chunk.embedding.len() => {
                return Err(AppError::validation(format!(
                    "embedding dimension {} does not match partition dimension {}",
                    chunk.embedding.len(),
                    dimension
                )));
            }
            Some(_) => {}
        }

        let chunk = Arc::new(chunk);
        match self.by_id.get(&chunk.id) {
            Some(&index) => {
                // Replacement keeps the original creation sequence
                self.chunks[index].chunk = chunk;
            }
            None => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.by_id.insert(chunk.id, self.chunks.len());
                self.chunks.push(StoredChunk { seq, chunk });
            }
        }
        Ok(())
    }
}

/// Per-connection chunk embedding store
#[derive(Default)]
pub struct VectorStore {
    partitions: RwLock<HashMap<ConnectionId, Partition>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store chunks for a connection, replacing any chunk with the same
    /// identifier. All-or-nothing per call: a dimension mismatch rejects
    /// the batch before anything is written.
    pub async fn upsert(&self, connection: &ConnectionId, chunks: Vec<DocumentChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(connection.clone()).or_default();

        if let Some(dimension) = partition
            .dimension
            .or_else(|| chunks.first().map(|c| c.embedding.len()))
        {
            if let Some(bad) = chunks.iter().find(|c| c.embedding.len() != dimension) {
                return Err(AppError::validation(format!(
                    "chunk {} has embedding dimension {}, expected {}",
                    bad.id,
                    bad.embedding.len(),
                    dimension
                )));
            }
        }

        let count = chunks.len();
        for chunk in chunks {
            partition.upsert(chunk)?;
        }

        debug!(
            connection = %connection,
            added = count,
            partition_size = partition.chunks.len(),
            "Chunks upserted"
        );
        Ok(())
    }

    /// Return the k most similar chunks for a connection. An empty or
    /// unknown partition yields an empty result, never an error.
    pub async fn search(
        &self,
        connection: &ConnectionId,
        query_embedding: &[f32],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<ScoredChunk>> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(connection) else {
            return Ok(Vec::new());
        };
        if partition.chunks.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if let Some(dimension) = partition.dimension {
            if query_embedding.len() != dimension {
                return Err(AppError::validation(format!(
                    "query embedding dimension {} does not match partition dimension {}",
                    query_embedding.len(),
                    dimension
                )));
            }
        }

        let mut scored: Vec<(u64, ScoredChunk)> = partition
            .chunks
            .iter()
            .filter(|stored| filter.map_or(true, |f| f.matches(&stored.chunk)))
            .map(|stored| {
                let score = cosine_similarity(query_embedding, &stored.chunk.embedding);
                (
                    stored.seq,
                    ScoredChunk {
                        chunk: Arc::clone(&stored.chunk),
                        score,
                    },
                )
            })
            .collect();

        // Highest score first; creation order (earlier first) breaks ties
        scored.sort_by(|(seq_a, a), (seq_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| seq_a.cmp(seq_b))
        });

        Ok(scored.into_iter().take(k).map(|(_, c)| c).collect())
    }

    /// Number of chunks stored for a connection
    pub async fn len(&self, connection: &ConnectionId) -> usize {
        self.partitions
            .read()
            .await
            .get(connection)
            .map(|p| p.chunks.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, connection: &ConnectionId) -> bool {
        self.len(connection).await == 0
    }

    /// Drop a connection's partition entirely
    pub async fn clear(&self, connection: &ConnectionId) {
        self.partitions.write().await.remove(connection);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> ConnectionId {
        ConnectionId::from_connection_string("memory://store-test").unwrap()
    }

    fn chunk(id: Uuid, document: &str, ordinal: usize, embedding: Vec<f32>) -> DocumentChunk {
        DocumentChunk {
            id,
            document_id: document.to_string(),
            job_id: Uuid::new_v4(),
            ordinal,
            content: format!("chunk {} of {}", ordinal, document),
            embedding,
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_search_empty_store_returns_empty() {
        let store = VectorStore::new();
        let results = store.search(&conn(), &[1.0, 0.0], 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let store = VectorStore::new();
        let c = conn();
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        store
            .upsert(
                &c,
                vec![
                    chunk(far, "doc", 0, vec![0.0, 1.0]),
                    chunk(close, "doc", 1, vec![1.0, 0.1]),
                ],
            )
            .await
            .unwrap();

        let results = store.search(&c, &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results[0].chunk.id, close);
        assert_eq!(results[1].chunk.id, far);
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn test_tie_broken_by_creation_order() {
        let store = VectorStore::new();
        let c = conn();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        // Identical embeddings: identical scores
        store
            .upsert(
                &c,
                vec![
                    chunk(first, "doc", 0, vec![1.0, 0.0]),
                    chunk(second, "doc", 1, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let results = store.search(&c, &[1.0, 0.0], 2, None).await.unwrap();
        assert_eq!(results[0].chunk.id, first);
        assert_eq!(results[1].chunk.id, second);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id_keeping_order() {
        let store = VectorStore::new();
        let c = conn();
        let id = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .upsert(
                &c,
                vec![
                    chunk(id, "doc", 0, vec![1.0, 0.0]),
                    chunk(other, "doc", 1, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        // Replace the first chunk's content; same id, same embedding
        let mut replacement = chunk(id, "doc", 0, vec![1.0, 0.0]);
        replacement.content = "replaced".to_string();
        store.upsert(&c, vec![replacement]).await.unwrap();

        assert_eq!(store.len(&c).await, 2);
        let results = store.search(&c, &[1.0, 0.0], 2, None).await.unwrap();
        // Still first by creation order, with the new content visible
        assert_eq!(results[0].chunk.id, id);
        assert_eq!(results[0].chunk.content, "replaced");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let store = VectorStore::new();
        let c = conn();
        store
            .upsert(&c, vec![chunk(Uuid::new_v4(), "doc", 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        let err = store
            .upsert(&c, vec![chunk(Uuid::new_v4(), "doc", 1, vec![1.0, 0.0, 0.0])])
            .await;
        assert!(err.is_err());

        let err = store.search(&c, &[1.0, 0.0, 0.0], 5, None).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_filter_by_document() {
        let store = VectorStore::new();
        let c = conn();
        store
            .upsert(
                &c,
                vec![
                    chunk(Uuid::new_v4(), "a.txt", 0, vec![1.0, 0.0]),
                    chunk(Uuid::new_v4(), "b.txt", 0, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let filter = SearchFilter {
            document_id: Some("a.txt".to_string()),
            metadata: None,
        };
        let results = store.search(&c, &[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.document_id, "a.txt");
    }

    #[tokio::test]
    async fn test_partitions_are_isolated() {
        let store = VectorStore::new();
        let a = ConnectionId::from_connection_string("memory://a").unwrap();
        let b = ConnectionId::from_connection_string("memory://b").unwrap();
        store
            .upsert(&a, vec![chunk(Uuid::new_v4(), "doc", 0, vec![1.0])])
            .await
            .unwrap();

        assert_eq!(store.len(&a).await, 1);
        assert_eq!(store.len(&b).await, 0);
        assert!(store.search(&b, &[1.0], 5, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_reads_during_writes() {
        use rand::Rng;

        let store = Arc::new(VectorStore::new());
        let c = conn();

        // Seed so searches have something to rank
        let seed: Vec<DocumentChunk> = (0..8)
            .map(|i| chunk(Uuid::new_v4(), "seed", i, vec![i as f32 + 1.0, 1.0]))
            .collect();
        store.upsert(&c, seed).await.unwrap();

        let writer = {
            let store = Arc::clone(&store);
            let c = c.clone();
            tokio::spawn(async move {
                let mut rng = rand::rngs::OsRng;
                for batch in 0..20 {
                    let chunks: Vec<DocumentChunk> = (0..4)
                        .map(|i| {
                            chunk(
                                Uuid::new_v4(),
                                "writer",
                                batch * 4 + i,
                                vec![rng.gen::<f32>(), rng.gen::<f32>()],
                            )
                        })
                        .collect();
                    store.upsert(&c, chunks).await.unwrap();
                }
            })
        };

        let reader = {
            let store = Arc::clone(&store);
            let c = c.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let results = store.search(&c, &[0.5, 0.5], 5, None).await.unwrap();
                    // Never torn: every result carries a full embedding
                    for r in &results {
                        assert_eq!(r.chunk.embedding.len(), 2);
                    }
                }
            })
        };

        writer.await.unwrap();
        reader.await.unwrap();
        assert_eq!(store.len(&c).await, 8 + 20 * 4);
    }
}
