//! Bounded query history
//!
//! Append-only, most-recent-first, bounded retention. One history per
//! connection engine; records are appended for every successfully
//! classified query, cache hit or miss. Requests that fail validation
//! never get here.

use querybridge_common::types::{QueryHistoryRecord, QueryType};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Bounded most-recent-first history for one connection
pub struct QueryHistory {
    capacity: usize,
    records: RwLock<VecDeque<QueryHistoryRecord>>,
}

impl QueryHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Append a record, dropping the oldest beyond capacity
    pub async fn add(&self, query: &str, query_type: QueryType) {
        let mut records = self.records.write().await;
        records.push_front(QueryHistoryRecord {
            query: query.to_string(),
            query_type,
            timestamp: chrono::Utc::now(),
        });
        records.truncate(self.capacity);
    }

    /// All records, most recent first
    pub async fn list(&self) -> Vec<QueryHistoryRecord> {
        self.records.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_most_recent_first() {
        let history = QueryHistory::new(10);
        history.add("first", QueryType::Sql).await;
        history.add("second", QueryType::Document).await;

        let records = history.list().await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].query, "second");
        assert_eq!(records[1].query, "first");
    }

    #[tokio::test]
    async fn test_bounded_retention() {
        let history = QueryHistory::new(3);
        for i in 0..5 {
            history.add(&format!("query {}", i), QueryType::Sql).await;
        }

        let records = history.list().await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].query, "query 4");
        assert_eq!(records[2].query, "query 2");
    }
}
