//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming. Per-request metrics
//! (latency, counts, cache hit) additionally travel inside each
//! `QueryResponse`; the counters here are the fleet-level view.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};

/// Metrics prefix for all QueryBridge metrics
pub const METRICS_PREFIX: &str = "querybridge";

/// Register all metric descriptions
pub fn register_metrics() {
    // Query metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of queries processed, labeled by classified type"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_counter!(
        format!("{}_query_path_failures_total", METRICS_PREFIX),
        Unit::Count,
        "Sub-path failures degraded to empty results"
    );

    // Cache metrics
    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total cache misses"
    );

    // Discovery metrics
    describe_histogram!(
        format!("{}_discovery_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Schema discovery latency in seconds"
    );

    describe_gauge!(
        format!("{}_discovered_tables", METRICS_PREFIX),
        Unit::Count,
        "Tables in the most recently discovered schema"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_files_ingested_total", METRICS_PREFIX),
        Unit::Count,
        "Total files processed, labeled by disposition"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks embedded and stored"
    );

    describe_histogram!(
        format!("{}_ingestion_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Ingestion job latency in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Record a completed query
pub fn record_query(duration_secs: f64, query_type: &str, cache_hit: bool) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "type" => query_type.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "type" => query_type.to_string()
    )
    .record(duration_secs);

    record_cache(cache_hit);
}

/// Record a sub-path that failed open
pub fn record_path_failure(path: &str) {
    counter!(
        format!("{}_query_path_failures_total", METRICS_PREFIX),
        "path" => path.to_string()
    )
    .increment(1);
}

/// Record a cache lookup outcome
pub fn record_cache(hit: bool) {
    if hit {
        counter!(format!("{}_cache_hits_total", METRICS_PREFIX)).increment(1);
    } else {
        counter!(format!("{}_cache_misses_total", METRICS_PREFIX)).increment(1);
    }
}

/// Record a schema discovery pass
pub fn record_discovery(duration_secs: f64, table_count: usize) {
    histogram!(format!("{}_discovery_duration_seconds", METRICS_PREFIX)).record(duration_secs);
    gauge!(format!("{}_discovered_tables", METRICS_PREFIX)).set(table_count as f64);
}

/// Record a processed file within an ingestion job
pub fn record_file(disposition: &str) {
    counter!(
        format!("{}_files_ingested_total", METRICS_PREFIX),
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

/// Record a finished ingestion job
pub fn record_ingestion(duration_secs: f64, chunks_indexed: usize) {
    counter!(format!("{}_chunks_indexed_total", METRICS_PREFIX)).increment(chunks_indexed as u64);
    histogram!(format!("{}_ingestion_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record an embedding call
pub fn record_embedding(duration_secs: f64, model: &str) {
    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}
