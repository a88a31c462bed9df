//! In-memory ingestion job tracker
//!
//! All job mutation funnels through one lock, so processed counts are
//! serialized (no double counting under concurrent file workers) and
//! status transitions stay monotonic: an illegal regression is ignored
//! and logged, never applied.

use chrono::Utc;
use querybridge_common::types::{ConnectionId, FileOutcome, IngestionJob, JobStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Tracker for ingestion jobs
pub struct JobTracker {
    jobs: Mutex<HashMap<Uuid, IngestionJob>>,
    retention: Duration,
}

impl JobTracker {
    pub fn new(retention: Duration) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            retention,
        }
    }

    /// Create a job in `pending` state
    pub async fn create(&self, connection: ConnectionId, total: usize) -> IngestionJob {
        let now = Utc::now();
        let job = IngestionJob {
            id: Uuid::new_v4(),
            connection,
            status: JobStatus::Pending,
            processed: 0,
            total,
            message: None,
            files: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.jobs.lock().await.insert(job.id, job.clone());
        debug!(job_id = %job.id, total, "Ingestion job created");
        job
    }

    /// Fetch a job snapshot
    pub async fn get(&self, id: Uuid) -> Option<IngestionJob> {
        self.jobs.lock().await.get(&id).cloned()
    }

    /// List jobs, optionally narrowed to one connection, newest first
    pub async fn list(&self, connection: Option<&ConnectionId>) -> Vec<IngestionJob> {
        let jobs = self.jobs.lock().await;
        let mut list: Vec<IngestionJob> = jobs
            .values()
            .filter(|job| connection.map_or(true, |c| &job.connection == c))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    /// Transition a job's status. Illegal transitions (regressions out of
    /// a terminal state) are dropped.
    pub async fn set_status(&self, id: Uuid, status: JobStatus, message: Option<String>) {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            warn!(job_id = %id, "Status update for unknown job");
            return;
        };

        if job.status == status {
            if message.is_some() {
                job.message = message;
                job.updated_at = Utc::now();
            }
            return;
        }

        if !job.status.allows_transition(status) {
            warn!(
                job_id = %id,
                from = %job.status,
                to = %status,
                "Illegal job status transition ignored"
            );
            return;
        }

        debug!(job_id = %id, from = %job.status, to = %status, "Job status transition");
        job.status = status;
        if message.is_some() {
            job.message = message;
        }
        job.updated_at = Utc::now();
    }

    /// Record one file's outcome and bump the processed counter. The
    /// counter never exceeds `total`.
    pub async fn record_file(&self, id: Uuid, outcome: FileOutcome) {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs.get_mut(&id) else {
            warn!(job_id = %id, "File outcome for unknown job");
            return;
        };

        if job.processed >= job.total {
            warn!(job_id = %id, file = %outcome.file_name, "File outcome beyond job total ignored");
            return;
        }

        job.processed += 1;
        job.files.push(outcome);
        job.updated_at = Utc::now();
    }

    /// Drop terminal jobs older than the retention window
    pub async fn sweep(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::zero());
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.status.is_terminal() && job.updated_at < cutoff));
        before - jobs.len()
    }

    /// Spawn the periodic retention sweep
    pub fn spawn_sweeper(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let tracker = self;
        let interval = tracker.retention.max(Duration::from_secs(60));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = tracker.sweep().await;
                if removed > 0 {
                    debug!(removed, "Job retention sweep");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use querybridge_common::types::FileDisposition;

    fn conn() -> ConnectionId {
        ConnectionId::from_connection_string("memory://jobs").unwrap()
    }

    fn outcome(name: &str) -> FileOutcome {
        FileOutcome {
            file_name: name.to_string(),
            disposition: FileDisposition::Indexed,
            detail: None,
            chunks: 3,
        }
    }

    #[tokio::test]
    async fn test_create_starts_pending() {
        let tracker = JobTracker::new(Duration::from_secs(3600));
        let job = tracker.create(conn(), 2).await;
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.processed, 0);
        assert_eq!(job.total, 2);
    }

    #[tokio::test]
    async fn test_processed_never_exceeds_total() {
        let tracker = JobTracker::new(Duration::from_secs(3600));
        let job = tracker.create(conn(), 1).await;

        tracker.record_file(job.id, outcome("a.txt")).await;
        tracker.record_file(job.id, outcome("phantom.txt")).await;

        let job = tracker.get(job.id).await.unwrap();
        assert_eq!(job.processed, 1);
        assert_eq!(job.files.len(), 1);
    }

    #[tokio::test]
    async fn test_no_status_regression() {
        let tracker = JobTracker::new(Duration::from_secs(3600));
        let job = tracker.create(conn(), 1).await;

        tracker.set_status(job.id, JobStatus::InProgress, None).await;
        tracker.set_status(job.id, JobStatus::Completed, None).await;
        tracker
            .set_status(job.id, JobStatus::InProgress, Some("rewind".to_string()))
            .await;

        let job = tracker.get(job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_concurrent_record_file_is_race_free() {
        let tracker = Arc::new(JobTracker::new(Duration::from_secs(3600)));
        let job = tracker.create(conn(), 50).await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let tracker = Arc::clone(&tracker);
            let id = job.id;
            handles.push(tokio::spawn(async move {
                tracker.record_file(id, outcome(&format!("f{}.txt", i))).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let job = tracker.get(job.id).await.unwrap();
        assert_eq!(job.processed, 50);
        assert_eq!(job.files.len(), 50);
    }

    #[tokio::test]
    async fn test_sweep_removes_old_terminal_jobs() {
        let tracker = JobTracker::new(Duration::from_millis(10));
        let done = tracker.create(conn(), 0).await;
        tracker.set_status(done.id, JobStatus::Completed, None).await;
        let running = tracker.create(conn(), 1).await;
        tracker.set_status(running.id, JobStatus::InProgress, None).await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        tracker.sweep().await;

        assert!(tracker.get(done.id).await.is_none());
        assert!(tracker.get(running.id).await.is_some());
    }

    #[tokio::test]
    async fn test_list_filters_by_connection() {
        let tracker = JobTracker::new(Duration::from_secs(3600));
        let a = ConnectionId::from_connection_string("memory://a").unwrap();
        let b = ConnectionId::from_connection_string("memory://b").unwrap();
        tracker.create(a.clone(), 1).await;
        tracker.create(b.clone(), 1).await;

        assert_eq!(tracker.list(Some(&a)).await.len(), 1);
        assert_eq!(tracker.list(None).await.len(), 2);
    }
}
