use chrono::{DateTime, Utc};
use dashmap::DashMap;
use jobpoll::JobStatus;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// One asynchronous job known to the server.
#[derive(Clone, Debug)]
pub struct JobRecord {
    pub cmd: String,
    pub status: JobStatus,
    pub created: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
}

/// Shared server state: job_id → JobRecord, plus the session key callers
/// must present (if any).
#[derive(Clone, Debug, Default)]
pub struct AppState {
    pub jobs: Arc<DashMap<Uuid, JobRecord>>,
    pub session_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(session_key: Option<String>) -> Self {
        AppState {
            jobs: Arc::new(DashMap::new()),
            session_key: session_key.map(Arc::from),
        }
    }

    /// Registers a pending job for `cmd` and returns its id.
    pub fn accept_job(&self, cmd: &str) -> Uuid {
        let job_id = Uuid::new_v4();
        self.jobs.insert(
            job_id,
            JobRecord {
                cmd: cmd.to_string(),
                status: JobStatus::Pending,
                created: Utc::now(),
                finished: None,
            },
        );
        job_id
    }

    /// Stores the terminal status of a job. Finished jobs never change again.
    pub fn finish_job(&self, job_id: Uuid, status: JobStatus) {
        if let Some(mut record) = self.jobs.get_mut(&job_id) {
            if !record.status.is_terminal() {
                record.status = status;
                record.finished = Some(Utc::now());
            }
        }
    }

    pub fn job(&self, job_id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(job_id).map(|r| r.value().clone())
    }

    /// Drops jobs that finished more than `retention` before `now`. Pending
    /// jobs are always kept. Returns how many records were removed.
    pub fn prune_finished(&self, now: DateTime<Utc>, retention: chrono::Duration) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, record| record.finished.map_or(true, |at| now - at < retention));
        before.saturating_sub(self.jobs.len())
    }

    /// Spawns a background task that prunes finished jobs every `every`.
    pub fn spawn_reaper(&self, every: Duration, retention: chrono::Duration) {
        let state = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(every).await;
                let removed = state.prune_finished(Utc::now(), retention);
                if removed > 0 {
                    debug!(removed, "pruned finished jobs");
                }
            }
        });
    }
}
