use anyhow::Result;
use chrono::Utc;
use signpost_common::types::JobStatus;
use signpost_storage::EditorialStore;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tokio::time::{interval, Duration};

use super::orchestrator::{JobOrchestrator, JobRun};

/// 每次巡检最多重新派发的 PENDING 任务数
const SWEEP_BATCH: usize = 100;

/// Sending half of the generation job queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<String>,
}

impl JobQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn dispatch(&self, job_id: &str) {
        if self.tx.send(job_id.to_string()).is_err() {
            tracing::warn!(job_id = %job_id, "Job queue closed, job left for the next sweep");
        }
    }
}

/// Consumes queued job ids with bounded concurrency.
///
/// A periodic sweep fails RUNNING jobs that have outlived
/// `stale_running_secs` and re-dispatches PENDING ones, so jobs survive a
/// restart.
pub struct JobWorker {
    orchestrator: Arc<JobOrchestrator>,
    store: Arc<EditorialStore>,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    tick_secs: u64,
    stale_running_secs: u64,
}

impl JobWorker {
    pub fn new(
        orchestrator: Arc<JobOrchestrator>,
        store: Arc<EditorialStore>,
        max_concurrent: usize,
        tick_secs: u64,
        stale_running_secs: u64,
    ) -> Self {
        Self {
            orchestrator,
            store,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tick_secs: tick_secs.max(1),
            stale_running_secs,
        }
    }

    /// Runs until the process exits. `rx` is the receiving half returned by
    /// [`JobQueue::new`].
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<String>) {
        tracing::info!(
            tick_secs = self.tick_secs,
            max_concurrent = self.semaphore.available_permits(),
            stale_running_secs = self.stale_running_secs,
            "Generation job worker started"
        );

        let mut tick = interval(Duration::from_secs(self.tick_secs));
        loop {
            tokio::select! {
                Some(job_id) = rx.recv() => self.spawn_job(job_id),
                _ = tick.tick() => {
                    if let Err(e) = self.sweep().await {
                        tracing::error!(error = %e, "Generation job sweep failed");
                    }
                }
            }
        }
    }

    async fn sweep(&self) -> Result<()> {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.stale_running_secs as i64);
        let interrupted = self.store.fail_stale_running_jobs(cutoff).await?;
        if interrupted > 0 {
            tracing::warn!(interrupted, "Marked stale running jobs as interrupted");
        }

        let pending = self
            .store
            .list_jobs_by_status(JobStatus::Pending, SWEEP_BATCH)
            .await?;
        if !pending.is_empty() {
            tracing::debug!(count = pending.len(), "Re-dispatching pending generation jobs");
        }
        for job in pending {
            self.spawn_job(job.id);
        }
        Ok(())
    }

    fn spawn_job(&self, job_id: String) {
        {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !in_flight.insert(job_id.clone()) {
                return;
            }
        }

        let semaphore = self.semaphore.clone();
        let orchestrator = self.orchestrator.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            if let Ok(_permit) = semaphore.acquire_owned().await {
                match orchestrator.run_generation_job(&job_id).await {
                    Ok(JobRun::Completed(done)) => {
                        tracing::debug!(
                            job_id = %job_id,
                            batch_id = %done.batch_id,
                            "Worker finished job"
                        );
                    }
                    Ok(JobRun::Failed(failure)) => {
                        tracing::debug!(job_id = %job_id, error = %failure, "Worker job failed");
                    }
                    Ok(JobRun::Skipped) => {}
                    Err(e) => {
                        tracing::error!(job_id = %job_id, error = %e, "Worker could not run job");
                    }
                }
            }
            in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .remove(&job_id);
        });
    }
}
