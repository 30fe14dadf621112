//! Worker pool draining the job queue

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::handler::HandlerRegistry;
use super::job::Job;
use super::queue::{FailOutcome, JobQueue};
use crate::error::{Error, Result};
use crate::storage::DocumentRepository;
use crate::types::StatusUpdate;

/// Pool of tokio tasks that claim, run, and settle jobs
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<JobQueue>,
    registry: Arc<HandlerRegistry>,
    repository: Arc<dyn DocumentRepository>,
    worker_count: usize,
    job_timeout: Duration,
}

/// Running workers; dropping it leaves them running until the runtime stops
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<JobQueue>,
        registry: Arc<HandlerRegistry>,
        repository: Arc<dyn DocumentRepository>,
        worker_count: usize,
        job_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            registry,
            repository,
            worker_count: worker_count.max(1),
            job_timeout,
        }
    }

    /// Spawn the workers
    pub fn start(self) -> WorkerPoolHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let workers = (0..self.worker_count)
            .map(|worker_id| {
                let pool = self.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move { pool.run_worker(worker_id, shutdown_rx).await })
            })
            .collect();

        tracing::info!(
            "Worker pool started: {} workers, {}s job timeout, handlers: {:?}",
            self.worker_count,
            self.job_timeout.as_secs(),
            self.registry.job_types()
        );

        WorkerPoolHandle { shutdown, workers }
    }

    async fn run_worker(self, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("Worker {} started", worker_id);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let job = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                job = self.queue.claim_next() => job,
            };
            tracing::debug!(
                "Worker {} claimed job {} ({}, attempt {}/{})",
                worker_id,
                job.id,
                job.job_type,
                job.attempts,
                job.max_attempts
            );
            self.run_job(job).await;
        }
        tracing::debug!("Worker {} stopped", worker_id);
    }

    /// Execute a claimed job and record the outcome in the queue
    pub async fn run_job(&self, job: Job) {
        let result = self.execute(&job).await;
        self.settle(job, result).await;
    }

    async fn execute(&self, job: &Job) -> Result<()> {
        let handler = self.registry.get(&job.job_type).ok_or_else(|| {
            Error::permanent(format!("no handler registered for job type {}", job.job_type))
        })?;

        let budget = handler.timeout(job, self.job_timeout);
        let task_job = job.clone();
        let mut task = tokio::spawn(async move { handler.handle(&task_job).await });

        match timeout(budget, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(Error::transient(format!(
                "handler for job {} crashed: {}",
                job.id, join_error
            ))),
            Err(_) => {
                task.abort();
                // The attempt must have stopped before the job can be claimed again
                if let Err(e) = task.await {
                    if !e.is_cancelled() {
                        tracing::warn!("Timed out job {} ended with {}", job.id, e);
                    }
                }
                Err(Error::transient(format!(
                    "job {} timed out after {}s",
                    job.id,
                    budget.as_secs_f64()
                )))
            }
        }
    }

    async fn settle(&self, job: Job, result: Result<()>) {
        let error = match result {
            Ok(()) => {
                if let Err(e) = self.queue.complete(job.id) {
                    tracing::error!("Failed to mark job {} complete: {}", job.id, e);
                } else {
                    tracing::info!("Job {} ({}) completed", job.id, job.job_type);
                }
                return;
            }
            Err(e) => e,
        };

        match self.queue.fail(job.id, &error) {
            Ok(FailOutcome::Retrying { attempt, delay }) => {
                tracing::warn!(
                    "Job {} attempt {} failed, retrying in {}ms: {}",
                    job.id,
                    attempt,
                    delay.as_millis(),
                    error
                );
            }
            Ok(FailOutcome::Failed(failed)) => {
                tracing::error!(
                    "Job {} ({}) failed after {} attempt(s): {}",
                    failed.id,
                    failed.job_type,
                    failed.attempts,
                    error
                );
                if let Some(document_id) = &failed.document_id {
                    self.fail_document(document_id, &error).await;
                }
            }
            Err(e) => tracing::error!("Failed to record failure of job {}: {}", job.id, e),
        }
    }

    async fn fail_document(&self, document_id: &str, error: &Error) {
        let update = StatusUpdate::failed(error.to_string());
        if let Err(e) = self.repository.set_status(document_id, update).await {
            tracing::warn!("Could not mark document {} failed: {}", document_id, e);
        }
    }
}

impl WorkerPoolHandle {
    /// Stop claiming new jobs and wait for in-flight jobs to settle
    pub async fn shutdown(self) {
        tracing::info!("Shutting down worker pool...");
        let _ = self.shutdown.send(true);
        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.await {
                tracing::error!("Worker {} panicked: {}", i, e);
            }
        }
        tracing::info!("All workers have stopped");
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}
