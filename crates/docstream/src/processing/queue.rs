//! In-process job queue with priorities and exponential backoff
//!
//! Jobs are claimed highest priority first, then in enqueue order. A failed
//! job with attempts left goes back to `pending` and becomes eligible again
//! after `retry_delay * 2^(attempts-1)`, capped at the queue's maximum delay.
//!
//! Terminal jobs drop their payload and only the most recent
//! `finished_limit` of them are kept.

use chrono::Utc;
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use uuid::Uuid;

use super::job::{Job, JobOptions, JobStatus, JobSummary, QueueStats};
use crate::config::QueueConfig;
use crate::error::{Error, Result};

/// Ordering key of a pending job
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct PendingKey {
    priority: Reverse<i32>,
    seq: u64,
    id: Uuid,
}

struct QueuedJob {
    job: Job,
    seq: u64,
    /// Not claimable before this instant
    run_at: Instant,
}

impl QueuedJob {
    fn key(&self) -> PendingKey {
        PendingKey {
            priority: Reverse(self.job.priority),
            seq: self.seq,
            id: self.job.id,
        }
    }
}

#[derive(Default)]
struct QueueInner {
    jobs: HashMap<Uuid, QueuedJob>,
    pending: BTreeSet<PendingKey>,
    /// Terminal job ids, oldest first
    finished: VecDeque<Uuid>,
    /// Counts of evicted terminal jobs
    retired: QueueStats,
    next_seq: u64,
}

/// Result of a non-blocking claim attempt
#[derive(Debug)]
pub enum Claim {
    /// The job is now `running`
    Job(Job),
    /// Nothing eligible; the earliest instant a pending job becomes eligible
    Idle(Option<Instant>),
}

/// What `fail` did with a job
#[derive(Debug, Clone)]
pub enum FailOutcome {
    /// Back to `pending`, eligible again after `delay`
    Retrying { attempt: u32, delay: Duration },
    /// Failed for good
    Failed(Job),
}

/// Job queue shared by producers and the worker pool
pub struct JobQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    defaults: JobOptions,
    max_retry_delay: Duration,
    finished_limit: usize,
}

impl JobQueue {
    pub fn new(defaults: JobOptions, max_retry_delay: Duration) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            defaults,
            max_retry_delay,
            finished_limit: 1000,
        }
    }

    /// Keep at most `limit` completed or failed jobs
    pub fn with_finished_limit(mut self, limit: usize) -> Self {
        self.finished_limit = limit.max(1);
        self
    }

    pub fn from_config(config: &QueueConfig) -> Self {
        let defaults = JobOptions::default()
            .with_max_attempts(config.max_attempts)
            .with_retry_delay(config.retry_delay());
        Self::new(defaults, config.max_retry_delay())
            .with_finished_limit(config.finished_job_limit)
    }

    /// Options configured for this queue, to be adjusted per job
    pub fn default_options(&self) -> JobOptions {
        self.defaults.clone()
    }

    /// Add a job; returns immediately
    pub fn enqueue(
        &self,
        job_type: impl Into<String>,
        payload: serde_json::Value,
        options: JobOptions,
    ) -> Uuid {
        let job = Job::new(job_type.into(), payload, options);
        let id = job.id;
        {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;
            let queued = QueuedJob {
                job,
                seq,
                run_at: Instant::now(),
            };
            inner.pending.insert(queued.key());
            inner.jobs.insert(id, queued);
        }
        self.notify.notify_one();
        tracing::debug!("Enqueued job {}", id);
        id
    }

    /// Claim the best eligible pending job, if any
    pub fn try_claim(&self) -> Claim {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let inner = &mut *inner;

        let mut next_eligible: Option<Instant> = None;
        let mut chosen = None;
        for key in inner.pending.iter() {
            let Some(queued) = inner.jobs.get(&key.id) else {
                continue;
            };
            if queued.run_at <= now {
                chosen = Some(*key);
                break;
            }
            next_eligible = Some(next_eligible.map_or(queued.run_at, |t| t.min(queued.run_at)));
        }

        let Some(key) = chosen else {
            return Claim::Idle(next_eligible);
        };
        inner.pending.remove(&key);
        match inner.jobs.get_mut(&key.id) {
            Some(queued) => {
                queued.job.status = JobStatus::Running;
                queued.job.attempts += 1;
                queued.job.updated_at = Utc::now();
                Claim::Job(queued.job.clone())
            }
            None => Claim::Idle(next_eligible),
        }
    }

    /// Wait until a job can be claimed and claim it
    pub async fn claim_next(&self) -> Job {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_claim() {
                Claim::Job(job) => return job,
                Claim::Idle(Some(deadline)) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                Claim::Idle(None) => notified.await,
            }
        }
    }

    /// Mark a running job as completed
    pub fn complete(&self, id: Uuid) -> Result<()> {
        let mut inner = self.inner.lock();
        let queued = inner
            .jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
        if queued.job.status != JobStatus::Running {
            return Err(Error::internal(format!(
                "cannot complete job {} in status {:?}",
                id, queued.job.status
            )));
        }
        queued.job.status = JobStatus::Completed;
        queued.job.updated_at = Utc::now();
        queued.job.payload = serde_json::Value::Null;
        self.retire(&mut inner, id);
        Ok(())
    }

    /// Record a failed attempt; retry or fail the job for good
    pub fn fail(&self, id: Uuid, error: &Error) -> Result<FailOutcome> {
        let outcome = {
            let mut inner = self.inner.lock();
            let queued = inner
                .jobs
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
            if queued.job.status != JobStatus::Running {
                return Err(Error::internal(format!(
                    "cannot fail job {} in status {:?}",
                    id, queued.job.status
                )));
            }

            queued.job.last_error = Some(error.to_string());
            queued.job.updated_at = Utc::now();

            if error.is_retryable() && queued.job.has_attempts_left() {
                let delay = self.backoff(&queued.job);
                queued.job.status = JobStatus::Pending;
                queued.run_at = Instant::now() + delay;
                let key = queued.key();
                let attempt = queued.job.attempts;
                inner.pending.insert(key);
                FailOutcome::Retrying { attempt, delay }
            } else {
                queued.job.status = JobStatus::Failed;
                queued.job.payload = serde_json::Value::Null;
                let failed = queued.job.clone();
                self.retire(&mut inner, id);
                FailOutcome::Failed(failed)
            }
        };

        if let FailOutcome::Retrying { attempt, delay } = &outcome {
            tracing::debug!(
                "Job {} attempt {} failed, retrying in {:?}: {}",
                id,
                attempt,
                delay,
                error
            );
            // Sleeping workers recompute their deadline
            self.notify.notify_one();
        }
        Ok(outcome)
    }

    /// Record a terminal job and evict the oldest beyond the limit
    fn retire(&self, inner: &mut QueueInner, id: Uuid) {
        inner.finished.push_back(id);
        while inner.finished.len() > self.finished_limit {
            let Some(oldest) = inner.finished.pop_front() else {
                break;
            };
            match inner.jobs.remove(&oldest).map(|q| q.job.status) {
                Some(JobStatus::Completed) => inner.retired.completed += 1,
                Some(JobStatus::Failed) => inner.retired.failed += 1,
                _ => {}
            }
        }
    }

    /// Delay before the next attempt of `job`
    fn backoff(&self, job: &Job) -> Duration {
        let exponent = job.attempts.saturating_sub(1).min(31);
        job.retry_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_retry_delay)
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.inner.lock().jobs.get(&id).map(|q| q.job.clone())
    }

    /// Retained jobs, oldest first
    pub fn list(&self) -> Vec<JobSummary> {
        self.summaries(|_| true)
    }

    /// Retained jobs of one owner, oldest first
    pub fn list_by_owner(&self, owner_id: &str) -> Vec<JobSummary> {
        self.summaries(|job| job.is_owned_by(owner_id))
    }

    fn summaries(&self, keep: impl Fn(&Job) -> bool) -> Vec<JobSummary> {
        let inner = self.inner.lock();
        let mut jobs: Vec<(u64, JobSummary)> = inner
            .jobs
            .values()
            .filter(|q| keep(&q.job))
            .map(|q| (q.seq, JobSummary::from(&q.job)))
            .collect();
        jobs.sort_by_key(|(seq, _)| *seq);
        jobs.into_iter().map(|(_, job)| job).collect()
    }

    /// Counts by status, including evicted jobs
    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock();
        let mut stats = inner.retired;
        for queued in inner.jobs.values() {
            match queued.job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Jobs waiting to run
    pub fn depth(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
