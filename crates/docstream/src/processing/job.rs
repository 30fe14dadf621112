//! Job records held by the queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A unit of asynchronous work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Handler key
    pub job_type: String,
    /// Handler input, opaque to the queue; released once the job is terminal
    pub payload: serde_json::Value,
    pub status: JobStatus,
    /// Claims so far
    pub attempts: u32,
    pub max_attempts: u32,
    /// Base backoff, doubled on every retry
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
    /// Higher runs first
    pub priority: i32,
    /// Document to fail when the job fails for good
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Owner allowed to inspect the job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    pub(crate) fn new(job_type: String, payload: serde_json::Value, options: JobOptions) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_type,
            payload,
            status: JobStatus::Pending,
            attempts: 0,
            max_attempts: options.max_attempts.max(1),
            retry_delay: options.retry_delay,
            priority: options.priority,
            document_id: options.document_id,
            owner_id: options.owner_id,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether another attempt is allowed after the current one
    pub fn has_attempts_left(&self) -> bool {
        self.attempts < self.max_attempts
    }

    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id.as_deref() == Some(owner_id)
    }
}

/// Job record without its payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSummary {
    pub id: Uuid,
    pub job_type: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub priority: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            job_type: job.job_type.clone(),
            status: job.status,
            attempts: job.attempts,
            max_attempts: job.max_attempts,
            priority: job.priority,
            document_id: job.document_id.clone(),
            owner_id: job.owner_id.clone(),
            last_error: job.last_error.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Per-job settings supplied at enqueue time
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub priority: i32,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub document_id: Option<String>,
    pub owner_id: Option<String>,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
            document_id: None,
            owner_id: None,
        }
    }
}

impl JobOptions {
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn for_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn for_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

/// Job counts by status
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.completed + self.failed
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
