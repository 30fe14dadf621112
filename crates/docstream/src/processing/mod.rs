//! Background processing with a retrying job queue

mod handler;
mod ingest;
mod job;
mod queue;
mod watchdog;
mod worker;

pub use handler::{HandlerRegistry, JobHandler};
pub use ingest::{IngestHandler, IngestPayload, INGEST_JOB_TYPE};
pub use job::{Job, JobOptions, JobStatus, JobSummary, QueueStats};
pub use queue::{Claim, FailOutcome, JobQueue};
pub use watchdog::{Watchdog, STALLED_ERROR};
pub use worker::{WorkerPool, WorkerPoolHandle};
