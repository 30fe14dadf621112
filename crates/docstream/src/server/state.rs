//! Application state for the ingestion server

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::events::{EventBroadcaster, Heartbeat, Topics};
use crate::ingestion::{IngestService, PlainTextExtractor, TextExtractor};
use crate::processing::{
    HandlerRegistry, IngestHandler, JobQueue, Watchdog, WorkerPool, WorkerPoolHandle,
};
use crate::storage::{DocumentRepository, InMemoryDocumentRepository};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: PipelineConfig,
    /// Document store
    repository: Arc<dyn DocumentRepository>,
    /// Job queue for async processing
    job_queue: Arc<JobQueue>,
    /// Upload validation and submission
    ingest: IngestService,
    /// Subscriber fan-out
    broadcaster: EventBroadcaster,
    /// Ready state
    ready: RwLock<bool>,
    /// Worker pool and periodic tasks
    background: Mutex<Option<BackgroundTasks>>,
}

struct BackgroundTasks {
    workers: WorkerPoolHandle,
    periodic: Vec<JoinHandle<()>>,
}

impl AppState {
    /// Create new application state with the built-in text extractor
    pub async fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_extractor(config, Arc::new(PlainTextExtractor::new())).await
    }

    /// Create new application state and start the background tasks
    pub async fn with_extractor(
        config: PipelineConfig,
        extractor: Arc<dyn TextExtractor>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing ingestion pipeline state...");

        let topics = Arc::new(Topics::new(config.events.subscriber_buffer));
        let repository: Arc<dyn DocumentRepository> = Arc::new(
            InMemoryDocumentRepository::new(config.events.history_limit)
                .with_sink(topics.clone()),
        );
        tracing::info!("Document repository initialized ({})", repository.name());

        let broadcaster = EventBroadcaster::new(topics, repository.clone());
        let job_queue = Arc::new(JobQueue::from_config(&config.queue));

        let handler = Arc::new(IngestHandler::from_config(
            &config,
            repository.clone(),
            extractor,
        )?);
        let registry = HandlerRegistry::new().with(handler.clone());
        let ingest = IngestService::new(
            config.clone(),
            repository.clone(),
            job_queue.clone(),
            handler,
        );

        // Start background workers
        let workers = WorkerPool::new(
            job_queue.clone(),
            Arc::new(registry),
            repository.clone(),
            config.queue.worker_count(),
            config.queue.job_timeout(),
        )
        .start();

        let mut periodic = vec![Heartbeat::new(
            broadcaster.clone(),
            job_queue.clone(),
            config.events.heartbeat_interval(),
        )
        .spawn()];
        if config.watchdog.enabled {
            periodic.push(Watchdog::new(repository.clone(), &config.watchdog).spawn());
            tracing::info!(
                "Watchdog enabled: documents stalled for {}s are failed",
                config.watchdog.stale_after_secs
            );
        }

        let state = Self {
            inner: Arc::new(AppStateInner {
                config,
                repository,
                job_queue,
                ingest,
                broadcaster,
                ready: RwLock::new(true),
                background: Mutex::new(Some(BackgroundTasks { workers, periodic })),
            }),
        };

        tracing::info!("Application state initialized");
        Ok(state)
    }

    /// Get configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    /// Get document repository
    pub fn repository(&self) -> &Arc<dyn DocumentRepository> {
        &self.inner.repository
    }

    /// Get job queue
    pub fn job_queue(&self) -> &Arc<JobQueue> {
        &self.inner.job_queue
    }

    /// Get ingestion service
    pub fn ingest(&self) -> &IngestService {
        &self.inner.ingest
    }

    /// Get event broadcaster
    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.inner.broadcaster
    }

    /// Check if ready
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.read()
    }

    /// Set ready state
    pub fn set_ready(&self, ready: bool) {
        *self.inner.ready.write() = ready;
    }

    /// Stop periodic tasks and drain the worker pool
    pub async fn shutdown(&self) {
        self.set_ready(false);
        let tasks = self.inner.background.lock().take();
        if let Some(tasks) = tasks {
            for task in tasks.periodic {
                task.abort();
            }
            tasks.workers.shutdown().await;
        }
    }
}
