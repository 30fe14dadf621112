//! Configuration for the ingestion pipeline

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::types::MimeClass;

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Upload validation
    pub upload: UploadConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Job queue and worker configuration
    pub queue: QueueConfig,
    /// Event history and streaming configuration
    pub events: EventsConfig,
    /// Stuck-document watchdog
    pub watchdog: WatchdogConfig,
}

impl PipelineConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `DOCSTREAM_CONFIG` if set, otherwise defaults, then apply env overrides
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("DOCSTREAM_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(host) = env_optional("DOCSTREAM_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_optional("DOCSTREAM_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("Invalid DOCSTREAM_PORT: {}", port)))?;
        }
        if let Some(workers) = env_optional("DOCSTREAM_WORKERS") {
            let workers = workers
                .parse()
                .map_err(|_| Error::Config(format!("Invalid DOCSTREAM_WORKERS: {}", workers)))?;
            self.queue.workers = Some(workers);
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.queue.workers == Some(0) {
            return Err(Error::Config("queue.workers must be >= 1".into()));
        }
        if self.queue.max_attempts == 0 {
            return Err(Error::Config("queue.max_attempts must be >= 1".into()));
        }
        if self.queue.job_timeout_secs == 0 {
            return Err(Error::Config("queue.job_timeout_secs must be > 0".into()));
        }
        if self.queue.finished_job_limit == 0 {
            return Err(Error::Config("queue.finished_job_limit must be > 0".into()));
        }
        if self.upload.max_file_size == 0 {
            return Err(Error::Config("upload.max_file_size must be > 0".into()));
        }
        if self.upload.allowed_kinds.is_empty() {
            return Err(Error::Config("upload.allowed_kinds must not be empty".into()));
        }
        if self.events.subscriber_buffer == 0 {
            return Err(Error::Config("events.subscriber_buffer must be > 0".into()));
        }
        if self.events.heartbeat_interval_secs == 0 {
            return Err(Error::Config("events.heartbeat_interval_secs must be > 0".into()));
        }
        if self.events.history_limit == 0 {
            return Err(Error::Config("events.history_limit must be > 0".into()));
        }
        Ok(())
    }
}

fn env_optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
        }
    }
}

/// Upload validation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes (default: 50MB)
    pub max_file_size: usize,
    /// Content kinds accepted for ingestion (default: the text formats)
    pub allowed_kinds: Vec<MimeClass>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            allowed_kinds: MimeClass::TEXTUAL.to_vec(),
        }
    }
}

impl UploadConfig {
    pub fn allows(&self, kind: MimeClass) -> bool {
        self.allowed_kinds.contains(&kind)
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in bytes
    pub chunk_size: usize,
    /// Overlap between chunks in bytes
    pub chunk_overlap: usize,
    /// Length of the text preview stored on completion
    pub preview_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            preview_chars: 200,
        }
    }
}

/// Job queue and worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of workers (default: CPU count, max 4)
    pub workers: Option<usize>,
    /// Attempts per job before it fails for good
    pub max_attempts: u32,
    /// Base retry delay in milliseconds, doubled on every retry
    pub retry_delay_ms: u64,
    /// Upper bound on a single retry delay
    pub max_retry_delay_ms: u64,
    /// Timeout for one handler invocation
    pub job_timeout_secs: u64,
    /// Timeout multiplier for OCR-bound content
    pub ocr_timeout_multiplier: u32,
    /// Completed and failed jobs kept for inspection; older ones are evicted
    pub finished_job_limit: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: None,
            max_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
            job_timeout_secs: 120,
            ocr_timeout_multiplier: 3,
            finished_job_limit: 1000,
        }
    }
}

impl QueueConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| num_cpus::get().min(4)).max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/// Event history and streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Processing events retained per document
    pub history_limit: usize,
    /// Buffered events per subscriber before events are dropped for it
    pub subscriber_buffer: usize,
    /// Seconds between heartbeats
    pub heartbeat_interval_secs: u64,
    /// Events returned by a status query when no limit is given
    pub recent_events_default: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            subscriber_buffer: 256,
            heartbeat_interval_secs: 15,
            recent_events_default: 10,
        }
    }
}

impl EventsConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// Watchdog that force-fails documents stuck early in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub enabled: bool,
    /// Age after which an `uploading`/`parsing` document counts as stalled
    pub stale_after_secs: u64,
    pub scan_interval_secs: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_secs: 1800,
            scan_interval_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.chunking.chunk_overlap, 200);
        assert!(config.queue.worker_count() >= 1);
        assert!(config.upload.allows(MimeClass::Markdown));
        assert!(!config.upload.allows(MimeClass::Pdf));
        assert!(!config.upload.allows(MimeClass::Image));
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let mut config = PipelineConfig::default();
        config.chunking.chunk_overlap = config.chunking.chunk_size;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [queue]
            max_attempts = 5
            workers = 2

            [upload]
            allowed_kinds = ["text", "markdown"]
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.queue.worker_count(), 2);
        assert_eq!(config.queue.retry_delay_ms, 1000);
        assert!(config.upload.allows(MimeClass::Markdown));
        assert!(!config.upload.allows(MimeClass::Pdf));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let mut config = PipelineConfig::default();
        config.queue.workers = Some(0);
        assert!(config.validate().is_err());
    }
}
