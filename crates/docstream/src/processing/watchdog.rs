//! Fails documents that stopped making progress before extraction finished

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::config::WatchdogConfig;
use crate::error::Result;
use crate::storage::DocumentRepository;
use crate::types::{DocumentStatus, StatusUpdate};

/// Error recorded on documents failed by the watchdog
pub const STALLED_ERROR: &str = "processing stalled";

const WATCHED: [DocumentStatus; 2] = [DocumentStatus::Uploading, DocumentStatus::Parsing];

pub struct Watchdog {
    repository: Arc<dyn DocumentRepository>,
    stale_after: Duration,
    scan_interval: Duration,
}

impl Watchdog {
    pub fn new(repository: Arc<dyn DocumentRepository>, config: &WatchdogConfig) -> Self {
        Self {
            repository,
            stale_after: Duration::from_secs(config.stale_after_secs),
            scan_interval: Duration::from_secs(config.scan_interval_secs.max(1)),
        }
    }

    /// Fail every stalled document once; returns how many were failed
    pub async fn sweep(&self) -> Result<usize> {
        let age = chrono::Duration::from_std(self.stale_after)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        let cutoff = Utc::now() - age;

        let stale = self.repository.list_stale(&WATCHED, cutoff).await?;
        let mut failed = 0;
        for document in stale {
            match self
                .repository
                .set_status(&document.id, StatusUpdate::failed(STALLED_ERROR))
                .await
            {
                Ok(_) => {
                    tracing::warn!(
                        "Document {} stalled in {} since {}",
                        document.id,
                        document.status,
                        document.updated_at
                    );
                    failed += 1;
                }
                // Moved on between the scan and the write
                Err(e) => tracing::debug!("Skipped stalled document {}: {}", document.id, e),
            }
        }
        Ok(failed)
    }

    /// Sweep on an interval until the task is aborted
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.scan_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep().await {
                    tracing::error!("Watchdog sweep failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryDocumentRepository;
    use crate::types::{MimeClass, NewDocument};

    #[tokio::test]
    async fn test_sweep_fails_only_early_stages() {
        let repo = Arc::new(InMemoryDocumentRepository::default());
        let new = || NewDocument {
            owner_id: "alice".into(),
            name: "a.txt".into(),
            mime_class: MimeClass::Text,
            size_bytes: 1,
        };
        let stuck = repo.create(new()).await.unwrap();
        let moving = repo.create(new()).await.unwrap();
        for (status, progress) in [(DocumentStatus::Parsing, 20), (DocumentStatus::Processing, 40)] {
            repo.set_status(&moving.id, StatusUpdate::stage(status, progress, "step"))
                .await
                .unwrap();
        }

        let watchdog = Watchdog::new(
            repo.clone(),
            &WatchdogConfig {
                enabled: true,
                stale_after_secs: 0,
                scan_interval_secs: 1,
            },
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(watchdog.sweep().await.unwrap(), 1);

        let stuck = repo.get(&stuck.id, "alice").await.unwrap();
        assert_eq!(stuck.status, DocumentStatus::Failed);
        assert_eq!(stuck.error.as_deref(), Some(STALLED_ERROR));
        let moving = repo.get(&moving.id, "alice").await.unwrap();
        assert_eq!(moving.status, DocumentStatus::Processing);

        assert_eq!(watchdog.sweep().await.unwrap(), 0);
    }
}
