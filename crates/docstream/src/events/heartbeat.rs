//! Periodic heartbeat on every active topic

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::broadcaster::EventBroadcaster;
use crate::processing::JobQueue;
use crate::types::{HeartbeatStats, StreamEvent};

pub struct Heartbeat {
    broadcaster: EventBroadcaster,
    queue: Arc<JobQueue>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(broadcaster: EventBroadcaster, queue: Arc<JobQueue>, interval: Duration) -> Self {
        Self {
            broadcaster,
            queue,
            interval,
        }
    }

    /// Publish one heartbeat per active topic; returns the number of topics
    pub async fn beat(&self) -> usize {
        let topics = self.broadcaster.topics().topics();
        let queue_depth = self.queue.depth();

        for owner_id in &topics {
            let total_documents = match self.broadcaster.repository().count_by_owner(owner_id).await {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!("Heartbeat could not count documents for {}: {}", owner_id, e);
                    continue;
                }
            };
            let stats = HeartbeatStats {
                total_documents,
                queue_depth,
                active_subscribers: self.broadcaster.topics().subscriber_count(owner_id),
            };
            self.broadcaster.publish(
                owner_id,
                StreamEvent::Heartbeat {
                    timestamp: Utc::now(),
                    stats,
                },
            );
        }
        topics.len()
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let topics = self.beat().await;
                tracing::trace!("Heartbeat sent to {} topics", topics);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Topics;
    use crate::storage::{DocumentRepository, InMemoryDocumentRepository};
    use crate::types::{MimeClass, NewDocument};

    #[tokio::test]
    async fn test_beat_reports_per_owner_stats() {
        let topics = Arc::new(Topics::new(16));
        let repo = Arc::new(InMemoryDocumentRepository::default().with_sink(topics.clone()));
        let broadcaster = EventBroadcaster::new(topics, repo.clone());
        let queue = Arc::new(JobQueue::default());
        queue.enqueue("noop", serde_json::Value::Null, queue.default_options());

        for _ in 0..2 {
            repo.create(NewDocument {
                owner_id: "alice".into(),
                name: "a.txt".into(),
                mime_class: MimeClass::Text,
                size_bytes: 1,
            })
            .await
            .unwrap();
        }

        let mut first = broadcaster.subscribe("alice").await.unwrap();
        let _second = broadcaster.subscribe("alice").await.unwrap();
        first.recv().await;

        let heartbeat = Heartbeat::new(broadcaster, queue, Duration::from_secs(15));
        assert_eq!(heartbeat.beat().await, 1);

        match first.recv().await {
            Some(StreamEvent::Heartbeat { stats, .. }) => {
                assert_eq!(
                    stats,
                    HeartbeatStats {
                        total_documents: 2,
                        queue_depth: 1,
                        active_subscribers: 2,
                    }
                );
            }
            other => panic!("expected heartbeat, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_heartbeat_ticks() {
        let topics = Arc::new(Topics::new(16));
        let repo = Arc::new(InMemoryDocumentRepository::default().with_sink(topics.clone()));
        let broadcaster = EventBroadcaster::new(topics, repo);
        let mut sub = broadcaster.subscribe("alice").await.unwrap();
        sub.recv().await;

        let task = Heartbeat::new(broadcaster, Arc::new(JobQueue::default()), Duration::from_secs(5)).spawn();
        let event = sub.recv().await;
        assert!(matches!(event, Some(StreamEvent::Heartbeat { .. })));
        task.abort();
    }
}
