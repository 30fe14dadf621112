//! Fan-out of document events to per-owner subscribers

use std::sync::Arc;

use super::subscription::Subscription;
use super::topics::{SubscriptionHandle, Topics};
use super::EventSink;
use crate::error::Result;
use crate::storage::DocumentRepository;
use crate::types::StreamEvent;

/// Subscribe side of the event pipeline
///
/// The repository publishes into the same [`Topics`] this broadcaster reads
/// from, so every status write reaches subscribers without a second hop.
#[derive(Clone)]
pub struct EventBroadcaster {
    topics: Arc<Topics>,
    repository: Arc<dyn DocumentRepository>,
}

impl EventBroadcaster {
    pub fn new(topics: Arc<Topics>, repository: Arc<dyn DocumentRepository>) -> Self {
        Self { topics, repository }
    }

    /// Subscribe to `owner_id`'s events.
    ///
    /// The subscriber is registered before the snapshot is read, so an event
    /// racing with the snapshot can show up twice but never goes missing.
    pub async fn subscribe(&self, owner_id: &str) -> Result<Subscription> {
        let (handle, receiver) = self.topics.register(owner_id);
        let mut subscription = Subscription::new(handle, receiver, self.topics.clone());

        let documents = self.repository.list_by_owner(owner_id).await?;
        tracing::info!(
            "New subscriber on {} ({} documents in snapshot)",
            owner_id,
            documents.len()
        );
        subscription.set_snapshot(StreamEvent::Snapshot { documents });
        Ok(subscription)
    }

    /// Remove a subscriber; calling it twice is harmless
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.topics.remove(handle)
    }

    pub fn publish(&self, owner_id: &str, event: StreamEvent) {
        self.topics.publish(owner_id, event);
    }

    pub fn topics(&self) -> &Arc<Topics> {
        &self.topics
    }

    pub fn repository(&self) -> &Arc<dyn DocumentRepository> {
        &self.repository
    }
}
