//! Per-owner subscriber routing

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use super::EventSink;
use crate::types::StreamEvent;

/// Identifies one registered subscriber
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub owner_id: String,
    pub id: u64,
}

/// Bounded per-subscriber channels grouped by owner
///
/// Publishing never blocks. A subscriber whose buffer is full is
/// disconnected: it drains what was buffered, then its stream ends and the
/// client resubscribes for a fresh snapshot. A subscriber whose receiver is
/// gone is removed.
pub struct Topics {
    subscribers: DashMap<String, HashMap<u64, mpsc::Sender<StreamEvent>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl Topics {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Add a subscriber to `owner_id`'s topic
    pub fn register(&self, owner_id: &str) -> (SubscriptionHandle, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(owner_id.to_string())
            .or_default()
            .insert(id, tx);
        tracing::debug!("Subscriber {} joined topic {}", id, owner_id);
        (
            SubscriptionHandle {
                owner_id: owner_id.to_string(),
                id,
            },
            rx,
        )
    }

    /// Remove a subscriber; returns false if it was already gone
    pub fn remove(&self, handle: &SubscriptionHandle) -> bool {
        let removed = match self.subscribers.get_mut(&handle.owner_id) {
            Some(mut topic) => topic.remove(&handle.id).is_some(),
            None => false,
        };
        self.subscribers
            .remove_if(&handle.owner_id, |_, topic| topic.is_empty());
        if removed {
            tracing::debug!("Subscriber {} left topic {}", handle.id, handle.owner_id);
        }
        removed
    }

    /// Subscribers currently registered for `owner_id`
    pub fn subscriber_count(&self, owner_id: &str) -> usize {
        self.subscribers.get(owner_id).map_or(0, |topic| topic.len())
    }

    /// Subscribers across all topics
    pub fn total_subscribers(&self) -> usize {
        self.subscribers.iter().map(|topic| topic.len()).sum()
    }

    /// Owners with at least one subscriber
    pub fn topics(&self) -> Vec<String> {
        self.subscribers
            .iter()
            .filter(|topic| !topic.is_empty())
            .map(|topic| topic.key().clone())
            .collect()
    }
}

impl Default for Topics {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for Topics {
    fn publish(&self, owner_id: &str, event: StreamEvent) {
        let Some(mut topic) = self.subscribers.get_mut(owner_id) else {
            return;
        };

        topic.retain(|id, tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                tracing::warn!(
                    "Subscriber {} on topic {} is lagging at {} event, disconnecting",
                    id,
                    owner_id,
                    dropped.kind()
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });

        let empty = topic.is_empty();
        drop(topic);
        if empty {
            self.subscribers.remove_if(owner_id, |_, topic| topic.is_empty());
        }
    }
}
