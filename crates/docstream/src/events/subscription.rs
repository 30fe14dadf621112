//! Live event subscription

use futures_util::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::topics::{SubscriptionHandle, Topics};
use crate::types::StreamEvent;

/// A subscriber's view of its owner topic: the snapshot, then live events.
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    handle: SubscriptionHandle,
    snapshot: Option<StreamEvent>,
    receiver: mpsc::Receiver<StreamEvent>,
    topics: Arc<Topics>,
}

impl Subscription {
    pub(crate) fn new(
        handle: SubscriptionHandle,
        receiver: mpsc::Receiver<StreamEvent>,
        topics: Arc<Topics>,
    ) -> Self {
        Self {
            handle,
            snapshot: None,
            receiver,
            topics,
        }
    }

    pub(crate) fn set_snapshot(&mut self, snapshot: StreamEvent) {
        self.snapshot = Some(snapshot);
    }

    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Next event, or `None` once unsubscribed
    pub async fn recv(&mut self) -> Option<StreamEvent> {
        if let Some(snapshot) = self.snapshot.take() {
            return Some(snapshot);
        }
        self.receiver.recv().await
    }

    /// Next event if one is ready
    pub fn try_recv(&mut self) -> Option<StreamEvent> {
        if let Some(snapshot) = self.snapshot.take() {
            return Some(snapshot);
        }
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(snapshot) = this.snapshot.take() {
            return Poll::Ready(Some(snapshot));
        }
        this.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.topics.remove(&self.handle);
    }
}
