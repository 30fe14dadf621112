//! Real-time event fan-out to streaming subscribers

mod broadcaster;
mod heartbeat;
mod subscription;
mod topics;

pub use broadcaster::EventBroadcaster;
pub use heartbeat::Heartbeat;
pub use subscription::Subscription;
pub use topics::{SubscriptionHandle, Topics};

use crate::types::StreamEvent;

/// Publish side of the event pipeline
///
/// Implementations must not block; the repository calls `publish` while it
/// holds a document's lock.
pub trait EventSink: Send + Sync {
    fn publish(&self, owner_id: &str, event: StreamEvent);
}
