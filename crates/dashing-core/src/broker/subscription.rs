//! Per-viewer delivery channel.

use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::event::Event;

/// Broker-assigned identity of a subscription. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub(crate) u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// A viewer's dedicated delivery channel.
///
/// Dropping the subscription unsubscribes it, so the registry entry never
/// outlives the connection that owns it.
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::Receiver<Arc<Event>>,
    unsubscribe: mpsc::UnboundedSender<SubscriptionId>,
}

impl Subscription {
    pub(crate) fn new(
        id: SubscriptionId,
        events: mpsc::Receiver<Arc<Event>>,
        unsubscribe: mpsc::UnboundedSender<SubscriptionId>,
    ) -> Self {
        Self {
            id,
            events,
            unsubscribe,
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the subscription has been removed from the
    /// broker (or the broker stopped) and all buffered events were read.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.events.recv().await
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Result<Arc<Event>, mpsc::error::TryRecvError> {
        self.events.try_recv()
    }
}

impl Stream for Subscription {
    type Item = Arc<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // The dispatcher may already be gone; nothing left to clean up then.
        let _ = self.unsubscribe.send(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
