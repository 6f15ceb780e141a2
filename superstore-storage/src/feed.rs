//! Cross-context change notifications.
//!
//! A [`ChangeFeed`] fans every published [`ChangeEvent`] out to all
//! subscribers over a `tokio::sync::broadcast` channel. Subscribers poll
//! synchronously with [`Subscription::try_next`]; no async runtime is
//! involved.
//!
//! Filtering of self-originated events happens here, in the notification
//! source: a subscription never yields an event whose origin is the context
//! it was created for.

use superstore_core::{ChangeEvent, ContextId};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// The subscriber fell behind and the channel dropped events it never saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Subscription lagged behind the change feed, {missed} notifications missed")]
pub struct FeedLagged {
    pub missed: u64,
}

/// Broadcast channel of change events.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event to every current subscriber.
    ///
    /// Returns the number of subscribers that will see it.
    pub fn publish(&self, event: ChangeEvent) -> usize {
        // An error only means nobody is listening.
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe on behalf of `context`.
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe(&self, context: ContextId) -> Subscription {
        Subscription {
            context,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// One context's view of a change feed.
///
/// Dropping the subscription unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    context: ContextId,
    receiver: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// Next event from another context, if one is pending.
    ///
    /// After a [`FeedLagged`] error the subscription keeps working from the
    /// oldest event still buffered.
    pub fn try_next(&mut self) -> Result<Option<ChangeEvent>, FeedLagged> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if event.origin == self.context => continue,
                Ok(event) => return Ok(Some(event)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return Ok(None),
                Err(TryRecvError::Lagged(missed)) => return Err(FeedLagged { missed }),
            }
        }
    }
}
