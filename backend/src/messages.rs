use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::MESSAGES_PER_PAGE;
use crate::error::{ConnectError, ConnectResult};
use crate::models::Message;
use crate::store::{ChangeEvent, ChangeOp, ConnectStore};

/// Paginated, append-only view of one connection's chat history.
pub struct MessageLog<S> {
    store: S,
}

impl<S: ConnectStore> MessageLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Up to one page of messages, ascending by creation time then id.
    ///
    /// With `before` set, only messages with a strictly smaller id are
    /// returned, so callers page backwards by passing the id of the oldest
    /// message they have loaded. Each call is independent; an empty result
    /// means nothing older remains.
    pub async fn fetch_page(
        &self,
        connection_id: Uuid,
        before: Option<i64>,
    ) -> ConnectResult<Vec<Message>> {
        self.store
            .list_messages(connection_id, before, MESSAGES_PER_PAGE)
            .await
    }

    /// Append one message. Content is trimmed and must be non-empty; the
    /// store enforces that the sender is a participant. The persisted row is
    /// returned and will also arrive on the live subscription.
    pub async fn append(
        &self,
        connection_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> ConnectResult<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ConnectError::validation("message content must not be empty"));
        }
        self.store
            .insert_message(connection_id, sender_id, content)
            .await
    }

    /// Live subscription to new messages for one connection, in feed order.
    /// Delivery is at-most-once: events dropped by a lagging receiver are
    /// not replayed and no deduplication is attempted.
    pub fn subscribe(&self, connection_id: Uuid) -> MessageSubscription {
        MessageSubscription {
            feed: self.store.subscribe(),
            connection_id,
        }
    }
}

/// Receiver half of a message subscription; yields only inserts scoped to
/// the subscribed connection.
pub struct MessageSubscription {
    feed: broadcast::Receiver<ChangeEvent>,
    connection_id: Uuid,
}

impl MessageSubscription {
    /// Next new message, or None once the feed shuts down.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.feed.recv().await {
                Ok(ChangeEvent::Message {
                    op: ChangeOp::Insert,
                    message,
                }) if message.connection_id == self.connection_id => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("message subscription lagged by {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
