pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::ConnectResult;
use crate::models::{ActiveConnection, ConnectionRequest, Message, NewConnectionRequest};

/// Kind of row-level change carried by a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// A row-level change on one of the watched relations.
///
/// Payloads are advisory: except for message inserts, consumers re-query the
/// store before committing a state transition instead of trusting the event
/// contents. The serde shape matches the JSON emitted by the Postgres notify
/// triggers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "relation")]
pub enum ChangeEvent {
    #[serde(rename = "connection_requests")]
    Request { op: ChangeOp, user_id: Uuid },
    #[serde(rename = "active_connections")]
    Connection {
        op: ChangeOp,
        connection_id: Uuid,
        user1_id: Uuid,
        user2_id: Uuid,
    },
    #[serde(rename = "messages")]
    Message { op: ChangeOp, message: Message },
}

impl ChangeEvent {
    /// Whether this change can affect the given user's session state.
    pub fn concerns_user(&self, user_id: Uuid) -> bool {
        match self {
            ChangeEvent::Request { user_id: uid, .. } => *uid == user_id,
            ChangeEvent::Connection {
                user1_id, user2_id, ..
            } => *user1_id == user_id || *user2_id == user_id,
            ChangeEvent::Message { message, .. } => message.sender_id == user_id,
        }
    }
}

/// Data-store client consumed by the Request Registry, Session Controller,
/// Message Log and matchmaker. Implemented by `PgStore` in production and
/// `MemoryStore` in tests; components receive it by injection rather than
/// reaching for a global.
#[allow(async_fn_in_trait)]
pub trait ConnectStore: Send + Sync {
    /// Open a receiver on the change feed. Every subscriber sees all events;
    /// filtering by relation/id happens at the consumer.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    /// Persist a new "searching" request. Fails with `Conflict` when the
    /// user already has a request or an active connection.
    async fn create_request(&self, new: NewConnectionRequest) -> ConnectResult<ConnectionRequest>;

    /// Delete a request by id. Returns whether a row was removed; a missing
    /// row is not an error.
    async fn delete_request(&self, request_id: Uuid) -> ConnectResult<bool>;

    async fn find_request_for_user(&self, user_id: Uuid)
    -> ConnectResult<Option<ConnectionRequest>>;

    async fn find_connection_for_user(
        &self,
        user_id: Uuid,
    ) -> ConnectResult<Option<ActiveConnection>>;

    /// Pair two searching users: inserts the active connection and flips both
    /// requests to "connected" in one transaction. Fails with `Conflict` if
    /// either request is no longer searching or either user is already
    /// paired, so concurrent matchers race safely.
    async fn create_connection(
        &self,
        user1_id: Uuid,
        user2_id: Uuid,
    ) -> ConnectResult<ActiveConnection>;

    /// Tear down a pairing: deletes the connection row and both
    /// participants' request rows. Returns whether the connection still
    /// existed; a missing row is not an error.
    async fn end_connection(&self, connection_id: Uuid) -> ConnectResult<bool>;

    /// Append a chat message. Fails with `NotFound` when the connection is
    /// gone and `Forbidden` when the sender is not a participant.
    async fn insert_message(
        &self,
        connection_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> ConnectResult<Message>;

    /// Messages for one connection, ascending by (created_at, id), up to
    /// `limit`, optionally restricted to ids strictly below `before`.
    async fn list_messages(
        &self,
        connection_id: Uuid,
        before: Option<i64>,
        limit: i64,
    ) -> ConnectResult<Vec<Message>>;

    /// All requests currently in "searching" status, oldest first.
    async fn list_searching_requests(&self) -> ConnectResult<Vec<ConnectionRequest>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_event_decodes_trigger_payload() {
        let user_id = Uuid::new_v4();
        let payload = format!(
            r#"{{"relation":"connection_requests","op":"delete","user_id":"{}"}}"#,
            user_id
        );
        let event: ChangeEvent = serde_json::from_str(&payload).unwrap();
        assert!(matches!(
            event,
            ChangeEvent::Request { op: ChangeOp::Delete, user_id: uid } if uid == user_id
        ));
    }

    #[test]
    fn test_change_event_decodes_message_payload() {
        let payload = r#"{
            "relation": "messages",
            "op": "insert",
            "message": {
                "id": 7,
                "connection_id": "6ecd8c99-4036-403d-bf84-cf8400f67836",
                "sender_id": "3f333df6-90a4-4fda-8dd3-9485d27cee36",
                "content": "hi",
                "created_at": "2026-08-06T12:34:56.789012+00:00"
            }
        }"#;
        let event: ChangeEvent = serde_json::from_str(payload).unwrap();
        match event {
            ChangeEvent::Message { op, message } => {
                assert_eq!(op, ChangeOp::Insert);
                assert_eq!(message.id, 7);
                assert_eq!(message.content, "hi");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_concerns_user_matches_either_connection_side() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let event = ChangeEvent::Connection {
            op: ChangeOp::Insert,
            connection_id: Uuid::new_v4(),
            user1_id: a,
            user2_id: b,
        };
        assert!(event.concerns_user(a));
        assert!(event.concerns_user(b));
        assert!(!event.concerns_user(Uuid::new_v4()));
    }
}
