use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::CHANGE_BUS_CAPACITY;
use crate::error::{ConnectError, ConnectResult};
use crate::models::{
    ActiveConnection, ConnectionRequest, Message, NewConnectionRequest, RequestStatus,
};
use crate::store::{ChangeEvent, ChangeOp, ConnectStore};

#[derive(Default)]
struct Tables {
    requests: Vec<ConnectionRequest>,
    connections: Vec<ActiveConnection>,
    messages: Vec<Message>,
    next_message_id: i64,
}

/// In-process store with the same contract and change feed as `PgStore`.
///
/// Backs the unit tests and doubles as a single-process store for local
/// experiments. `set_failing` makes every operation return a retryable store
/// error, for exercising the paths where a transition must not commit.
#[derive(Clone)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    bus: broadcast::Sender<ChangeEvent>,
    failing: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (bus, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self {
            tables: Arc::new(Mutex::new(Tables {
                next_message_id: 1,
                ..Tables::default()
            })),
            bus,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// When set, every store operation fails with a retryable error until
    /// cleared.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Inject a raw event into the change feed, bypassing the tables. Lets
    /// tests simulate late or spurious notifications from the channel.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.bus.send(event);
    }

    fn check_available(&self) -> ConnectResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(ConnectError::Store(anyhow::anyhow!(
                "memory store unavailable (injected failure)"
            )))
        } else {
            Ok(())
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
        // A poisoned lock only happens after a test panic; the tables are
        // still usable.
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ConnectStore for MemoryStore {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    async fn create_request(&self, new: NewConnectionRequest) -> ConnectResult<ConnectionRequest> {
        self.check_available()?;
        let request = {
            let mut tables = self.lock();
            if tables.connections.iter().any(|c| c.involves(new.user_id)) {
                return Err(ConnectError::Conflict("user already has an active connection"));
            }
            if tables.requests.iter().any(|r| r.user_id == new.user_id) {
                return Err(ConnectError::Conflict("an active request already exists"));
            }
            let now = Utc::now();
            let request = ConnectionRequest {
                id: Uuid::new_v4(),
                user_id: new.user_id,
                nickname: new.nickname,
                location: new.location,
                interests: new.interests,
                status: RequestStatus::Searching,
                created_at: now,
                updated_at: now,
            };
            tables.requests.push(request.clone());
            request
        };
        self.publish(ChangeEvent::Request {
            op: ChangeOp::Insert,
            user_id: request.user_id,
        });
        Ok(request)
    }

    async fn delete_request(&self, request_id: Uuid) -> ConnectResult<bool> {
        self.check_available()?;
        let removed = {
            let mut tables = self.lock();
            let mut removed_user = None;
            tables.requests.retain(|r| {
                if r.id == request_id {
                    removed_user = Some(r.user_id);
                    false
                } else {
                    true
                }
            });
            removed_user
        };
        if let Some(user_id) = removed {
            self.publish(ChangeEvent::Request {
                op: ChangeOp::Delete,
                user_id,
            });
        }
        Ok(removed.is_some())
    }

    async fn find_request_for_user(
        &self,
        user_id: Uuid,
    ) -> ConnectResult<Option<ConnectionRequest>> {
        self.check_available()?;
        Ok(self
            .lock()
            .requests
            .iter()
            .find(|r| r.user_id == user_id)
            .cloned())
    }

    async fn find_connection_for_user(
        &self,
        user_id: Uuid,
    ) -> ConnectResult<Option<ActiveConnection>> {
        self.check_available()?;
        Ok(self
            .lock()
            .connections
            .iter()
            .find(|c| c.involves(user_id))
            .cloned())
    }

    async fn create_connection(
        &self,
        user1_id: Uuid,
        user2_id: Uuid,
    ) -> ConnectResult<ActiveConnection> {
        self.check_available()?;
        if user1_id == user2_id {
            return Err(ConnectError::Conflict("cannot pair a user with themselves"));
        }
        let connection = {
            let mut tables = self.lock();
            let both_searching = [user1_id, user2_id].iter().all(|uid| {
                tables
                    .requests
                    .iter()
                    .any(|r| r.user_id == *uid && r.status == RequestStatus::Searching)
            });
            if !both_searching {
                return Err(ConnectError::Conflict("request is no longer searching"));
            }
            if tables
                .connections
                .iter()
                .any(|c| c.involves(user1_id) || c.involves(user2_id))
            {
                return Err(ConnectError::Conflict("user is already in a connection"));
            }
            let now = Utc::now();
            let connection = ActiveConnection {
                id: Uuid::new_v4(),
                user1_id,
                user2_id,
                created_at: now,
                updated_at: now,
            };
            tables.connections.push(connection.clone());
            for request in tables
                .requests
                .iter_mut()
                .filter(|r| r.user_id == user1_id || r.user_id == user2_id)
            {
                request.status = RequestStatus::Connected;
                request.updated_at = now;
            }
            connection
        };
        self.publish(ChangeEvent::Connection {
            op: ChangeOp::Insert,
            connection_id: connection.id,
            user1_id,
            user2_id,
        });
        self.publish(ChangeEvent::Request {
            op: ChangeOp::Update,
            user_id: user1_id,
        });
        self.publish(ChangeEvent::Request {
            op: ChangeOp::Update,
            user_id: user2_id,
        });
        Ok(connection)
    }

    async fn end_connection(&self, connection_id: Uuid) -> ConnectResult<bool> {
        self.check_available()?;
        let ended = {
            let mut tables = self.lock();
            let Some(pos) = tables.connections.iter().position(|c| c.id == connection_id) else {
                return Ok(false);
            };
            let connection = tables.connections.remove(pos);
            tables
                .requests
                .retain(|r| r.user_id != connection.user1_id && r.user_id != connection.user2_id);
            connection
        };
        self.publish(ChangeEvent::Connection {
            op: ChangeOp::Delete,
            connection_id: ended.id,
            user1_id: ended.user1_id,
            user2_id: ended.user2_id,
        });
        self.publish(ChangeEvent::Request {
            op: ChangeOp::Delete,
            user_id: ended.user1_id,
        });
        self.publish(ChangeEvent::Request {
            op: ChangeOp::Delete,
            user_id: ended.user2_id,
        });
        Ok(true)
    }

    async fn insert_message(
        &self,
        connection_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> ConnectResult<Message> {
        self.check_available()?;
        let message = {
            let mut tables = self.lock();
            let connection = tables
                .connections
                .iter()
                .find(|c| c.id == connection_id)
                .ok_or(ConnectError::NotFound("connection"))?;
            if !connection.involves(sender_id) {
                return Err(ConnectError::Forbidden(
                    "sender is not a participant of this connection",
                ));
            }
            let message = Message {
                id: tables.next_message_id,
                connection_id,
                sender_id,
                content: content.to_string(),
                created_at: Utc::now(),
            };
            tables.next_message_id += 1;
            tables.messages.push(message.clone());
            message
        };
        self.publish(ChangeEvent::Message {
            op: ChangeOp::Insert,
            message: message.clone(),
        });
        Ok(message)
    }

    async fn list_messages(
        &self,
        connection_id: Uuid,
        before: Option<i64>,
        limit: i64,
    ) -> ConnectResult<Vec<Message>> {
        self.check_available()?;
        let tables = self.lock();
        let mut messages: Vec<Message> = tables
            .messages
            .iter()
            .filter(|m| m.connection_id == connection_id)
            .filter(|m| before.is_none_or(|b| m.id < b))
            .cloned()
            .collect();
        messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        messages.truncate(limit.max(0) as usize);
        Ok(messages)
    }

    async fn list_searching_requests(&self) -> ConnectResult<Vec<ConnectionRequest>> {
        self.check_available()?;
        let tables = self.lock();
        let mut requests: Vec<ConnectionRequest> = tables
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Searching)
            .cloned()
            .collect();
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }
}
