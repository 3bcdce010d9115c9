use sqlx::PgPool;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::constants::{CHANGE_BUS_CAPACITY, CHANGE_CHANNEL};
use crate::error::{ConnectError, ConnectResult};
use crate::models::{ActiveConnection, ConnectionRequest, Message, NewConnectionRequest};
use crate::store::{ChangeEvent, ConnectStore};

const SQL_INSERT_REQUEST: &str = r#"
INSERT INTO connection_requests (user_id, nickname, location, interests, status)
VALUES ($1, $2, $3, $4, 'searching')
ON CONFLICT (user_id) DO NOTHING
RETURNING id, user_id, nickname, location, interests, status, created_at, updated_at
"#;

const SQL_DELETE_REQUEST: &str = r#"
DELETE FROM connection_requests WHERE id = $1
"#;

const SQL_FIND_REQUEST_FOR_USER: &str = r#"
SELECT id, user_id, nickname, location, interests, status, created_at, updated_at
FROM connection_requests
WHERE user_id = $1
"#;

const SQL_LIST_SEARCHING_REQUESTS: &str = r#"
SELECT id, user_id, nickname, location, interests, status, created_at, updated_at
FROM connection_requests
WHERE status = 'searching'
ORDER BY created_at ASC
"#;

const SQL_LOCK_SEARCHING_PAIR: &str = r#"
SELECT id, user_id, nickname, location, interests, status, created_at, updated_at
FROM connection_requests
WHERE user_id = ANY($1) AND status = 'searching'
FOR UPDATE
"#;

const SQL_ANY_CONNECTION_FOR_USERS: &str = r#"
SELECT EXISTS(
    SELECT 1 FROM active_connections
    WHERE user1_id = ANY($1) OR user2_id = ANY($1)
)
"#;

const SQL_FIND_CONNECTION_FOR_USER: &str = r#"
SELECT id, user1_id, user2_id, created_at, updated_at
FROM active_connections
WHERE user1_id = $1 OR user2_id = $1
LIMIT 1
"#;

const SQL_INSERT_CONNECTION: &str = r#"
INSERT INTO active_connections (user1_id, user2_id)
VALUES ($1, $2)
RETURNING id, user1_id, user2_id, created_at, updated_at
"#;

const SQL_MARK_REQUESTS_CONNECTED: &str = r#"
UPDATE connection_requests
SET status = 'connected', updated_at = NOW()
WHERE user_id = ANY($1)
"#;

const SQL_DELETE_CONNECTION: &str = r#"
DELETE FROM active_connections WHERE id = $1
RETURNING user1_id, user2_id
"#;

const SQL_DELETE_REQUESTS_FOR_USERS: &str = r#"
DELETE FROM connection_requests WHERE user_id = ANY($1)
"#;

const SQL_FIND_CONNECTION_BY_ID: &str = r#"
SELECT id, user1_id, user2_id, created_at, updated_at
FROM active_connections
WHERE id = $1
"#;

const SQL_INSERT_MESSAGE: &str = r#"
INSERT INTO messages (connection_id, sender_id, content)
VALUES ($1, $2, $3)
RETURNING id, connection_id, sender_id, content, created_at
"#;

const SQL_LIST_MESSAGES: &str = r#"
SELECT id, connection_id, sender_id, content, created_at
FROM messages
WHERE connection_id = $1 AND ($2::BIGINT IS NULL OR id < $2)
ORDER BY created_at ASC, id ASC
LIMIT $3
"#;

/// Production store backed by Postgres.
///
/// Mutations go through the pool; the change feed is fed by the notify
/// triggers installed by the migrations, pumped from LISTEN into an
/// in-process broadcast bus so every subscriber in this process sees the
/// same stream, including changes made by other processes (the matchmaker
/// worker in particular).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    bus: broadcast::Sender<ChangeEvent>,
}

impl PgStore {
    /// Wrap a pool and start the LISTEN pump in the background.
    pub fn new(pool: PgPool) -> Self {
        let (bus, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        tokio::spawn(run_change_pump(pool.clone(), bus.clone()));
        Self { pool, bus }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Relay `pg_notify` payloads onto the broadcast bus, reconnecting with a
/// short delay whenever the listener connection drops.
async fn run_change_pump(pool: PgPool, bus: broadcast::Sender<ChangeEvent>) {
    loop {
        match PgListener::connect_with(&pool).await {
            Ok(mut listener) => match listener.listen(CHANGE_CHANNEL).await {
                Ok(()) => {
                    tracing::debug!("listening on {}", CHANGE_CHANNEL);
                    loop {
                        match listener.recv().await {
                            Ok(notification) => {
                                match serde_json::from_str::<ChangeEvent>(notification.payload()) {
                                    Ok(event) => {
                                        // Send only fails with no subscribers, which is fine.
                                        let _ = bus.send(event);
                                    }
                                    Err(e) => {
                                        tracing::warn!(
                                            "undecodable change payload {:?}: {}",
                                            notification.payload(),
                                            e
                                        );
                                    }
                                }
                            }
                            Err(e) => {
                                tracing::warn!("change listener dropped: {}", e);
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("failed to LISTEN on {}: {}", CHANGE_CHANNEL, e);
                }
            },
            Err(e) => {
                tracing::warn!("failed to open listener connection: {}", e);
            }
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

impl ConnectStore for PgStore {
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.bus.subscribe()
    }

    async fn create_request(&self, new: NewConnectionRequest) -> ConnectResult<ConnectionRequest> {
        let mut tx = self.pool.begin().await?;

        let users = vec![new.user_id];
        let already_connected: bool = sqlx::query_scalar(SQL_ANY_CONNECTION_FOR_USERS)
            .bind(&users)
            .fetch_one(&mut *tx)
            .await?;
        if already_connected {
            return Err(ConnectError::Conflict("user already has an active connection"));
        }

        let inserted = sqlx::query_as::<_, ConnectionRequest>(SQL_INSERT_REQUEST)
            .bind(new.user_id)
            .bind(&new.nickname)
            .bind(&new.location)
            .bind(&new.interests)
            .fetch_optional(&mut *tx)
            .await?;

        match inserted {
            Some(request) => {
                tx.commit().await?;
                Ok(request)
            }
            // ON CONFLICT DO NOTHING returned no row: the unique index on
            // user_id means a request already exists.
            None => Err(ConnectError::Conflict("an active request already exists")),
        }
    }

    async fn delete_request(&self, request_id: Uuid) -> ConnectResult<bool> {
        let result = sqlx::query(SQL_DELETE_REQUEST)
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_request_for_user(
        &self,
        user_id: Uuid,
    ) -> ConnectResult<Option<ConnectionRequest>> {
        let request = sqlx::query_as::<_, ConnectionRequest>(SQL_FIND_REQUEST_FOR_USER)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(request)
    }

    async fn find_connection_for_user(
        &self,
        user_id: Uuid,
    ) -> ConnectResult<Option<ActiveConnection>> {
        let connection = sqlx::query_as::<_, ActiveConnection>(SQL_FIND_CONNECTION_FOR_USER)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(connection)
    }

    async fn create_connection(
        &self,
        user1_id: Uuid,
        user2_id: Uuid,
    ) -> ConnectResult<ActiveConnection> {
        if user1_id == user2_id {
            return Err(ConnectError::Conflict("cannot pair a user with themselves"));
        }

        let mut tx = self.pool.begin().await?;
        let users = vec![user1_id, user2_id];

        // Lock both request rows so concurrent matchers serialize here.
        let searching = sqlx::query_as::<_, ConnectionRequest>(SQL_LOCK_SEARCHING_PAIR)
            .bind(&users)
            .fetch_all(&mut *tx)
            .await?;
        if searching.len() != 2 {
            return Err(ConnectError::Conflict("request is no longer searching"));
        }

        let already_connected: bool = sqlx::query_scalar(SQL_ANY_CONNECTION_FOR_USERS)
            .bind(&users)
            .fetch_one(&mut *tx)
            .await?;
        if already_connected {
            return Err(ConnectError::Conflict("user is already in a connection"));
        }

        let connection = sqlx::query_as::<_, ActiveConnection>(SQL_INSERT_CONNECTION)
            .bind(user1_id)
            .bind(user2_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(SQL_MARK_REQUESTS_CONNECTED)
            .bind(&users)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(connection)
    }

    async fn end_connection(&self, connection_id: Uuid) -> ConnectResult<bool> {
        let mut tx = self.pool.begin().await?;

        let participants = sqlx::query_as::<_, (Uuid, Uuid)>(SQL_DELETE_CONNECTION)
            .bind(connection_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some((user1_id, user2_id)) = participants else {
            // Already gone, the other participant got there first.
            return Ok(false);
        };

        sqlx::query(SQL_DELETE_REQUESTS_FOR_USERS)
            .bind(vec![user1_id, user2_id])
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn insert_message(
        &self,
        connection_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> ConnectResult<Message> {
        let connection = sqlx::query_as::<_, ActiveConnection>(SQL_FIND_CONNECTION_BY_ID)
            .bind(connection_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(ConnectError::NotFound("connection"))?;

        if !connection.involves(sender_id) {
            return Err(ConnectError::Forbidden(
                "sender is not a participant of this connection",
            ));
        }

        let message = sqlx::query_as::<_, Message>(SQL_INSERT_MESSAGE)
            .bind(connection_id)
            .bind(sender_id)
            .bind(content)
            .fetch_one(&self.pool)
            .await?;
        Ok(message)
    }

    async fn list_messages(
        &self,
        connection_id: Uuid,
        before: Option<i64>,
        limit: i64,
    ) -> ConnectResult<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(SQL_LIST_MESSAGES)
            .bind(connection_id)
            .bind(before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(messages)
    }

    async fn list_searching_requests(&self) -> ConnectResult<Vec<ConnectionRequest>> {
        let requests = sqlx::query_as::<_, ConnectionRequest>(SQL_LIST_SEARCHING_REQUESTS)
            .fetch_all(&self.pool)
            .await?;
        Ok(requests)
    }
}
