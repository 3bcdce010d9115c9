use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of a connection request. "searching" until the
/// matchmaker pairs the user, "connected" while the pairing is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Searching,
    Connected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Searching => "searching",
            RequestStatus::Connected => "connected",
        }
    }
}

impl TryFrom<String> for RequestStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "searching" => Ok(RequestStatus::Searching),
            "connected" => Ok(RequestStatus::Connected),
            other => Err(format!("unknown request status: {}", other)),
        }
    }
}

/// A user's open "searching" intent. At most one row per user at a time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectionRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub nickname: String,
    pub location: String,
    pub interests: Vec<String>,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a connection request. Validation happens in the
/// Request Registry before this ever reaches a store.
#[derive(Debug, Clone)]
pub struct NewConnectionRequest {
    pub user_id: Uuid,
    pub nickname: String,
    pub location: String,
    pub interests: Vec<String>,
}

/// A live pairing between exactly two users. Either participant may end it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActiveConnection {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActiveConnection {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The other participant, or None if the given user is not part of
    /// this connection.
    pub fn peer_of(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// One chat entry. Immutable once created; ordered by creation time with
/// the sequential id as tie-break.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub connection_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Presentation fields for the matched peer, read from the peer's own
/// connection request row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerProfile {
    pub user_id: Uuid,
    pub nickname: String,
    pub location: String,
    pub interests: Vec<String>,
}

impl From<&ConnectionRequest> for PeerProfile {
    fn from(request: &ConnectionRequest) -> Self {
        Self {
            user_id: request.user_id,
            nickname: request.nickname.clone(),
            location: request.location.clone(),
            interests: request.interests.clone(),
        }
    }
}
