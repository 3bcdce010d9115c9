use uuid::Uuid;

use crate::error::{ConnectError, ConnectResult};
use crate::models::{ActiveConnection, ConnectionRequest, NewConnectionRequest};
use crate::store::ConnectStore;

/// What the store currently knows about a user's matching state.
///
/// Both fields are queried even though they are mutually exclusive in
/// practice: the notification that flips one of them may not have been
/// processed yet, so callers get the raw pair and decide.
#[derive(Debug, Clone)]
pub struct RequestStatusView {
    pub request: Option<ConnectionRequest>,
    pub connection: Option<ActiveConnection>,
}

/// Manages a user's "searching" intent record.
pub struct RequestRegistry<S> {
    store: S,
}

impl<S: ConnectStore> RequestRegistry<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Validate and persist a new searching request.
    ///
    /// Nickname and location must be non-blank, and at least one non-blank
    /// interest tag is required. Duplicate-request and already-connected
    /// conflicts are enforced by the store.
    pub async fn create_request(
        &self,
        user_id: Uuid,
        nickname: &str,
        location: &str,
        interests: Vec<String>,
    ) -> ConnectResult<ConnectionRequest> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(ConnectError::validation("nickname must not be empty"));
        }
        let location = location.trim();
        if location.is_empty() {
            return Err(ConnectError::validation("location must not be empty"));
        }
        let interests: Vec<String> = interests
            .into_iter()
            .map(|tag| tag.trim().to_string())
            .collect();
        if interests.is_empty() || interests.iter().any(|tag| tag.is_empty()) {
            return Err(ConnectError::validation(
                "at least one non-empty interest is required",
            ));
        }

        self.store
            .create_request(NewConnectionRequest {
                user_id,
                nickname: nickname.to_string(),
                location: location.to_string(),
                interests,
            })
            .await
    }

    /// Delete a request. Idempotent: a request that is already gone counts
    /// as cancelled.
    pub async fn cancel_request(&self, request_id: Uuid) -> ConnectResult<()> {
        self.store.delete_request(request_id).await?;
        Ok(())
    }

    pub async fn status(&self, user_id: Uuid) -> ConnectResult<RequestStatusView> {
        let request = self.store.find_request_for_user(user_id).await?;
        let connection = self.store.find_connection_for_user(user_id).await?;
        Ok(RequestStatusView {
            request,
            connection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestStatus;
    use crate::store::MemoryStore;

    fn registry() -> RequestRegistry<MemoryStore> {
        RequestRegistry::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_create_then_status_is_searching() {
        let registry = registry();
        let user = Uuid::new_v4();

        let request = registry
            .create_request(user, "Ada", "NYC", vec!["math".to_string()])
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Searching);

        let view = registry.status(user).await.unwrap();
        assert_eq!(
            view.request.map(|r| r.status),
            Some(RequestStatus::Searching)
        );
        assert!(view.connection.is_none());
    }

    #[tokio::test]
    async fn test_second_create_conflicts() {
        let registry = registry();
        let user = Uuid::new_v4();

        registry
            .create_request(user, "Ada", "NYC", vec!["math".to_string()])
            .await
            .unwrap();
        let err = registry
            .create_request(user, "Ada", "NYC", vec!["math".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_while_connected_conflicts() {
        let store = MemoryStore::new();
        let registry = RequestRegistry::new(store.clone());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        registry
            .create_request(a, "Ada", "NYC", vec!["math".to_string()])
            .await
            .unwrap();
        registry
            .create_request(b, "Bo", "NYC", vec!["math".to_string()])
            .await
            .unwrap();
        let connection = store.create_connection(a, b).await.unwrap();

        // The request row still exists (status connected) and the user is
        // paired; a fresh create must fail either way.
        let err = registry
            .create_request(a, "Ada", "NYC", vec!["math".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectError::Conflict(_)));

        let view = registry.status(a).await.unwrap();
        assert_eq!(view.connection.map(|c| c.id), Some(connection.id));
    }

    #[tokio::test]
    async fn test_validation_rejects_blank_fields() {
        let registry = registry();
        let user = Uuid::new_v4();

        for (nickname, location, interests) in [
            ("", "NYC", vec!["math".to_string()]),
            ("  ", "NYC", vec!["math".to_string()]),
            ("Ada", "", vec!["math".to_string()]),
            ("Ada", "NYC", vec![]),
            ("Ada", "NYC", vec!["  ".to_string()]),
        ] {
            let err = registry
                .create_request(user, nickname, location, interests)
                .await
                .unwrap_err();
            assert!(matches!(err, ConnectError::Validation(_)));
        }

        // Nothing was persisted by the rejected attempts.
        assert!(registry.status(user).await.unwrap().request.is_none());
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let registry = registry();
        let user = Uuid::new_v4();
        let request = registry
            .create_request(user, "Ada", "NYC", vec!["math".to_string()])
            .await
            .unwrap();

        registry.cancel_request(request.id).await.unwrap();
        // Second cancel of the same id is a no-op, not an error.
        registry.cancel_request(request.id).await.unwrap();
        assert!(registry.status(user).await.unwrap().request.is_none());
    }
}
