use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ConnectError;
use crate::messages::MessageLog;
use crate::models::{ActiveConnection, ConnectionRequest, Message};
use crate::registry::RequestRegistry;
use crate::store::{ConnectStore, PgStore};
use crate::utils::Config;

pub type AppState = (PgStore, Config);

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn error_response(err: ConnectError) -> (StatusCode, Json<ApiError>) {
    let status = match &err {
        ConnectError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ConnectError::Conflict(_) => StatusCode::CONFLICT,
        ConnectError::Forbidden(_) => StatusCode::FORBIDDEN,
        ConnectError::NotFound(_) => StatusCode::NOT_FOUND,
        ConnectError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    if matches!(err, ConnectError::Store(_)) {
        tracing::error!("store failure behind api call: {}", err);
    }
    (
        status,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub user_id: Uuid,
    pub nickname: String,
    pub location: String,
    pub interests: Vec<String>,
}

/// Open a "searching" request for a user.
pub async fn create_request(
    State((store, _config)): State<AppState>,
    Json(body): Json<CreateRequestBody>,
) -> ApiResult<ConnectionRequest> {
    let registry = RequestRegistry::new(store);
    registry
        .create_request(body.user_id, &body.nickname, &body.location, body.interests)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Delete a request by id. Idempotent: cancelling an already-gone request
/// succeeds.
pub async fn cancel_request(
    State((store, _config)): State<AppState>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<CancelResponse> {
    let registry = RequestRegistry::new(store);
    registry
        .cancel_request(request_id)
        .await
        .map(|()| Json(CancelResponse { cancelled: true }))
        .map_err(error_response)
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub request: Option<ConnectionRequest>,
    pub connection: Option<ActiveConnection>,
}

/// Current request and connection for a user. Both are reported; the client
/// decides which one wins while notifications are in flight.
pub async fn get_status(
    State((store, _config)): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusResponse> {
    let registry = RequestRegistry::new(store);
    registry
        .status(user_id)
        .await
        .map(|view| {
            Json(StatusResponse {
                request: view.request,
                connection: view.connection,
            })
        })
        .map_err(error_response)
}

#[derive(Debug, Serialize)]
pub struct EndResponse {
    pub ended: bool,
}

/// Tear down a pairing. Either participant may call this; a connection that
/// is already gone reports `ended: false` rather than an error.
pub async fn end_connection(
    State((store, _config)): State<AppState>,
    Path(connection_id): Path<Uuid>,
) -> ApiResult<EndResponse> {
    store
        .end_connection(connection_id)
        .await
        .map(|ended| Json(EndResponse { ended }))
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    /// Return only messages with an id strictly below this one.
    pub before: Option<i64>,
}

pub async fn list_messages(
    State((store, _config)): State<AppState>,
    Path(connection_id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> ApiResult<Vec<Message>> {
    let log = MessageLog::new(store);
    log.fetch_page(connection_id, query.before)
        .await
        .map(Json)
        .map_err(error_response)
}

#[derive(Debug, Deserialize)]
pub struct SendMessageBody {
    pub connection_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
}

pub async fn send_message(
    State((store, _config)): State<AppState>,
    Json(body): Json<SendMessageBody>,
) -> ApiResult<Message> {
    let log = MessageLog::new(store);
    log.append(body.connection_id, body.sender_id, &body.content)
        .await
        .map(Json)
        .map_err(error_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_taxonomy_maps_to_status_codes() {
        let cases = [
            (
                error_response(ConnectError::validation("empty nickname")).0,
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                error_response(ConnectError::Conflict("already searching")).0,
                StatusCode::CONFLICT,
            ),
            (
                error_response(ConnectError::Forbidden("not a participant")).0,
                StatusCode::FORBIDDEN,
            ),
            (
                error_response(ConnectError::NotFound("connection")).0,
                StatusCode::NOT_FOUND,
            ),
            (
                error_response(ConnectError::Store(anyhow::anyhow!("down"))).0,
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (got, want) in cases {
            assert_eq!(got, want);
        }
    }

    #[test]
    fn test_error_body_carries_reason() {
        let (_, Json(body)) = error_response(ConnectError::validation("nickname must not be empty"));
        assert!(body.error.contains("nickname"));
    }
}
