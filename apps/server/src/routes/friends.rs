use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::friends::{self, Resolution};
use crate::state::AppState;

/// Friend-request endpoints, mounted under `/user`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/sendRequest", put(send_request))
        .route("/acceptFriendRequest", put(accept_request))
        .route("/notifications", get(notifications))
        .route("/friends", get(list_friends))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequestBody {
    receiver_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResolveRequestBody {
    request_id: Uuid,
    accept: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FriendsQuery {
    chat_id: Option<Uuid>,
}

async fn send_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<SendRequestBody>,
) -> ApiResult<impl IntoResponse> {
    // a duplicate is reported to HTTP clients as a bad request
    friends::send_request(&state, user.id, body.receiver_id)
        .await
        .map_err(|e| match e {
            ApiError::Conflict(message) => ApiError::InvalidOperation(message),
            other => other,
        })?;
    Ok(Json(json!({ "success": true, "message": "Friend Request Sent" })))
}

async fn accept_request(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ResolveRequestBody>,
) -> ApiResult<impl IntoResponse> {
    // someone else's request looks the same as a missing one
    let resolution = friends::resolve_request(&state, body.request_id, user.id, body.accept)
        .await
        .map_err(|e| match e {
            ApiError::Unauthorized(message) => ApiError::NotFound(message),
            other => other,
        })?;
    let response = match resolution {
        Resolution::Rejected => json!({ "success": true, "message": "Friend Request Rejected" }),
        Resolution::Accepted { chat_id, sender_id } => json!({
            "success": true,
            "message": "Friend Request Accepted",
            "chatId": chat_id,
            "senderId": sender_id,
        }),
    };
    Ok(Json(response))
}

async fn notifications(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<impl IntoResponse> {
    let requests = friends::notifications_for(&state.db, user.id).await?;
    Ok(Json(json!({ "success": true, "requests": requests })))
}

async fn list_friends(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<FriendsQuery>,
) -> ApiResult<impl IntoResponse> {
    let friends = friends::friends_of(&state.db, user.id, query.chat_id).await?;
    Ok(Json(json!({ "success": true, "friends": friends })))
}
