use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use shared_proto::auth::ADMIN_COOKIE;

use crate::auth::{set_cookie_headers, AdminSession};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::stats;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(whoami))
        .route("/verify", post(verify))
        .route("/logout", get(logout))
        .route("/stats", get(dashboard))
        .route("/users", get(users))
        .route("/chats", get(chats))
        .route("/messages", get(messages))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBody {
    secret_key: String,
}

async fn verify(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> ApiResult<impl IntoResponse> {
    let expected = state
        .config
        .admin_secret_key
        .as_deref()
        .ok_or_else(|| ApiError::not_found("Admin surface is disabled"))?;
    if body.secret_key != expected {
        tracing::warn!(component = "admin", "rejected admin key");
        return Err(ApiError::Unauthenticated("Invalid Admin Key".to_string()));
    }

    let token = state.sessions.issue_admin()?;
    tracing::info!(component = "admin", "admin session issued");
    Ok((
        set_cookie_headers(state.sessions.admin_cookie(&token)),
        Json(json!({ "success": true, "message": "Authenticated Successfully, Welcome BOSS" })),
    ))
}

async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        set_cookie_headers(state.sessions.cleared_cookie(ADMIN_COOKIE)),
        Json(json!({ "success": true, "message": "Logged Out Successfully" })),
    )
}

async fn whoami(_admin: AdminSession) -> impl IntoResponse {
    Json(json!({ "admin": true }))
}

async fn dashboard(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<impl IntoResponse> {
    let stats = stats::dashboard_stats(&state.db).await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

async fn users(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<impl IntoResponse> {
    let users = stats::all_users(&state.db).await?;
    Ok(Json(json!({ "success": true, "users": users })))
}

async fn chats(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<impl IntoResponse> {
    let chats = stats::all_chats(&state.db).await?;
    Ok(Json(json!({ "success": true, "chats": chats })))
}

async fn messages(State(state): State<AppState>, _admin: AdminSession) -> ApiResult<impl IntoResponse> {
    let messages = stats::all_messages(&state.db).await?;
    Ok(Json(json!({ "success": true, "messages": messages })))
}
