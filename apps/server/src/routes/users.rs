use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use shared_proto::auth::SESSION_COOKIE;

use crate::auth::{set_cookie_headers, AuthUser};
use crate::error::ApiResult;
use crate::routes::read_form;
use crate::state::AppState;
use crate::users::{self, LoginRequest, RegisterRequest};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(register))
        .route("/login", post(login))
        .route("/logout", get(logout))
        .route("/myself", get(myself))
        .route("/search", get(search))
}

/// Multipart: name, username, password, description and an `avatar` file.
async fn register(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut form = read_form(multipart).await?;
    let req = RegisterRequest {
        name: form.field("name")?.to_string(),
        username: form.field("username")?.to_string(),
        password: form.field("password")?.to_string(),
        description: form.field("description")?.to_string(),
    };
    let avatar = form.take_files("avatar").into_iter().next();

    let (user, token) = users::register(&state, req, avatar).await?;
    Ok((
        StatusCode::CREATED,
        set_cookie_headers(state.sessions.session_cookie(&token)),
        Json(json!({ "success": true, "user": user, "message": "User created" })),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let (user, token) = users::login(&state, req).await?;
    let message = format!("Welcome Back, {}", user.name);
    Ok((
        set_cookie_headers(state.sessions.session_cookie(&token)),
        Json(json!({ "success": true, "user": user, "message": message })),
    ))
}

async fn logout(State(state): State<AppState>, _user: AuthUser) -> impl IntoResponse {
    (
        set_cookie_headers(state.sessions.cleared_cookie(SESSION_COOKIE)),
        Json(json!({ "success": true, "message": "Logged out successfully" })),
    )
}

async fn myself(State(state): State<AppState>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    let user = users::profile(&state.db, user.id).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    name: String,
}

async fn search(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<SearchQuery>,
) -> ApiResult<impl IntoResponse> {
    let users = users::search(&state.db, user.id, &query.name).await?;
    Ok(Json(json!({ "success": true, "users": users })))
}
