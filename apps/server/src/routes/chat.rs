use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::chats::{self, ChatFilter, NewGroupRequest};
use crate::error::{ApiError, ApiResult};
use crate::messages;
use crate::routes::read_form;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(new_group))
        .route("/personal", get(my_chats))
        .route("/personal/groups", get(my_groups))
        .route("/add", put(add_members))
        .route("/remove", put(remove_members))
        .route("/leave/:id", delete(leave_group))
        .route("/message", post(send_attachments))
        .route("/message/:id", get(get_messages))
        .route(
            "/:id",
            get(chat_details).put(rename_group).delete(delete_chat),
        )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembersBody {
    chat_id: Uuid,
    members: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<i64>,
}

async fn new_group(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewGroupRequest>,
) -> ApiResult<impl IntoResponse> {
    let chat = chats::create_group(&state, user.id, req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": "Group Created", "chat": chat })),
    ))
}

async fn my_chats(State(state): State<AppState>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    let chats = chats::list_my_chats(&state.db, user.id, ChatFilter::All).await?;
    Ok(Json(json!({ "success": true, "chats": chats })))
}

async fn my_groups(State(state): State<AppState>, user: AuthUser) -> ApiResult<impl IntoResponse> {
    let groups = chats::list_my_chats(&state.db, user.id, ChatFilter::GroupsOnly).await?;
    Ok(Json(json!({ "success": true, "groups": groups })))
}

async fn add_members(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<MembersBody>,
) -> ApiResult<impl IntoResponse> {
    let chat = chats::add_members(&state, user.id, body.chat_id, body.members).await?;
    Ok(Json(json!({ "success": true, "message": "Members added successfully", "chat": chat })))
}

async fn remove_members(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<MembersBody>,
) -> ApiResult<impl IntoResponse> {
    let chat = chats::remove_members(&state, user.id, body.chat_id, body.members).await?;
    Ok(Json(json!({ "success": true, "message": "Members removed successfully", "chat": chat })))
}

async fn leave_group(
    State(state): State<AppState>,
    user: AuthUser,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    chats::leave_group(&state, user.id, chat_id).await?;
    Ok(Json(json!({ "success": true, "message": "Left group successfully" })))
}

/// Multipart: `chatId` plus 1..=5 `files`.
async fn send_attachments(
    State(state): State<AppState>,
    user: AuthUser,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut form = read_form(multipart).await?;
    let chat_id = Uuid::parse_str(form.field("chatId")?.trim())
        .map_err(|_| ApiError::validation("Invalid chatId"))?;
    let files = form.take_files("files");

    let message = messages::send_attachments(&state, user.id, chat_id, files).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "message": message })),
    ))
}

async fn get_messages(
    State(state): State<AppState>,
    user: AuthUser,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> ApiResult<impl IntoResponse> {
    let page = messages::get_messages(&state.db, user.id, chat_id, query.page.unwrap_or(1)).await?;
    Ok(Json(json!({
        "success": true,
        "messages": page.messages,
        "totalPages": page.total_pages,
    })))
}

async fn chat_details(
    State(state): State<AppState>,
    user: AuthUser,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let chat = chats::chat_details(&state, user.id, chat_id).await?;
    Ok(Json(json!({ "success": true, "chat": chat })))
}

async fn rename_group(
    State(state): State<AppState>,
    user: AuthUser,
    Path(chat_id): Path<Uuid>,
    Json(body): Json<RenameBody>,
) -> ApiResult<impl IntoResponse> {
    chats::rename_group(&state, user.id, chat_id, &body.name).await?;
    Ok(Json(json!({ "success": true, "message": "Group renamed successfully" })))
}

async fn delete_chat(
    State(state): State<AppState>,
    user: AuthUser,
    Path(chat_id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    chats::delete_chat(&state, user.id, chat_id).await?;
    Ok(Json(json!({ "success": true, "message": "Chat deleted successfully" })))
}
