use shared_proto::events::ServerEvent;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::chats;
use crate::db::{from_millis, now_millis};
use crate::error::{ApiError, ApiResult};
use crate::models::{FriendRequest, Notification, UserPublic};
use crate::state::AppState;
use crate::users;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Rejected,
    Accepted { chat_id: Uuid, sender_id: Uuid },
}

/// Create a pending request from `sender` to `receiver` and notify the receiver.
///
/// The pair is stored in sorted order under a unique index, so two concurrent
/// requests between the same users (in either direction) cannot both commit.
pub async fn send_request(state: &AppState, sender: Uuid, receiver: Uuid) -> ApiResult<FriendRequest> {
    if sender == receiver {
        return Err(ApiError::invalid_operation(
            "You cannot send a friend request to yourself",
        ));
    }

    users::find_user(&state.db, receiver).await?;

    let mut conn = state.writer.acquire().await?;
    if are_friends(&mut *conn, sender, receiver).await? {
        return Err(ApiError::conflict("You are already friends"));
    }

    let (pair_low, pair_high) = ordered_pair(sender, receiver);
    let request = sqlx::query_as::<_, FriendRequest>(
        r#"
        INSERT INTO friend_requests (id, sender_id, receiver_id, pair_low, pair_high, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id, sender_id, receiver_id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(sender)
    .bind(receiver)
    .bind(pair_low)
    .bind(pair_high)
    .bind(now_millis())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match ApiError::from(e) {
        ApiError::Conflict(_) => ApiError::conflict("Request has already been sent"),
        other => other,
    })?;
    drop(conn);

    tracing::info!(
        component = "friends",
        request_id = %request.id,
        %sender,
        %receiver,
        "friend request sent"
    );
    state.channels.emit(&ServerEvent::NewRequest, [receiver]);
    Ok(request)
}

/// Accept or reject a pending request. Only its receiver may do either.
/// Both outcomes delete the request; accepting also opens a private chat.
pub async fn resolve_request(
    state: &AppState,
    request_id: Uuid,
    acting_user: Uuid,
    accept: bool,
) -> ApiResult<Resolution> {
    let mut tx = state.writer.begin().await?;

    let request = sqlx::query_as::<_, FriendRequest>(
        "SELECT id, sender_id, receiver_id, created_at FROM friend_requests WHERE id = ?",
    )
    .bind(request_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found("Request not found"))?;

    if request.receiver_id != acting_user {
        return Err(ApiError::unauthorized(
            "You are not authorized to resolve this request",
        ));
    }

    sqlx::query("DELETE FROM friend_requests WHERE id = ?")
        .bind(request.id)
        .execute(&mut *tx)
        .await?;

    if !accept {
        tx.commit().await?;
        tracing::info!(component = "friends", %request_id, "friend request rejected");
        return Ok(Resolution::Rejected);
    }

    let parties = [request.sender_id, request.receiver_id];
    let names = users::find_public_many(&mut *tx, &parties).await?;
    let name_of = |id: Uuid| {
        names
            .get(&id)
            .map(|user| user.name.clone())
            .ok_or_else(|| ApiError::not_found(format!("User {id} not found")))
    };
    let chat_name = format!(
        "{} - {}",
        name_of(request.receiver_id)?,
        name_of(request.sender_id)?
    );

    let chat_id = chats::insert_chat(&mut *tx, &chat_name, false, None, &parties).await?;
    tx.commit().await?;

    tracing::info!(
        component = "friends",
        %request_id,
        %chat_id,
        "friend request accepted"
    );
    state.channels.emit(&ServerEvent::RefetchChats, parties);

    Ok(Resolution::Accepted {
        chat_id,
        sender_id: request.sender_id,
    })
}

#[derive(Debug, FromRow)]
struct NotificationRow {
    id: Uuid,
    created_at: i64,
    sender_id: Uuid,
    sender_name: String,
    sender_avatar: String,
}

/// Pending requests addressed to `user_id`, each with the sender's public fields.
pub async fn notifications_for(db: &SqlitePool, user_id: Uuid) -> ApiResult<Vec<Notification>> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT r.id, r.created_at, u.id AS sender_id, u.name AS sender_name, u.avatar_url AS sender_avatar
        FROM friend_requests r
        JOIN users u ON u.id = r.sender_id
        WHERE r.receiver_id = ?
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Notification {
            id: row.id,
            sender: UserPublic {
                id: row.sender_id,
                name: row.sender_name,
                avatar: row.sender_avatar,
            },
            created_at: from_millis(row.created_at),
        })
        .collect())
}

/// Everyone `user_id` shares a private chat with. With `exclude_chat`, drops
/// those already in that chat (the "add members" picker).
pub async fn friends_of(
    db: &SqlitePool,
    user_id: Uuid,
    exclude_chat: Option<Uuid>,
) -> ApiResult<Vec<UserPublic>> {
    let mut friends = sqlx::query_as::<_, UserPublic>(
        r#"
        SELECT u.id, u.name, u.avatar_url AS avatar
        FROM chat_members mine
        JOIN chats c ON c.id = mine.chat_id AND c.group_chat = 0
        JOIN chat_members other ON other.chat_id = c.id AND other.user_id <> mine.user_id
        JOIN users u ON u.id = other.user_id
        WHERE mine.user_id = ?
        ORDER BY u.name
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    if let Some(chat_id) = exclude_chat {
        let chat = chats::load_chat(db, chat_id).await?;
        if !chat.is_member(user_id) {
            return Err(ApiError::unauthorized("You are not a member of this chat"));
        }
        friends.retain(|friend| !chat.is_member(friend.id));
    }

    Ok(friends)
}

async fn are_friends(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> ApiResult<bool> {
    let shared = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*)
        FROM chats c
        JOIN chat_members ma ON ma.chat_id = c.id AND ma.user_id = ?
        JOIN chat_members mb ON mb.chat_id = c.id AND mb.user_id = ?
        WHERE c.group_chat = 0
        "#,
    )
    .bind(a)
    .bind(b)
    .fetch_one(&mut *conn)
    .await?;
    Ok(shared > 0)
}

fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
