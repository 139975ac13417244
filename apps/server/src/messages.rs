use std::collections::HashSet;

use shared_proto::events::ServerEvent;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::attachments::Upload;
use crate::chats::{load_member_chat, load_member_chat_in};
use crate::db::{from_millis, now_millis};
use crate::error::{ApiError, ApiResult};
use crate::models::{Attachment, MessagePage, MessagePayload, MessageRow, SenderInfo};
use crate::state::AppState;
use crate::users;
use crate::validation::{check, validate_message_content, MAX_ATTACHMENTS};

pub const PAGE_SIZE: i64 = 20;

/// Text message from a live channel.
pub async fn send_text(
    state: &AppState,
    sender: Uuid,
    chat_id: Uuid,
    content: &str,
) -> ApiResult<MessagePayload> {
    check("message", content, validate_message_content)?;
    store_and_fan_out(state, chat_id, sender, content.trim(), Vec::new()).await
}

/// Message made of 1..=5 uploaded files and no text.
pub async fn send_attachments(
    state: &AppState,
    sender: Uuid,
    chat_id: Uuid,
    files: Vec<Upload>,
) -> ApiResult<MessagePayload> {
    if files.is_empty() {
        return Err(ApiError::validation("Please Upload Attachments"));
    }
    if files.len() > MAX_ATTACHMENTS {
        return Err(ApiError::limit_exceeded(format!(
            "Files can't be more than {MAX_ATTACHMENTS}"
        )));
    }

    // rejected callers never reach the attachment store
    load_member_chat(&state.db, sender, chat_id).await?;
    let stored = state.attachments.upload(files).await?;
    let public_ids: Vec<String> = stored.iter().map(|a| a.public_id.clone()).collect();

    match store_and_fan_out(state, chat_id, sender, "", stored).await {
        Ok(message) => Ok(message),
        Err(e) => {
            if let Err(cleanup) = state.attachments.delete(&public_ids).await {
                tracing::warn!(component = "messages", %chat_id, error = %cleanup, "failed to clean up attachments");
            }
            Err(e)
        }
    }
}

/// Membership is checked again inside the write transaction, so a chat deleted
/// after an earlier check surfaces as NotFound.
async fn store_and_fan_out(
    state: &AppState,
    chat_id: Uuid,
    sender: Uuid,
    content: &str,
    attachments: Vec<Attachment>,
) -> ApiResult<MessagePayload> {
    let encoded = serde_json::to_string(&attachments)
        .map_err(|e| ApiError::internal(format!("attachment encoding failed: {e}")))?;

    let mut tx = state.writer.begin().await?;
    let chat = load_member_chat_in(&mut *tx, sender, chat_id).await?;
    let sender_info = users::find_public_many(&mut *tx, &[sender])
        .await?
        .remove(&sender)
        .map(|user| SenderInfo {
            id: user.id,
            name: user.name,
        })
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    let id = Uuid::new_v4();
    let created_at = now_millis();
    sqlx::query(
        "INSERT INTO messages (id, chat_id, sender_id, content, attachments, created_at) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(chat.id)
    .bind(sender)
    .bind(content)
    .bind(&encoded)
    .bind(created_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    let message = MessagePayload {
        id,
        chat_id: chat.id,
        sender: sender_info,
        content: content.to_string(),
        attachments,
        created_at: from_millis(created_at),
    };

    let delivered = state.channels.emit(
        &ServerEvent::NewMessage(message.clone()),
        chat.members.iter().copied(),
    );
    state.channels.emit(
        &ServerEvent::NewMessageAlert { chat_id: chat.id },
        chat.members.iter().copied(),
    );
    tracing::debug!(component = "messages", chat_id = %chat.id, message_id = %id, delivered, "message stored");
    Ok(message)
}

/// One page of a chat's history, newest first. Pages start at 1.
pub async fn get_messages(
    db: &SqlitePool,
    user_id: Uuid,
    chat_id: Uuid,
    page: i64,
) -> ApiResult<MessagePage> {
    if page < 1 {
        return Err(ApiError::validation("Page must be at least 1"));
    }
    load_member_chat(db, user_id, chat_id).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE chat_id = ?")
        .bind(chat_id)
        .fetch_one(db)
        .await?;

    let rows = sqlx::query_as::<_, MessageRow>(
        r#"
        SELECT id, chat_id, sender_id, content, attachments, created_at
        FROM messages
        WHERE chat_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(chat_id)
    .bind(PAGE_SIZE)
    .bind((page - 1) * PAGE_SIZE)
    .fetch_all(db)
    .await?;

    let sender_ids: Vec<Uuid> = rows
        .iter()
        .map(|row| row.sender_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let senders = users::find_public_many(db, &sender_ids).await?;

    let messages = rows
        .into_iter()
        .map(|row| MessagePayload {
            id: row.id,
            chat_id: row.chat_id,
            sender: SenderInfo {
                id: row.sender_id,
                name: senders
                    .get(&row.sender_id)
                    .map(|user| user.name.clone())
                    .unwrap_or_default(),
            },
            content: row.content,
            attachments: decode_attachments(&row.attachments),
            created_at: from_millis(row.created_at),
        })
        .collect();

    Ok(MessagePage {
        messages,
        total_pages: (total + PAGE_SIZE - 1) / PAGE_SIZE,
    })
}

pub(crate) fn decode_attachments(raw: &str) -> Vec<Attachment> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::warn!(component = "messages", error = %e, "unreadable attachment list");
        Vec::new()
    })
}

/// Public ids of every attachment in the given stored attachment lists.
pub(crate) fn attachment_ids(lists: &[String]) -> Vec<String> {
    lists
        .iter()
        .flat_map(|raw| decode_attachments(raw))
        .map(|attachment| attachment.public_id)
        .collect()
}
