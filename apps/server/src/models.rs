use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub use shared_proto::events::{Attachment, MessagePayload, SenderInfo};

use crate::db::from_millis;

pub const MIN_GROUP_MEMBERS: usize = 3;
pub const MAX_GROUP_MEMBERS: usize = 100;

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub password_hash: String,
    pub description: String,
    pub avatar_public_id: String,
    pub avatar_url: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub description: String,
    pub avatar: Attachment,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            username: user.username,
            description: user.description,
            avatar: Attachment {
                public_id: user.avatar_public_id,
                url: user.avatar_url,
            },
            created_at: from_millis(user.created_at),
        }
    }
}

/// The identity fields other users are allowed to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UserPublic {
    pub id: Uuid,
    pub name: String,
    pub avatar: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub sender: UserPublic,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct ChatRow {
    pub id: Uuid,
    pub name: String,
    pub group_chat: bool,
    pub creator_id: Option<Uuid>,
    pub created_at: i64,
}

/// A chat with its member ids in join order.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: Uuid,
    pub name: String,
    pub group_chat: bool,
    pub creator: Option<Uuid>,
    pub members: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn from_row(row: ChatRow, members: Vec<Uuid>) -> Self {
        Self {
            id: row.id,
            name: row.name,
            group_chat: row.group_chat,
            creator: row.creator_id,
            members,
            created_at: from_millis(row.created_at),
        }
    }

    pub fn is_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

/// Chat entry as shown in a user's chat list.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: Uuid,
    pub name: String,
    pub group_chat: bool,
    pub avatar: Vec<String>,
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatDetails {
    pub id: Uuid,
    pub name: String,
    pub group_chat: bool,
    pub creator: Option<Uuid>,
    pub members: Vec<UserPublic>,
}

#[derive(Debug, Clone, FromRow)]
pub struct MessageRow {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachments: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePage {
    pub messages: Vec<MessagePayload>,
    pub total_pages: i64,
}
