pub mod events {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Attachment {
        pub public_id: String,
        pub url: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct SenderInfo {
        pub id: Uuid,
        pub name: String,
    }

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct MessagePayload {
        pub id: Uuid,
        pub chat_id: Uuid,
        pub sender: SenderInfo,
        pub content: String,
        pub attachments: Vec<Attachment>,
        pub created_at: DateTime<Utc>,
    }

    /// Events pushed from the server to every live channel of a target user.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum ServerEvent {
        NewRequest,
        RefetchChats,
        NewMessage(MessagePayload),
        NewMessageAlert { chat_id: Uuid },
        Alert { chat_id: Uuid, message: String },
    }

    impl ServerEvent {
        pub fn name(&self) -> &'static str {
            match self {
                ServerEvent::NewRequest => "NEW_REQUEST",
                ServerEvent::RefetchChats => "REFETCH_CHATS",
                ServerEvent::NewMessage(_) => "NEW_MESSAGE",
                ServerEvent::NewMessageAlert { .. } => "NEW_MESSAGE_ALERT",
                ServerEvent::Alert { .. } => "ALERT",
            }
        }
    }

    /// Events a connected client may send over its channel.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
    pub enum ClientEvent {
        NewMessage { chat_id: Uuid, content: String },
    }
}

pub mod auth {
    /// Cookie carrying the signed session token, for HTTP and the real-time handshake.
    pub const SESSION_COOKIE: &str = "chatbox-token";
    pub const ADMIN_COOKIE: &str = "admin-token";
}
