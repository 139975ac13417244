use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::db::{from_millis, now_millis};
use crate::error::ApiResult;
use crate::messages::decode_attachments;
use crate::models::{Attachment, ChatRow, UserPublic};

const DAY_MILLIS: i64 = 24 * 60 * 60 * 1000;
const CHART_DAYS: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub groups_count: i64,
    pub users_count: i64,
    pub messages_count: i64,
    pub total_chats_count: i64,
    /// Messages per day for the last week; index 6 is today.
    pub messages_chart: [i64; CHART_DAYS],
}

pub async fn dashboard_stats(db: &SqlitePool) -> ApiResult<DashboardStats> {
    let (groups_count, total_chats_count): (i64, i64) =
        sqlx::query_as("SELECT COALESCE(SUM(group_chat), 0), COUNT(*) FROM chats")
            .fetch_one(db)
            .await?;
    let users_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(db)
        .await?;
    let messages_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
        .fetch_one(db)
        .await?;

    let now = now_millis();
    let recent: Vec<i64> = sqlx::query_scalar("SELECT created_at FROM messages WHERE created_at > ?")
        .bind(now - CHART_DAYS as i64 * DAY_MILLIS)
        .fetch_all(db)
        .await?;

    Ok(DashboardStats {
        groups_count,
        users_count,
        messages_count,
        total_chats_count,
        messages_chart: bucket_by_day(now, &recent),
    })
}

fn bucket_by_day(now: i64, created: &[i64]) -> [i64; CHART_DAYS] {
    let mut chart = [0; CHART_DAYS];
    for at in created {
        let days_ago = (now - at).max(0) / DAY_MILLIS;
        let slot = CHART_DAYS as i64 - 1 - days_ago;
        if slot >= 0 {
            chart[slot as usize] += 1;
        }
    }
    chart
}

/// A user as listed on the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct UserOverview {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub avatar: String,
    pub groups_count: i64,
    pub friends_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOverview {
    pub id: Uuid,
    pub name: String,
    pub group_chat: bool,
    /// Avatars of the first three members.
    pub avatar: Vec<String>,
    pub members: Vec<UserPublic>,
    pub creator: Option<UserPublic>,
    pub total_members: usize,
    pub total_messages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageOverview {
    pub id: Uuid,
    pub chat_id: Uuid,
    pub group_chat: bool,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub sender: UserPublic,
    pub created_at: DateTime<Utc>,
}

/// Every user, oldest account first. Friends are counted as private chats.
pub async fn all_users(db: &SqlitePool) -> ApiResult<Vec<UserOverview>> {
    let users = sqlx::query_as::<_, UserOverview>(
        r#"
        SELECT u.id, u.name, u.username, u.avatar_url AS avatar,
            (SELECT COUNT(*) FROM chat_members m JOIN chats c ON c.id = m.chat_id
             WHERE m.user_id = u.id AND c.group_chat = 1) AS groups_count,
            (SELECT COUNT(*) FROM chat_members m JOIN chats c ON c.id = m.chat_id
             WHERE m.user_id = u.id AND c.group_chat = 0) AS friends_count
        FROM users u
        ORDER BY u.created_at, u.rowid
        "#,
    )
    .fetch_all(db)
    .await?;
    Ok(users)
}

#[derive(Debug, FromRow)]
struct MemberRow {
    chat_id: Uuid,
    user_id: Uuid,
}

pub async fn all_chats(db: &SqlitePool) -> ApiResult<Vec<ChatOverview>> {
    let chats = sqlx::query_as::<_, ChatRow>(
        "SELECT id, name, group_chat, creator_id, created_at FROM chats ORDER BY created_at DESC, rowid DESC",
    )
    .fetch_all(db)
    .await?;

    let memberships = sqlx::query_as::<_, MemberRow>(
        "SELECT chat_id, user_id FROM chat_members ORDER BY joined_at, rowid",
    )
    .fetch_all(db)
    .await?;
    let mut members_by_chat: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in memberships {
        members_by_chat.entry(row.chat_id).or_default().push(row.user_id);
    }

    let counts: HashMap<Uuid, i64> =
        sqlx::query_as::<_, (Uuid, i64)>("SELECT chat_id, COUNT(*) FROM messages GROUP BY chat_id")
            .fetch_all(db)
            .await?
            .into_iter()
            .collect();

    let profiles: HashMap<Uuid, UserPublic> =
        sqlx::query_as::<_, UserPublic>("SELECT id, name, avatar_url AS avatar FROM users")
            .fetch_all(db)
            .await?
            .into_iter()
            .map(|user| (user.id, user))
            .collect();

    Ok(chats
        .into_iter()
        .map(|row| {
            let members: Vec<UserPublic> = members_by_chat
                .remove(&row.id)
                .unwrap_or_default()
                .iter()
                .filter_map(|id| profiles.get(id).cloned())
                .collect();
            ChatOverview {
                id: row.id,
                name: row.name,
                group_chat: row.group_chat,
                avatar: members.iter().take(3).map(|m| m.avatar.clone()).collect(),
                creator: row.creator_id.and_then(|id| profiles.get(&id).cloned()),
                total_members: members.len(),
                total_messages: counts.get(&row.id).copied().unwrap_or(0),
                members,
            }
        })
        .collect())
}

#[derive(Debug, FromRow)]
struct MessageOverviewRow {
    id: Uuid,
    chat_id: Uuid,
    group_chat: bool,
    content: String,
    attachments: String,
    created_at: i64,
    sender_id: Uuid,
    sender_name: String,
    sender_avatar: String,
}

/// Every message across all chats, newest first.
pub async fn all_messages(db: &SqlitePool) -> ApiResult<Vec<MessageOverview>> {
    let rows = sqlx::query_as::<_, MessageOverviewRow>(
        r#"
        SELECT m.id, m.chat_id, c.group_chat, m.content, m.attachments, m.created_at,
            u.id AS sender_id, u.name AS sender_name, u.avatar_url AS sender_avatar
        FROM messages m
        JOIN chats c ON c.id = m.chat_id
        JOIN users u ON u.id = m.sender_id
        ORDER BY m.created_at DESC, m.rowid DESC
        "#,
    )
    .fetch_all(db)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| MessageOverview {
            id: row.id,
            chat_id: row.chat_id,
            group_chat: row.group_chat,
            content: row.content,
            attachments: decode_attachments(&row.attachments),
            sender: UserPublic {
                id: row.sender_id,
                name: row.sender_name,
                avatar: row.sender_avatar,
            },
            created_at: from_millis(row.created_at),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chats::{create_group, NewGroupRequest};
    use crate::friends::{resolve_request, send_request, Resolution};
    use crate::messages::send_text;
    use crate::state::testing::test_state;
    use crate::users::testing::insert_user;

    #[test]
    fn buckets_count_back_from_today() {
        let now = 100 * DAY_MILLIS;
        let created = [
            now,
            now - 1,
            now - DAY_MILLIS,
            now - 6 * DAY_MILLIS - 1,
            now - 7 * DAY_MILLIS,
        ];
        assert_eq!(bucket_by_day(now, &created), [1, 0, 0, 0, 0, 1, 2]);
    }

    #[tokio::test]
    async fn counts_reflect_storage() {
        let state = test_state("stats").await;
        let empty = dashboard_stats(&state.db).await.expect("empty stats");
        assert_eq!(empty.total_chats_count, 0);
        assert_eq!(empty.messages_chart, [0; CHART_DAYS]);

        let mut ids = Vec::new();
        for name in ["alice", "bob", "carol"] {
            ids.push(insert_user(&state.writer, name, name).await);
        }
        let chat = create_group(
            &state,
            ids[0],
            NewGroupRequest {
                name: "Team".to_string(),
                members: vec![ids[1], ids[2]],
            },
        )
        .await
        .expect("group");
        send_text(&state, ids[1], chat.id, "hi").await.expect("send");
        send_text(&state, ids[2], chat.id, "hey").await.expect("send");

        let stats = dashboard_stats(&state.db).await.expect("stats");
        assert_eq!(stats.users_count, 3);
        assert_eq!(stats.groups_count, 1);
        assert_eq!(stats.total_chats_count, 1);
        assert_eq!(stats.messages_count, 2);
        assert_eq!(stats.messages_chart[6], 2);
    }

    #[tokio::test]
    async fn listings_cover_users_chats_and_messages() {
        let state = test_state("stats-listings").await;
        let mut ids = Vec::new();
        for name in ["alice", "bob", "carol", "dave"] {
            ids.push(insert_user(&state.writer, name, name).await);
        }
        let team = create_group(
            &state,
            ids[0],
            NewGroupRequest {
                name: "Team".to_string(),
                members: vec![ids[1], ids[2]],
            },
        )
        .await
        .expect("group");
        let request = send_request(&state, ids[3], ids[0]).await.expect("request");
        let Resolution::Accepted { chat_id: private, .. } =
            resolve_request(&state, request.id, ids[0], true)
                .await
                .expect("accept")
        else {
            panic!("expected acceptance");
        };
        send_text(&state, ids[1], team.id, "first").await.expect("send");
        send_text(&state, ids[3], private, "second").await.expect("send");

        let users = all_users(&state.db).await.expect("users");
        assert_eq!(users.len(), 4);
        assert_eq!(users[0].username, "alice");
        assert_eq!((users[0].groups_count, users[0].friends_count), (1, 1));
        assert_eq!((users[3].groups_count, users[3].friends_count), (0, 1));

        let chats = all_chats(&state.db).await.expect("chats");
        assert_eq!(chats.len(), 2);
        let group = chats.iter().find(|c| c.id == team.id).expect("team listed");
        assert_eq!(group.total_members, 3);
        assert_eq!(group.total_messages, 1);
        assert_eq!(group.avatar.len(), 3);
        assert_eq!(group.creator.as_ref().map(|c| c.id), Some(ids[0]));
        let direct = chats.iter().find(|c| c.id == private).expect("private listed");
        assert!(!direct.group_chat);
        assert!(direct.creator.is_none());

        let messages = all_messages(&state.db).await.expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "second");
        assert_eq!(messages[0].sender.name, "dave");
        assert!(!messages[0].group_chat);
        assert!(messages[1].group_chat);
    }
}
