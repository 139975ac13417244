use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use shared_proto::events::ServerEvent;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::db::now_millis;
use crate::error::{ApiError, ApiResult};
use crate::models::{
    Chat, ChatDetails, ChatRow, ChatSummary, MAX_GROUP_MEMBERS, MIN_GROUP_MEMBERS,
};
use crate::state::AppState;
use crate::users;
use crate::validation::validate_group_name;

#[derive(Debug, Clone, Deserialize)]
pub struct NewGroupRequest {
    pub name: String,
    pub members: Vec<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFilter {
    All,
    GroupsOnly,
}

pub(crate) async fn insert_chat(
    conn: &mut SqliteConnection,
    name: &str,
    group_chat: bool,
    creator: Option<Uuid>,
    members: &[Uuid],
) -> ApiResult<Uuid> {
    let chat_id = Uuid::new_v4();
    let now = now_millis();

    sqlx::query(
        "INSERT INTO chats (id, name, group_chat, creator_id, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(chat_id)
    .bind(name)
    .bind(group_chat)
    .bind(creator)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    insert_members(conn, chat_id, members, now).await?;
    Ok(chat_id)
}

async fn insert_members(
    conn: &mut SqliteConnection,
    chat_id: Uuid,
    members: &[Uuid],
    joined_at: i64,
) -> ApiResult<()> {
    for member in members {
        sqlx::query("INSERT INTO chat_members (chat_id, user_id, joined_at) VALUES (?, ?, ?)")
            .bind(chat_id)
            .bind(*member)
            .bind(joined_at)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

async fn members_of(conn: &mut SqliteConnection, chat_id: Uuid) -> ApiResult<Vec<Uuid>> {
    let members = sqlx::query_scalar::<_, Uuid>(
        "SELECT user_id FROM chat_members WHERE chat_id = ? ORDER BY joined_at, rowid",
    )
    .bind(chat_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(members)
}

pub(crate) async fn load_chat_in(conn: &mut SqliteConnection, chat_id: Uuid) -> ApiResult<Chat> {
    let row = sqlx::query_as::<_, ChatRow>(
        "SELECT id, name, group_chat, creator_id, created_at FROM chats WHERE id = ?",
    )
    .bind(chat_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| ApiError::not_found("Chat not found"))?;

    let members = members_of(conn, chat_id).await?;
    Ok(Chat::from_row(row, members))
}

pub async fn load_chat(db: &SqlitePool, chat_id: Uuid) -> ApiResult<Chat> {
    let mut conn = db.acquire().await?;
    load_chat_in(&mut conn, chat_id).await
}

/// Loads a chat the caller belongs to.
pub async fn load_member_chat(db: &SqlitePool, user_id: Uuid, chat_id: Uuid) -> ApiResult<Chat> {
    let mut conn = db.acquire().await?;
    load_member_chat_in(&mut conn, user_id, chat_id).await
}

pub(crate) async fn load_member_chat_in(
    conn: &mut SqliteConnection,
    user_id: Uuid,
    chat_id: Uuid,
) -> ApiResult<Chat> {
    let chat = load_chat_in(conn, chat_id).await?;
    if !chat.is_member(user_id) {
        return Err(ApiError::unauthorized("You are not a member of this chat"));
    }
    Ok(chat)
}

fn require_group_creator(chat: &Chat, acting_user: Uuid, action: &str) -> ApiResult<()> {
    if !chat.group_chat {
        return Err(ApiError::invalid_operation("This is not a group chat"));
    }
    if chat.creator != Some(acting_user) {
        return Err(ApiError::unauthorized(format!(
            "Only the group creator can {action}"
        )));
    }
    Ok(())
}

fn alert(chat_id: Uuid, message: String) -> ServerEvent {
    ServerEvent::Alert { chat_id, message }
}

fn joined_names(names: &HashMap<Uuid, crate::models::UserPublic>, ids: &[Uuid]) -> String {
    ids.iter()
        .filter_map(|id| names.get(id).map(|user| user.name.as_str()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Create a group owned by `creator` with `creator` plus `req.members`.
pub async fn create_group(state: &AppState, creator: Uuid, req: NewGroupRequest) -> ApiResult<Chat> {
    let name = req.name.trim().to_string();
    crate::validation::check("group name", &name, validate_group_name)?;

    let mut members = vec![creator];
    let mut seen = HashSet::from([creator]);
    for id in req.members {
        if seen.insert(id) {
            members.push(id);
        }
    }

    if members.len() < MIN_GROUP_MEMBERS || members.len() > MAX_GROUP_MEMBERS {
        return Err(ApiError::limit_exceeded(format!(
            "A group must have between {MIN_GROUP_MEMBERS} and {MAX_GROUP_MEMBERS} members"
        )));
    }

    let mut tx = state.writer.begin().await?;
    users::ensure_exist(&mut *tx, &members).await?;
    let chat_id = insert_chat(&mut *tx, &name, true, Some(creator), &members).await?;
    let chat = load_chat_in(&mut *tx, chat_id).await?;
    tx.commit().await?;

    tracing::info!(
        component = "chats",
        %chat_id,
        %creator,
        members = chat.members.len(),
        "group created"
    );
    state.channels.emit(
        &alert(chat_id, format!("Welcome to {name} group")),
        chat.members.iter().copied(),
    );
    state
        .channels
        .emit(&ServerEvent::RefetchChats, chat.members.iter().copied());
    Ok(chat)
}

/// Add users to a group. Ids already in the group are ignored; if nothing is
/// new the call succeeds without touching storage or notifying anyone.
pub async fn add_members(
    state: &AppState,
    acting_user: Uuid,
    chat_id: Uuid,
    new_ids: Vec<Uuid>,
) -> ApiResult<Chat> {
    if new_ids.is_empty() {
        return Err(ApiError::validation("Please Add Members"));
    }

    let mut tx = state.writer.begin().await?;
    let chat = load_chat_in(&mut *tx, chat_id).await?;
    require_group_creator(&chat, acting_user, "add members")?;

    let mut seen: HashSet<Uuid> = chat.members.iter().copied().collect();
    let added: Vec<Uuid> = new_ids.into_iter().filter(|id| seen.insert(*id)).collect();
    if added.is_empty() {
        return Ok(chat);
    }

    if chat.members.len() + added.len() > MAX_GROUP_MEMBERS {
        return Err(ApiError::limit_exceeded(format!(
            "A group cannot have more than {MAX_GROUP_MEMBERS} members"
        )));
    }

    let names = users::find_public_many(&mut *tx, &added).await?;
    if let Some(missing) = added.iter().find(|id| !names.contains_key(id)) {
        return Err(ApiError::not_found(format!("User {missing} not found")));
    }

    insert_members(&mut *tx, chat_id, &added, now_millis()).await?;
    let chat = load_chat_in(&mut *tx, chat_id).await?;
    tx.commit().await?;

    tracing::info!(
        component = "chats",
        %chat_id,
        added = added.len(),
        members = chat.members.len(),
        "members added"
    );
    state.channels.emit(
        &alert(
            chat_id,
            format!("{} has been added to the group", joined_names(&names, &added)),
        ),
        chat.members.iter().copied(),
    );
    state
        .channels
        .emit(&ServerEvent::RefetchChats, chat.members.iter().copied());
    Ok(chat)
}

/// Remove users from a group. A group never shrinks below the minimum size,
/// and the creator cannot be removed this way.
pub async fn remove_members(
    state: &AppState,
    acting_user: Uuid,
    chat_id: Uuid,
    remove_ids: Vec<Uuid>,
) -> ApiResult<Chat> {
    if remove_ids.is_empty() {
        return Err(ApiError::validation("Please select members to remove"));
    }

    let mut tx = state.writer.begin().await?;
    let chat = load_chat_in(&mut *tx, chat_id).await?;
    require_group_creator(&chat, acting_user, "remove members")?;

    if chat.creator.is_some_and(|creator| remove_ids.contains(&creator)) {
        return Err(ApiError::invalid_operation(
            "The group creator cannot be removed, leave the group instead",
        ));
    }

    let mut targets: Vec<Uuid> = Vec::new();
    for id in remove_ids {
        if chat.is_member(id) && !targets.contains(&id) {
            targets.push(id);
        }
    }
    if targets.is_empty() {
        return Err(ApiError::not_found("None of these users is a member"));
    }

    if chat.members.len() - targets.len() < MIN_GROUP_MEMBERS {
        return Err(ApiError::invalid_operation(format!(
            "Group must have at least {MIN_GROUP_MEMBERS} members"
        )));
    }

    let names = users::find_public_many(&mut *tx, &targets).await?;
    for id in &targets {
        sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
            .bind(chat_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    let updated = load_chat_in(&mut *tx, chat_id).await?;
    tx.commit().await?;

    tracing::info!(
        component = "chats",
        %chat_id,
        removed = targets.len(),
        members = updated.members.len(),
        "members removed"
    );
    state.channels.emit(
        &alert(
            chat_id,
            format!(
                "{} has been removed from the group",
                joined_names(&names, &targets)
            ),
        ),
        updated.members.iter().copied(),
    );
    state
        .channels
        .emit(&ServerEvent::RefetchChats, chat.members.iter().copied());
    Ok(updated)
}

/// Leave a group. When the creator leaves, the earliest-joined remaining
/// member becomes the creator.
pub async fn leave_group(state: &AppState, user_id: Uuid, chat_id: Uuid) -> ApiResult<Chat> {
    let mut tx = state.writer.begin().await?;
    let chat = load_chat_in(&mut *tx, chat_id).await?;

    if !chat.group_chat {
        return Err(ApiError::invalid_operation("This is not a group chat"));
    }
    if !chat.is_member(user_id) {
        return Err(ApiError::not_found("You are not a member of this group"));
    }
    if chat.members.len() - 1 < MIN_GROUP_MEMBERS {
        return Err(ApiError::invalid_operation(format!(
            "Group must have at least {MIN_GROUP_MEMBERS} members"
        )));
    }

    sqlx::query("DELETE FROM chat_members WHERE chat_id = ? AND user_id = ?")
        .bind(chat_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let remaining = members_of(&mut *tx, chat_id).await?;
    if chat.creator == Some(user_id) {
        let heir = remaining
            .first()
            .copied()
            .ok_or_else(|| ApiError::internal("group has no remaining members"))?;
        sqlx::query("UPDATE chats SET creator_id = ? WHERE id = ?")
            .bind(heir)
            .bind(chat_id)
            .execute(&mut *tx)
            .await?;
        tracing::info!(component = "chats", %chat_id, new_creator = %heir, "group ownership transferred");
    }

    let leaver = users::find_public_many(&mut *tx, &[user_id]).await?;
    let updated = load_chat_in(&mut *tx, chat_id).await?;
    tx.commit().await?;

    tracing::info!(component = "chats", %chat_id, %user_id, "member left group");
    state.channels.emit(
        &alert(
            chat_id,
            format!("{} has left the group", joined_names(&leaver, &[user_id])),
        ),
        updated.members.iter().copied(),
    );
    state
        .channels
        .emit(&ServerEvent::RefetchChats, chat.members.iter().copied());
    Ok(updated)
}

pub async fn rename_group(
    state: &AppState,
    acting_user: Uuid,
    chat_id: Uuid,
    name: &str,
) -> ApiResult<Chat> {
    let name = name.trim();
    crate::validation::check("group name", name, validate_group_name)?;

    let mut tx = state.writer.begin().await?;
    let chat = load_chat_in(&mut *tx, chat_id).await?;
    require_group_creator(&chat, acting_user, "rename the group")?;

    sqlx::query("UPDATE chats SET name = ? WHERE id = ?")
        .bind(name)
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
    let updated = load_chat_in(&mut *tx, chat_id).await?;
    tx.commit().await?;

    tracing::info!(component = "chats", %chat_id, "group renamed");
    state
        .channels
        .emit(&ServerEvent::RefetchChats, updated.members.iter().copied());
    Ok(updated)
}

/// Delete a chat with its messages. Groups: creator only. Private chats: either member.
pub async fn delete_chat(state: &AppState, acting_user: Uuid, chat_id: Uuid) -> ApiResult<()> {
    let mut tx = state.writer.begin().await?;
    let chat = load_chat_in(&mut *tx, chat_id).await?;

    if chat.group_chat {
        require_group_creator(&chat, acting_user, "delete the group")?;
    } else if !chat.is_member(acting_user) {
        return Err(ApiError::unauthorized("You are not a member of this chat"));
    }

    let attachment_lists = sqlx::query_scalar::<_, String>(
        "SELECT attachments FROM messages WHERE chat_id = ? AND attachments <> '[]'",
    )
    .bind(chat_id)
    .fetch_all(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM chats WHERE id = ?")
        .bind(chat_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(component = "chats", %chat_id, group = chat.group_chat, "chat deleted");
    state
        .channels
        .emit(&ServerEvent::RefetchChats, chat.members.iter().copied());

    let public_ids = crate::messages::attachment_ids(&attachment_lists);
    if !public_ids.is_empty() {
        if let Err(e) = state.attachments.delete(&public_ids).await {
            tracing::warn!(component = "chats", %chat_id, error = %e, "failed to delete chat attachments");
        }
    }
    Ok(())
}

pub async fn chat_details(state: &AppState, user_id: Uuid, chat_id: Uuid) -> ApiResult<ChatDetails> {
    let chat = load_member_chat(&state.db, user_id, chat_id).await?;
    let profiles = users::find_public_many(&state.db, &chat.members).await?;

    Ok(ChatDetails {
        id: chat.id,
        name: chat.name,
        group_chat: chat.group_chat,
        creator: chat.creator,
        members: chat
            .members
            .iter()
            .filter_map(|id| profiles.get(id).cloned())
            .collect(),
    })
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    chat_id: Uuid,
    user_id: Uuid,
}

/// Chats `user_id` belongs to, newest first.
pub async fn list_my_chats(
    db: &SqlitePool,
    user_id: Uuid,
    filter: ChatFilter,
) -> ApiResult<Vec<ChatSummary>> {
    let chats = sqlx::query_as::<_, ChatRow>(
        r#"
        SELECT c.id, c.name, c.group_chat, c.creator_id, c.created_at
        FROM chats c
        JOIN chat_members m ON m.chat_id = c.id
        WHERE m.user_id = ?1 AND (?2 = 0 OR c.group_chat = 1)
        ORDER BY c.created_at DESC, c.rowid DESC
        "#,
    )
    .bind(user_id)
    .bind(filter == ChatFilter::GroupsOnly)
    .fetch_all(db)
    .await?;

    let memberships = sqlx::query_as::<_, MembershipRow>(
        r#"
        SELECT chat_id, user_id
        FROM chat_members
        WHERE chat_id IN (SELECT chat_id FROM chat_members WHERE user_id = ?)
        ORDER BY joined_at, rowid
        "#,
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let mut members_by_chat: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for row in memberships {
        members_by_chat.entry(row.chat_id).or_default().push(row.user_id);
    }

    let everyone: Vec<Uuid> = members_by_chat
        .values()
        .flatten()
        .copied()
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let profiles = users::find_public_many(db, &everyone).await?;
    let avatar_of = |id: &Uuid| profiles.get(id).map(|user| user.avatar.clone());

    Ok(chats
        .into_iter()
        .map(|row| {
            let members = members_by_chat.remove(&row.id).unwrap_or_default();
            let others: Vec<Uuid> = members.iter().copied().filter(|id| *id != user_id).collect();
            let avatar = if row.group_chat {
                members.iter().take(3).filter_map(avatar_of).collect()
            } else {
                others.iter().filter_map(avatar_of).collect()
            };

            ChatSummary {
                id: row.id,
                name: row.name,
                group_chat: row.group_chat,
                avatar,
                members: others,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use axum::extract::ws::Message;

    use super::*;
    use crate::channels::ChannelHandle;
    use crate::friends;
    use crate::state::testing::test_state;
    use crate::users::testing::insert_user;

    fn event_names(handle: &mut ChannelHandle) -> Vec<String> {
        let mut names = Vec::new();
        while let Ok(Message::Text(text)) = handle.rx.try_recv() {
            let event: ServerEvent = serde_json::from_str(&text).expect("event json");
            names.push(event.name().to_string());
        }
        names
    }

    async fn users(state: &AppState, count: usize) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            ids.push(insert_user(&state.writer, &format!("user{i:03}"), &format!("User {i}")).await);
        }
        ids
    }

    fn group(name: &str, members: &[Uuid]) -> NewGroupRequest {
        NewGroupRequest {
            name: name.to_string(),
            members: members.to_vec(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unrelated_groups_can_be_created_concurrently() {
        let state = test_state("chats-concurrent").await;
        let ids = users(&state, 24).await;

        let creations = ids.chunks(3).enumerate().map(|(i, trio)| {
            let state = state.clone();
            let (creator, members) = (trio[0], trio[1..].to_vec());
            tokio::spawn(async move {
                create_group(&state, creator, group(&format!("Team {i}"), &members)).await
            })
        });
        for outcome in futures::future::join_all(creations).await {
            outcome.expect("task").expect("create group");
        }

        let groups: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chats WHERE group_chat = 1")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(groups, 8);
    }

    #[tokio::test]
    async fn group_size_bounds() {
        let state = test_state("chats-bounds").await;
        let ids = users(&state, 101).await;

        let err = create_group(&state, ids[0], group("Pair", &ids[1..2]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::LimitExceeded(_)));

        let chat = create_group(&state, ids[0], group("Trio", &ids[1..3]))
            .await
            .expect("three members");
        assert_eq!(chat.members.len(), 3);
        assert_eq!(chat.creator, Some(ids[0]));
        assert!(chat.group_chat);

        let err = create_group(&state, ids[0], group("Crowd", &ids[1..101]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::LimitExceeded(_)));

        let chat = create_group(&state, ids[0], group("Full", &ids[1..100]))
            .await
            .expect("hundred members");
        assert_eq!(chat.members.len(), 100);
    }

    #[tokio::test]
    async fn creator_listed_in_members_is_counted_once() {
        let state = test_state("chats-dedup").await;
        let ids = users(&state, 3).await;

        let err = create_group(&state, ids[0], group("Echo", &[ids[0], ids[1], ids[1]]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::LimitExceeded(_)));
    }

    #[tokio::test]
    async fn unknown_member_fails_without_partial_group() {
        let state = test_state("chats-unknown").await;
        let ids = users(&state, 2).await;

        let err = create_group(&state, ids[0], group("Ghost", &[ids[1], Uuid::new_v4()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert!(list_my_chats(&state.db, ids[0], ChatFilter::All)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn add_member_notifies_everyone() {
        let state = test_state("chats-add").await;
        let ids = users(&state, 4).await;
        let chat = create_group(&state, ids[0], group("Team", &ids[1..3]))
            .await
            .expect("create");

        let mut channels: Vec<ChannelHandle> =
            ids.iter().map(|id| state.channels.register(*id)).collect();

        let chat = add_members(&state, ids[0], chat.id, vec![ids[3], ids[1]])
            .await
            .expect("add");
        assert_eq!(chat.members.len(), 4);

        for channel in channels.iter_mut() {
            let names = event_names(channel);
            assert!(names.contains(&"REFETCH_CHATS".to_string()), "{names:?}");
            assert!(names.contains(&"ALERT".to_string()), "{names:?}");
        }
    }

    #[tokio::test]
    async fn add_only_existing_members_is_silent_noop() {
        let state = test_state("chats-add-noop").await;
        let ids = users(&state, 3).await;
        let chat = create_group(&state, ids[0], group("Team", &ids[1..3]))
            .await
            .expect("create");
        let mut channel = state.channels.register(ids[1]);

        let same = add_members(&state, ids[0], chat.id, vec![ids[1], ids[2]])
            .await
            .expect("noop");
        assert_eq!(same.members, chat.members);
        assert!(event_names(&mut channel).is_empty());
    }

    #[tokio::test]
    async fn add_rules() {
        let state = test_state("chats-add-rules").await;
        let ids = users(&state, 5).await;
        let chat = create_group(&state, ids[0], group("Team", &ids[1..3]))
            .await
            .expect("create");

        let err = add_members(&state, ids[1], chat.id, vec![ids[3]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let err = add_members(&state, ids[0], Uuid::new_v4(), vec![ids[3]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = add_members(&state, ids[0], chat.id, vec![Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        let err = add_members(&state, ids[0], chat.id, vec![]).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn add_beyond_limit_fails() {
        let state = test_state("chats-add-limit").await;
        let ids = users(&state, 102).await;
        let chat = create_group(&state, ids[0], group("Full", &ids[1..100]))
            .await
            .expect("create");

        let err = add_members(&state, ids[0], chat.id, vec![ids[100], ids[101]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::LimitExceeded(_)));
        assert_eq!(load_chat(&state.db, chat.id).await.unwrap().members.len(), 100);
    }

    async fn private_chat(state: &AppState, a: Uuid, b: Uuid) -> Uuid {
        let request = friends::send_request(state, a, b).await.expect("send");
        match friends::resolve_request(state, request.id, b, true)
            .await
            .expect("accept")
        {
            friends::Resolution::Accepted { chat_id, .. } => chat_id,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn private_chat_membership_is_immutable() {
        let state = test_state("chats-private").await;
        let ids = users(&state, 3).await;
        let chat_id = private_chat(&state, ids[0], ids[1]).await;

        let err = add_members(&state, ids[0], chat_id, vec![ids[2]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));

        let err = remove_members(&state, ids[0], chat_id, vec![ids[1]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));

        let err = leave_group(&state, ids[0], chat_id).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));

        let err = rename_group(&state, ids[0], chat_id, "New").await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));
    }

    #[tokio::test]
    async fn three_member_group_cannot_shrink_to_two() {
        let state = test_state("chats-floor").await;
        let ids = users(&state, 3).await;
        let chat = create_group(&state, ids[0], group("Trio", &ids[1..3]))
            .await
            .expect("create");

        let err = remove_members(&state, ids[0], chat.id, vec![ids[2]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));

        let err = leave_group(&state, ids[1], chat.id).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));

        assert_eq!(load_chat(&state.db, chat.id).await.unwrap().members.len(), 3);
    }

    #[tokio::test]
    async fn remove_members_from_larger_group() {
        let state = test_state("chats-remove").await;
        let ids = users(&state, 5).await;
        let chat = create_group(&state, ids[0], group("Five", &ids[1..5]))
            .await
            .expect("create");
        let mut removed_channel = state.channels.register(ids[4]);

        let err = remove_members(&state, ids[0], chat.id, vec![ids[0]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidOperation(_)));

        let err = remove_members(&state, ids[1], chat.id, vec![ids[4]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));

        let updated = remove_members(&state, ids[0], chat.id, vec![ids[4], ids[3]])
            .await
            .expect("remove two");
        assert_eq!(updated.members, vec![ids[0], ids[1], ids[2]]);
        assert_eq!(event_names(&mut removed_channel), vec!["REFETCH_CHATS"]);

        let err = remove_members(&state, ids[0], chat.id, vec![ids[4]])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn creator_leaving_hands_ownership_to_earliest_member() {
        let state = test_state("chats-leave").await;
        let ids = users(&state, 5).await;
        let chat = create_group(&state, ids[0], group("Team", &ids[1..3]))
            .await
            .expect("create");
        add_members(&state, ids[0], chat.id, vec![ids[3]])
            .await
            .expect("add late member");

        let updated = leave_group(&state, ids[0], chat.id).await.expect("leave");
        assert_eq!(updated.creator, Some(ids[1]));
        assert_eq!(updated.members, vec![ids[1], ids[2], ids[3]]);

        // the new creator now holds the creator-only rights
        let renamed = rename_group(&state, ids[1], chat.id, "Renamed")
            .await
            .expect("rename by new creator");
        assert_eq!(renamed.name, "Renamed");
        let err = rename_group(&state, ids[0], chat.id, "Nope").await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_) | ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn non_creator_leaving_keeps_owner() {
        let state = test_state("chats-leave-member").await;
        let ids = users(&state, 4).await;
        let chat = create_group(&state, ids[0], group("Team", &ids[1..4]))
            .await
            .expect("create");

        let updated = leave_group(&state, ids[2], chat.id).await.expect("leave");
        assert_eq!(updated.creator, Some(ids[0]));
        assert!(!updated.is_member(ids[2]));

        let err = leave_group(&state, ids[2], chat.id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_rules() {
        let state = test_state("chats-delete").await;
        let ids = users(&state, 4).await;
        let chat = create_group(&state, ids[0], group("Team", &ids[1..3]))
            .await
            .expect("create");

        let err = delete_chat(&state, ids[1], chat.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
        delete_chat(&state, ids[0], chat.id).await.expect("creator deletes");
        assert!(matches!(
            load_chat(&state.db, chat.id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));

        let private = private_chat(&state, ids[0], ids[3]).await;
        let err = delete_chat(&state, ids[1], private).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
        delete_chat(&state, ids[3], private).await.expect("member deletes");
    }

    #[tokio::test]
    async fn details_require_membership() {
        let state = test_state("chats-details").await;
        let ids = users(&state, 4).await;
        let chat = create_group(&state, ids[0], group("Team", &ids[1..3]))
            .await
            .expect("create");

        let details = chat_details(&state, ids[1], chat.id).await.expect("details");
        assert_eq!(details.members.len(), 3);
        assert_eq!(details.members[0].id, ids[0]);

        let err = chat_details(&state, ids[3], chat.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn chat_lists_are_partitioned_by_kind() {
        let state = test_state("chats-list").await;
        let ids = users(&state, 3).await;
        let private = private_chat(&state, ids[0], ids[1]).await;
        let group_chat = create_group(&state, ids[0], group("Team", &ids[1..3]))
            .await
            .expect("create");

        let all = list_my_chats(&state.db, ids[0], ChatFilter::All)
            .await
            .expect("all");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, group_chat.id);
        assert_eq!(all[0].avatar.len(), 3);
        assert_eq!(all[1].id, private);
        assert_eq!(all[1].members, vec![ids[1]]);
        assert_eq!(all[1].avatar.len(), 1);

        let groups = list_my_chats(&state.db, ids[0], ChatFilter::GroupsOnly)
            .await
            .expect("groups");
        assert_eq!(groups.iter().map(|c| c.id).collect::<Vec<_>>(), vec![group_chat.id]);

        let outsider = list_my_chats(&state.db, ids[2], ChatFilter::All)
            .await
            .expect("outsider");
        assert_eq!(outsider.len(), 1);
    }
}
