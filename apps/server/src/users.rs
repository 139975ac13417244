use std::collections::HashMap;

use serde::Deserialize;
use sqlx::{Executor, QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;
use validator::Validate;

use crate::attachments::Upload;
use crate::auth::{hash_password, verify_password};
use crate::db::now_millis;
use crate::error::{ApiError, ApiResult};
use crate::models::{User, UserProfile, UserPublic};
use crate::state::AppState;
use crate::validation::{normalize_username, validate_display_name, validate_username};

const SEARCH_LIMIT: i64 = 20;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_display_name"))]
    pub name: String,
    #[validate(length(min = 3, max = 32), custom(function = "validate_username"))]
    pub username: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
    #[validate(length(min = 1, max = 500))]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 32))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// Create an account and return it with a fresh session token.
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
    avatar: Option<Upload>,
) -> ApiResult<(UserProfile, String)> {
    req.validate()?;
    let avatar = avatar.ok_or_else(|| ApiError::validation("Please Upload Avatar"))?;

    let username = normalize_username(&req.username);
    let password_hash = hash_password(&req.password)?;

    let stored = state
        .attachments
        .upload(vec![avatar])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::internal("attachment store returned no avatar"))?;

    let user_id = Uuid::new_v4();
    let inserted = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, name, username, password_hash, description, avatar_public_id, avatar_url, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(req.name.trim())
    .bind(&username)
    .bind(&password_hash)
    .bind(req.description.trim())
    .bind(&stored.public_id)
    .bind(&stored.url)
    .bind(now_millis())
    .fetch_one(&state.writer)
    .await;

    let user = match inserted {
        Ok(user) => user,
        Err(e) => {
            if let Err(cleanup) = state.attachments.delete(&[stored.public_id]).await {
                tracing::warn!(component = "users", error = %cleanup, "failed to clean up avatar");
            }
            return Err(match ApiError::from(e) {
                ApiError::Conflict(_) => ApiError::conflict("Username is already taken"),
                other => other,
            });
        }
    };

    let token = state.sessions.issue(user.id)?;
    tracing::info!(component = "users", user_id = %user.id, "user registered");
    Ok((user.into(), token))
}

/// Check credentials. Unknown users and wrong passwords look the same to the caller.
pub async fn login(state: &AppState, req: LoginRequest) -> ApiResult<(UserProfile, String)> {
    req.validate()?;

    let username = normalize_username(&req.username);
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| ApiError::not_found("Invalid username or password"))?;

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(ApiError::not_found("Invalid username or password"));
    }

    let token = state.sessions.issue(user.id)?;
    tracing::info!(component = "users", user_id = %user.id, "user logged in");
    Ok((user.into(), token))
}

pub async fn find_user(db: &SqlitePool, user_id: Uuid) -> ApiResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))
}

pub async fn profile(db: &SqlitePool, user_id: Uuid) -> ApiResult<UserProfile> {
    Ok(find_user(db, user_id).await?.into())
}

/// Resolve ids to public identity fields. Unknown ids are absent from the map.
pub async fn find_public_many<'e, E>(executor: E, ids: &[Uuid]) -> ApiResult<HashMap<Uuid, UserPublic>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let mut query =
        QueryBuilder::<Sqlite>::new("SELECT id, name, avatar_url AS avatar FROM users WHERE id IN (");
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let users = query.build_query_as::<UserPublic>().fetch_all(executor).await?;
    Ok(users.into_iter().map(|user| (user.id, user)).collect())
}

/// Fails with NotFound unless every id names an existing user.
pub async fn ensure_exist<'e, E>(executor: E, ids: &[Uuid]) -> ApiResult<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let found = find_public_many(executor, ids).await?;
    match ids.iter().find(|id| !found.contains_key(id)) {
        Some(missing) => Err(ApiError::not_found(format!("User {missing} not found"))),
        None => Ok(()),
    }
}

/// Users whose display name contains `name`, minus the caller and the caller's friends.
pub async fn search(db: &SqlitePool, user_id: Uuid, name: &str) -> ApiResult<Vec<UserPublic>> {
    let pattern = format!("%{}%", escape_like(name.trim()));
    let users = sqlx::query_as::<_, UserPublic>(
        r#"
        SELECT id, name, avatar_url AS avatar
        FROM users
        WHERE id <> ?1
          AND name LIKE ?2 ESCAPE '\'
          AND id NOT IN (
              SELECT other.user_id
              FROM chat_members mine
              JOIN chats c ON c.id = mine.chat_id AND c.group_chat = 0
              JOIN chat_members other ON other.chat_id = c.id
              WHERE mine.user_id = ?1
          )
        ORDER BY name
        LIMIT ?3
        "#,
    )
    .bind(user_id)
    .bind(pattern)
    .bind(SEARCH_LIMIT)
    .fetch_all(db)
    .await?;

    Ok(users)
}

fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
