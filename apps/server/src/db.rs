use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        name TEXT NOT NULL,
        username TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        description TEXT NOT NULL,
        avatar_public_id TEXT NOT NULL,
        avatar_url TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
    // pair_low/pair_high hold the ordered pair, so the unique index covers both directions.
    r#"
    CREATE TABLE IF NOT EXISTS friend_requests (
        id BLOB PRIMARY KEY,
        sender_id BLOB NOT NULL REFERENCES users(id),
        receiver_id BLOB NOT NULL REFERENCES users(id),
        pair_low BLOB NOT NULL,
        pair_high BLOB NOT NULL,
        created_at INTEGER NOT NULL,
        CHECK (sender_id <> receiver_id),
        UNIQUE (pair_low, pair_high)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver ON friend_requests(receiver_id)",
    r#"
    CREATE TABLE IF NOT EXISTS chats (
        id BLOB PRIMARY KEY,
        name TEXT NOT NULL,
        group_chat INTEGER NOT NULL,
        creator_id BLOB REFERENCES users(id),
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_members (
        chat_id BLOB NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
        user_id BLOB NOT NULL REFERENCES users(id),
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (chat_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_members_user ON chat_members(user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id BLOB PRIMARY KEY,
        chat_id BLOB NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
        sender_id BLOB NOT NULL REFERENCES users(id),
        content TEXT NOT NULL,
        attachments TEXT NOT NULL DEFAULT '[]',
        created_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_chat_time ON messages(chat_id, created_at DESC)",
];

/// The two pools over one database file. `writer` holds a single connection and
/// carries every write, so write transactions queue on it instead of racing for
/// the SQLite write lock mid-transaction. `reader` serves everything else; WAL
/// keeps readers off the writer's way.
#[derive(Clone)]
pub struct Database {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

/// Open (or create) the database behind `url` and make sure the schema exists.
pub async fn connect(url: &str) -> Result<Database, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    open(options).await
}

pub async fn connect_path(path: &Path) -> Result<Database, sqlx::Error> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    open(options).await
}

async fn open(options: SqliteConnectOptions) -> Result<Database, sqlx::Error> {
    let writer = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options.clone())
        .await?;
    init_schema(&writer).await?;

    let reader = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(Database { reader, writer })
}

async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn from_millis(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
