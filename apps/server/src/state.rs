use std::sync::Arc;

use sqlx::SqlitePool;

use crate::attachments::{AttachmentStore, LocalAttachmentStore};
use crate::auth::SessionKeys;
use crate::channels::ChannelRegistry;
use crate::config::ServerConfig;
use crate::db::Database;
use crate::error::ApiResult;

#[derive(Clone)]
pub struct AppState {
    /// Read pool
    pub db: SqlitePool,
    /// Single-connection pool every write goes through
    pub writer: SqlitePool,
    /// Live real-time channels, keyed by identity id
    pub channels: ChannelRegistry,
    pub sessions: SessionKeys,
    pub attachments: Arc<dyn AttachmentStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(
        database: Database,
        config: ServerConfig,
        attachments: Arc<dyn AttachmentStore>,
    ) -> Self {
        Self {
            db: database.reader,
            writer: database.writer,
            channels: ChannelRegistry::new(),
            sessions: SessionKeys::from_config(&config),
            attachments,
            config: Arc::new(config),
        }
    }

    /// State backed by the local-disk attachment store configured in `config`.
    pub async fn with_local_store(database: Database, config: ServerConfig) -> ApiResult<Self> {
        let store =
            LocalAttachmentStore::new(config.upload_dir.clone(), config.upload_base_url.clone())
                .await?;
        Ok(Self::new(database, config, Arc::new(store)))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use uuid::Uuid;

    use super::*;
    use crate::db::testing::temp_database;

    pub async fn test_state(prefix: &str) -> AppState {
        let database = temp_database(prefix).await;
        let upload_dir = std::env::temp_dir().join(format!("{prefix}-uploads-{}", Uuid::new_v4()));
        AppState::with_local_store(database, ServerConfig::for_tests(upload_dir))
            .await
            .expect("test state")
    }
}
