use std::path::PathBuf;

use axum::{async_trait, body::Bytes};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::Attachment;

/// A file received from a client, before it is handed to the object store.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Bytes,
}

/// The object store that keeps binary attachments. The core only records the
/// identifiers and URLs it returns.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    async fn upload(&self, files: Vec<Upload>) -> ApiResult<Vec<Attachment>>;
    async fn delete(&self, public_ids: &[String]) -> ApiResult<()>;
}

/// Keeps attachments on local disk; the router serves `root` under `base_url`.
pub struct LocalAttachmentStore {
    root: PathBuf,
    base_url: String,
}

impl LocalAttachmentStore {
    pub async fn new(root: PathBuf, base_url: impl Into<String>) -> ApiResult<Self> {
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }
}

#[async_trait]
impl AttachmentStore for LocalAttachmentStore {
    async fn upload(&self, files: Vec<Upload>) -> ApiResult<Vec<Attachment>> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let public_id = match file.file_name.as_deref().and_then(extension) {
                Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
                None => Uuid::new_v4().to_string(),
            };

            if let Err(e) = tokio::fs::write(self.root.join(&public_id), &file.bytes).await {
                let written: Vec<String> = stored
                    .iter()
                    .map(|a: &Attachment| a.public_id.clone())
                    .collect();
                if let Err(cleanup) = self.delete(&written).await {
                    tracing::warn!(component = "attachments", error = %cleanup, "failed to clean up partial upload");
                }
                return Err(ApiError::from(e));
            }

            stored.push(Attachment {
                url: format!("{}/{}", self.base_url, public_id),
                public_id,
            });
        }

        tracing::info!(component = "attachments", count = stored.len(), "stored attachments");
        Ok(stored)
    }

    async fn delete(&self, public_ids: &[String]) -> ApiResult<()> {
        for public_id in public_ids {
            if !is_plain_file_name(public_id) {
                tracing::warn!(component = "attachments", %public_id, "refusing to delete suspicious id");
                continue;
            }
            match tokio::fs::remove_file(self.root.join(public_id)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext)
}

fn is_plain_file_name(value: &str) -> bool {
    !value.is_empty()
        && value != "."
        && value != ".."
        && !value.contains(['/', '\\'])
}
