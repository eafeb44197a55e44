use std::sync::Arc;

use crate::domain::upload::model::{UploadKey, UploadStatusView};
use crate::error::AppError;
use crate::storage::{ArtifactStore, ChunkStore};

/// Derives upload status from the registry first, then the chunk store.
/// A finished artifact always wins over a lingering session directory.
pub struct StatusResolver {
    chunks: Arc<dyn ChunkStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl StatusResolver {
    pub fn new(chunks: Arc<dyn ChunkStore>, artifacts: Arc<dyn ArtifactStore>) -> Self {
        Self { chunks, artifacts }
    }

    pub async fn status(&self, key: &UploadKey) -> Result<UploadStatusView, AppError> {
        if self.artifacts.exists(&key.digest).await? {
            return Ok(UploadStatusView::Complete);
        }
        if self.chunks.session_exists(key).await? {
            let chunk_count = self.chunks.list_indices(key).await?.len();
            return Ok(UploadStatusView::Incomplete { chunk_count });
        }
        Ok(UploadStatusView::NotExist)
    }
}
