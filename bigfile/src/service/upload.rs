use std::sync::Arc;

use crate::domain::artifact::model::ArtifactInfo;
use crate::domain::upload::model::{ChunkUpload, MergeOutcome, UploadKey, UploadStatusView};
use crate::error::AppError;
use crate::service::assembly::AssemblyEngine;
use crate::service::range::{ArtifactStream, RangeReader};
use crate::service::status::StatusResolver;
use crate::storage::driver::filesystem::{FilesystemArtifactStore, FilesystemChunkStore};
use crate::storage::paths::PathManager;
use crate::storage::{ArtifactStore, ChunkSource, ChunkStore};
use crate::utils::digest::{ContentDigest, DigestAlgorithm};

/// A resolved artifact together with a stream over the requested suffix.
pub struct ArtifactDownload {
    pub info: ArtifactInfo,
    pub content: ArtifactStream,
}

/// The operations offered to the transport layer.
pub struct UploadService {
    chunks: Arc<dyn ChunkStore>,
    artifacts: Arc<dyn ArtifactStore>,
    engine: AssemblyEngine,
    status: StatusResolver,
    algorithm: DigestAlgorithm,
}

impl UploadService {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        artifacts: Arc<dyn ArtifactStore>,
        algorithm: DigestAlgorithm,
    ) -> Self {
        Self {
            engine: AssemblyEngine::new(chunks.clone(), artifacts.clone(), algorithm),
            status: StatusResolver::new(chunks.clone(), artifacts.clone()),
            chunks,
            artifacts,
            algorithm,
        }
    }

    pub fn filesystem(path_manager: PathManager, algorithm: DigestAlgorithm) -> Self {
        Self::new(
            Arc::new(FilesystemChunkStore::new(path_manager.clone())),
            Arc::new(FilesystemArtifactStore::new(path_manager)),
            algorithm,
        )
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// Stores one chunk and merges the session if it is now complete.
    pub async fn accept_chunk(
        &self,
        upload: ChunkUpload,
        source: ChunkSource,
    ) -> Result<MergeOutcome, AppError> {
        let ChunkUpload {
            key,
            index,
            declared_total,
            declared_length,
            declared_name,
        } = upload;

        if index > declared_total {
            tracing::warn!(
                "chunk {} of {} is beyond the declared total {} and will not be merged",
                index,
                key,
                declared_total
            );
        }
        tracing::debug!(
            "accepting chunk {}/{} of {} ({}, {} bytes declared)",
            index,
            declared_total,
            key,
            declared_name,
            declared_length
        );

        self.chunks.write_chunk(&key, index, source).await?;
        self.engine
            .try_complete(&key, declared_total, &declared_name)
            .await
    }

    pub async fn query_status(&self, key: &UploadKey) -> Result<UploadStatusView, AppError> {
        self.status.status(key).await
    }

    /// Resolves `digest` and opens it at `offset`.
    pub async fn fetch_artifact(
        &self,
        digest: &ContentDigest,
        offset: u64,
    ) -> Result<ArtifactDownload, AppError> {
        let info = self
            .artifacts
            .resolve(digest)
            .await?
            .ok_or_else(|| AppError::ArtifactNotFound(digest.to_string()))?;
        let content = RangeReader::open_from(&info.path, offset).await?;
        Ok(ArtifactDownload { info, content })
    }
}
