use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::io;

use crate::domain::upload::model::{MergeOutcome, UploadKey};
use crate::error::AppError;
use crate::storage::{ArtifactStore, ArtifactUpload, ChunkStore};
use crate::utils::digest::DigestAlgorithm;
use crate::utils::keyed_lock::KeyedMutex;
use crate::utils::validation::extension_of;

/// True iff every index in `1..=declared_total` is present. Indices above
/// the declared total are ignored.
pub fn is_complete(present: &BTreeSet<u32>, declared_total: u32) -> bool {
    declared_total > 0 && (1..=declared_total).all(|index| present.contains(&index))
}

/// Decides when a session is complete and merges it into a verified artifact.
pub struct AssemblyEngine {
    chunks: Arc<dyn ChunkStore>,
    artifacts: Arc<dyn ArtifactStore>,
    algorithm: DigestAlgorithm,
    locks: KeyedMutex<UploadKey>,
}

impl AssemblyEngine {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        artifacts: Arc<dyn ArtifactStore>,
        algorithm: DigestAlgorithm,
    ) -> Self {
        Self {
            chunks,
            artifacts,
            algorithm,
            locks: KeyedMutex::new(),
        }
    }

    /// Merges the session if all chunks are present.
    ///
    /// Attempts for the same key are serialized. A caller that waited for an
    /// in-flight merge which already committed receives that commit instead
    /// of `Pending`.
    ///
    /// On digest mismatch the staged artifact is discarded and the chunks are
    /// kept so the client can retry without re-uploading them.
    pub async fn try_complete(
        &self,
        key: &UploadKey,
        declared_total: u32,
        declared_name: &str,
    ) -> Result<MergeOutcome, AppError> {
        let _guard = self.locks.lock(key.clone()).await;

        let present = self.chunks.list_indices(key).await?;
        if !is_complete(&present, declared_total) {
            if !self.chunks.session_exists(key).await? {
                if let Some(info) = self.artifacts.resolve(&key.digest).await? {
                    tracing::debug!("{} was merged by a concurrent attempt", key);
                    return Ok(MergeOutcome::Committed { path: info.path });
                }
            }
            let received = present.iter().filter(|&&index| index <= declared_total).count();
            tracing::debug!("{}: {}/{} chunks present", key, received, declared_total);
            return Ok(MergeOutcome::Pending { received });
        }

        let extension = extension_of(declared_name);
        tracing::info!(
            "merging {} chunks of {} into {}{}",
            declared_total,
            key,
            key.digest,
            extension
        );

        let mut upload = self.artifacts.begin(&key.digest, &extension).await?;
        let actual = match self.stage(key, declared_total, upload.as_mut()).await {
            Ok(actual) => actual,
            Err(err) => {
                discard(upload).await;
                return Err(err);
            }
        };

        if actual != key.digest.as_str() {
            tracing::warn!(
                "digest mismatch for {}: expected {}, got {}",
                key,
                key.digest,
                actual
            );
            discard(upload).await;
            return Err(AppError::DigestMismatch {
                expected: key.digest.to_string(),
                actual,
            });
        }

        let path = upload.commit().await?;
        self.chunks.remove_session(key).await?;
        tracing::info!("committed {} as {}", key, path.display());
        Ok(MergeOutcome::Committed { path })
    }

    /// Appends chunks `1..=declared_total` in ascending order, flushes, and
    /// hashes the staged result.
    async fn stage(
        &self,
        key: &UploadKey,
        declared_total: u32,
        upload: &mut dyn ArtifactUpload,
    ) -> Result<String, AppError> {
        for index in 1..=declared_total {
            let mut reader = match self.chunks.open_chunk(key, index).await {
                Ok(reader) => reader,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(AppError::ChunkVanished(index));
                }
                Err(err) => return Err(err.into()),
            };
            upload.append(&mut reader).await?;
        }
        let written = upload.finish().await?;
        tracing::debug!("staged {} bytes for {}", written, key);
        Ok(upload.checksum(self.algorithm).await?)
    }
}

async fn discard(upload: Box<dyn ArtifactUpload>) {
    if let Err(err) = upload.abort().await {
        tracing::error!("failed to discard staged artifact: {}", err);
    }
}
