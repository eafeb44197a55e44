use std::collections::BTreeSet;
use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::{self, AsyncRead};

use crate::domain::artifact::model::ArtifactInfo;
use crate::domain::upload::model::UploadKey;
use crate::error::AppError;
use crate::utils::digest::{ContentDigest, DigestAlgorithm};

pub mod driver;
pub mod paths;

pub type ChunkReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where the bytes of an incoming chunk currently live.
#[derive(Debug, Clone)]
pub enum ChunkSource {
    /// A spooled temporary file; it is moved into place and may be removed
    /// concurrently by an external sweep.
    TempFile(PathBuf),
    Bytes(Bytes),
}

/// Per-session storage of numbered chunk blobs.
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persists `source` as chunk `index`, replacing any previous content.
    async fn write_chunk(
        &self,
        key: &UploadKey,
        index: u32,
        source: ChunkSource,
    ) -> Result<(), AppError>;
    /// Indices present in the session; empty when the session does not exist.
    async fn list_indices(&self, key: &UploadKey) -> io::Result<BTreeSet<u32>>;
    async fn session_exists(&self, key: &UploadKey) -> io::Result<bool>;
    async fn open_chunk(&self, key: &UploadKey, index: u32) -> io::Result<ChunkReader>;
    /// Removes the whole session; a missing session is not an error.
    async fn remove_session(&self, key: &UploadKey) -> io::Result<()>;
}

/// Content-addressed store of finalized artifacts. There is no insert: an
/// artifact becomes resolvable once an [`ArtifactUpload`] is committed.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn resolve(&self, digest: &ContentDigest) -> io::Result<Option<ArtifactInfo>>;

    async fn exists(&self, digest: &ContentDigest) -> io::Result<bool> {
        Ok(self.resolve(digest).await?.is_some())
    }

    /// Starts staging the artifact `<digest><extension>`.
    async fn begin(
        &self,
        digest: &ContentDigest,
        extension: &str,
    ) -> io::Result<Box<dyn ArtifactUpload>>;
}

/// A staged artifact, invisible to [`ArtifactStore::resolve`] until committed.
#[async_trait::async_trait]
pub trait ArtifactUpload: Send {
    /// Appends everything `reader` yields; returns the number of bytes copied.
    async fn append(&mut self, reader: &mut ChunkReader) -> io::Result<u64>;
    /// Flushes staged content to durable storage; returns the staged length.
    async fn finish(&mut self) -> io::Result<u64>;
    /// Hashes the staged content in a separate full pass.
    async fn checksum(&mut self, algorithm: DigestAlgorithm) -> io::Result<String>;
    /// Publishes the artifact under its content-addressed name.
    async fn commit(self: Box<Self>) -> io::Result<PathBuf>;
    /// Discards the staged content.
    async fn abort(self: Box<Self>) -> io::Result<()>;
}
