use std::fmt;
use std::path::PathBuf;

use crate::utils::digest::ContentDigest;

/// Identifies one upload session: the claimed content digest plus the uploader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadKey {
    pub digest: ContentDigest,
    pub uploader_id: String,
}

impl UploadKey {
    pub fn new(digest: ContentDigest, uploader_id: impl Into<String>) -> Self {
        Self {
            digest,
            uploader_id: uploader_id.into(),
        }
    }
}

impl fmt::Display for UploadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.uploader_id, self.digest)
    }
}

/// A validated chunk submission. The session totals are re-declared by the
/// client on every chunk and never stored server-side.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub key: UploadKey,
    /// 1-based.
    pub index: u32,
    pub declared_total: u32,
    pub declared_length: u64,
    pub declared_name: String,
}

/// Result of a completeness evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The session still lacks some index in `1..=declared_total`.
    Pending { received: usize },
    /// The artifact was verified and is resolvable at `path`.
    Committed { path: PathBuf },
}

/// Computed upload status; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatusView {
    NotExist,
    Complete,
    Incomplete { chunk_count: usize },
}
