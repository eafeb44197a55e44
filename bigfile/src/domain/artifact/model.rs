use std::path::PathBuf;

use crate::utils::digest::ContentDigest;

/// A finalized artifact as seen through the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactInfo {
    pub digest: ContentDigest,
    /// Stored file name, `<digest><extension>`.
    pub file_name: String,
    pub extension: String,
    pub length: u64,
    pub path: PathBuf,
}
