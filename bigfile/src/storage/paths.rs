// PathManager maps upload sessions and artifacts onto the filesystem.
//
// The path layout in the storage backend is as follows:
//
//	<chunk root>
//	└── <uploader id>_<digest>
//	    ├── 1
//	    ├── 2
//	    └── ...
//	<artifact root>
//	└── <digest><extension>
//
// Temporary files are dot-prefixed and live next to their final name, so a
// rename never crosses a filesystem and never matches a chunk index or a
// digest prefix.

use std::path::{Path, PathBuf};

use crate::domain::upload::model::UploadKey;
use crate::utils::digest::ContentDigest;

#[derive(Clone, Debug)]
pub struct PathManager {
    chunk_root: PathBuf,
    artifact_root: PathBuf,
}

impl PathManager {
    pub fn new(chunk_root: impl Into<PathBuf>, artifact_root: impl Into<PathBuf>) -> Self {
        PathManager {
            chunk_root: chunk_root.into(),
            artifact_root: artifact_root.into(),
        }
    }

    /// Returns the root of all upload sessions, (e.g. `<chunk root>`).
    pub fn chunk_root(&self) -> &Path {
        &self.chunk_root
    }

    /// Returns the flat artifact directory, (e.g. `<artifact root>`).
    pub fn artifact_root(&self) -> &Path {
        &self.artifact_root
    }

    /// Returns the directory of a single upload session,
    /// (e.g. `<chunk root>/<uploader id>_<digest>`).
    pub fn session_path(&self, key: &UploadKey) -> PathBuf {
        self.chunk_root.join(key.to_string())
    }

    /// Returns the path of a single chunk,
    /// (e.g. `<chunk root>/<uploader id>_<digest>/<index>`).
    pub fn chunk_path(&self, key: &UploadKey, index: u32) -> PathBuf {
        self.session_path(key).join(index.to_string())
    }

    /// Returns the content-addressed path of an artifact,
    /// (e.g. `<artifact root>/<digest><extension>`).
    pub fn artifact_path(&self, digest: &ContentDigest, extension: &str) -> PathBuf {
        self.artifact_root.join(format!("{digest}{extension}"))
    }

    /// Returns a unique sibling of `path` for staging writes,
    /// (e.g. `<dir>/.<name>.tmp.<uuid>`).
    pub fn temp_sibling(path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        path.with_file_name(format!(".{name}.tmp.{}", uuid::Uuid::new_v4()))
    }
}
