use std::path::PathBuf;

use crate::storage::paths::PathManager;
use crate::utils::digest::DigestAlgorithm;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub root_dir: PathBuf,
    /// Session directories, `<root>/temp`.
    pub chunk_root: PathBuf,
    /// Finalized artifacts, `<root>/uploads`.
    pub artifact_root: PathBuf,
    /// Spooled multipart bodies, `<root>/temp/uploads`.
    pub spool_dir: PathBuf,
    pub digest_algorithm: DigestAlgorithm,
    pub max_chunk_bytes: usize,
}

impl Config {
    /// Derives the directory layout from `root_dir`.
    pub fn with_root(
        host: impl Into<String>,
        port: u16,
        root_dir: impl Into<PathBuf>,
        digest_algorithm: DigestAlgorithm,
        max_chunk_bytes: usize,
    ) -> Self {
        let root_dir = root_dir.into();
        let chunk_root = root_dir.join("temp");
        Config {
            host: host.into(),
            port,
            spool_dir: chunk_root.join("uploads"),
            artifact_root: root_dir.join("uploads"),
            chunk_root,
            root_dir,
            digest_algorithm,
            max_chunk_bytes,
        }
    }

    pub fn path_manager(&self) -> PathManager {
        PathManager::new(&self.chunk_root, &self.artifact_root)
    }
}
