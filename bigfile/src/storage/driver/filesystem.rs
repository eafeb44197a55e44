use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::domain::artifact::model::ArtifactInfo;
use crate::domain::upload::model::UploadKey;
use crate::error::AppError;
use crate::storage::paths::PathManager;
use crate::storage::{ArtifactStore, ArtifactUpload, ChunkReader, ChunkSource, ChunkStore};
use crate::utils::digest::{ContentDigest, DigestAlgorithm, digest_reader};

use tempfile::TempPath;
use tokio::{
    fs::{
        File, create_dir_all, metadata, read_dir, remove_dir_all, remove_file, rename, try_exists,
    },
    io::{self, AsyncWriteExt, BufWriter},
};

async fn ensure_dir(path: &Path) -> io::Result<()> {
    match create_dir_all(path).await {
        Err(err) if err.kind() != io::ErrorKind::AlreadyExists => Err(err),
        _ => Ok(()),
    }
}

async fn remove_if_exists(path: &Path) -> io::Result<()> {
    match remove_file(path).await {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

/// Writes `data` to a temp sibling of `dest`, fsyncs, then renames into place.
/// The temp sibling is removed on every exit short of the rename, including
/// cancellation.
async fn write_atomic(dest: &Path, data: &[u8]) -> io::Result<()> {
    let temp_path = TempPath::from_path(PathManager::temp_sibling(dest));
    let mut file = File::create(&temp_path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);
    rename(&temp_path, dest).await?;
    temp_path.keep()?;
    Ok(())
}

/// Copies `src` to a temp sibling of `dest`, fsyncs, then renames into place.
async fn copy_atomic(src: &Path, dest: &Path) -> io::Result<()> {
    let temp_path = TempPath::from_path(PathManager::temp_sibling(dest));
    let mut reader = File::open(src).await?;
    let mut file = File::create(&temp_path).await?;
    tokio::io::copy(&mut reader, &mut file).await?;
    file.sync_all().await?;
    drop(file);
    rename(&temp_path, dest).await?;
    temp_path.keep()?;
    Ok(())
}

pub struct FilesystemChunkStore {
    path_manager: PathManager,
}

impl FilesystemChunkStore {
    pub fn new(path_manager: PathManager) -> Self {
        FilesystemChunkStore { path_manager }
    }

    /// Moves a spooled temp file into place. The source may be swept away
    /// by an external cleanup at any point, so a failed rename is retried
    /// once as copy-then-delete if the source still exists.
    async fn move_temp_file(&self, src: &Path, dest: &Path) -> Result<(), AppError> {
        let err = match rename(src, dest).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if !matches!(
            err.kind(),
            io::ErrorKind::NotFound | io::ErrorKind::CrossesDevices
        ) {
            return Err(err.into());
        }
        if !try_exists(src).await? {
            return Err(AppError::SourceLost(src.to_path_buf()));
        }

        tracing::warn!(
            "rename of {} failed ({}), falling back to copy",
            src.display(),
            err
        );
        if let Some(parent) = dest.parent() {
            ensure_dir(parent).await?;
        }
        if let Err(err) = copy_atomic(src, dest).await {
            if err.kind() == io::ErrorKind::NotFound && !try_exists(src).await? {
                return Err(AppError::SourceLost(src.to_path_buf()));
            }
            return Err(err.into());
        }
        remove_if_exists(src).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ChunkStore for FilesystemChunkStore {
    async fn write_chunk(
        &self,
        key: &UploadKey,
        index: u32,
        source: ChunkSource,
    ) -> Result<(), AppError> {
        if let ChunkSource::TempFile(src) = &source {
            // Checked before the session directory is created so a lost
            // source does not leave an empty session behind.
            if !try_exists(src).await? {
                return Err(AppError::SourceLost(src.clone()));
            }
        }
        ensure_dir(&self.path_manager.session_path(key)).await?;
        let dest = self.path_manager.chunk_path(key, index);
        match source {
            ChunkSource::Bytes(data) => write_atomic(&dest, &data).await?,
            ChunkSource::TempFile(src) => self.move_temp_file(&src, &dest).await?,
        }
        tracing::debug!("stored chunk {} of {}", index, key);
        Ok(())
    }

    async fn list_indices(&self, key: &UploadKey) -> io::Result<BTreeSet<u32>> {
        let mut indices = BTreeSet::new();
        let mut entries = match read_dir(self.path_manager.session_path(key)).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(indices),
            Err(err) => return Err(err),
        };
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            // Only canonical decimal names count; temp files and strays such as "01" do not.
            if let Ok(index) = name.parse::<u32>() {
                if index > 0 && index.to_string() == name {
                    indices.insert(index);
                }
            }
        }
        Ok(indices)
    }

    async fn session_exists(&self, key: &UploadKey) -> io::Result<bool> {
        match metadata(self.path_manager.session_path(key)).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn open_chunk(&self, key: &UploadKey, index: u32) -> io::Result<ChunkReader> {
        let file = File::open(self.path_manager.chunk_path(key, index)).await?;
        Ok(Box::new(file))
    }

    async fn remove_session(&self, key: &UploadKey) -> io::Result<()> {
        match remove_dir_all(self.path_manager.session_path(key)).await {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}

pub struct FilesystemArtifactStore {
    path_manager: PathManager,
}

impl FilesystemArtifactStore {
    pub fn new(path_manager: PathManager) -> Self {
        FilesystemArtifactStore { path_manager }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    // Linear in the number of artifacts: the directory itself is the index.
    async fn resolve(&self, digest: &ContentDigest) -> io::Result<Option<ArtifactInfo>> {
        let mut entries = match read_dir(self.path_manager.artifact_root()).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        let mut found: Option<(String, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Some(rest) = name.strip_prefix(digest.as_str()) else {
                continue;
            };
            if !(rest.is_empty() || rest.starts_with('.')) {
                continue;
            }
            if !entry.file_type().await?.is_file() {
                continue;
            }
            // Same content stored under several extensions: pick deterministically.
            if found.as_ref().is_none_or(|(current, _)| name < *current) {
                found = Some((name, entry.path()));
            }
        }

        let Some((file_name, path)) = found else {
            return Ok(None);
        };
        let length = match metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };
        Ok(Some(ArtifactInfo {
            digest: digest.clone(),
            extension: file_name[digest.as_str().len()..].to_string(),
            file_name,
            length,
            path,
        }))
    }

    async fn begin(
        &self,
        digest: &ContentDigest,
        extension: &str,
    ) -> io::Result<Box<dyn ArtifactUpload>> {
        ensure_dir(self.path_manager.artifact_root()).await?;
        let final_path = self.path_manager.artifact_path(digest, extension);
        let temp_path = TempPath::from_path(PathManager::temp_sibling(&final_path));
        let file = File::create(&temp_path).await?;
        Ok(Box::new(FilesystemArtifactUpload {
            writer: BufWriter::new(file),
            temp_path,
            final_path,
            bytes_written: 0,
        }))
    }
}

/// Artifact staged under a hidden temp name next to its final path. The
/// staged file is deleted when the upload is dropped without a commit, so a
/// merge abandoned mid-way does not leave it in the artifact root.
struct FilesystemArtifactUpload {
    writer: BufWriter<File>,
    temp_path: TempPath,
    final_path: PathBuf,
    bytes_written: u64,
}

#[async_trait::async_trait]
impl ArtifactUpload for FilesystemArtifactUpload {
    async fn append(&mut self, reader: &mut ChunkReader) -> io::Result<u64> {
        let copied = tokio::io::copy(reader, &mut self.writer).await?;
        self.bytes_written += copied;
        Ok(copied)
    }

    async fn finish(&mut self) -> io::Result<u64> {
        self.writer.flush().await?;
        self.writer.get_ref().sync_all().await?;
        Ok(self.bytes_written)
    }

    async fn checksum(&mut self, algorithm: DigestAlgorithm) -> io::Result<String> {
        let mut file = File::open(&self.temp_path).await?;
        digest_reader(algorithm, &mut file).await
    }

    async fn commit(self: Box<Self>) -> io::Result<PathBuf> {
        let FilesystemArtifactUpload {
            writer,
            temp_path,
            final_path,
            ..
        } = *self;
        drop(writer);
        rename(&temp_path, &final_path).await?;
        temp_path.keep()?;
        Ok(final_path)
    }

    async fn abort(self: Box<Self>) -> io::Result<()> {
        let FilesystemArtifactUpload {
            writer, temp_path, ..
        } = *self;
        drop(writer);
        let temp_path = temp_path.keep()?;
        remove_if_exists(&temp_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::digest::digest_bytes;
    use bytes::Bytes;
    use tokio::io::AsyncReadExt;

    fn digest_of(data: &[u8]) -> ContentDigest {
        ContentDigest::parse(DigestAlgorithm::Md5, &digest_bytes(DigestAlgorithm::Md5, data))
            .unwrap()
    }

    fn stores(root: &Path) -> (PathManager, FilesystemChunkStore, FilesystemArtifactStore) {
        let pm = PathManager::new(root.join("temp"), root.join("uploads"));
        (
            pm.clone(),
            FilesystemChunkStore::new(pm.clone()),
            FilesystemArtifactStore::new(pm),
        )
    }

    #[tokio::test]
    async fn test_write_and_list_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let (pm, chunks, _) = stores(tmp.path());
        let key = UploadKey::new(digest_of(b"x"), "alice");

        assert!(!chunks.session_exists(&key).await.unwrap());
        assert!(chunks.list_indices(&key).await.unwrap().is_empty());

        chunks
            .write_chunk(&key, 2, ChunkSource::Bytes(Bytes::from_static(b"CD")))
            .await
            .unwrap();
        chunks
            .write_chunk(&key, 10, ChunkSource::Bytes(Bytes::from_static(b"ZZ")))
            .await
            .unwrap();
        // Stray files that are not canonical indices are ignored.
        tokio::fs::write(pm.session_path(&key).join("01"), b"?").await.unwrap();
        tokio::fs::write(pm.session_path(&key).join(".3.tmp.abc"), b"?")
            .await
            .unwrap();

        assert!(chunks.session_exists(&key).await.unwrap());
        let indices: Vec<u32> = chunks.list_indices(&key).await.unwrap().into_iter().collect();
        assert_eq!(indices, vec![2, 10]);
    }

    #[tokio::test]
    async fn test_rewrite_chunk_last_write_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, chunks, _) = stores(tmp.path());
        let key = UploadKey::new(digest_of(b"x"), "alice");

        chunks
            .write_chunk(&key, 1, ChunkSource::Bytes(Bytes::from_static(b"old")))
            .await
            .unwrap();
        chunks
            .write_chunk(&key, 1, ChunkSource::Bytes(Bytes::from_static(b"new")))
            .await
            .unwrap();

        let mut reader = chunks.open_chunk(&key, 1).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"new");
    }

    #[tokio::test]
    async fn test_temp_file_is_moved() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, chunks, _) = stores(tmp.path());
        let key = UploadKey::new(digest_of(b"x"), "alice");
        let spooled = tmp.path().join("spooled");
        tokio::fs::write(&spooled, b"AB").await.unwrap();

        chunks
            .write_chunk(&key, 1, ChunkSource::TempFile(spooled.clone()))
            .await
            .unwrap();

        assert!(!spooled.exists());
        let mut reader = chunks.open_chunk(&key, 1).await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"AB");
    }

    #[tokio::test]
    async fn test_missing_temp_file_is_source_lost() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, chunks, _) = stores(tmp.path());
        let key = UploadKey::new(digest_of(b"x"), "alice");

        let err = chunks
            .write_chunk(&key, 1, ChunkSource::TempFile(tmp.path().join("gone")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SourceLost(_)));
        assert!(!chunks.session_exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_session_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, chunks, _) = stores(tmp.path());
        let key = UploadKey::new(digest_of(b"x"), "alice");

        chunks
            .write_chunk(&key, 1, ChunkSource::Bytes(Bytes::from_static(b"A")))
            .await
            .unwrap();
        chunks.remove_session(&key).await.unwrap();
        chunks.remove_session(&key).await.unwrap();
        assert!(!chunks.session_exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_staged_artifact_invisible_until_commit() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, chunks, artifacts) = stores(tmp.path());
        let digest = digest_of(b"AB");
        let key = UploadKey::new(digest.clone(), "alice");
        chunks
            .write_chunk(&key, 1, ChunkSource::Bytes(Bytes::from_static(b"AB")))
            .await
            .unwrap();

        let mut upload = artifacts.begin(&digest, ".bin").await.unwrap();
        let mut reader = chunks.open_chunk(&key, 1).await.unwrap();
        upload.append(&mut reader).await.unwrap();
        assert_eq!(upload.finish().await.unwrap(), 2);
        assert_eq!(
            upload.checksum(DigestAlgorithm::Md5).await.unwrap(),
            digest.as_str()
        );
        assert!(artifacts.resolve(&digest).await.unwrap().is_none());

        let path = upload.commit().await.unwrap();
        let info = artifacts.resolve(&digest).await.unwrap().unwrap();
        assert_eq!(info.path, path);
        assert_eq!(info.length, 2);
        assert_eq!(info.extension, ".bin");
        assert_eq!(info.file_name, format!("{digest}.bin"));
    }

    #[tokio::test]
    async fn test_abort_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().unwrap();
        let (pm, _, artifacts) = stores(tmp.path());
        let digest = digest_of(b"AB");

        let mut upload = artifacts.begin(&digest, "").await.unwrap();
        upload.finish().await.unwrap();
        upload.abort().await.unwrap();

        assert!(!artifacts.exists(&digest).await.unwrap());
        let mut entries = read_dir(pm.artifact_root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dropped_upload_removes_staged_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (pm, chunks, artifacts) = stores(tmp.path());
        let digest = digest_of(b"ABCD");
        let key = UploadKey::new(digest.clone(), "alice");
        chunks
            .write_chunk(&key, 1, ChunkSource::Bytes(Bytes::from_static(b"AB")))
            .await
            .unwrap();

        let mut upload = artifacts.begin(&digest, ".bin").await.unwrap();
        let mut reader = chunks.open_chunk(&key, 1).await.unwrap();
        upload.append(&mut reader).await.unwrap();
        drop(upload);

        let mut entries = read_dir(pm.artifact_root()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_rename_falls_back_to_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, chunks, _) = stores(tmp.path());
        let spooled = tmp.path().join("spooled");
        tokio::fs::write(&spooled, b"AB").await.unwrap();

        // The destination directory is missing, so the rename fails with
        // NotFound while the source is still there.
        let dest = tmp.path().join("swept").join("1");
        chunks.move_temp_file(&spooled, &dest).await.unwrap();

        assert!(!spooled.exists());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"AB");
        let mut entries = read_dir(dest.parent().unwrap()).await.unwrap();
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        assert_eq!(names, vec!["1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_rename_without_source_is_source_lost() {
        let tmp = tempfile::tempdir().unwrap();
        let (_, chunks, _) = stores(tmp.path());

        let dest = tmp.path().join("swept").join("1");
        let err = chunks
            .move_temp_file(&tmp.path().join("gone"), &dest)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SourceLost(_)));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_resolve_requires_digest_boundary() {
        let tmp = tempfile::tempdir().unwrap();
        let (pm, _, artifacts) = stores(tmp.path());
        let digest = digest_of(b"AB");
        tokio::fs::create_dir_all(pm.artifact_root()).await.unwrap();
        tokio::fs::write(pm.artifact_root().join(format!("{digest}x")), b"no")
            .await
            .unwrap();
        assert!(artifacts.resolve(&digest).await.unwrap().is_none());

        tokio::fs::write(pm.artifact_root().join(format!("{digest}.zip")), b"AB")
            .await
            .unwrap();
        tokio::fs::write(pm.artifact_root().join(format!("{digest}.bin")), b"AB")
            .await
            .unwrap();
        let info = artifacts.resolve(&digest).await.unwrap().unwrap();
        assert_eq!(info.extension, ".bin");
    }
}
