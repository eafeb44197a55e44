use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{self, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::AppError;

/// A lazy, single-pass byte sequence over an artifact suffix.
pub struct ArtifactStream {
    /// Total artifact length.
    pub total_length: u64,
    /// First byte the stream yields.
    pub offset: u64,
    pub stream: ReaderStream<File>,
}

impl ArtifactStream {
    /// Number of bytes the stream will yield.
    pub fn remaining(&self) -> u64 {
        self.total_length - self.offset
    }
}

pub struct RangeReader;

impl RangeReader {
    /// Opens `path` positioned at `offset`. `offset == length` yields an
    /// empty stream; anything past the end is `InvalidRange`.
    pub async fn open_from(path: &Path, offset: u64) -> Result<ArtifactStream, AppError> {
        let mut file = match File::open(path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AppError::ArtifactNotFound(path.display().to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let total_length = file.metadata().await?.len();
        if offset > total_length {
            return Err(AppError::InvalidRange {
                offset,
                length: total_length,
            });
        }
        if offset > 0 {
            file.seek(SeekFrom::Start(offset)).await?;
        }
        Ok(ArtifactStream {
            total_length,
            offset,
            stream: ReaderStream::new(file),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    async fn collect(mut stream: ArtifactStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.stream.next().await {
            out.extend_from_slice(&chunk.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_open_from_offsets() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("artifact");
        tokio::fs::write(&path, b"ABCDEF").await.unwrap();

        let full = RangeReader::open_from(&path, 0).await.unwrap();
        assert_eq!(full.remaining(), 6);
        assert_eq!(collect(full).await, b"ABCDEF");

        let suffix = RangeReader::open_from(&path, 4).await.unwrap();
        assert_eq!(suffix.remaining(), 2);
        assert_eq!(collect(suffix).await, b"EF");

        let empty = RangeReader::open_from(&path, 6).await.unwrap();
        assert_eq!(empty.remaining(), 0);
        assert!(collect(empty).await.is_empty());

        assert!(matches!(
            RangeReader::open_from(&path, 7).await,
            Err(AppError::InvalidRange { offset: 7, length: 6 })
        ));
    }

    #[tokio::test]
    async fn test_missing_path() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            RangeReader::open_from(&tmp.path().join("nope"), 0).await,
            Err(AppError::ArtifactNotFound(_))
        ));
    }
}
