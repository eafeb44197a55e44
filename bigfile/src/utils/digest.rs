use std::fmt;
use std::str::FromStr;

use sha2::{Digest as _, Sha256};
use tokio::io::{self, AsyncRead, AsyncReadExt};

use crate::error::AppError;

const READ_BUF_SIZE: usize = 64 * 1024;

/// Hash function used to address artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
}

impl DigestAlgorithm {
    /// Length of the lowercase hex form of a digest.
    pub fn hex_len(self) -> usize {
        match self {
            DigestAlgorithm::Md5 => 32,
            DigestAlgorithm::Sha256 => 64,
        }
    }

    pub fn hasher(self) -> ContentHasher {
        match self {
            DigestAlgorithm::Md5 => ContentHasher::Md5(md5::Context::new()),
            DigestAlgorithm::Sha256 => ContentHasher::Sha256(Sha256::new()),
        }
    }
}

impl FromStr for DigestAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(DigestAlgorithm::Md5),
            "sha256" => Ok(DigestAlgorithm::Sha256),
            other => Err(format!("unsupported digest algorithm `{other}`")),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Md5 => f.write_str("md5"),
            DigestAlgorithm::Sha256 => f.write_str("sha256"),
        }
    }
}

/// A validated, lowercase hex content digest.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn parse(algorithm: DigestAlgorithm, raw: &str) -> Result<Self, AppError> {
        Self::parse_field(algorithm, "digest", raw)
    }

    /// Like [`ContentDigest::parse`], reporting failures against the named input field.
    pub fn parse_field(
        algorithm: DigestAlgorithm,
        field: &'static str,
        raw: &str,
    ) -> Result<Self, AppError> {
        let raw = raw.trim();
        if raw.len() != algorithm.hex_len() {
            return Err(AppError::InvalidField {
                field,
                reason: format!(
                    "expected {} hex characters for {algorithm}, got {}",
                    algorithm.hex_len(),
                    raw.len()
                ),
            });
        }
        if !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(AppError::InvalidField {
                field,
                reason: "digest must be hexadecimal".to_string(),
            });
        }
        Ok(ContentDigest(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Incremental hasher over the supported algorithms.
pub enum ContentHasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl ContentHasher {
    pub fn update(&mut self, data: &[u8]) {
        match self {
            ContentHasher::Md5(ctx) => ctx.consume(data),
            ContentHasher::Sha256(hasher) => hasher.update(data),
        }
    }

    pub fn finalize_hex(self) -> String {
        match self {
            ContentHasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            ContentHasher::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

/// Hashes everything `reader` yields until EOF.
pub async fn digest_reader<R>(algorithm: DigestAlgorithm, reader: &mut R) -> io::Result<String>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize_hex())
}

pub fn digest_bytes(algorithm: DigestAlgorithm, data: &[u8]) -> String {
    let mut hasher = algorithm.hasher();
    hasher.update(data);
    hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            digest_bytes(DigestAlgorithm::Md5, b"ABCDEF"),
            "8827a41122a5028b9808c7bf84b9fcf6"
        );
        assert_eq!(
            digest_bytes(DigestAlgorithm::Sha256, b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_digest_reader_matches_digest_bytes() {
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut reader = &data[..];
        let streamed = digest_reader(DigestAlgorithm::Md5, &mut reader).await.unwrap();
        assert_eq!(streamed, digest_bytes(DigestAlgorithm::Md5, &data));
    }

    #[test]
    fn test_parse_normalizes_case() {
        let d = ContentDigest::parse(DigestAlgorithm::Md5, "8827A41122A5028B9808C7BF84B9FCF6")
            .unwrap();
        assert_eq!(d.as_str(), "8827a41122a5028b9808c7bf84b9fcf6");
    }

    #[test]
    fn test_parse_rejects_wrong_length_and_non_hex() {
        assert!(ContentDigest::parse(DigestAlgorithm::Md5, "abc").is_err());
        assert!(
            ContentDigest::parse(DigestAlgorithm::Md5, "zz27a41122a5028b9808c7bf84b9fcf6").is_err()
        );
        assert!(
            ContentDigest::parse(DigestAlgorithm::Sha256, "8827a41122a5028b9808c7bf84b9fcf6")
                .is_err()
        );
    }

    #[test]
    fn test_algorithm_from_str() {
        assert_eq!("MD5".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Md5));
        assert_eq!("sha256".parse::<DigestAlgorithm>(), Ok(DigestAlgorithm::Sha256));
        assert!("crc32".parse::<DigestAlgorithm>().is_err());
    }
}
