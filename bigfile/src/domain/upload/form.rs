use std::str::FromStr;

use crate::domain::upload::model::{ChunkUpload, UploadKey};
use crate::error::AppError;
use crate::utils::digest::{ContentDigest, DigestAlgorithm};
use crate::utils::validation::is_valid_uploader_id;

/// Raw chunk metadata as sent by clients, field names kept wire-compatible.
#[derive(Debug, Clone, Default)]
pub struct ChunkForm {
    pub name: Option<String>,
    pub chunks: Option<String>,
    pub chunk: Option<String>,
    pub total_length: Option<String>,
    pub total_file_md5: Option<String>,
    pub user_uid: Option<String>,
}

impl ChunkForm {
    /// Assigns a multipart text field by its wire name. Unknown fields are ignored.
    pub fn set(&mut self, field: &str, value: String) {
        let slot = match field {
            "name" => &mut self.name,
            "chunks" => &mut self.chunks,
            "chunk" => &mut self.chunk,
            "totalLength" => &mut self.total_length,
            "totalFileMd5" => &mut self.total_file_md5,
            "user_uid" => &mut self.user_uid,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn validate(self, algorithm: DigestAlgorithm) -> Result<ChunkUpload, AppError> {
        let name = required("name", self.name)?;
        let chunks = required("chunks", self.chunks)?;
        let chunk = required("chunk", self.chunk)?;
        let total_length = required("totalLength", self.total_length)?;
        let digest = required("totalFileMd5", self.total_file_md5)?;
        let uploader_id = required("user_uid", self.user_uid)?;

        let declared_total: u32 = number("chunks", &chunks)?;
        if declared_total == 0 {
            return Err(invalid("chunks", "must be at least 1"));
        }
        let index: u32 = number("chunk", &chunk)?;
        if index == 0 {
            return Err(invalid("chunk", "chunk indices start at 1"));
        }
        let declared_length: u64 = number("totalLength", &total_length)?;
        let digest = ContentDigest::parse_field(algorithm, "totalFileMd5", &digest)?;
        if !is_valid_uploader_id(&uploader_id) {
            return Err(invalid("user_uid", "contains unsupported characters"));
        }

        Ok(ChunkUpload {
            key: UploadKey::new(digest, uploader_id),
            index,
            declared_total,
            declared_length,
            declared_name: name,
        })
    }
}

fn required(field: &'static str, value: Option<String>) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(AppError::MissingRequiredField(field)),
    }
}

fn number<T: FromStr>(field: &'static str, raw: &str) -> Result<T, AppError> {
    raw.parse()
        .map_err(|_| invalid(field, format!("`{raw}` is not a valid number")))
}

fn invalid(field: &'static str, reason: impl Into<String>) -> AppError {
    AppError::InvalidField {
        field,
        reason: reason.into(),
    }
}
