use std::io;
use std::path::PathBuf;

use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    // Caller input
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: String,
    },

    // Upload side
    #[error("uploaded temporary data vanished before it could be stored: {}", .0.display())]
    SourceLost(PathBuf),

    #[error("chunk {0} disappeared while merging")]
    ChunkVanished(u32),

    #[error("merged content digest {actual} does not match claimed digest {expected}")]
    DigestMismatch { expected: String, actual: String },

    // Download side
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),

    #[error("offset {offset} is beyond artifact length {length}")]
    InvalidRange { offset: u64, length: u64 },

    // Internal
    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingRequiredField(_)
            | Self::InvalidField { .. }
            | Self::SourceLost(_)
            | Self::Multipart(_) => StatusCode::BAD_REQUEST,
            Self::ChunkVanished(_) => StatusCode::CONFLICT,
            Self::DigestMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("Generating response for AppError: {:?}", self);

        let status_code = self.status_code();
        let message = match &self {
            // Do not leak filesystem details to clients.
            Self::Io(_) => "an internal server error occurred".to_string(),
            Self::SourceLost(_) => "uploaded chunk data was lost, please upload it again".to_string(),
            other => other.to_string(),
        };
        (
            status_code,
            Json(ErrorBody {
                success: false,
                message,
            }),
        )
            .into_response()
    }
}
