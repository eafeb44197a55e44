use serde::{Deserialize, Serialize};

use crate::domain::upload::model::UploadStatusView;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<UploadData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadData {
    pub file_path: String,
}

impl UploadResponse {
    pub fn pending(index: u32, total: u32) -> Self {
        UploadResponse {
            success: true,
            message: format!("chunk {index}/{total} uploaded"),
            data: None,
        }
    }

    pub fn committed(file_path: String) -> Self {
        UploadResponse {
            success: true,
            message: "file uploaded".to_string(),
            data: Some(UploadData { file_path }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub file_md5: Option<String>,
    pub user_uid: Option<String>,
    pub skip_length: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    #[serde(rename = "newData")]
    pub new_data: Option<StatusQuery>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub file_md5: Option<String>,
    pub user_uid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(rename = "returnValue")]
    pub return_value: StatusBody,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct StatusBody {
    #[serde(rename = "retCode")]
    pub ret_code: &'static str,
    #[serde(rename = "chunkCount", skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<usize>,
}

impl From<UploadStatusView> for StatusBody {
    fn from(view: UploadStatusView) -> Self {
        match view {
            UploadStatusView::NotExist => StatusBody {
                ret_code: "0",
                chunk_count: None,
            },
            UploadStatusView::Complete => StatusBody {
                ret_code: "1",
                chunk_count: None,
            },
            UploadStatusView::Incomplete { chunk_count } => StatusBody {
                ret_code: "2",
                chunk_count: Some(chunk_count),
            },
        }
    }
}
