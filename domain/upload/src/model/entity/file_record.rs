use serde::{Deserialize, Serialize};

use crate::model::vo::{ErrorReport, FileLinks, RemoteFile, TransferKind, UploadState};

/// One file of a draft as the deposit form sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// File name, unique inside a draft.
    pub key: String,
    pub size: u64,
    pub mime_type: String,
    pub transfer_kind: TransferKind,
    pub state: UploadState,
    /// 0 to 100.
    pub progress_percentage: u8,
    /// Only set once the server confirmed it.
    pub checksum: Option<String>,
    #[serde(default)]
    pub links: FileLinks,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorReport>,
}

impl FileRecord {
    pub fn new(
        key: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
        transfer_kind: TransferKind,
    ) -> Self {
        Self {
            key: key.into(),
            size,
            mime_type: mime_type.into(),
            transfer_kind,
            state: UploadState::Pending,
            progress_percentage: 0,
            checksum: None,
            links: FileLinks::default(),
            file_id: None,
            error: None,
        }
    }

    /// Record of a file that is already on the server.
    pub fn from_remote(file: RemoteFile) -> Self {
        let completed = file.status.as_deref().map_or(true, |el| el == "completed");
        Self {
            key: file.key,
            size: file.size,
            mime_type: file.mimetype.unwrap_or_else(|| "application/octet-stream".to_owned()),
            transfer_kind: TransferKind::Local,
            state: if completed {
                UploadState::Completed
            } else {
                UploadState::Pending
            },
            progress_percentage: if completed { 100 } else { 0 },
            checksum: file.checksum,
            links: file.links,
            file_id: file.file_id,
            error: None,
        }
    }
}
