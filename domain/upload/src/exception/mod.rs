use crate::model::vo::{TransferKind, UploadState};

pub type UploadResult<T> = Result<T, UploadException>;

#[derive(Debug, thiserror::Error)]
pub enum UploadException {
    #[error("Unsupported upload transfer kind \"{kind}\" for file: {key}. Server supports: {supported:?}.")]
    UnsupportedTransferKind {
        key: String,
        kind: TransferKind,
        supported: Vec<TransferKind>,
    },

    #[error("File: {key} can't be added: {reason}.")]
    FileSize { key: String, reason: String },

    #[error("A file with key: {key} is already part of the draft.")]
    DuplicateFile { key: String },

    #[error("Part {part_number} of file: {key} failed to upload: {reason}.")]
    PartUploadFailed {
        key: String,
        part_number: u64,
        reason: String,
    },

    #[error("The signed target of part {part_number} of file: {key} has expired.")]
    SignedUrlExpired { key: String, part_number: u64 },

    #[error("Part number {part_number} of file: {key} is outside 1..={total_parts}.")]
    InvalidPartNumber {
        key: String,
        part_number: u64,
        total_parts: u64,
    },

    #[error("File: {key} doesn't exist on the server anymore.")]
    DeleteNotFound { key: String },

    #[error("Upload of file: {key} was cancelled.")]
    Cancelled { key: String },

    #[error("File: {key} can't move from {from} to {to}.")]
    InvalidTransition {
        key: String,
        from: UploadState,
        to: UploadState,
    },

    #[error("There is no file with key: {key}.")]
    NoSuchFile { key: String },

    #[error("The local content of file: {key} is not available, it can't be uploaded again.")]
    ContentUnavailable { key: String },

    #[error("Request {operation} for file: {key} timed out.")]
    Timeout { key: String, operation: String },

    #[error("Server rejected {operation} with status {status:?}: {message}")]
    Gateway {
        operation: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Upload internal error: {source}")]
    InternalError {
        #[source]
        source: anyhow::Error,
    },
}

impl UploadException {
    /// Whether the message is meant for the person depositing files,
    /// as opposed to an internal diagnostic.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedTransferKind { .. }
                | Self::FileSize { .. }
                | Self::DuplicateFile { .. }
                | Self::DeleteNotFound { .. }
                | Self::ContentUnavailable { .. }
        )
    }

    /// Whether repeating the same request may succeed.
    ///
    /// `SignedUrlExpired` is excluded: it needs a new signed target first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::PartUploadFailed { .. } | Self::Timeout { .. } => true,
            Self::Gateway { status, .. } => match status {
                Some(status) => *status >= 500 || *status == 408 || *status == 429,
                None => true,
            },
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<anyhow::Error> for UploadException {
    fn from(e: anyhow::Error) -> Self {
        UploadException::InternalError { source: e }
    }
}
