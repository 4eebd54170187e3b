use std::sync::Arc;

use crate::model::vo::TransferKind;
use crate::service::ContentSource;

/// Add a local file to the draft.
pub struct AddFileCommand {
    /// File name inside the draft.
    pub key: String,
    pub mime_type: String,
    /// Transfer kind to force, otherwise picked by size.
    pub transfer_kind: Option<TransferKind>,
    pub content: Arc<dyn ContentSource>,
}

impl AddFileCommand {
    pub fn new(key: impl Into<String>, content: Arc<dyn ContentSource>) -> Self {
        Self {
            key: key.into(),
            mime_type: "application/octet-stream".to_owned(),
            transfer_kind: None,
            content,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_transfer_kind(mut self, kind: TransferKind) -> Self {
        self.transfer_kind = Some(kind);
        self
    }
}
