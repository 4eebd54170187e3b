use async_trait::async_trait;

use crate::command::AddFileCommand;
use crate::exception::UploadResult;
use crate::model::entity::FileRecord;
use crate::model::vo::{DraftLinks, QuotaUsage, RemoteFile, UploadEvent};

/// # Session coordinator
///
/// Owns the files of one draft and every upload session running for them.
#[async_trait]
pub trait SessionCoordinatorService: Send + Sync {
    /// Check quota and add a pending file. Never touches the network.
    async fn admit(&self, command: AddFileCommand) -> UploadResult<FileRecord>;

    /// Run the session of an admitted file until it reaches a terminal state.
    async fn start(&self, key: &str) -> UploadResult<FileRecord>;

    /// `admit` then `start`.
    async fn upload(&self, command: AddFileCommand) -> UploadResult<FileRecord>;

    /// Upload a failed file again from scratch.
    async fn retry(&self, key: &str) -> UploadResult<FileRecord>;

    /// Cancel a session. Does nothing for files in a terminal state.
    async fn cancel(&self, key: &str) -> UploadResult<FileRecord>;

    /// Remove a file from the draft and the server.
    async fn delete(&self, key: &str) -> UploadResult<()>;

    /// Add a file the server already has, skipping initialize.
    async fn add_remote_file(&self, file: RemoteFile) -> UploadResult<FileRecord>;

    async fn import_parent_files(&self, draft: &DraftLinks) -> UploadResult<Vec<FileRecord>>;

    async fn files(&self) -> Vec<FileRecord>;

    async fn file(&self, key: &str) -> UploadResult<FileRecord>;

    async fn quota_usage(&self) -> QuotaUsage;

    /// Stream of lifecycle, removal and import events from now on.
    async fn subscribe(&self) -> flume::Receiver<UploadEvent>;
}
