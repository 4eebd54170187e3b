use async_trait::async_trait;
use bytes::Bytes;

use crate::exception::UploadResult;
use crate::model::vo::{
    DeleteOutcome, DraftLinks, FileLinks, FinalizedFile, InitializedFile, InitializeRequest,
    PartAck, RemoteFile, SignedPart,
};

/// The repository's file endpoints.
///
/// Implementations report `SignedUrlExpired` for rejected part targets and
/// `Gateway` with the HTTP status for everything else the server refuses.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Register the intent to upload, reserving a slot in the draft.
    async fn initialize_upload(
        &self,
        files_url: &str,
        request: &InitializeRequest,
    ) -> UploadResult<InitializedFile>;

    /// Get a fresh signed target for one part.
    async fn sign_part(&self, key: &str, links: &FileLinks, part_number: u64)
        -> UploadResult<SignedPart>;

    async fn upload_part(&self, key: &str, target: &SignedPart, body: Bytes)
        -> UploadResult<PartAck>;

    /// Send a whole file in one request.
    ///
    /// The running total of bytes handed to the transport is reported on `sent`.
    async fn upload_content(
        &self,
        key: &str,
        content_url: &str,
        body: Bytes,
        sent: flume::Sender<u64>,
    ) -> UploadResult<()>;

    /// Commit the upload, the server answers with the confirmed size and checksum.
    async fn finalize_upload(&self, key: &str, commit_url: &str) -> UploadResult<FinalizedFile>;

    async fn delete_file(&self, key: &str, links: &FileLinks) -> UploadResult<DeleteOutcome>;

    /// Copy the files of the previous version into the draft.
    async fn import_parent_record_files(&self, draft: &DraftLinks) -> UploadResult<Vec<RemoteFile>>;
}
