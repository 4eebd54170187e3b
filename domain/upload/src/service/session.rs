use std::sync::Arc;

use async_trait::async_trait;

use crate::exception::UploadResult;
use crate::model::entity::FileRecord;
use crate::model::vo::{SessionHandle, Transition};
use crate::service::ContentSource;

/// Where a running session records its transitions.
#[async_trait]
pub trait SessionTracker: Send + Sync {
    /// Apply `transition` to the attempt of `handle`.
    ///
    /// Returns `Cancelled` when the attempt is no longer current, the caller must stop.
    async fn transition(
        &self,
        handle: &SessionHandle,
        transition: Transition,
    ) -> UploadResult<FileRecord>;

    /// Bytes confirmed so far by the attempt of `handle`.
    async fn progress(&self, handle: &SessionHandle, transferred: u64);
}

/// # Upload session
///
/// Drives one attempt through initialize, upload and finalize.
#[async_trait]
pub trait UploadSessionService: Send + Sync {
    /// Drive the attempt of `handle` for `record`, already initializing, to completion.
    ///
    /// Failures are recorded through `tracker` before they are returned.
    async fn run(
        &self,
        tracker: &dyn SessionTracker,
        handle: SessionHandle,
        files_url: &str,
        record: FileRecord,
        content: Arc<dyn ContentSource>,
    ) -> UploadResult<FileRecord>;
}
