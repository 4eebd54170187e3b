use std::sync::Arc;

use async_trait::async_trait;

use crate::exception::UploadResult;
use crate::model::vo::{FileLinks, SessionHandle, TransferDescriptor};
use crate::service::{ContentSource, SessionTracker};

/// # Part scheduler
///
/// Sends the parts of a multipart transfer with bounded concurrency and retries.
#[async_trait]
pub trait PartSchedulerService: Send + Sync {
    /// Upload every outstanding part of `descriptor`.
    ///
    /// Ok only once every part in 1..=N is acknowledged. Progress is reported to `tracker`.
    async fn schedule_upload(
        &self,
        tracker: &dyn SessionTracker,
        handle: &SessionHandle,
        links: &FileLinks,
        content: Arc<dyn ContentSource>,
        descriptor: &mut TransferDescriptor,
    ) -> UploadResult<()>;
}
