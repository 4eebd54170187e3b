use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use domain_upload::{
    exception::{UploadException, UploadResult},
    model::{
        entity::FileRecord,
        vo::{
            ErrorReport, InitializeRequest, SessionHandle, TransferDescriptor, TransferPolicy,
            TransferRequest, Transition,
        },
    },
    service::{
        BackendGateway, ContentSource, PartSchedulerService, SessionTracker, UploadSessionService,
    },
};
use typed_builder::TypedBuilder;

use crate::request::RetryPolicy;

#[derive(TypedBuilder)]
pub struct UploadSessionServiceImpl {
    gateway: Arc<dyn BackendGateway>,
    part_scheduler: Arc<dyn PartSchedulerService>,
    #[builder(default)]
    policy: TransferPolicy,
    #[builder(default)]
    retry: RetryPolicy,
}

#[async_trait]
impl UploadSessionService for UploadSessionServiceImpl {
    #[tracing::instrument(skip_all, fields(key = %handle.key, attempt = handle.attempt))]
    async fn run(
        &self,
        tracker: &dyn SessionTracker,
        handle: SessionHandle,
        files_url: &str,
        record: FileRecord,
        content: Arc<dyn ContentSource>,
    ) -> UploadResult<FileRecord> {
        match self.drive(tracker, &handle, files_url, record, content).await {
            Ok(record) => {
                tracing::info!(size = record.size, "Upload completed.");
                Ok(record)
            }
            Err(e) if e.is_cancelled() => {
                tracing::info!("Upload cancelled.");
                Err(e)
            }
            Err(e) => {
                tracing::error!("Upload failed: {e}");
                tracker.transition(&handle, Transition::Fail(ErrorReport::from(&e))).await?;
                Err(e)
            }
        }
    }
}

impl UploadSessionServiceImpl {
    async fn drive(
        &self,
        tracker: &dyn SessionTracker,
        handle: &SessionHandle,
        files_url: &str,
        record: FileRecord,
        content: Arc<dyn ContentSource>,
    ) -> UploadResult<FileRecord> {
        let key = record.key.as_str();
        self.policy.ensure_supported(key, &record.transfer_kind)?;

        let mut descriptor = record
            .transfer_kind
            .is_multipart()
            .then(|| {
                TransferDescriptor::plan(
                    key,
                    record.transfer_kind.to_owned(),
                    record.size,
                    self.policy.part_size,
                )
            })
            .transpose()?;
        let request = InitializeRequest {
            key: key.to_owned(),
            size: record.size,
            transfer: TransferRequest {
                kind: record.transfer_kind.to_owned(),
                parts: descriptor.as_ref().map(|el| el.total_parts),
                part_size: descriptor.as_ref().map(|el| el.part_size),
            },
        };
        let initialized = self
            .retry
            .run(handle, "initialize", || self.gateway.initialize_upload(files_url, &request))
            .await?;
        tracing::debug!(file_id = ?initialized.file_id, "Upload registered.");
        let record = tracker
            .transition(
                handle,
                Transition::Registered {
                    file_id: initialized.file_id,
                    links: initialized.links,
                },
            )
            .await?;

        match descriptor.as_mut() {
            Some(descriptor) => {
                self.part_scheduler
                    .schedule_upload(tracker, handle, &record.links, content, descriptor)
                    .await?
            }
            None => {
                let content_url = record
                    .links
                    .content
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("Server gave no content link for {key}"))?;
                let body = content.read(0..record.size).await?;
                self.send_content(tracker, handle, content_url, body).await?;
                tracker.progress(handle, record.size).await;
            }
        }

        let record = tracker.transition(handle, Transition::BeginFinalize).await?;
        let commit_url = record
            .links
            .commit
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Server gave no commit link for {key}"))?;
        let finalized = self
            .retry
            .run(handle, "finalize", || self.gateway.finalize_upload(key, commit_url))
            .await?;
        if finalized.key != record.key {
            return Err(UploadException::Gateway {
                operation: "finalize".to_owned(),
                status: None,
                message: format!("committed {} instead of {}", finalized.key, record.key),
            });
        }
        tracker.transition(handle, Transition::Complete(finalized)).await
    }

    /// Single request upload, forwarding the transport's progress while it runs.
    async fn send_content(
        &self,
        tracker: &dyn SessionTracker,
        handle: &SessionHandle,
        content_url: &str,
        body: Bytes,
    ) -> UploadResult<()> {
        let key = handle.key.as_str();
        let (sent, progress) = flume::unbounded();
        let upload = self.retry.run(handle, "upload content", || {
            self.gateway.upload_content(key, content_url, body.clone(), sent.clone())
        });
        tokio::pin!(upload);

        let result = loop {
            tokio::select! {
                result = &mut upload => break result,
                Ok(transferred) = progress.recv_async() => tracker.progress(handle, transferred).await,
            }
        };
        // Totals reported right before the request returned.
        let rest: Vec<u64> = progress.drain().collect();
        for transferred in rest {
            tracker.progress(handle, transferred).await;
        }
        result
    }
}
