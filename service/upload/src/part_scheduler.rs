use std::{ops::Range, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use domain_upload::{
    exception::{UploadException, UploadResult},
    model::vo::{normalize_checksum, FileLinks, PartAck, SessionHandle, SignedPart, TransferDescriptor},
    service::{BackendGateway, ContentSource, PartSchedulerService, SessionTracker},
};
use futures::StreamExt;
use typed_builder::TypedBuilder;

use crate::request::{back_off, guarded};

#[derive(TypedBuilder)]
pub struct PartSchedulerServiceImpl {
    gateway: Arc<dyn BackendGateway>,
    /// Parts of one file in flight at once.
    #[builder(default = 4)]
    concurrency: usize,
    /// Attempts per part, the first one included.
    #[builder(default = 3)]
    retry_limit: u32,
    #[builder(default = Duration::from_secs(60))]
    request_timeout: Duration,
    #[builder(default = Duration::from_millis(500))]
    retry_backoff: Duration,
    /// Compare the server's integrity token with the MD5 of each part.
    #[builder(default = false)]
    verify_part_integrity: bool,
}

/// One part as sent to the server.
struct PartJob<'a> {
    handle: &'a SessionHandle,
    links: &'a FileLinks,
    part_number: u64,
    total_parts: u64,
    body: Bytes,
    /// MD5 of `body` when integrity is verified.
    digest: Option<String>,
}

#[async_trait]
impl PartSchedulerService for PartSchedulerServiceImpl {
    #[tracing::instrument(skip_all, fields(key = %handle.key, parts = descriptor.total_parts))]
    async fn schedule_upload(
        &self,
        tracker: &dyn SessionTracker,
        handle: &SessionHandle,
        links: &FileLinks,
        content: Arc<dyn ContentSource>,
        descriptor: &mut TransferDescriptor,
    ) -> UploadResult<()> {
        let total_parts = descriptor.total_parts;
        let jobs = descriptor
            .outstanding_parts()
            .into_iter()
            .map(|nth| {
                let range = descriptor.byte_range(nth).ok_or(UploadException::InvalidPartNumber {
                    key: handle.key.to_owned(),
                    part_number: nth,
                    total_parts,
                })?;
                Ok((nth, range))
            })
            .collect::<UploadResult<Vec<(u64, Range<u64>)>>>()?;

        let mut uploads = futures::stream::iter(jobs.into_iter().map(|(nth, range)| {
            let content = content.clone();
            async move {
                let result = self.upload_part(handle, links, content, nth, total_parts, range).await;
                (nth, result)
            }
        }))
        .buffer_unordered(self.concurrency.max(1));

        // Acks are booked between polls of `uploads`, never across an await of a part.
        while let Some((nth, result)) = uploads.next().await {
            match result {
                Ok(_) => {
                    descriptor.acknowledge(nth);
                    tracing::debug!(
                        part = nth,
                        acknowledged = descriptor.acknowledged_parts().len(),
                        "Part acknowledged."
                    );
                    tracker.progress(handle, descriptor.acknowledged_bytes()).await;
                }
                Err(e) => {
                    descriptor.mark_failed(nth);
                    tracing::warn!(part = nth, "Abandoning multipart transfer: {e}");
                    // Dropping `uploads` aborts the parts still in flight.
                    return Err(e);
                }
            }
        }

        if !descriptor.is_complete() {
            return Err(anyhow::anyhow!(
                "Multipart transfer of {} ended with parts {:?} unacknowledged",
                handle.key,
                descriptor.outstanding_parts()
            )
            .into());
        }
        Ok(())
    }
}

impl PartSchedulerServiceImpl {
    async fn upload_part(
        &self,
        handle: &SessionHandle,
        links: &FileLinks,
        content: Arc<dyn ContentSource>,
        part_number: u64,
        total_parts: u64,
        range: Range<u64>,
    ) -> UploadResult<PartAck> {
        let body = content.read(range).await?;
        let digest = self.verify_part_integrity.then(|| format!("{:x}", md5::compute(&body)));
        let job = PartJob {
            handle,
            links,
            part_number,
            total_parts,
            body,
            digest,
        };

        let mut target = None;
        let mut attempt = 1;
        loop {
            let error = match self.try_part(&job, &mut target).await {
                Ok(ack) => return Ok(ack),
                Err(e) => e,
            };
            match &error {
                // The target is spent, the next attempt signs a new one.
                UploadException::SignedUrlExpired { .. } => target = None,
                e if e.is_retryable() => {}
                _ => return Err(error),
            }
            if attempt >= self.retry_limit {
                return Err(error);
            }
            tracing::debug!(part = part_number, attempt, "Part attempt failed: {error}");
            back_off(handle, self.retry_backoff, attempt).await?;
            attempt += 1;
        }
    }

    async fn try_part(&self, job: &PartJob<'_>, target: &mut Option<SignedPart>) -> UploadResult<PartAck> {
        let key = job.handle.key.as_str();
        let signed = match target.take() {
            Some(signed) => signed,
            None => {
                guarded(
                    job.handle,
                    "sign part",
                    self.request_timeout,
                    self.gateway.sign_part(key, job.links, job.part_number),
                )
                .await?
            }
        };
        if signed.part_number != job.part_number {
            return Err(UploadException::InvalidPartNumber {
                key: key.to_owned(),
                part_number: signed.part_number,
                total_parts: job.total_parts,
            });
        }
        if signed.is_expired(Utc::now()) {
            return Err(UploadException::SignedUrlExpired {
                key: key.to_owned(),
                part_number: job.part_number,
            });
        }
        *target = Some(signed.clone());

        let ack = match guarded(
            job.handle,
            "upload part",
            self.request_timeout,
            self.gateway.upload_part(key, &signed, job.body.clone()),
        )
        .await
        {
            // A stalled request may outlive the target's validity window.
            Err(UploadException::Timeout { .. }) => {
                return Err(UploadException::SignedUrlExpired {
                    key: key.to_owned(),
                    part_number: job.part_number,
                })
            }
            result => result?,
        };

        if ack.part_number != job.part_number {
            return Err(UploadException::InvalidPartNumber {
                key: key.to_owned(),
                part_number: ack.part_number,
                total_parts: job.total_parts,
            });
        }
        if let (Some(digest), Some(token)) = (&job.digest, &ack.checksum) {
            if &normalize_checksum(token) != digest {
                return Err(UploadException::PartUploadFailed {
                    key: key.to_owned(),
                    part_number: job.part_number,
                    reason: format!("integrity token {token} doesn't match {digest}"),
                });
            }
        }
        Ok(ack)
    }
}
