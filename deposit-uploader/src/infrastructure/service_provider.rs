use std::sync::Arc;

use domain_upload::{
    model::vo::DraftLinks,
    service::{BackendGateway, SessionCoordinatorService},
};
use service_upload::{
    PartSchedulerServiceImpl, SessionCoordinatorServiceImpl, UploadSessionServiceImpl,
};
use tokio::sync::Semaphore;

use super::{build_http_client, InvenioBackendGateway};
use crate::config::DepositConfig;

/// Services wired together for one draft.
pub struct ServiceProvider {
    pub coordinator: Arc<dyn SessionCoordinatorService>,
}

impl ServiceProvider {
    pub fn build(config: &DepositConfig, draft: DraftLinks) -> anyhow::Result<Self> {
        let gateway: Arc<dyn BackendGateway> = match config.gateway.kind.to_lowercase().as_str() {
            "invenio" => Arc::new(InvenioBackendGateway::new(
                build_http_client(&config.http)?,
                config.gateway.token.to_owned(),
            )),
            other => anyhow::bail!("Unknown gateway.kind: {other}"),
        };
        Ok(Self {
            coordinator: Self::coordinator(config, draft, gateway),
        })
    }

    /// Coordinator for `draft` on top of any gateway.
    pub fn coordinator(
        config: &DepositConfig,
        draft: DraftLinks,
        gateway: Arc<dyn BackendGateway>,
    ) -> Arc<dyn SessionCoordinatorService> {
        let upload = &config.upload;
        let part_scheduler = PartSchedulerServiceImpl::builder()
            .gateway(gateway.clone())
            .concurrency(upload.part_upload_concurrency.max(1))
            .retry_limit(upload.part_retry_limit.max(1))
            .request_timeout(upload.request_timeout())
            .retry_backoff(upload.retry_backoff())
            .verify_part_integrity(upload.verify_part_integrity)
            .build();
        let session_service = UploadSessionServiceImpl::builder()
            .gateway(gateway.clone())
            .part_scheduler(Arc::new(part_scheduler))
            .policy(upload.transfer_policy())
            .retry(upload.retry_policy())
            .build();
        Arc::new(
            SessionCoordinatorServiceImpl::builder()
                .gateway(gateway)
                .session_service(Arc::new(session_service))
                .draft(draft)
                .quota(upload.quota())
                .allow_empty_files(upload.allow_empty_files)
                .policy(upload.transfer_policy())
                .upload_permits(Arc::new(Semaphore::new(upload.max_concurrent_uploads.max(1))))
                .retry(upload.retry_policy())
                .build(),
        )
    }
}
