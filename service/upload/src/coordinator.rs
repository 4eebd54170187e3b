use std::sync::Arc;

use async_trait::async_trait;
use domain_upload::{
    command::AddFileCommand,
    exception::{UploadException, UploadResult},
    model::{
        entity::{FileRecord, UploadSession},
        vo::{
            DeleteOutcome, DraftLinks, Quota, QuotaUsage, RemoteFile, SessionHandle,
            TransferPolicy, UploadEvent, UploadState,
        },
    },
    service::{BackendGateway, SessionCoordinatorService, UploadSessionService},
};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use typed_builder::TypedBuilder;

use crate::{
    registry::{Launch, SessionRegistry},
    request::RetryPolicy,
};

#[derive(TypedBuilder)]
pub struct SessionCoordinatorServiceImpl {
    gateway: Arc<dyn BackendGateway>,
    session_service: Arc<dyn UploadSessionService>,
    /// The draft new files are uploaded to.
    draft: DraftLinks,
    #[builder(default)]
    registry: Arc<SessionRegistry>,
    #[builder(default)]
    quota: Quota,
    #[builder(default = false)]
    allow_empty_files: bool,
    #[builder(default)]
    policy: TransferPolicy,
    /// Sessions running at once across the draft.
    #[builder(default = Arc::new(Semaphore::new(4)))]
    upload_permits: Arc<Semaphore>,
    #[builder(default)]
    retry: RetryPolicy,
}

#[async_trait]
impl SessionCoordinatorService for SessionCoordinatorServiceImpl {
    #[tracing::instrument(skip_all, fields(key = %command.key))]
    async fn admit(&self, command: AddFileCommand) -> UploadResult<FileRecord> {
        let size = command.content.size();
        let kind = self.policy.choose(command.transfer_kind.as_ref(), size);
        let record = FileRecord::new(command.key, size, command.mime_type, kind);
        let session = UploadSession::new(record, Some(command.content));
        let record = self.registry.admit(&self.quota, self.allow_empty_files, session).await?;
        tracing::info!(size, kind = %record.transfer_kind, "File admitted.");
        Ok(record)
    }

    async fn start(&self, key: &str) -> UploadResult<FileRecord> {
        let _permit = self.permit().await?;
        let launch = self.registry.begin(key).await?;
        self.launch(launch).await
    }

    async fn upload(&self, command: AddFileCommand) -> UploadResult<FileRecord> {
        let record = self.admit(command).await?;
        self.start(&record.key).await
    }

    #[tracing::instrument(skip(self))]
    async fn retry(&self, key: &str) -> UploadResult<FileRecord> {
        let _permit = self.permit().await?;
        let launch = self.registry.rearm(key, &self.quota).await?;
        tracing::info!(attempt = launch.handle.attempt, "Retrying upload.");
        self.launch(launch).await
    }

    async fn cancel(&self, key: &str) -> UploadResult<FileRecord> {
        self.registry.cancel(key).await
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, key: &str) -> UploadResult<()> {
        // How far the file got, not a cancellation, decides how a 404 is read.
        let (record, standing) = self.registry.halt(key).await?;

        let mut links = record.links;
        let guessed = links.self_link.is_none();
        if guessed {
            if standing == UploadState::Pending {
                tracing::debug!("File never reached the server, removing it locally.");
                self.registry.remove(key).await;
                return Ok(());
            }
            // Initialize may have reserved a slot before its answer was lost.
            links.self_link = Some(self.draft.file_url(key));
        }

        let handle = self.detached_handle(key);
        let outcome = self
            .retry
            .run(&handle, "delete", || self.gateway.delete_file(key, &links))
            .await?;
        match outcome {
            DeleteOutcome::Deleted => {}
            DeleteOutcome::NotFound
                if guessed || matches!(standing, UploadState::Pending | UploadState::Initializing) =>
            {
                tracing::info!(state = %standing, "Server had no trace of the file yet.");
            }
            DeleteOutcome::NotFound => {
                return Err(UploadException::DeleteNotFound { key: key.to_owned() });
            }
        }
        self.registry.remove(key).await;
        tracing::info!("File deleted.");
        Ok(())
    }

    async fn add_remote_file(&self, file: RemoteFile) -> UploadResult<FileRecord> {
        let session = UploadSession::new(FileRecord::from_remote(file), None);
        self.registry.insert_remote(session).await
    }

    #[tracing::instrument(skip_all, fields(draft = %draft.self_link))]
    async fn import_parent_files(&self, draft: &DraftLinks) -> UploadResult<Vec<FileRecord>> {
        let handle = self.detached_handle("files-import");
        let files = self
            .retry
            .run(&handle, "import", || self.gateway.import_parent_record_files(draft))
            .await?;

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let key = file.key.to_owned();
            match self.add_remote_file(file).await {
                Ok(record) => records.push(record),
                Err(UploadException::DuplicateFile { .. }) => {
                    tracing::warn!(key, "Skipping imported file, the draft already has one.")
                }
                Err(e) => return Err(e),
            }
        }
        let keys: Vec<String> = records.iter().map(|el| el.key.to_owned()).collect();
        tracing::info!(count = keys.len(), "Imported files of the parent record.");
        self.registry.publish(UploadEvent::Imported { keys }).await;
        Ok(records)
    }

    async fn files(&self) -> Vec<FileRecord> {
        self.registry.records().await
    }

    async fn file(&self, key: &str) -> UploadResult<FileRecord> {
        self.registry.get(key).await
    }

    async fn quota_usage(&self) -> QuotaUsage {
        self.registry.usage(&self.quota).await
    }

    async fn subscribe(&self) -> flume::Receiver<UploadEvent> {
        self.registry.subscribe().await
    }
}

impl SessionCoordinatorServiceImpl {
    async fn permit(&self) -> UploadResult<OwnedSemaphorePermit> {
        Ok(self.upload_permits.clone().acquire_owned().await.map_err(anyhow::Error::from)?)
    }

    async fn launch(&self, launch: Launch) -> UploadResult<FileRecord> {
        let Launch {
            handle,
            record,
            content,
        } = launch;
        self.session_service
            .run(self.registry.as_ref(), handle, &self.draft.files_url(), record, content)
            .await
    }

    /// Handle for draft level requests that no session cancellation reaches.
    fn detached_handle(&self, key: &str) -> SessionHandle {
        SessionHandle {
            key: key.to_owned(),
            attempt: 0,
            cancel: CancellationToken::new(),
        }
    }
}
