use std::ops::Range;

use async_trait::async_trait;
use bytes::Bytes;
use mockall::mock;

use crate::{
    exception::UploadResult,
    model::{
        entity::FileRecord,
        vo::{
            DeleteOutcome, DraftLinks, FileLinks, FinalizedFile, InitializeRequest,
            InitializedFile, PartAck, RemoteFile, SessionHandle, SignedPart, Transition,
        },
    },
    service::{BackendGateway, ContentSource, SessionTracker},
};

mock! {
    pub BackendGateway {}
    #[async_trait]
    impl BackendGateway for BackendGateway {
        async fn initialize_upload(
            &self,
            files_url: &str,
            request: &InitializeRequest,
        ) -> UploadResult<InitializedFile>;
        async fn sign_part(
            &self,
            key: &str,
            links: &FileLinks,
            part_number: u64,
        ) -> UploadResult<SignedPart>;
        async fn upload_part(&self, key: &str, target: &SignedPart, body: Bytes) -> UploadResult<PartAck>;
        async fn upload_content(
            &self,
            key: &str,
            content_url: &str,
            body: Bytes,
            sent: flume::Sender<u64>,
        ) -> UploadResult<()>;
        async fn finalize_upload(&self, key: &str, commit_url: &str) -> UploadResult<FinalizedFile>;
        async fn delete_file(&self, key: &str, links: &FileLinks) -> UploadResult<DeleteOutcome>;
        async fn import_parent_record_files(&self, draft: &DraftLinks) -> UploadResult<Vec<RemoteFile>>;
    }
}

mock! {
    pub SessionTracker {}
    #[async_trait]
    impl SessionTracker for SessionTracker {
        async fn transition(
            &self,
            handle: &SessionHandle,
            transition: Transition,
        ) -> UploadResult<FileRecord>;
        async fn progress(&self, handle: &SessionHandle, transferred: u64);
    }
}

mock! {
    pub ContentSource {}
    #[async_trait]
    impl ContentSource for ContentSource {
        fn size(&self) -> u64;
        async fn read(&self, range: Range<u64>) -> anyhow::Result<Bytes>;
    }
}
