#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use domain_upload::{
    exception::UploadResult,
    model::vo::{
        DeleteOutcome, DraftLinks, FileLinks, FinalizedFile, InitializeRequest, InitializedFile,
        PartAck, RemoteFile, SignedPart,
    },
    service::BackendGateway,
};

pub const DRAFT: &str = "https://repo.test/api/records/1/draft";

pub fn file_links(key: &str) -> FileLinks {
    let base = format!("{DRAFT}/files/{key}");
    FileLinks {
        content: Some(format!("{base}/content")),
        commit: Some(format!("{base}/commit")),
        self_link: Some(base),
        parts: vec![],
    }
}

pub fn signed(part_number: u64) -> SignedPart {
    SignedPart {
        part_number,
        url: format!("https://s3.test/bucket/part/{part_number}"),
        expires_at: None,
    }
}

/// Gateway that answers after a configurable delay, or never.
#[derive(Default)]
pub struct SlowGateway {
    /// Delay before the ack of a part.
    pub part_delays: HashMap<u64, Duration>,
    /// Leave initialize pending forever.
    pub stall_initialize: bool,
    /// Leave part and content uploads pending forever.
    pub stall_uploads: bool,
    /// Answer deletes with a 404.
    pub missing_on_delete: bool,
    /// Self links of the delete requests.
    pub deleted: Mutex<Vec<String>>,
    /// Size reported by finalize.
    pub size: u64,
    pub finalized: AtomicU32,
}

impl SlowGateway {
    pub fn finalized(&self) -> u32 {
        self.finalized.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendGateway for SlowGateway {
    async fn initialize_upload(
        &self,
        _files_url: &str,
        request: &InitializeRequest,
    ) -> UploadResult<InitializedFile> {
        if self.stall_initialize {
            futures::future::pending::<()>().await;
        }
        Ok(InitializedFile {
            key: request.key.to_owned(),
            file_id: None,
            links: file_links(&request.key),
        })
    }

    async fn sign_part(
        &self,
        _key: &str,
        _links: &FileLinks,
        part_number: u64,
    ) -> UploadResult<SignedPart> {
        Ok(signed(part_number))
    }

    async fn upload_part(&self, _key: &str, target: &SignedPart, _body: Bytes) -> UploadResult<PartAck> {
        if self.stall_uploads {
            futures::future::pending::<()>().await;
        }
        if let Some(delay) = self.part_delays.get(&target.part_number) {
            tokio::time::sleep(*delay).await;
        }
        Ok(PartAck {
            part_number: target.part_number,
            checksum: None,
        })
    }

    async fn upload_content(
        &self,
        _key: &str,
        _content_url: &str,
        _body: Bytes,
        _sent: flume::Sender<u64>,
    ) -> UploadResult<()> {
        if self.stall_uploads {
            futures::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn finalize_upload(&self, key: &str, _commit_url: &str) -> UploadResult<FinalizedFile> {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        Ok(FinalizedFile {
            key: key.to_owned(),
            size: self.size,
            checksum: "md5:0f343b0931126a20f133d67c2b018a3b".to_owned(),
            links: FileLinks::default(),
        })
    }

    async fn delete_file(&self, _key: &str, links: &FileLinks) -> UploadResult<DeleteOutcome> {
        self.deleted
            .lock()
            .unwrap()
            .extend(links.self_link.iter().cloned());
        if self.missing_on_delete {
            return Ok(DeleteOutcome::NotFound);
        }
        Ok(DeleteOutcome::Deleted)
    }

    async fn import_parent_record_files(&self, _draft: &DraftLinks) -> UploadResult<Vec<RemoteFile>> {
        Ok(vec![])
    }
}
