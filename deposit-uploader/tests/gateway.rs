use std::sync::Arc;

use bytes::Bytes;
use deposit_uploader::{
    config::{DepositConfig, HttpConfig},
    infrastructure::{build_http_client, InvenioBackendGateway, ServiceProvider},
};
use domain_upload::{
    command::AddFileCommand,
    exception::UploadException,
    model::vo::{
        DeleteOutcome, DraftLinks, FileLinks, InitializeRequest, SignedPart, TransferKind,
        TransferRequest, UploadState,
    },
    service::BackendGateway,
};
use httpmock::{
    Method::{DELETE, GET, POST, PUT},
    MockServer,
};
use serde_json::json;

const TOKEN: &str = "secret-token";

fn gateway() -> InvenioBackendGateway {
    let client = build_http_client(&HttpConfig::default()).unwrap();
    InvenioBackendGateway::new(client, Some(TOKEN.to_owned()))
}

fn links(server: &MockServer, key: &str) -> FileLinks {
    let base = server.url(format!("/api/records/1/draft/files/{key}"));
    FileLinks {
        content: Some(format!("{base}/content")),
        commit: Some(format!("{base}/commit")),
        self_link: Some(base),
        parts: vec![],
    }
}

#[tokio::test]
async fn test_initialize_registers_the_file() {
    let server = MockServer::start_async().await;
    let init = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/api/records/1/draft/files")
                .header("authorization", format!("Bearer {TOKEN}"))
                .json_body(json!([
                    { "key": "data.csv", "size": 30, "transfer": { "type": "M", "parts": 3, "part_size": 10 } }
                ]));
            then.status(201).json_body(json!({
                "enabled": true,
                "entries": [{
                    "key": "data.csv",
                    "file_id": "0b2c",
                    "status": "pending",
                    "links": {
                        "self": server.url("/api/records/1/draft/files/data.csv"),
                        "commit": server.url("/api/records/1/draft/files/data.csv/commit")
                    }
                }]
            }));
        })
        .await;

    let initialized = gateway()
        .initialize_upload(
            &server.url("/api/records/1/draft/files"),
            &InitializeRequest {
                key: "data.csv".to_owned(),
                size: 30,
                transfer: TransferRequest {
                    kind: TransferKind::Multipart,
                    parts: Some(3),
                    part_size: Some(10),
                },
            },
        )
        .await
        .unwrap();

    init.assert_async().await;
    assert_eq!(initialized.file_id.as_deref(), Some("0b2c"));
    assert!(initialized.links.commit.unwrap().ends_with("/data.csv/commit"));
    assert!(initialized.links.content.is_none());
}

#[tokio::test]
async fn test_sign_part_reads_fresh_links() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/api/records/1/draft/files/data.csv");
            then.status(200).json_body(json!({
                "key": "data.csv",
                "links": {
                    "self": server.url("/api/records/1/draft/files/data.csv"),
                    "parts": [
                        { "part": 1, "url": server.url("/s3/1"), "expiration": "2099-01-01T00:00:00Z" },
                        { "part": 2, "url": server.url("/s3/2"), "expiration": "2099-01-01T00:00:00Z" }
                    ]
                }
            }));
        })
        .await;

    let gateway = gateway();
    let links = links(&server, "data.csv");
    let part = gateway.sign_part("data.csv", &links, 2).await.unwrap();
    assert_eq!(part.url, server.url("/s3/2"));
    assert!(part.expires_at.is_some());

    let missing = gateway.sign_part("data.csv", &links, 3).await;
    assert!(matches!(
        missing,
        Err(UploadException::InvalidPartNumber { part_number: 3, total_parts: 2, .. })
    ));
}

#[tokio::test]
async fn test_part_status_mapping() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/s3/1").body("hello");
            then.status(200).header("ETag", "\"5d41402abc4b2a76b9719d911017c592\"");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/s3/2");
            then.status(403).body("<Error><Code>AccessDenied</Code></Error>");
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(PUT).path("/s3/3");
            then.status(503);
        })
        .await;
    let target = |nth: u64| SignedPart {
        part_number: nth,
        url: server.url(format!("/s3/{nth}")),
        expires_at: None,
    };
    let gateway = gateway();

    let ack = gateway
        .upload_part("a", &target(1), Bytes::from_static(b"hello"))
        .await
        .unwrap();
    assert_eq!(ack.part_number, 1);
    assert_eq!(ack.checksum.as_deref(), Some("\"5d41402abc4b2a76b9719d911017c592\""));

    let expired = gateway.upload_part("a", &target(2), Bytes::new()).await;
    assert!(matches!(expired, Err(UploadException::SignedUrlExpired { part_number: 2, .. })));

    let busy = gateway.upload_part("a", &target(3), Bytes::new()).await.unwrap_err();
    assert!(matches!(busy, UploadException::PartUploadFailed { part_number: 3, .. }));
    assert!(busy.is_retryable());
}

#[tokio::test]
async fn test_delete_status_mapping() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/records/1/draft/files/gone.csv");
            then.status(404).json_body(json!({ "status": 404, "message": "not found" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/records/1/draft/files/here.csv");
            then.status(204);
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(DELETE).path("/api/records/1/draft/files/locked.csv");
            then.status(400).json_body(json!({ "status": 400, "message": "Record is locked." }));
        })
        .await;
    let gateway = gateway();

    let gone = gateway.delete_file("gone.csv", &links(&server, "gone.csv")).await.unwrap();
    assert_eq!(gone, DeleteOutcome::NotFound);
    let here = gateway.delete_file("here.csv", &links(&server, "here.csv")).await.unwrap();
    assert_eq!(here, DeleteOutcome::Deleted);

    let locked = gateway
        .delete_file("locked.csv", &links(&server, "locked.csv"))
        .await
        .unwrap_err();
    match locked {
        UploadException::Gateway { status, message, .. } => {
            assert_eq!(status, Some(400));
            assert_eq!(message, "Record is locked.");
        }
        other => panic!("unexpected error: {other}"),
    }

    let unlinked = gateway.delete_file("x", &FileLinks::default()).await;
    assert!(matches!(unlinked, Err(UploadException::InternalError { .. })));
}

#[tokio::test]
async fn test_import_reads_entries() {
    let server = MockServer::start_async().await;
    let import = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/records/1/draft/actions/files-import");
            then.status(201).json_body(json!({
                "entries": [
                    { "key": "old.csv", "size": 9, "checksum": "md5:abc", "mimetype": "text/csv", "status": "completed" }
                ]
            }));
        })
        .await;

    let files = gateway()
        .import_parent_record_files(&DraftLinks::new(server.url("/api/records/1/draft")))
        .await
        .unwrap();
    import.assert_async().await;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].checksum.as_deref(), Some("md5:abc"));
    assert_eq!(files[0].status.as_deref(), Some("completed"));
}

#[tokio::test]
async fn test_local_upload_end_to_end() {
    let server = MockServer::start_async().await;
    let file = server.url("/api/records/1/draft/files/notes.txt");
    let init = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/records/1/draft/files");
            then.status(201).json_body(json!({
                "entries": [{
                    "key": "notes.txt",
                    "links": {
                        "self": file,
                        "content": format!("{file}/content"),
                        "commit": format!("{file}/commit")
                    }
                }]
            }));
        })
        .await;
    let content = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/records/1/draft/files/notes.txt/content")
                .header("content-type", "application/octet-stream")
                .body("some notes");
            then.status(200).json_body(json!({ "key": "notes.txt", "status": "pending" }));
        })
        .await;
    let commit = server
        .mock_async(|when, then| {
            when.method(POST).path("/api/records/1/draft/files/notes.txt/commit");
            then.status(200).json_body(json!({
                "key": "notes.txt",
                "size": 10,
                "checksum": "md5:2ad6b1f6a1a1bbd5ac4c0e1a4a5a4f5c",
                "status": "completed",
                "links": { "self": file }
            }));
        })
        .await;

    let coordinator = ServiceProvider::coordinator(
        &DepositConfig::default(),
        DraftLinks::new(server.url("/api/records/1/draft")),
        Arc::new(gateway()),
    );
    let record = coordinator
        .upload(
            AddFileCommand::new("notes.txt", Arc::new(Bytes::from_static(b"some notes")))
                .with_mime_type("text/plain"),
        )
        .await
        .unwrap();

    init.assert_async().await;
    content.assert_async().await;
    commit.assert_async().await;
    assert_eq!(record.state, UploadState::Completed);
    assert_eq!(record.size, 10);
    assert_eq!(record.checksum.as_deref(), Some("md5:2ad6b1f6a1a1bbd5ac4c0e1a4a5a4f5c"));
}

#[tokio::test]
async fn test_content_upload_reports_each_chunk() {
    let server = MockServer::start_async().await;
    let content = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/api/records/1/draft/files/big.bin/content")
                .header("authorization", format!("Bearer {TOKEN}"))
                .header("content-length", "200000");
            then.status(200);
        })
        .await;

    let (sent, progress) = flume::unbounded();
    gateway()
        .upload_content(
            "big.bin",
            &server.url("/api/records/1/draft/files/big.bin/content"),
            Bytes::from(vec![1_u8; 200_000]),
            sent,
        )
        .await
        .unwrap();

    content.assert_async().await;
    let totals: Vec<u64> = progress.drain().collect();
    assert_eq!(totals, vec![65_536, 131_072, 196_608, 200_000]);
}
