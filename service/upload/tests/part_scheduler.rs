mod common;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::Bytes;
use common::{file_links, signed, SlowGateway};
use domain_upload::{
    exception::UploadException,
    mock::{MockBackendGateway, MockSessionTracker},
    model::vo::{PartAck, PartState, SessionHandle, TransferDescriptor, TransferKind},
    service::{ContentSource, PartSchedulerService},
};
use service_upload::PartSchedulerServiceImpl;
use tokio_util::sync::CancellationToken;

fn handle() -> SessionHandle {
    SessionHandle {
        key: "data.bin".to_owned(),
        attempt: 0,
        cancel: CancellationToken::new(),
    }
}

fn content(size: usize) -> Arc<dyn ContentSource> {
    Arc::new(Bytes::from((0..size).map(|el| el as u8).collect::<Vec<_>>()))
}

/// A tracker that remembers every reported byte count.
fn recording_tracker() -> (MockSessionTracker, Arc<Mutex<Vec<u64>>>) {
    let seen = Arc::new(Mutex::new(vec![]));
    let mut tracker = MockSessionTracker::new();
    let sink = seen.clone();
    tracker
        .expect_progress()
        .returning(move |_, transferred| sink.lock().unwrap().push(transferred));
    (tracker, seen)
}

#[tokio::test(start_paused = true)]
async fn test_acks_out_of_order_complete_the_transfer() {
    let gateway = SlowGateway {
        part_delays: HashMap::from([
            (1, Duration::from_millis(30)),
            (2, Duration::from_millis(20)),
            (3, Duration::from_millis(10)),
        ]),
        ..Default::default()
    };
    let scheduler = PartSchedulerServiceImpl::builder()
        .gateway(Arc::new(gateway))
        .concurrency(3)
        .build();
    let (tracker, seen) = recording_tracker();
    let mut descriptor = TransferDescriptor::plan("data.bin", TransferKind::Multipart, 25, 10).unwrap();

    scheduler
        .schedule_upload(&tracker, &handle(), &file_links("data.bin"), content(25), &mut descriptor)
        .await
        .unwrap();

    assert!(descriptor.is_complete());
    // Part 3 is the short one and lands first.
    assert_eq!(*seen.lock().unwrap(), vec![5, 15, 25]);
}

#[tokio::test]
async fn test_part_retried_until_it_succeeds() {
    let mut gateway = MockBackendGateway::new();
    gateway.expect_sign_part().returning(|_, _, nth| Ok(signed(nth)));
    let mut failures = 0;
    gateway.expect_upload_part().times(5).returning(move |key, target, _| {
        if target.part_number == 2 && failures < 2 {
            failures += 1;
            return Err(UploadException::PartUploadFailed {
                key: key.to_owned(),
                part_number: 2,
                reason: "connection reset".to_owned(),
            });
        }
        Ok(PartAck {
            part_number: target.part_number,
            checksum: None,
        })
    });
    let scheduler = PartSchedulerServiceImpl::builder()
        .gateway(Arc::new(gateway))
        .retry_limit(3)
        .retry_backoff(Duration::ZERO)
        .build();
    let (tracker, _) = recording_tracker();
    let mut descriptor = TransferDescriptor::plan("data.bin", TransferKind::Multipart, 30, 10).unwrap();

    scheduler
        .schedule_upload(&tracker, &handle(), &file_links("data.bin"), content(30), &mut descriptor)
        .await
        .unwrap();
    assert!(descriptor.is_complete());
}

#[tokio::test]
async fn test_integrity_mismatch_exhausts_attempts() {
    let mut gateway = MockBackendGateway::new();
    // The target stays valid, only the body is sent again.
    gateway.expect_sign_part().times(1).returning(|_, _, nth| Ok(signed(nth)));
    gateway.expect_upload_part().times(2).returning(|_, target, _| {
        Ok(PartAck {
            part_number: target.part_number,
            checksum: Some("\"deadbeef\"".to_owned()),
        })
    });
    let scheduler = PartSchedulerServiceImpl::builder()
        .gateway(Arc::new(gateway))
        .retry_limit(2)
        .retry_backoff(Duration::ZERO)
        .verify_part_integrity(true)
        .build();
    let (tracker, _) = recording_tracker();
    let mut descriptor = TransferDescriptor::plan("data.bin", TransferKind::Multipart, 8, 10).unwrap();

    let result = scheduler
        .schedule_upload(&tracker, &handle(), &file_links("data.bin"), content(8), &mut descriptor)
        .await;
    assert!(matches!(
        result,
        Err(UploadException::PartUploadFailed { part_number: 1, .. })
    ));
    assert_eq!(descriptor.part_state(1), Some(PartState::Failed));
    assert!(!descriptor.is_complete());
}

#[tokio::test]
async fn test_matching_integrity_token_is_accepted() {
    let body = content(8);
    let digest = format!("\"{:x}\"", md5::compute(body.read(0..8).await.unwrap()));
    let mut gateway = MockBackendGateway::new();
    gateway.expect_sign_part().times(1).returning(|_, _, nth| Ok(signed(nth)));
    gateway.expect_upload_part().times(1).returning(move |_, target, _| {
        Ok(PartAck {
            part_number: target.part_number,
            checksum: Some(digest.to_owned()),
        })
    });
    let scheduler = PartSchedulerServiceImpl::builder()
        .gateway(Arc::new(gateway))
        .verify_part_integrity(true)
        .build();
    let (tracker, _) = recording_tracker();
    let mut descriptor = TransferDescriptor::plan("data.bin", TransferKind::Multipart, 8, 10).unwrap();

    scheduler
        .schedule_upload(&tracker, &handle(), &file_links("data.bin"), body, &mut descriptor)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_foreign_part_number_is_fatal() {
    let mut gateway = MockBackendGateway::new();
    gateway.expect_sign_part().times(1).returning(|_, _, nth| Ok(signed(nth)));
    gateway.expect_upload_part().times(1).returning(|_, _, _| {
        Ok(PartAck {
            part_number: 7,
            checksum: None,
        })
    });
    let scheduler = PartSchedulerServiceImpl::builder()
        .gateway(Arc::new(gateway))
        .retry_backoff(Duration::ZERO)
        .build();
    let (tracker, _) = recording_tracker();
    let mut descriptor = TransferDescriptor::plan("data.bin", TransferKind::Multipart, 5, 10).unwrap();

    let result = scheduler
        .schedule_upload(&tracker, &handle(), &file_links("data.bin"), content(5), &mut descriptor)
        .await;
    assert!(matches!(
        result,
        Err(UploadException::InvalidPartNumber { part_number: 7, total_parts: 1, .. })
    ));
}

#[tokio::test]
async fn test_expired_target_is_signed_again() {
    let mut gateway = MockBackendGateway::new();
    let mut signatures = 0;
    gateway.expect_sign_part().times(2).returning(move |_, _, nth| {
        signatures += 1;
        let mut target = signed(nth);
        if signatures == 1 {
            target.expires_at = Some(chrono::Utc::now() - chrono::Duration::minutes(1));
        }
        Ok(target)
    });
    gateway.expect_upload_part().times(1).returning(|_, target, _| {
        assert!(target.expires_at.is_none());
        Ok(PartAck {
            part_number: target.part_number,
            checksum: None,
        })
    });
    let scheduler = PartSchedulerServiceImpl::builder()
        .gateway(Arc::new(gateway))
        .retry_backoff(Duration::ZERO)
        .build();
    let (tracker, _) = recording_tracker();
    let mut descriptor = TransferDescriptor::plan("data.bin", TransferKind::Multipart, 5, 10).unwrap();

    scheduler
        .schedule_upload(&tracker, &handle(), &file_links("data.bin"), content(5), &mut descriptor)
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_aborts_parts_in_flight() {
    let gateway = SlowGateway {
        stall_uploads: true,
        ..Default::default()
    };
    let scheduler = PartSchedulerServiceImpl::builder()
        .gateway(Arc::new(gateway))
        .build();
    let (tracker, seen) = recording_tracker();
    let handle = handle();
    let mut descriptor = TransferDescriptor::plan("data.bin", TransferKind::Multipart, 40, 10).unwrap();

    let links = file_links("data.bin");
    let (result, _) = tokio::join!(
        scheduler.schedule_upload(&tracker, &handle, &links, content(40), &mut descriptor),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.cancel.cancel();
        }
    );
    assert!(matches!(result, Err(UploadException::Cancelled { .. })));
    assert!(descriptor.acknowledged_parts().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}
