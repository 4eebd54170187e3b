use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use domain_upload::{
    exception::{UploadException, UploadResult},
    model::{
        entity::{FileRecord, UploadSession},
        vo::{Quota, QuotaUsage, SessionHandle, Transition, UploadEvent, UploadState},
    },
    service::{ContentSource, SessionTracker},
};
use tokio::sync::Mutex;

/// Sessions of one draft and the subscribers to their events.
///
/// The lock is only held for bookkeeping, never while a request is pending.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, UploadSession>,
    subscribers: Vec<flume::Sender<UploadEvent>>,
}

impl Inner {
    fn publish(&mut self, event: UploadEvent) {
        self.subscribers.retain(|el| el.send(event.clone()).is_ok());
    }

    fn usage(&self, quota: &Quota, except: Option<&str>) -> QuotaUsage {
        quota.usage(
            self.sessions
                .values()
                .map(UploadSession::record)
                .filter(|el| Some(el.key.as_str()) != except),
        )
    }

    fn session(&mut self, key: &str) -> UploadResult<&mut UploadSession> {
        self.sessions.get_mut(key).ok_or_else(|| UploadException::NoSuchFile {
            key: key.to_owned(),
        })
    }

    /// Refuse `key` while a live session holds it.
    fn ensure_vacant(&self, key: &str) -> UploadResult<()> {
        match self.sessions.get(key) {
            Some(el) if el.state().is_live() => Err(UploadException::DuplicateFile {
                key: key.to_owned(),
            }),
            _ => Ok(()),
        }
    }

    fn insert(&mut self, session: UploadSession) -> FileRecord {
        let record = session.record().to_owned();
        self.publish(UploadEvent::Lifecycle(session.event()));
        self.sessions.insert(record.key.to_owned(), session);
        record
    }
}

/// What a session attempt starts from.
pub(crate) struct Launch {
    pub handle: SessionHandle,
    pub record: FileRecord,
    pub content: Arc<dyn ContentSource>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self) -> flume::Receiver<UploadEvent> {
        let (sender, receiver) = flume::unbounded();
        self.inner.lock().await.subscribers.push(sender);
        receiver
    }

    pub async fn publish(&self, event: UploadEvent) {
        self.inner.lock().await.publish(event);
    }

    /// Add a pending local file if the quota allows it.
    pub async fn admit(
        &self,
        quota: &Quota,
        allow_empty_files: bool,
        session: UploadSession,
    ) -> UploadResult<FileRecord> {
        let mut inner = self.inner.lock().await;
        let record = session.record();
        inner.ensure_vacant(&record.key)?;
        let usage = inner.usage(quota, Some(&record.key));
        quota.admit(&usage, &record.key, record.size, allow_empty_files)?;
        Ok(inner.insert(session))
    }

    /// Add a file the server already holds. Counted against the quota but never refused for it.
    pub async fn insert_remote(&self, session: UploadSession) -> UploadResult<FileRecord> {
        let mut inner = self.inner.lock().await;
        inner.ensure_vacant(&session.record().key)?;
        Ok(inner.insert(session))
    }

    /// Move a pending file to initializing and hand out its first attempt.
    pub(crate) async fn begin(&self, key: &str) -> UploadResult<Launch> {
        let mut inner = self.inner.lock().await;
        let session = inner.session(key)?;
        let content = session.content().ok_or_else(|| UploadException::ContentUnavailable {
            key: key.to_owned(),
        })?;
        match session.state() {
            UploadState::Pending => {}
            UploadState::Cancelled => return Err(UploadException::Cancelled { key: key.to_owned() }),
            from => {
                return Err(UploadException::InvalidTransition {
                    key: key.to_owned(),
                    from,
                    to: UploadState::Initializing,
                })
            }
        }
        let event = session.apply(Transition::Initialize)?;
        let launch = Launch {
            handle: session.handle(),
            record: session.record().to_owned(),
            content,
        };
        inner.publish(UploadEvent::Lifecycle(event));
        Ok(launch)
    }

    /// Start a new attempt of a failed file, checking the quota again.
    pub(crate) async fn rearm(&self, key: &str, quota: &Quota) -> UploadResult<Launch> {
        let mut inner = self.inner.lock().await;
        let usage = inner.usage(quota, Some(key));
        let session = inner.session(key)?;
        // Failed files don't count, so the old size has to fit again.
        if session.state() == UploadState::Failed {
            quota.admit(&usage, key, session.record().size, true)?;
        }
        let handle = session.rearm()?;
        let event = session.apply(Transition::Initialize)?;
        let launch = Launch {
            handle,
            record: session.record().to_owned(),
            content: session.content().ok_or_else(|| UploadException::ContentUnavailable {
                key: key.to_owned(),
            })?,
        };
        inner.publish(UploadEvent::Lifecycle(event));
        Ok(launch)
    }

    /// Cancel a session. Files in a terminal state are returned as they are.
    pub async fn cancel(&self, key: &str) -> UploadResult<FileRecord> {
        let mut inner = self.inner.lock().await;
        let session = inner.session(key)?;
        let event = session.cancel();
        let record = session.record().to_owned();
        if let Some(event) = event {
            tracing::info!(key, "Upload cancelled.");
            inner.publish(UploadEvent::Lifecycle(event));
        }
        Ok(record)
    }

    /// Stop the attempt in flight, if any, ahead of a delete.
    ///
    /// Pending and failed files are left as they are, so a delete that fails changes nothing for them.
    /// Returns the record with its standing.
    pub async fn halt(&self, key: &str) -> UploadResult<(FileRecord, UploadState)> {
        let mut inner = self.inner.lock().await;
        let session = inner.session(key)?;
        let event = if session.state().is_in_flight() {
            session.cancel()
        } else {
            None
        };
        let halted = (session.record().to_owned(), session.standing());
        if let Some(event) = event {
            tracing::info!(key, "Upload stopped for deletion.");
            inner.publish(UploadEvent::Lifecycle(event));
        }
        Ok(halted)
    }

    /// Drop a file from the working set. An attempt started meanwhile is cancelled.
    pub async fn remove(&self, key: &str) -> Option<FileRecord> {
        let mut inner = self.inner.lock().await;
        let mut session = inner.sessions.remove(key)?;
        let record = session.record().to_owned();
        session.cancel();
        inner.publish(UploadEvent::Removed { key: key.to_owned() });
        Some(record)
    }

    pub async fn get(&self, key: &str) -> UploadResult<FileRecord> {
        self.inner.lock().await.session(key).map(|el| el.record().to_owned())
    }

    /// Every file, ordered by key.
    pub async fn records(&self) -> Vec<FileRecord> {
        let inner = self.inner.lock().await;
        let mut records: Vec<_> = inner.sessions.values().map(|el| el.record().to_owned()).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        records
    }

    pub async fn usage(&self, quota: &Quota) -> QuotaUsage {
        self.inner.lock().await.usage(quota, None)
    }
}

#[async_trait]
impl SessionTracker for SessionRegistry {
    async fn transition(
        &self,
        handle: &SessionHandle,
        transition: Transition,
    ) -> UploadResult<FileRecord> {
        let mut inner = self.inner.lock().await;
        let stale = || UploadException::Cancelled {
            key: handle.key.to_owned(),
        };
        let session = inner.sessions.get_mut(&handle.key).ok_or_else(stale)?;
        if !session.is_current(handle) {
            tracing::debug!(key = %handle.key, attempt = handle.attempt, "Ignoring a stale result.");
            return Err(stale());
        }
        let event = session.apply(transition)?;
        let record = session.record().to_owned();
        inner.publish(UploadEvent::Lifecycle(event));
        Ok(record)
    }

    async fn progress(&self, handle: &SessionHandle, transferred: u64) {
        let mut inner = self.inner.lock().await;
        let Some(session) = inner.sessions.get_mut(&handle.key) else {
            return;
        };
        if !session.is_current(handle) {
            return;
        }
        if let Some(event) = session.progress(transferred) {
            inner.publish(UploadEvent::Lifecycle(event));
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use domain_upload::model::vo::{ErrorReport, FileLinks, RemoteFile, TransferKind};

    use super::*;

    fn local(key: &str, size: u64) -> UploadSession {
        let content: Arc<dyn ContentSource> = Arc::new(Bytes::from(vec![1_u8; size as usize]));
        UploadSession::new(
            FileRecord::new(key, size, "text/plain", TransferKind::Local),
            Some(content),
        )
    }

    fn quota() -> Quota {
        Quota {
            max_files: 2,
            max_storage: 100,
        }
    }

    #[tokio::test]
    async fn admit_respects_quota_and_keys() {
        let registry = SessionRegistry::new();
        registry.admit(&quota(), false, local("a", 60)).await.unwrap();
        assert!(matches!(
            registry.admit(&quota(), false, local("a", 1)).await,
            Err(UploadException::DuplicateFile { .. })
        ));
        assert!(matches!(
            registry.admit(&quota(), false, local("b", 41)).await,
            Err(UploadException::FileSize { .. })
        ));
        assert_eq!(registry.records().await.len(), 1);
        registry.admit(&quota(), false, local("b", 40)).await.unwrap();
        assert_eq!(registry.usage(&quota()).await.remaining_bytes, 0);
    }

    #[tokio::test]
    async fn stale_attempts_are_ignored() {
        let registry = SessionRegistry::new();
        registry.admit(&quota(), false, local("a", 10)).await.unwrap();
        let first = registry.begin("a").await.unwrap();
        registry
            .transition(
                &first.handle,
                Transition::Fail(ErrorReport {
                    message: "boom".to_owned(),
                    is_user_facing: false,
                }),
            )
            .await
            .unwrap();
        let second = registry.rearm("a", &quota()).await.unwrap();
        assert_eq!(second.record.state, UploadState::Initializing);

        let late = registry
            .transition(
                &first.handle,
                Transition::Registered {
                    file_id: None,
                    links: FileLinks::default(),
                },
            )
            .await;
        assert!(matches!(late, Err(UploadException::Cancelled { .. })));
        assert_eq!(registry.get("a").await.unwrap().state, UploadState::Initializing);
    }

    #[tokio::test]
    async fn subscribers_see_events_in_order() {
        let registry = SessionRegistry::new();
        let events = registry.subscribe().await;
        registry.admit(&quota(), false, local("a", 10)).await.unwrap();
        registry.cancel("a").await.unwrap();
        registry.cancel("a").await.unwrap();
        registry.remove("a").await.unwrap();

        let states: Vec<_> = events.drain().collect();
        assert_eq!(states.len(), 3);
        assert!(matches!(&states[0], UploadEvent::Lifecycle(el) if el.state == UploadState::Pending));
        assert!(matches!(&states[1], UploadEvent::Lifecycle(el) if el.state == UploadState::Cancelled));
        assert_eq!(states[2], UploadEvent::Removed { key: "a".to_owned() });
    }

    #[tokio::test]
    async fn halt_only_stops_attempts_in_flight() {
        let registry = SessionRegistry::new();
        registry.admit(&quota(), false, local("a", 10)).await.unwrap();
        registry.admit(&quota(), false, local("b", 10)).await.unwrap();

        let (record, standing) = registry.halt("a").await.unwrap();
        assert_eq!((record.state, standing), (UploadState::Pending, UploadState::Pending));
        assert_eq!(registry.get("a").await.unwrap().state, UploadState::Pending);

        let launch = registry.begin("b").await.unwrap();
        let (_, standing) = registry.halt("b").await.unwrap();
        assert_eq!(standing, UploadState::Initializing);
        assert!(launch.handle.cancel.is_cancelled());
        assert_eq!(registry.get("b").await.unwrap().state, UploadState::Cancelled);
        // A second halt still sees where the upload was.
        let (_, standing) = registry.halt("b").await.unwrap();
        assert_eq!(standing, UploadState::Initializing);
    }

    #[tokio::test]
    async fn remote_files_bypass_quota() {
        let registry = SessionRegistry::new();
        let full = Quota {
            max_files: 0,
            max_storage: 0,
        };
        let record = registry
            .insert_remote(UploadSession::new(
                FileRecord::from_remote(RemoteFile {
                    key: "old.csv".to_owned(),
                    size: 5,
                    checksum: Some("md5:abc".to_owned()),
                    mimetype: None,
                    file_id: None,
                    links: FileLinks::default(),
                    status: Some("completed".to_owned()),
                }),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(record.state, UploadState::Completed);
        assert_eq!(registry.usage(&full).await.files, 1);
        assert!(matches!(
            registry.begin("old.csv").await,
            Err(UploadException::ContentUnavailable { .. })
        ));
    }
}
