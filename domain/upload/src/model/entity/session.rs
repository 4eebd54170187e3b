use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::exception::{UploadException, UploadResult};
use crate::model::entity::FileRecord;
use crate::model::vo::{FileLinks, LifecycleEvent, SessionHandle, Transition, UploadState};
use crate::service::ContentSource;

/// A file record paired with what is needed to (re)send it.
///
/// All lifecycle changes of the record go through here.
pub struct UploadSession {
    record: FileRecord,
    content: Option<Arc<dyn ContentSource>>,
    attempt: u32,
    cancel: CancellationToken,
    /// State the record had when it got cancelled.
    cancelled_from: Option<UploadState>,
}

impl UploadSession {
    /// `content` is `None` for files that only exist on the server.
    pub fn new(record: FileRecord, content: Option<Arc<dyn ContentSource>>) -> Self {
        Self {
            record,
            content,
            attempt: 0,
            cancel: CancellationToken::new(),
            cancelled_from: None,
        }
    }

    pub fn record(&self) -> &FileRecord {
        &self.record
    }

    pub fn state(&self) -> UploadState {
        self.record.state
    }

    /// How far the file got before any cancellation.
    pub fn standing(&self) -> UploadState {
        match (self.record.state, self.cancelled_from) {
            (UploadState::Cancelled, Some(from)) => from,
            (state, _) => state,
        }
    }

    pub fn content(&self) -> Option<Arc<dyn ContentSource>> {
        self.content.clone()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            key: self.record.key.to_owned(),
            attempt: self.attempt,
            cancel: self.cancel.clone(),
        }
    }

    /// Whether results of `handle` still matter.
    pub fn is_current(&self, handle: &SessionHandle) -> bool {
        self.attempt == handle.attempt && !self.record.state.is_terminal()
    }

    pub fn apply(&mut self, transition: Transition) -> UploadResult<LifecycleEvent> {
        let next = match &transition {
            Transition::Initialize => UploadState::Initializing,
            Transition::Registered { .. } => UploadState::Uploading,
            Transition::BeginFinalize => UploadState::Finalizing,
            Transition::Complete(_) => UploadState::Completed,
            Transition::Fail(_) => UploadState::Failed,
        };
        if !self.record.state.can_transition_to(next) {
            return Err(UploadException::InvalidTransition {
                key: self.record.key.to_owned(),
                from: self.record.state,
                to: next,
            });
        }

        let record = &mut self.record;
        match transition {
            Transition::Initialize => {
                record.progress_percentage = 0;
                record.checksum = None;
                record.error = None;
                record.links = FileLinks::default();
            }
            Transition::Registered { file_id, links } => {
                record.links.merge(links);
                if file_id.is_some() {
                    record.file_id = file_id;
                }
            }
            Transition::BeginFinalize => {}
            Transition::Complete(finalized) => {
                // Server values replace the provisional client ones.
                record.size = finalized.size;
                record.checksum = Some(finalized.checksum);
                record.links.merge(finalized.links);
                record.progress_percentage = 100;
            }
            Transition::Fail(report) => record.error = Some(report),
        }
        record.state = next;
        Ok(self.event())
    }

    /// Update progress from the number of bytes confirmed so far.
    ///
    /// Returns an event only when the percentage grew.
    pub fn progress(&mut self, transferred: u64) -> Option<LifecycleEvent> {
        if self.record.state != UploadState::Uploading {
            return None;
        }
        let percentage = if self.record.size == 0 {
            100
        } else {
            (u128::from(transferred.min(self.record.size)) * 100 / u128::from(self.record.size))
                as u8
        };
        if percentage <= self.record.progress_percentage {
            return None;
        }
        self.record.progress_percentage = percentage;
        Some(self.event())
    }

    /// Cancel from any non-terminal state. `None` when there was nothing to cancel.
    pub fn cancel(&mut self) -> Option<LifecycleEvent> {
        if self.record.state.is_terminal() {
            return None;
        }
        self.cancel.cancel();
        self.cancelled_from = Some(self.record.state);
        self.record.state = UploadState::Cancelled;
        Some(self.event())
    }

    /// Prepare a new attempt of a failed upload.
    pub fn rearm(&mut self) -> UploadResult<SessionHandle> {
        if self.record.state != UploadState::Failed {
            return Err(UploadException::InvalidTransition {
                key: self.record.key.to_owned(),
                from: self.record.state,
                to: UploadState::Initializing,
            });
        }
        if self.content.is_none() {
            return Err(UploadException::ContentUnavailable {
                key: self.record.key.to_owned(),
            });
        }
        self.attempt += 1;
        self.cancel = CancellationToken::new();
        Ok(self.handle())
    }

    /// Where the file stands right now.
    pub fn event(&self) -> LifecycleEvent {
        LifecycleEvent {
            key: self.record.key.to_owned(),
            state: self.record.state,
            progress_percentage: Some(self.record.progress_percentage),
            error: self.record.error.to_owned(),
        }
    }
}
