use tokio_util::sync::CancellationToken;

use crate::model::vo::{ErrorReport, FileLinks, FinalizedFile};

/// Step requested by the session driver.
#[derive(Debug, Clone)]
pub enum Transition {
    /// pending/failed -> initializing
    Initialize,
    /// initializing -> uploading
    Registered {
        file_id: Option<String>,
        links: FileLinks,
    },
    /// uploading -> finalizing
    BeginFinalize,
    /// finalizing -> completed
    Complete(FinalizedFile),
    /// initializing/uploading/finalizing -> failed
    Fail(ErrorReport),
}

/// Identifies one attempt of one session.
///
/// Results carrying an outdated attempt are ignored.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub key: String,
    pub attempt: u32,
    pub cancel: CancellationToken,
}
