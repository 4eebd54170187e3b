use serde::{Deserialize, Serialize};

use crate::exception::UploadException;
use crate::model::vo::UploadState;

/// Error as shown to whoever consumes the event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub is_user_facing: bool,
}

impl From<&UploadException> for ErrorReport {
    fn from(e: &UploadException) -> Self {
        Self {
            message: e.to_string(),
            is_user_facing: e.is_user_facing(),
        }
    }
}

/// A transition or progress update of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    pub key: String,
    pub state: UploadState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_percentage: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReport>,
}

impl LifecycleEvent {
    /// Whether this event closes the current attempt.
    pub fn ends_attempt(&self) -> bool {
        self.state.is_terminal() || self.state == UploadState::Failed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UploadEvent {
    Lifecycle(LifecycleEvent),
    /// The file left the working set.
    Removed { key: String },
    /// Files of the parent record were added.
    Imported { keys: Vec<String> },
}
