use serde::{Deserialize, Serialize};

/// Lifecycle state of one file upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Admitted, nothing sent yet.
    #[default]
    Pending,
    /// Registering the upload with the server.
    Initializing,
    /// Sending bytes or parts.
    Uploading,
    /// Asking the server to commit the uploaded content.
    Finalizing,
    Completed,
    Failed,
    Cancelled,
}

impl UploadState {
    /// `Completed` and `Cancelled` never change again.
    ///
    /// `Failed` is not terminal, it can be retried or cancelled.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// An attempt is talking to the server.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Initializing | Self::Uploading | Self::Finalizing)
    }

    /// Whether a file in this state takes up quota.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: UploadState) -> bool {
        use UploadState::*;
        match (self, next) {
            (Pending, Initializing)
            | (Failed, Initializing)
            | (Initializing, Uploading)
            | (Uploading, Finalizing)
            | (Finalizing, Completed)
            | (Initializing | Uploading | Finalizing, Failed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for UploadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Initializing => "initializing",
            Self::Uploading => "uploading",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for UploadState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "pending" => Self::Pending,
            "initializing" => Self::Initializing,
            "uploading" => Self::Uploading,
            "finalizing" => Self::Finalizing,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            other => anyhow::bail!("Unknown upload state: {other}"),
        })
    }
}
