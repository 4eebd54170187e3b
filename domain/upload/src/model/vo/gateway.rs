use serde::{Deserialize, Serialize};

use crate::model::vo::{FileLinks, TransferKind};

/// Body entry of an initialize request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeRequest {
    pub key: String,
    pub size: u64,
    pub transfer: TransferRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    #[serde(rename = "type")]
    pub kind: TransferKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parts: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_size: Option<u64>,
}

/// Registered upload slot returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializedFile {
    pub key: String,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub links: FileLinks,
}

/// Server acknowledgment of one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartAck {
    pub part_number: u64,
    /// Integrity token, usually the MD5 ETag of the part.
    pub checksum: Option<String>,
}

/// Server-confirmed file after commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedFile {
    pub key: String,
    pub size: u64,
    pub checksum: String,
    #[serde(default)]
    pub links: FileLinks,
}

/// A file the server already knows about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub key: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub file_id: Option<String>,
    #[serde(default)]
    pub links: FileLinks,
    /// Server side status, "completed" once committed.
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Strip quoting and an "md5:" prefix so tokens from different sources compare equal.
pub fn normalize_checksum(checksum: &str) -> String {
    let trimmed = checksum.trim().trim_matches('"');
    trimmed.strip_prefix("md5:").unwrap_or(trimmed).to_lowercase()
}
