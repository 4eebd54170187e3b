use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Links the server issues for one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileLinks {
    /// Metadata of the file, also used to delete it.
    #[serde(rename = "self", default, skip_serializing_if = "Option::is_none")]
    pub self_link: Option<String>,
    /// Where the bytes of a whole-file transfer go.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Finalizes the upload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    /// Signed part targets of a multipart transfer.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<SignedPart>,
}

impl FileLinks {
    pub fn is_empty(&self) -> bool {
        self.self_link.is_none() && self.content.is_none() && self.commit.is_none()
    }

    /// Take every link `other` has, keep ours where it has none.
    pub fn merge(&mut self, other: FileLinks) {
        if other.self_link.is_some() {
            self.self_link = other.self_link;
        }
        if other.content.is_some() {
            self.content = other.content;
        }
        if other.commit.is_some() {
            self.commit = other.commit;
        }
        if !other.parts.is_empty() {
            self.parts = other.parts;
        }
    }

    pub fn part(&self, part_number: u64) -> Option<&SignedPart> {
        self.parts.iter().find(|el| el.part_number == part_number)
    }
}

/// A signed, time-limited target for one part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPart {
    #[serde(rename = "part")]
    pub part_number: u64,
    pub url: String,
    #[serde(rename = "expiration", default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SignedPart {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

/// Links of the draft the files belong to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftLinks {
    #[serde(rename = "self")]
    pub self_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<String>,
}

impl DraftLinks {
    pub fn new(self_link: impl Into<String>) -> Self {
        Self {
            self_link: self_link.into(),
            files: None,
        }
    }

    pub fn files_url(&self) -> String {
        match &self.files {
            Some(files) => files.to_owned(),
            None => format!("{}/files", self.self_link.trim_end_matches('/')),
        }
    }

    /// Metadata link of `key`, for files whose own link is not known.
    pub fn file_url(&self, key: &str) -> String {
        format!("{}/{key}", self.files_url())
    }

    pub fn files_import_url(&self) -> String {
        format!("{}/actions/files-import", self.self_link.trim_end_matches('/'))
    }
}
