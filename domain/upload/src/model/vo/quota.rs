use serde::{Deserialize, Serialize};

use crate::exception::{UploadException, UploadResult};
use crate::model::entity::FileRecord;

/// Per-draft limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    #[serde(default = "Quota::default_max_files")]
    pub max_files: usize,
    /// Bytes.
    #[serde(default = "Quota::default_max_storage")]
    pub max_storage: u64,
}

impl Quota {
    fn default_max_files() -> usize {
        5
    }
    fn default_max_storage() -> u64 {
        10_u64.pow(10)
    }

    /// Usage of the live (not failed, not cancelled) records.
    pub fn usage<'a>(&self, records: impl IntoIterator<Item = &'a FileRecord>) -> QuotaUsage {
        let (files, bytes) = records
            .into_iter()
            .filter(|el| el.state.is_live())
            .fold((0_usize, 0_u64), |(files, bytes), el| (files + 1, bytes + el.size));
        QuotaUsage {
            files,
            bytes,
            remaining_files: self.max_files.saturating_sub(files),
            remaining_bytes: self.max_storage.saturating_sub(bytes),
        }
    }

    /// Check one more file of `size` bytes against `usage`.
    pub fn admit(
        &self,
        usage: &QuotaUsage,
        key: &str,
        size: u64,
        allow_empty_files: bool,
    ) -> UploadResult<()> {
        let reason = if size == 0 && !allow_empty_files {
            Some("empty files are not allowed".to_owned())
        } else if usage.remaining_files == 0 {
            Some(format!("the draft already has the maximum of {} files", self.max_files))
        } else if size > usage.remaining_bytes {
            Some(format!(
                "its size of {size} bytes exceeds the remaining {} bytes of storage",
                usage.remaining_bytes
            ))
        } else {
            None
        };
        match reason {
            Some(reason) => Err(UploadException::FileSize {
                key: key.to_owned(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            max_files: Self::default_max_files(),
            max_storage: Self::default_max_storage(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaUsage {
    pub files: usize,
    pub bytes: u64,
    pub remaining_files: usize,
    pub remaining_bytes: u64,
}
