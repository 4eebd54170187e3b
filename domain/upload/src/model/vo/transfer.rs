use std::collections::BTreeSet;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::exception::{UploadException, UploadResult};

/// Upload strategy tag understood by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransferKind {
    /// "L": the whole file in one request.
    Local,
    /// "M": signed parts, committed at the end.
    Multipart,
    Other(String),
}

impl TransferKind {
    pub fn is_multipart(&self) -> bool {
        matches!(self, Self::Multipart)
    }
}

impl From<String> for TransferKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "L" => Self::Local,
            "M" => Self::Multipart,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for TransferKind {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl From<TransferKind> for String {
    fn from(value: TransferKind) -> Self {
        value.to_string()
    }
}

impl std::fmt::Display for TransferKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferKind::Local => write!(f, "L"),
            TransferKind::Multipart => write!(f, "M"),
            TransferKind::Other(tag) => write!(f, "{tag}"),
        }
    }
}

/// Which transfer kinds may be used and how a file picks one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPolicy {
    #[serde(default = "TransferPolicy::default_supported")]
    pub supported_transfer_kinds: Vec<TransferKind>,
    #[serde(default = "TransferPolicy::default_kind")]
    pub default_transfer_kind: TransferKind,
    /// Bytes per part of a multipart transfer.
    #[serde(default = "TransferPolicy::default_part_size")]
    pub part_size: u64,
    /// Files strictly larger than this use multipart when the server supports it.
    #[serde(default = "TransferPolicy::default_multipart_threshold")]
    pub multipart_threshold: u64,
}

impl TransferPolicy {
    fn default_supported() -> Vec<TransferKind> {
        vec![TransferKind::Local]
    }
    fn default_kind() -> TransferKind {
        TransferKind::Local
    }
    fn default_part_size() -> u64 {
        5 * 1024 * 1024
    }
    fn default_multipart_threshold() -> u64 {
        100 * 1024 * 1024
    }

    /// Kind for a new file: the requested one, else multipart for large files, else the default.
    pub fn choose(&self, requested: Option<&TransferKind>, size: u64) -> TransferKind {
        if let Some(kind) = requested {
            return kind.to_owned();
        }
        if size > self.multipart_threshold && self.is_supported(&TransferKind::Multipart) {
            return TransferKind::Multipart;
        }
        self.default_transfer_kind.to_owned()
    }

    pub fn is_supported(&self, kind: &TransferKind) -> bool {
        self.supported_transfer_kinds.contains(kind)
    }

    pub fn ensure_supported(&self, key: &str, kind: &TransferKind) -> UploadResult<()> {
        if self.is_supported(kind) {
            return Ok(());
        }
        Err(UploadException::UnsupportedTransferKind {
            key: key.to_owned(),
            kind: kind.to_owned(),
            supported: self.supported_transfer_kinds.to_owned(),
        })
    }
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            supported_transfer_kinds: Self::default_supported(),
            default_transfer_kind: Self::default_kind(),
            part_size: Self::default_part_size(),
            multipart_threshold: Self::default_multipart_threshold(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    Pending,
    Uploaded,
    Failed,
}

/// Part layout and progress of one multipart transfer.
///
/// Part numbers are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDescriptor {
    pub kind: TransferKind,
    pub size: u64,
    pub part_size: u64,
    pub total_parts: u64,
    parts: Vec<PartState>,
    acknowledged: BTreeSet<u64>,
}

impl TransferDescriptor {
    /// Most parts one multipart upload may have, as S3 style stores allow.
    pub const MAX_PARTS: u64 = 10_000;

    /// Split `size` bytes of `key` into parts of `part_size`. An empty file still has one (empty) part.
    pub fn plan(key: &str, kind: TransferKind, size: u64, part_size: u64) -> UploadResult<Self> {
        if part_size == 0 {
            return Err(anyhow::anyhow!("Part size of {key} must be positive").into());
        }
        let total_parts = if size == 0 {
            1
        } else {
            size / part_size + u64::from(size % part_size != 0)
        };
        if total_parts > Self::MAX_PARTS {
            return Err(UploadException::FileSize {
                key: key.to_owned(),
                reason: format!(
                    "it needs {total_parts} parts of {part_size} bytes, at most {} are allowed",
                    Self::MAX_PARTS
                ),
            });
        }
        Ok(Self {
            kind,
            size,
            part_size,
            total_parts,
            parts: vec![PartState::Pending; total_parts as usize],
            acknowledged: BTreeSet::new(),
        })
    }

    pub fn contains(&self, part_number: u64) -> bool {
        (1..=self.total_parts).contains(&part_number)
    }

    pub fn check_part(&self, key: &str, part_number: u64) -> UploadResult<()> {
        if self.contains(part_number) {
            return Ok(());
        }
        Err(UploadException::InvalidPartNumber {
            key: key.to_owned(),
            part_number,
            total_parts: self.total_parts,
        })
    }

    /// Byte range of a part inside the file.
    pub fn byte_range(&self, part_number: u64) -> Option<Range<u64>> {
        if !self.contains(part_number) {
            return None;
        }
        let start = (part_number - 1) * self.part_size;
        let end = (start + self.part_size).min(self.size);
        Some(start..end)
    }

    pub fn part_state(&self, part_number: u64) -> Option<PartState> {
        if !self.contains(part_number) {
            return None;
        }
        self.parts.get((part_number - 1) as usize).copied()
    }

    /// Record an acknowledged part. Returns whether it was new.
    pub fn acknowledge(&mut self, part_number: u64) -> bool {
        if !self.contains(part_number) {
            return false;
        }
        self.parts[(part_number - 1) as usize] = PartState::Uploaded;
        self.acknowledged.insert(part_number)
    }

    pub fn mark_failed(&mut self, part_number: u64) {
        if self.contains(part_number) && !self.acknowledged.contains(&part_number) {
            self.parts[(part_number - 1) as usize] = PartState::Failed;
        }
    }

    /// Parts that still have to be sent, in order.
    pub fn outstanding_parts(&self) -> Vec<u64> {
        (1..=self.total_parts).filter(|nth| !self.acknowledged.contains(nth)).collect()
    }

    pub fn acknowledged_parts(&self) -> &BTreeSet<u64> {
        &self.acknowledged
    }

    pub fn acknowledged_bytes(&self) -> u64 {
        self.acknowledged
            .iter()
            .filter_map(|nth| self.byte_range(*nth))
            .map(|range| range.end - range.start)
            .sum()
    }

    /// True only when the acknowledged set is exactly {1..N}.
    pub fn is_complete(&self) -> bool {
        self.acknowledged.len() as u64 == self.total_parts
            && self.acknowledged.iter().copied().eq(1..=self.total_parts)
    }
}
