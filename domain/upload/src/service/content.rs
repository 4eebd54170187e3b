use std::ops::Range;

use anyhow::bail;
use async_trait::async_trait;
use bytes::Bytes;

/// Bytes of a file that is being uploaded.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Total length in bytes.
    fn size(&self) -> u64;
    /// Read `range`, which always lies inside `0..size()`.
    async fn read(&self, range: Range<u64>) -> anyhow::Result<Bytes>;
}

#[async_trait]
impl ContentSource for Bytes {
    fn size(&self) -> u64 {
        self.len() as u64
    }

    async fn read(&self, range: Range<u64>) -> anyhow::Result<Bytes> {
        if range.start > range.end || range.end > self.size() {
            bail!("Range {range:?} is outside of 0..{}", self.size());
        }
        Ok(self.slice(range.start as usize..range.end as usize))
    }
}
