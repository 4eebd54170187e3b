use std::{
    io::SeekFrom,
    ops::Range,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use domain_upload::service::ContentSource;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// A file on local disk, opened again for every read so parts can be read in parallel.
pub struct LocalFileContent {
    path: PathBuf,
    size: u64,
}

impl LocalFileContent {
    pub async fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("Can't read {}", path.display()))?;
        if !metadata.is_file() {
            bail!("{} is not a regular file", path.display());
        }
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }

    /// File name used as the key inside the draft.
    pub fn key(&self) -> anyhow::Result<String> {
        self.path
            .file_name()
            .and_then(|el| el.to_str())
            .map(str::to_owned)
            .with_context(|| format!("{} has no usable file name", self.path.display()))
    }

    /// Content type guessed from the extension.
    pub fn mime_type(&self) -> &'static str {
        let extension = self
            .path
            .extension()
            .and_then(|el| el.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("txt" | "md") => "text/plain",
            Some("csv") => "text/csv",
            Some("json") => "application/json",
            Some("pdf") => "application/pdf",
            Some("zip") => "application/zip",
            Some("gz" | "tgz") => "application/gzip",
            Some("png") => "image/png",
            Some("jpg" | "jpeg") => "image/jpeg",
            _ => "application/octet-stream",
        }
    }
}

#[async_trait]
impl ContentSource for LocalFileContent {
    fn size(&self) -> u64 {
        self.size
    }

    async fn read(&self, range: Range<u64>) -> anyhow::Result<Bytes> {
        if range.start > range.end || range.end > self.size {
            bail!("Range {range:?} is outside of 0..{}", self.size);
        }
        let mut file = tokio::fs::File::open(&self.path)
            .await
            .with_context(|| format!("Can't open {}", self.path.display()))?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buffer = BytesMut::zeroed((range.end - range.start) as usize);
        file.read_exact(&mut buffer)
            .await
            .with_context(|| format!("{} changed while it was being uploaded", self.path.display()))?;
        Ok(buffer.freeze())
    }
}
