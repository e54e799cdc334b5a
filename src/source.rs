use std::{
    io::{self, SeekFrom},
    ops::Range,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

use crate::splitter::SplitError;

/// A finite payload that can be read by byte range.
///
/// The splitter reads it once to fingerprint it and once more, range by
/// range and possibly concurrently, to cut the partials.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Base name the combiner publishes the payload under.
    fn file_name(&self) -> &str;

    fn size(&self) -> u64;

    async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes>;
}

/// A regular file on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    file_name: String,
    size: u64,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SplitError> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|source| SplitError::OpenSource {
                path: path.clone(),
                source,
            })?;
        if metadata.is_dir() {
            return Err(SplitError::SourceIsDirectory(path));
        }
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path,
            file_name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl PayloadSource for FileSource {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(range.start)).await?;
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

/// A payload already held in memory.
#[derive(Debug, Clone)]
pub struct BytesSource {
    file_name: String,
    data: Bytes,
}

impl BytesSource {
    pub fn new(file_name: &str, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.to_string(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl PayloadSource for BytesSource {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: Range<u64>) -> io::Result<Bytes> {
        if range.end > self.size() || range.start > range.end {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("range {range:?} is outside of {} bytes", self.size()),
            ));
        }
        Ok(self.data.slice(range.start as usize..range.end as usize))
    }
}
