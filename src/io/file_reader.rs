use std::io::{ErrorKind, SeekFrom};
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;

use super::range_reader::check_range;
use super::RangeReader;
use crate::error::IoError;

/// Local-file implementation of RangeReader.
///
/// Owns a single file descriptor for the lifetime of a slide handle. Each
/// read is a seek followed by `read_exact`, and the pair runs under a mutex:
/// that mutex is the only serialization point for one open file. Readers on
/// different files never contend.
pub struct LocalFileReader {
    file: Mutex<Option<File>>,
    size: u64,
    identifier: String,
}

impl LocalFileReader {
    /// Open `path` for reading.
    ///
    /// Returns [`IoError::NotFound`] when the path does not exist and
    /// [`IoError::Read`] for any other failure (including directories).
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IoError> {
        let path = path.as_ref();
        let identifier = path.display().to_string();

        let file = File::open(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => IoError::NotFound(identifier.clone()),
            _ => IoError::Read(format!("{}: {}", identifier, e)),
        })?;

        let metadata = file
            .metadata()
            .await
            .map_err(|e| IoError::Read(format!("{}: {}", identifier, e)))?;
        if !metadata.is_file() {
            return Err(IoError::Read(format!("{}: not a regular file", identifier)));
        }

        Ok(Self {
            file: Mutex::new(Some(file)),
            size: metadata.len(),
            identifier,
        })
    }

    /// Whether the reader has been closed.
    pub async fn is_closed(&self) -> bool {
        self.file.lock().await.is_none()
    }
}

#[async_trait]
impl RangeReader for LocalFileReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.size)?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(IoError::Closed)?;

        let mut buf = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| IoError::Read(format!("{}: seek to {}: {}", self.identifier, offset, e)))?;
        file.read_exact(&mut buf).await.map_err(|e| {
            IoError::Read(format!(
                "{}: read {} bytes at {}: {}",
                self.identifier, len, offset, e
            ))
        })?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Drop the file descriptor.
    async fn close(&self) {
        self.file.lock().await.take();
    }
}
