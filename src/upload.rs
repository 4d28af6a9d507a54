//! Temporary storage for an uploaded file.
//!
//! The multipart body is streamed to a named temp file. The file is removed
//! when the [`UploadedFile`] is dropped, whichever way the request ends.

use axum::body::Bytes;
use axum::extract::multipart::Field;
use futures::{Stream, StreamExt};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Media type assumed when the client declares none.
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("failed to read upload: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub media_type: String,
    pub size: u64,
    file: NamedTempFile,
}

impl UploadedFile {
    /// Stream a multipart field into a new temp file.
    pub async fn from_field(field: Field<'_>) -> Result<Self, UploadError> {
        let filename = field.file_name().unwrap_or("upload").to_string();
        let media_type = field
            .content_type()
            .unwrap_or(DEFAULT_MEDIA_TYPE)
            .to_string();

        let (file, size) = spool(field).await?;

        debug!(
            "Stored upload '{}' ({}, {} bytes) at {:?}",
            filename,
            media_type,
            size,
            file.path()
        );

        Ok(Self {
            filename,
            media_type,
            size,
            file,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Read the stored bytes back.
    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(self.path()).await
    }
}

/// Write a chunk stream to a new temp file without blocking the runtime.
async fn spool<S, E>(chunks: S) -> Result<(NamedTempFile, u64), UploadError>
where
    S: Stream<Item = Result<Bytes, E>>,
    UploadError: From<E>,
{
    let file = NamedTempFile::new()?;
    let mut writer = tokio::fs::File::from_std(file.as_file().try_clone()?);

    let mut chunks = std::pin::pin!(chunks);
    let mut size = 0u64;
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }
    writer.flush().await?;

    Ok((file, size))
}

impl Drop for UploadedFile {
    fn drop(&mut self) {
        debug!("Releasing temp upload {:?}", self.file.path());
    }
}
