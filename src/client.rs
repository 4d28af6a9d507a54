//! Client for the extraction endpoint, used by the form controller.

use futures::stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use std::path::Path;
use tracing::debug;

use crate::server::PROCESS_TRAVELLERS_PATH;

/// Upload body chunk size; progress is reported once per chunk.
const CHUNK_SIZE: usize = 64 * 1024;

/// File extensions the form accepts, with the media type declared for each.
const ACCEPTED_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("csv", "text/csv"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("xls", "application/vnd.ms-excel"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("pdf", "application/pdf"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
];

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("request failed with status {status}: {message}")]
    Server {
        status: u16,
        message: String,
        error: Option<String>,
    },

    #[error("response is not JSON: {0}")]
    Decode(String),
}

/// Media type for an accepted file name, by extension.
pub fn media_type_for(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ACCEPTED_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, media_type)| *media_type)
}

/// A file picked for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl UploadFile {
    /// Wrap in-memory bytes, declaring the media type from the file name.
    pub fn new(filename: impl Into<String>, data: Vec<u8>) -> Result<Self, ClientError> {
        let filename = filename.into();
        let media_type = media_type_for(&filename)
            .ok_or_else(|| ClientError::UnsupportedFileType(filename.clone()))?;
        Ok(Self {
            filename,
            media_type: media_type.to_string(),
            data,
        })
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        // Check the type before reading a possibly large file
        media_type_for(&filename).ok_or_else(|| ClientError::UnsupportedFileType(filename.clone()))?;
        let data = tokio::fs::read(path).await?;
        Self::new(filename, data)
    }
}

#[derive(Debug, Clone)]
pub struct UploadClient {
    client: Client,
    endpoint: String,
}

impl UploadClient {
    /// `base_url` is the server root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), PROCESS_TRAVELLERS_PATH),
        }
    }

    /// Upload `file` as the multipart `file` field and return the JSON body.
    ///
    /// `on_progress(sent, total)` is called as body chunks are handed to the connection.
    pub async fn upload<F>(
        &self,
        file: &UploadFile,
        on_progress: F,
    ) -> Result<serde_json::Value, ClientError>
    where
        F: Fn(u64, u64) + Send + Sync + 'static,
    {
        let total = file.data.len() as u64;
        let chunks: Vec<Vec<u8>> = file.data.chunks(CHUNK_SIZE).map(<[u8]>::to_vec).collect();

        let mut sent = 0u64;
        let body = Body::wrap_stream(stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(sent, total);
            Ok::<_, std::io::Error>(chunk)
        })));

        let part = Part::stream_with_length(body, total)
            .file_name(file.filename.clone())
            .mime_str(&file.media_type)?;
        let form = Form::new().part("file", part);

        debug!("Uploading {} ({} bytes) to {}", file.filename, total, self.endpoint);
        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
            let field = |name: &str| body.get(name).and_then(|v| v.as_str()).map(str::to_string);
            return Err(ClientError::Server {
                status: status.as_u16(),
                message: field("message").unwrap_or_else(|| text.clone()),
                error: field("error"),
            });
        }

        serde_json::from_str(&text).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
