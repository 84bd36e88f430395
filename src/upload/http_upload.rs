// bakrest/src/upload/http_upload.rs
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::UploadConfig;
use crate::errors::{AppError, Result};
use crate::restore::move_plan::LogicalFile;
use crate::tracker::Progress;

/// Bytes read from disk per request-body chunk.
pub const CHUNK_SIZE: usize = 4096;

const READINESS_PHRASE: &str = "server is listening";

/// What the server reports once the backup has landed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadResult {
    #[serde(rename = "file_path")]
    pub remote_file_path: String,
    pub suggested_restore_dir: String,
    pub logical_files: Vec<LogicalFile>,
}

#[derive(Debug, Deserialize)]
struct ReadinessResponse {
    message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UploadIdResponse {
    upload_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProgressResponse {
    progress: Option<String>,
}

/// Client for the upload server's readiness, upload and progress endpoints.
#[derive(Debug, Clone)]
pub struct UploadClient {
    base_url: String,
    config: UploadConfig,
    client: Client,
}

impl UploadClient {
    pub fn new(config: UploadConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| AppError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.base_url.as_str().trim_end_matches('/').to_string(),
            config,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        if path.is_empty() {
            self.base_url.clone()
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.endpoint(path))
            .timeout(self.config.request_timeout)
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        parse_body(&body)
    }

    /// Checks that the server answers with its readiness message.
    pub async fn test_connection(&self) -> Result<()> {
        let readiness: ReadinessResponse = self.get_json("").await?;
        let message = readiness.message.map(|m| match m {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
        match message {
            Some(m) if m.to_lowercase().contains(READINESS_PHRASE) => Ok(()),
            other => Err(AppError::protocol(format!(
                "Unexpected readiness message: {:?}",
                other
            ))),
        }
    }

    pub async fn request_upload_id(&self) -> Result<String> {
        let response: UploadIdResponse = self.get_json("upload-request").await?;
        match response.upload_id {
            Some(serde_json::Value::String(id)) if !id.is_empty() => Ok(id),
            Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
            _ => Err(AppError::protocol("Failed to retrieve upload ID")),
        }
    }

    /// Streams the file in `CHUNK_SIZE` pieces; cancellation is checked at
    /// every chunk boundary and while waiting for the server's reply.
    pub async fn upload(
        &self,
        upload_id: &str,
        file_path: &Path,
        cancel: CancellationToken,
    ) -> Result<UploadResult> {
        let file = File::open(file_path).await?;
        let file_size = file.metadata().await?.len();
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                AppError::Config(format!("Not a file path: {}", file_path.display()))
            })?;

        info!("Uploading {} ({} bytes) as upload {}", file_name, file_size, upload_id);

        let sent = Arc::new(AtomicU64::new(0));
        let body = chunk_stream(
            ReaderStream::with_capacity(file, CHUNK_SIZE),
            Arc::clone(&sent),
            cancel.clone(),
        );

        let request = self
            .client
            .post(self.endpoint(&format!("upload/{}", upload_id)))
            .header("X-Filename", file_name)
            .body(reqwest::Body::wrap_stream(body))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled(format!("upload {} interrupted", upload_id)));
            }
            response = request => response,
        };

        let response = match response {
            Ok(r) => r,
            Err(_) if cancel.is_cancelled() => {
                return Err(AppError::Cancelled(format!("upload {} interrupted", upload_id)));
            }
            Err(e) => return Err(e.into()),
        }
        .error_for_status()?;

        let body = response.bytes().await?;
        let result: UploadResult = parse_body(&body)?;

        let sent = sent.load(Ordering::Relaxed);
        if sent != file_size {
            warn!("Sent {} bytes but the file is {} bytes", sent, file_size);
        } else {
            debug!("Sent {} bytes for upload {}", sent, upload_id);
        }
        Ok(result)
    }

    /// Server-side progress of an upload. The server reports e.g. `"42%"`.
    pub async fn poll_progress(&self, upload_id: &str) -> Result<Progress> {
        let response: ProgressResponse = self.get_json(&format!("progress/{}", upload_id)).await?;
        let raw = response
            .progress
            .ok_or_else(|| AppError::protocol("Unexpected progress data: missing 'progress'"))?;
        raw.parse::<Progress>().map_err(AppError::Protocol)
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        AppError::protocol(format!(
            "{} in {:?}",
            e,
            String::from_utf8_lossy(&body[..body.len().min(200)])
        ))
    })
}

/// Counts bytes as chunks pass through and turns cancellation into an I/O
/// error so the request body ends with a failure instead of a short file.
fn chunk_stream<S, B>(
    chunks: S,
    sent: Arc<AtomicU64>,
    cancel: CancellationToken,
) -> impl Stream<Item = io::Result<B>> + Send + Sync + 'static
where
    S: Stream<Item = io::Result<B>> + Send + Sync + 'static,
    B: AsRef<[u8]> + Send + Sync + 'static,
{
    chunks.map(move |chunk| {
        if cancel.is_cancelled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "upload cancelled"));
        }
        let chunk = chunk?;
        sent.fetch_add(chunk.as_ref().len() as u64, Ordering::Relaxed);
        Ok(chunk)
    })
}
