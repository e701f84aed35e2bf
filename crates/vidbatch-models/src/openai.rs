//! OpenAI video API implementation.
//!
//! This module provides an implementation of the `VideoApi` trait for the
//! `/v1/videos` endpoints: create, remix, retrieve and content download.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};
use vidbatch_abstraction::{CreateVideoRequest, VideoApi, VideoError, VideoJob, VideoRequest};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI video API client.
#[derive(Debug, Clone)]
pub struct OpenAIVideoClient {
    /// The API key for authentication.
    api_key: String,
    /// The base URL for the OpenAI API.
    base_url: String,
    /// HTTP client for making requests.
    client: Client,
}

impl OpenAIVideoClient {
    /// Creates a new client from `OPENAI_API_KEY` and, when set, `OPENAI_BASE_URL`.
    ///
    /// # Errors
    /// Returns `VideoError::Auth` if the API key is not found in environment variables.
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn new() -> Result<Self, VideoError> {
        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                VideoError::Auth("OPENAI_API_KEY environment variable not set".to_string())
            })?;

        let client = Self::with_api_key(api_key);
        Ok(match env::var("OPENAI_BASE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => client.with_base_url(base_url),
            _ => client,
        })
    }

    /// Creates a new client with an explicit API key.
    #[must_use]
    pub fn with_api_key(api_key: String) -> Self {
        Self { api_key, base_url: DEFAULT_BASE_URL.to_string(), client: Client::new() }
    }

    /// Points the client at a different API root (proxies, test servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn create(&self, request: &CreateVideoRequest) -> Result<VideoJob, VideoError> {
        let url = format!("{}/videos", self.base_url);

        let mut form = Form::new()
            .text("prompt", request.prompt.clone())
            .text("model", request.model.as_str())
            .text("size", request.size.as_str())
            .text("seconds", request.seconds.to_string());

        if let Some(path) = &request.input_reference {
            form = form.part("input_reference", reference_part(path).await?);
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, "create video"))?;

        parse_job(response, "create video", "").await
    }

    async fn remix(&self, video_id: &str, prompt: &str) -> Result<VideoJob, VideoError> {
        let url = format!("{}/videos/{}/remix", self.base_url, video_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&RemixBody { prompt })
            .send()
            .await
            .map_err(|e| map_transport_error(&e, "remix video"))?;

        parse_job(response, "remix video", video_id).await
    }
}

#[async_trait]
impl VideoApi for OpenAIVideoClient {
    async fn submit(&self, request: &VideoRequest) -> Result<VideoJob, VideoError> {
        debug!(prompt_len = request.prompt().len(), "Submitting video job to OpenAI");

        let job = match request {
            VideoRequest::Create(create) => self.create(create).await?,
            VideoRequest::Remix { video_id, prompt } => self.remix(video_id, prompt).await?,
        };

        debug!(video_id = %job.id, status = ?job.status, "Video job accepted");
        Ok(job)
    }

    async fn retrieve(&self, video_id: &str) -> Result<VideoJob, VideoError> {
        let url = format!("{}/videos/{}", self.base_url, video_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, "retrieve video"))?;

        parse_job(response, "retrieve video", video_id).await
    }

    async fn download(&self, video_id: &str, destination: &Path) -> Result<u64, VideoError> {
        let url = format!("{}/videos/{}/content", self.base_url, video_id);
        debug!(video_id = %video_id, path = %destination.display(), "Downloading video content");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| map_transport_error(&e, "download video"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, video_id = %video_id, error = %error_text, "OpenAI content download failed");
            return Err(map_http_error(status, &error_text, "download video"));
        }

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                error!(path = %parent.display(), error = %e, "Failed to create download directory");
                VideoError::Io(format!("Failed to create download directory: {}", e))
            })?;
        }

        // Stream into a sibling file so a broken or aborted transfer never leaves a truncated video behind.
        let partial = PartialDownload::new(destination);
        let written = write_stream(response, partial.path()).await?;
        tokio::fs::rename(partial.path(), destination).await.map_err(|e| {
            error!(path = %destination.display(), error = %e, "Failed to move download into place");
            VideoError::Io(format!("Failed to move download into place: {}", e))
        })?;
        partial.keep();

        debug!(video_id = %video_id, bytes = written, "Video downloaded");
        Ok(written)
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

/// A `.part` file that is removed when dropped unless the download completed.
///
/// Dropping covers every early exit, including the task being aborted while
/// the body is still streaming.
struct PartialDownload {
    path: PathBuf,
    completed: bool,
}

impl PartialDownload {
    fn new(destination: &Path) -> Self {
        Self { path: partial_path(destination), completed: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// The file was renamed into place; nothing to clean up.
    fn keep(mut self) {
        self.completed = true;
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed partial download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove partial download"),
        }
    }
}

async fn write_stream(response: Response, path: &Path) -> Result<u64, VideoError> {
    let io_error = |e: std::io::Error| {
        error!(path = %path.display(), error = %e, "Failed to write download");
        VideoError::Io(format!("Failed to write download: {}", e))
    };

    let mut file = tokio::fs::File::create(path).await.map_err(io_error)?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| map_transport_error(&e, "download video"))?;
        file.write_all(&chunk).await.map_err(io_error)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(io_error)?;
    Ok(written)
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn reference_part(path: &Path) -> Result<Part, VideoError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to read input reference");
        VideoError::Io(format!("Failed to read input reference: {}", e))
    })?;

    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| {
            error!(path = %path.display(), "Input reference has no usable file name");
            VideoError::InvalidInput("Invalid input reference filename".to_string())
        })?
        .to_string();

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(detect_image_mime_type(path))
        .map_err(|e| VideoError::InvalidInput(format!("Failed to set MIME type: {}", e)))
}

/// Decodes a job record. `video_id` is only logged; error messages carry the
/// operation name and the provider's wording.
async fn parse_job(response: Response, operation: &str, video_id: &str) -> Result<VideoJob, VideoError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
        error!(
            status = %status,
            error = %error_text,
            operation = %operation,
            video_id = %video_id,
            "OpenAI API returned error status"
        );
        return Err(map_http_error(status, &error_text, operation));
    }

    response.json::<VideoJob>().await.map_err(|e| {
        error!(error = %e, operation = %operation, video_id = %video_id, "Failed to parse OpenAI API response");
        VideoError::Serialization(format!("Failed to parse {} response: {}", operation, e))
    })
}

/// Maps HTTP status codes to appropriate `VideoError` variants.
fn map_http_error(status: StatusCode, error_text: &str, operation: &str) -> VideoError {
    let message = api_error_message(error_text);
    match status.as_u16() {
        401 => VideoError::Auth(format!("{}: {}", operation, message)),
        403 => VideoError::AccessDenied(format!("{}: {}", operation, message)),
        404 => VideoError::NotFound(format!("{}: {}", operation, message)),
        429 => VideoError::RateLimited(format!("{}: {}", operation, message)),
        code => VideoError::Api { status: code, message: format!("{}: {}", operation, message) },
    }
}

fn map_transport_error(e: &reqwest::Error, operation: &str) -> VideoError {
    if e.is_timeout() {
        VideoError::Request(format!("Request timeout during {}: {}", operation, e))
    } else {
        VideoError::Request(format!("Network error during {}: {}", operation, e))
    }
}

/// Pulls `error.message` out of an OpenAI error envelope, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.message)
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| body.trim().to_string())
}

/// Detects an image MIME type from the file extension.
fn detect_image_mime_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

// OpenAI API request/response structures

#[derive(Debug, Serialize)]
struct RemixBody<'a> {
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        let body = r#"{"error": {"message": "Rate limit reached for requests", "type": "requests"}}"#;
        let err = map_http_error(StatusCode::TOO_MANY_REQUESTS, body, "create video");
        assert_eq!(
            err,
            VideoError::RateLimited("create video: Rate limit reached for requests".to_string())
        );

        assert!(matches!(
            map_http_error(StatusCode::UNAUTHORIZED, "bad key", "retrieve video"),
            VideoError::Auth(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::FORBIDDEN, "", "retrieve video"),
            VideoError::AccessDenied(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::NOT_FOUND, "", "remix video"),
            VideoError::NotFound(_)
        ));
    }

    #[test]
    fn test_server_errors_keep_status_in_message() {
        let err = map_http_error(StatusCode::SERVICE_UNAVAILABLE, "upstream busy", "create video");
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("upstream busy"));
    }

    #[test]
    fn test_api_error_message_falls_back_to_body() {
        assert_eq!(api_error_message("  plain text failure \n"), "plain text failure");
        assert_eq!(api_error_message(r#"{"error": {"message": ""}}"#), r#"{"error": {"message": ""}}"#);
    }

    #[test]
    fn test_image_mime_detection() {
        assert_eq!(detect_image_mime_type(Path::new("a/frame.PNG")), "image/png");
        assert_eq!(detect_image_mime_type(Path::new("frame.jpeg")), "image/jpeg");
        assert_eq!(detect_image_mime_type(Path::new("frame.webp")), "image/webp");
        assert_eq!(detect_image_mime_type(Path::new("frame")), "application/octet-stream");
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(partial_path(Path::new("out/clip.mp4")), PathBuf::from("out/clip.mp4.part"));
    }

    #[test]
    fn test_partial_download_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("clip.mp4");

        let partial = PartialDownload::new(&destination);
        std::fs::write(partial.path(), b"half a video").unwrap();
        let part_file = partial.path().to_path_buf();
        drop(partial);

        assert!(!part_file.exists());
    }

    #[test]
    fn test_completed_download_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("clip.mp4");

        let partial = PartialDownload::new(&destination);
        std::fs::write(partial.path(), b"video").unwrap();
        std::fs::rename(partial.path(), &destination).unwrap();
        partial.keep();

        assert!(destination.exists());
    }

    #[tokio::test]
    async fn test_aborted_download_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("clip.mp4");
        let part_file = partial_path(&destination);
        let (written_tx, written_rx) = tokio::sync::oneshot::channel();

        let task = tokio::spawn(async move {
            let partial = PartialDownload::new(&destination);
            tokio::fs::write(partial.path(), b"first chunk").await.unwrap();
            let _ = written_tx.send(());
            // Body that never finishes streaming.
            std::future::pending::<()>().await;
            partial.keep();
        });

        written_rx.await.unwrap();
        assert!(part_file.exists());
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        assert!(!part_file.exists());
    }

    #[test]
    fn test_error_messages_omit_video_id() {
        let err = map_http_error(StatusCode::NOT_FOUND, "no such video", "retrieve video");
        assert_eq!(err.to_string(), "Not found: retrieve video: no such video");
    }

    #[test]
    fn test_client_creation_with_api_key() {
        let client = OpenAIVideoClient::with_api_key("test-key".to_string())
            .with_base_url("http://localhost:8080/v1/".to_string());
        assert_eq!(client.base_url, "http://localhost:8080/v1");
        assert_eq!(client.provider(), "openai");
    }

    #[test]
    #[ignore = "Requires API key and network access"]
    fn test_openai_retrieve_unknown_video() {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let Ok(client) = OpenAIVideoClient::new() else {
                return;
            };
            let err = client.retrieve("video_does_not_exist").await.unwrap_err();
            assert!(matches!(err, VideoError::NotFound(_)));
        });
    }
}
