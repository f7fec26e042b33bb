//! Chat-webhook notification client.

use std::path::{Path, PathBuf};

use reqwest::{StatusCode, multipart};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to read image {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("webhook request failed")]
    Request(#[from] reqwest::Error),
    #[error("webhook rejected the upload with status {status}")]
    Status { status: StatusCode },
}

/// Posts stored images to a chat webhook as multipart uploads.
#[derive(Clone)]
pub struct NotifyClient {
    http: reqwest::Client,
    webhook_url: String,
}

impl NotifyClient {
    pub fn new(http: reqwest::Client, webhook_url: impl Into<String>) -> Self {
        Self {
            http,
            webhook_url: webhook_url.into(),
        }
    }

    /// Send one image to the webhook. A non-2xx answer counts as a failure.
    pub async fn send_image(&self, path: &Path) -> Result<(), NotifyError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| NotifyError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));

        let response = self
            .http
            .post(&self.webhook_url)
            .multipart(form)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status { status });
        }
        Ok(())
    }
}
