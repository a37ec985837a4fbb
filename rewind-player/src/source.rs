//! Where recordings come from: the backend's session endpoint or a file.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use thiserror::Error;

use rewind_core::config::SourceConfig;
use rewind_core::SessionRecording;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("session {0} not found")]
    NotFound(String),

    #[error("backend error ({code}): {body}")]
    Status { code: u16, body: String },

    #[error("invalid base URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not read recording: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed recording: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct HttpSessionSource {
    client: Client,
    base_url: String,
}

impl HttpSessionSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        Self::with_base_url(config, &config.base_url)
    }

    pub fn with_base_url(config: &SourceConfig, base_url: &str) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    /// `{base_url}/api/sessions/{id}`
    pub fn session_url(&self, id: &str) -> Result<Url, SourceError> {
        let invalid = |reason: String| SourceError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };
        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(["api", "sessions", id]);
        Ok(url)
    }

    pub async fn fetch(&self, id: &str) -> Result<SessionRecording, SourceError> {
        let url = self.session_url(id)?;
        tracing::debug!(%url, "fetching session");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(id.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                code: status.as_u16(),
                body,
            });
        }
        let body: serde_json::Value = response.json().await?;
        let recording = SessionRecording::from_value(body)?;
        tracing::info!(session = id, events = recording.events.len(), "session fetched");
        Ok(recording)
    }
}

/// Load a `{session, events}` document from disk.
pub fn load_file(path: impl AsRef<Path>) -> Result<SessionRecording, SourceError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let recording = SessionRecording::from_json(&raw)?;
    tracing::info!(path = %path.display(), events = recording.events.len(), "recording loaded from file");
    Ok(recording)
}
