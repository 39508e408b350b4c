use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::backend::Artifact;
use super::task::ContentInfo;

/// Hands a finished artifact to the content store and returns the identifier
/// the store assigned to it.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    async fn publish(&self, artifact: &Artifact, info: &ContentInfo) -> Result<String>;
}

/// Uploads to the storage API's create endpoint as multipart form data.
pub struct HttpPublisher {
    endpoint: String,
    client: Client,
    timeout: Duration,
}

impl HttpPublisher {
    pub fn new(base_url: &str, create_path: &str, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), create_path),
            client: Client::new(),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// The store answers with `{"url": "/read/<id>"}`; the id is the last segment.
pub fn identifier_from_url(url: &str) -> Option<String> {
    url.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(|id| id.to_string())
}

#[async_trait]
impl ResultPublisher for HttpPublisher {
    async fn publish(&self, artifact: &Artifact, info: &ContentInfo) -> Result<String> {
        let file = reqwest::multipart::Part::bytes(artifact.bytes.clone())
            .file_name(info.filename.clone())
            .mime_str(&artifact.mime_type)?;

        let form = reqwest::multipart::Form::new()
            .text("real", info.real.to_string())
            .text("date", info.date.to_string())
            .text("theme", info.theme.clone())
            .text("status", info.status.as_str())
            .part("file", file);

        debug!("Publishing {} to {}", info.filename, self.endpoint);
        let res = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(anyhow!(
                "Failed to save image ({}): {}",
                status,
                res.text().await.unwrap_or_default()
            ));
        }

        let parsed: serde_json::Value = res.json().await?;
        parsed
            .get("url")
            .and_then(|u| u.as_str())
            .and_then(identifier_from_url)
            .ok_or_else(|| anyhow!("No url in storage response: {}", parsed))
    }
}
