use anyhow::{Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde_json::{Map, Value};
use std::time::Duration;

use super::task::{ImageEditParams, PreparedImage, TextToImageParams};

pub const DEFAULT_ARTIFACT_MIME: &str = "image/jpeg";

/// Binary output of a synthesis backend.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl Artifact {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// Image-conditioned edits. Implementations may assume they are never
/// called concurrently by the task queue.
#[async_trait]
pub trait ImageEditBackend: Send + Sync {
    async fn edit(&self, source: &PreparedImage, params: &ImageEditParams) -> Result<Artifact>;
}

/// Text-conditioned generation, under the same non-reentrancy assumption.
#[async_trait]
pub trait TextToImageBackend: Send + Sync {
    async fn generate(&self, params: &TextToImageParams) -> Result<Artifact>;
}

/// Inference server reached over HTTP: the sparse parameter map is posted as
/// JSON and the response body is the image.
pub struct HttpSynthesisBackend {
    image_edit_url: String,
    text_to_image_url: String,
    client: Client,
    timeout: Duration,
}

impl HttpSynthesisBackend {
    pub fn new(image_edit_url: String, text_to_image_url: String, timeout: Duration) -> Self {
        Self {
            image_edit_url,
            text_to_image_url,
            client: Client::new(),
            timeout,
        }
    }

    async fn post(&self, url: &str, body: Map<String, Value>) -> Result<Artifact> {
        let res = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            return Err(anyhow!(
                "Synthesis backend {} returned {}: {}",
                url,
                status,
                res.text().await.unwrap_or_default()
            ));
        }

        let mime_type = res
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("image/"))
            .unwrap_or(DEFAULT_ARTIFACT_MIME)
            .to_string();
        let bytes = res.bytes().await?;
        if bytes.is_empty() {
            return Err(anyhow!("Synthesis backend {} returned an empty body", url));
        }
        Ok(Artifact::new(bytes.to_vec(), mime_type))
    }
}

#[async_trait]
impl ImageEditBackend for HttpSynthesisBackend {
    async fn edit(&self, source: &PreparedImage, params: &ImageEditParams) -> Result<Artifact> {
        let mut body = params.to_parameters();
        body.insert(
            "image".to_string(),
            Value::String(base64::engine::general_purpose::STANDARD.encode(&source.bytes)),
        );
        self.post(&self.image_edit_url, body).await
    }
}

#[async_trait]
impl TextToImageBackend for HttpSynthesisBackend {
    async fn generate(&self, params: &TextToImageParams) -> Result<Artifact> {
        self.post(&self.text_to_image_url, params.to_parameters()).await
    }
}
