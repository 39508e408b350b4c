//! Source images for edit tasks: fetched or read, decoded, upright, RGB, PNG.

use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use reqwest::Client;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::task::PreparedImage;
use crate::core::error::SchedulerError;

#[derive(Debug, Clone)]
pub enum SourceImage {
    Bytes(Vec<u8>),
    Path(PathBuf),
    Url(String),
}

impl SourceImage {
    /// `http://` / `https://` strings become URLs, anything else a file path.
    pub fn from_arg(value: &str) -> Self {
        let lower = value.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SourceImage::Url(value.to_string())
        } else {
            SourceImage::Path(PathBuf::from(value))
        }
    }
}

pub struct SourceLoader {
    client: Client,
    timeout: Duration,
}

impl SourceLoader {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }

    pub async fn prepare(&self, source: SourceImage) -> Result<PreparedImage, SchedulerError> {
        let raw = match source {
            SourceImage::Bytes(bytes) => bytes,
            SourceImage::Path(path) => tokio::fs::read(&path).await.map_err(|e| {
                SchedulerError::SourceImage(format!("{}: {}", path.display(), e))
            })?,
            SourceImage::Url(url) => self.fetch(&url).await?,
        };
        if raw.is_empty() {
            return Err(SchedulerError::MissingRequiredField("image"));
        }

        tokio::task::spawn_blocking(move || normalize(&raw))
            .await
            .map_err(|e| SchedulerError::SourceImage(format!("decode task failed: {}", e)))?
    }

    async fn fetch(&self, raw_url: &str) -> Result<Vec<u8>, SchedulerError> {
        let url = url::Url::parse(raw_url)
            .map_err(|e| SchedulerError::SourceImage(format!("{}: {}", raw_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SchedulerError::SourceImage(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        debug!("Fetching source image {}", url);
        let res = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| SchedulerError::SourceImage(format!("{}: {}", url, e)))?;
        if !res.status().is_success() {
            return Err(SchedulerError::SourceImage(format!(
                "{} returned {}",
                url,
                res.status()
            )));
        }
        let bytes = res
            .bytes()
            .await
            .map_err(|e| SchedulerError::SourceImage(format!("{}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }
}

/// Decode, apply EXIF orientation, convert to RGB and re-encode as PNG.
pub fn normalize(raw: &[u8]) -> Result<PreparedImage, SchedulerError> {
    let decode_err = |e: image::ImageError| SchedulerError::SourceImage(e.to_string());

    let reader = ImageReader::new(Cursor::new(raw))
        .with_guessed_format()
        .map_err(|e| SchedulerError::SourceImage(e.to_string()))?;
    let mut decoder = reader.into_decoder().map_err(decode_err)?;
    let orientation = decoder.orientation().map_err(decode_err)?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_err)?;
    img.apply_orientation(orientation);

    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Png).map_err(decode_err)?;

    Ok(PreparedImage {
        bytes: out.into_inner(),
        width: rgb.width(),
        height: rgb.height(),
    })
}
