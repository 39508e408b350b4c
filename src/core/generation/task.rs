use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::core::error::SchedulerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    #[default]
    Unverified,
    Verified,
    Rejected,
}

impl ImageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageStatus::Unverified => "unverified",
            ImageStatus::Verified => "verified",
            ImageStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "unverified" => Some(ImageStatus::Unverified),
            "verified" => Some(ImageStatus::Verified),
            "rejected" => Some(ImageStatus::Rejected),
            _ => None,
        }
    }
}

/// Form-style boolean: only `true` (any case) is true.
pub fn str_to_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Metadata stored alongside a generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentInfo {
    pub filename: String,
    pub date: i64,
    pub theme: String,
    pub real: bool,
    #[serde(default)]
    pub status: ImageStatus,
}

impl ContentInfo {
    pub fn new(
        filename: impl Into<String>,
        date: i64,
        theme: impl Into<String>,
        real: bool,
    ) -> Self {
        Self {
            filename: filename.into(),
            date,
            theme: theme.into(),
            real,
            status: ImageStatus::Unverified,
        }
    }
}

fn required_text(value: String, field: &'static str) -> Result<String, SchedulerError> {
    if value.trim().is_empty() {
        return Err(SchedulerError::MissingRequiredField(field));
    }
    Ok(value)
}

/// Image-conditioned edit request. The source image travels separately on
/// the task; only explicitly supplied options are forwarded.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageEditParams {
    pub prompt: String,
    pub edit_strength: Option<f64>,
    pub inference_steps: Option<u32>,
}

impl ImageEditParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn edit_strength(mut self, value: f64) -> Self {
        self.edit_strength = Some(value);
        self
    }

    pub fn inference_steps(mut self, value: u32) -> Self {
        self.inference_steps = Some(value);
        self
    }

    pub fn to_parameters(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("prompt".to_string(), json!(self.prompt));
        if let Some(v) = self.inference_steps {
            out.insert("num_inference_steps".to_string(), json!(v));
        }
        if let Some(v) = self.edit_strength {
            out.insert("image_guidance_scale".to_string(), json!(v));
        }
        out
    }
}

/// Text-conditioned generation request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextToImageParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    pub inference_steps: Option<u32>,
    pub guidance_scale: Option<f64>,
}

impl TextToImageParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn negative_prompt(mut self, value: impl Into<String>) -> Self {
        self.negative_prompt = Some(value.into());
        self
    }

    pub fn inference_steps(mut self, value: u32) -> Self {
        self.inference_steps = Some(value);
        self
    }

    pub fn guidance_scale(mut self, value: f64) -> Self {
        self.guidance_scale = Some(value);
        self
    }

    pub fn to_parameters(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("prompt".to_string(), json!(self.prompt));
        if let Some(v) = &self.negative_prompt {
            out.insert("negative_prompt".to_string(), json!(v));
        }
        if let Some(v) = self.inference_steps {
            out.insert("num_inference_steps".to_string(), json!(v));
        }
        if let Some(v) = self.guidance_scale {
            out.insert("guidance_scale".to_string(), json!(v));
        }
        out
    }
}

/// Normalized source image (PNG-encoded RGB) attached to an edit task.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub enum TaskVariant {
    ImageEdit {
        source: PreparedImage,
        params: ImageEditParams,
    },
    TextToImage {
        params: TextToImageParams,
    },
}

/// One requested synthesis job. Immutable once built; consumed exactly once.
#[derive(Debug, Clone)]
pub struct GenerationTask {
    pub id: Uuid,
    pub variant: TaskVariant,
    pub content_info: ContentInfo,
}

impl GenerationTask {
    pub fn image_edit(
        content_info: ContentInfo,
        source: PreparedImage,
        params: ImageEditParams,
    ) -> Result<Self, SchedulerError> {
        if source.bytes.is_empty() {
            return Err(SchedulerError::MissingRequiredField("image"));
        }
        let params = ImageEditParams {
            prompt: required_text(params.prompt, "prompt")?,
            ..params
        };
        Ok(Self {
            id: Uuid::new_v4(),
            variant: TaskVariant::ImageEdit { source, params },
            content_info,
        })
    }

    pub fn text_to_image(
        content_info: ContentInfo,
        params: TextToImageParams,
    ) -> Result<Self, SchedulerError> {
        let params = TextToImageParams {
            prompt: required_text(params.prompt, "prompt")?,
            ..params
        };
        Ok(Self {
            id: Uuid::new_v4(),
            variant: TaskVariant::TextToImage { params },
            content_info,
        })
    }

    pub fn prompt(&self) -> &str {
        match &self.variant {
            TaskVariant::ImageEdit { params, .. } => &params.prompt,
            TaskVariant::TextToImage { params } => &params.prompt,
        }
    }

    pub fn kind(&self) -> &'static str {
        match &self.variant {
            TaskVariant::ImageEdit { .. } => "image_edit",
            TaskVariant::TextToImage { .. } => "text_to_image",
        }
    }

    /// The sparse parameter mapping forwarded to the backend.
    pub fn parameters(&self) -> Map<String, Value> {
        match &self.variant {
            TaskVariant::ImageEdit { params, .. } => params.to_parameters(),
            TaskVariant::TextToImage { params } => params.to_parameters(),
        }
    }
}
