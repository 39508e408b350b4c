//! Generation requests: producers build tasks, one worker synthesizes and
//! publishes them in submission order.

pub mod backend;
pub mod publisher;
pub mod queue;
pub mod source;
pub mod task;

pub use backend::{Artifact, HttpSynthesisBackend, ImageEditBackend, TextToImageBackend};
pub use publisher::{HttpPublisher, ResultPublisher};
pub use queue::{Pipeline, QueueStats, TaskQueue, WorkerState};
pub use source::{SourceImage, SourceLoader};
pub use task::{
    ContentInfo, GenerationTask, ImageEditParams, ImageStatus, PreparedImage, TextToImageParams,
    str_to_bool,
};

use uuid::Uuid;

use crate::core::error::SchedulerError;

/// Producer-facing entry point. Source images are prepared on the caller's
/// side so the worker only ever sees ready-to-send tasks.
pub struct GenerationService {
    loader: SourceLoader,
    queue: TaskQueue,
}

impl GenerationService {
    pub fn start(loader: SourceLoader, pipeline: Pipeline) -> Self {
        Self {
            loader,
            queue: TaskQueue::start(pipeline),
        }
    }

    pub async fn submit_image_edit(
        &self,
        content_info: ContentInfo,
        source: SourceImage,
        params: ImageEditParams,
    ) -> Result<Uuid, SchedulerError> {
        if self.queue.is_closed() {
            return Err(SchedulerError::QueueClosed);
        }
        if params.prompt.trim().is_empty() {
            return Err(SchedulerError::MissingRequiredField("prompt"));
        }
        let prepared = self.loader.prepare(source).await?;
        let task = GenerationTask::image_edit(content_info, prepared, params)?;
        self.queue.submit(task)
    }

    pub fn submit_text_to_image(
        &self,
        content_info: ContentInfo,
        params: TextToImageParams,
    ) -> Result<Uuid, SchedulerError> {
        let task = GenerationTask::text_to_image(content_info, params)?;
        self.queue.submit(task)
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub async fn shutdown(&self) -> QueueStats {
        self.queue.shutdown().await
    }
}
