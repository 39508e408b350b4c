//! Single-worker FIFO for synthesis jobs.
//!
//! Any number of producers may `submit` concurrently; exactly one worker
//! dequeues in global submission order and runs each job to completion
//! (synthesis, then publish) before touching the next, so the backends never
//! see overlapping calls. `shutdown` enqueues a close marker behind every
//! accepted task and waits for the worker to reach it.
//!
//! ```text
//! Idle ──dequeue──▶ Processing ──publish done──▶ Idle
//!   └────────────── close marker ──▶ Draining ──▶ Stopped
//! ```

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::backend::{ImageEditBackend, TextToImageBackend};
use super::publisher::ResultPublisher;
use super::task::{GenerationTask, TaskVariant};
use crate::core::error::{SchedulerError, TaskFailure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Idle,
    Processing,
    Draining,
    Stopped,
}

enum QueueMessage {
    Task(GenerationTask),
    Close,
}

/// Everything a dequeued task needs: both backends and the publisher.
pub struct Pipeline {
    pub image_edit: Arc<dyn ImageEditBackend>,
    pub text_to_image: Arc<dyn TextToImageBackend>,
    pub publisher: Arc<dyn ResultPublisher>,
}

impl Pipeline {
    async fn run(&self, task: &GenerationTask) -> Result<String, TaskFailure> {
        let artifact = match &task.variant {
            TaskVariant::ImageEdit { source, params } => self.image_edit.edit(source, params).await,
            TaskVariant::TextToImage { params } => self.text_to_image.generate(params).await,
        }
        .map_err(TaskFailure::Backend)?;

        self.publisher
            .publish(&artifact, &task.content_info)
            .await
            .map_err(TaskFailure::Publish)
    }
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    published: AtomicU64,
    synthesis_failures: AtomicU64,
    publish_failures: AtomicU64,
    panicked: AtomicU64,
    pending: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub submitted: u64,
    pub processed: u64,
    pub published: u64,
    pub synthesis_failures: u64,
    pub publish_failures: u64,
    pub panicked: u64,
    pub pending: usize,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        let published = self.published.load(Ordering::SeqCst);
        let synthesis_failures = self.synthesis_failures.load(Ordering::SeqCst);
        let publish_failures = self.publish_failures.load(Ordering::SeqCst);
        let panicked = self.panicked.load(Ordering::SeqCst);
        QueueStats {
            submitted: self.submitted.load(Ordering::SeqCst),
            processed: published + synthesis_failures + publish_failures + panicked,
            published,
            synthesis_failures,
            publish_failures,
            panicked,
            pending: self.pending.load(Ordering::SeqCst),
        }
    }
}

pub struct TaskQueue {
    // `None` once shutdown has begun; holding the lock while sending keeps
    // every accepted task ahead of the close marker.
    sender: StdMutex<Option<mpsc::UnboundedSender<QueueMessage>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    state: watch::Receiver<WorkerState>,
    counters: Arc<Counters>,
}

impl TaskQueue {
    /// Spawn the worker on the current tokio runtime.
    pub fn start(pipeline: Pipeline) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(WorkerState::Idle);
        let counters = Arc::new(Counters::default());

        let worker = tokio::spawn(run_worker(
            rx,
            Arc::new(pipeline),
            counters.clone(),
            state_tx,
        ));

        Self {
            sender: StdMutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            state: state_rx,
            counters,
        }
    }

    /// Enqueue at the tail. Never blocks on the worker.
    pub fn submit(&self, task: GenerationTask) -> Result<Uuid, SchedulerError> {
        let id = task.id;
        let prompt = task.prompt().to_string();

        let guard = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        let sender = guard.as_ref().ok_or(SchedulerError::QueueClosed)?;

        self.counters.pending.fetch_add(1, Ordering::SeqCst);
        if sender.send(QueueMessage::Task(task)).is_err() {
            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SchedulerError::QueueClosed);
        }
        self.counters.submitted.fetch_add(1, Ordering::SeqCst);
        drop(guard);

        info!("Enqueued [{}]: {}", id, prompt);
        Ok(id)
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.clone()
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }

    /// Enqueued but not yet dequeued.
    pub fn pending(&self) -> usize {
        self.counters.pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }

    /// Stop accepting work, wait until every task accepted before this call
    /// has been processed, then stop the worker. Waits without a timeout.
    /// Calling it again just returns the final stats.
    pub async fn shutdown(&self) -> QueueStats {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(sender) = sender {
            info!(
                "Waiting for {} tasks to finish...",
                self.counters.pending.load(Ordering::SeqCst)
            );
            if sender.send(QueueMessage::Close).is_err() {
                warn!("Worker already gone before shutdown");
            }
        }

        // Held across the join so concurrent callers wait for the same drain.
        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.take() {
            if let Err(e) = handle.await {
                error!("Task queue worker ended abnormally: {}", e);
            }
        }
        drop(worker);

        let stats = self.stats();
        info!(
            "Task queue stopped: {} processed, {} published, {} synthesis failures, {} publish failures",
            stats.processed, stats.published, stats.synthesis_failures, stats.publish_failures
        );
        stats
    }
}

async fn run_worker(
    mut rx: mpsc::UnboundedReceiver<QueueMessage>,
    pipeline: Arc<Pipeline>,
    counters: Arc<Counters>,
    state: watch::Sender<WorkerState>,
) {
    while let Some(message) = rx.recv().await {
        let task = match message {
            QueueMessage::Task(task) => task,
            QueueMessage::Close => break,
        };
        counters.pending.fetch_sub(1, Ordering::SeqCst);
        state.send_replace(WorkerState::Processing);

        let id = task.id;
        let kind = task.kind();
        let filename = task.content_info.filename.clone();
        info!("Dequeued [{}] {}: {}", id, kind, task.prompt());

        // Awaited immediately: one task in flight, and a panicking backend
        // only takes down this task.
        let job = pipeline.clone();
        let outcome = tokio::spawn(async move { job.run(&task).await })
            .await
            .unwrap_or_else(|e| Err(TaskFailure::Panicked(e.to_string())));

        match outcome {
            Ok(image_id) => {
                counters.published.fetch_add(1, Ordering::SeqCst);
                info!(
                    "Saved image: {} as {}, {} tasks remaining",
                    filename,
                    image_id,
                    counters.pending.load(Ordering::SeqCst)
                );
            }
            Err(failure) => {
                let counter = match &failure {
                    TaskFailure::Backend(_) => &counters.synthesis_failures,
                    TaskFailure::Publish(_) => &counters.publish_failures,
                    TaskFailure::Panicked(_) => &counters.panicked,
                };
                counter.fetch_add(1, Ordering::SeqCst);
                error!("Task [{}] for {} failed: {}", id, filename, failure);
            }
        }

        state.send_replace(WorkerState::Idle);
    }

    state.send_replace(WorkerState::Draining);
    rx.close();
    state.send_replace(WorkerState::Stopped);
}
