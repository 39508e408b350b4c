use thiserror::Error;

/// Errors surfaced synchronously to callers of the scheduling core.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error("Invalid baseline {latest_known}: out of range for epoch {epoch}")]
    InvalidBaseline { latest_known: i64, epoch: i64 },
    #[error("Empty database: no known dates to rotate through")]
    EmptyBaseline,
    #[error("Missing required field: {0}")]
    MissingRequiredField(&'static str),
    #[error("Task queue is shut down")]
    QueueClosed,
    #[error("Source image unusable: {0}")]
    SourceImage(String),
    #[error("Ledger error: {0}")]
    Ledger(#[from] anyhow::Error),
}

/// Failure of a single dequeued task. Never escapes the worker loop.
#[derive(Error, Debug)]
pub enum TaskFailure {
    #[error("synthesis failed: {0}")]
    Backend(anyhow::Error),
    #[error("publish failed: {0}")]
    Publish(anyhow::Error),
    #[error("task panicked: {0}")]
    Panicked(String),
}
