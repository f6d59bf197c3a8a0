// Package scheduler error taxonomy.

use std::time::Duration;
use thiserror::Error;

/// Why a job could not be admitted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("job queue is full ({capacity} jobs queued)")]
    QueueFull { capacity: usize },

    #[error("scheduler is stopped")]
    Stopped,
}

/// Why an attempt did not complete. Recorded as the job's `last_error`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    Execution(String),

    #[error("job exceeded its {0:?} timeout")]
    Timeout(Duration),

    #[error("job cancelled")]
    Cancelled,

    #[error("job panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler was stopped and cannot be restarted")]
    AlreadyStopped,
}
