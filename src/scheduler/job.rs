// Package scheduler defines the job model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::work::JobWork;

/// Job identifier, a random UUID assigned at enqueue.
pub type JobId = Uuid;

/// Free-form job parameters.
pub type JobParams = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// Every tier, highest first.
    pub const ALL: [JobPriority; 3] = [JobPriority::High, JobPriority::Normal, JobPriority::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            JobPriority::High => 0,
            JobPriority::Normal => 1,
            JobPriority::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    Retrying,
}

impl JobStatus {
    /// Whether the job will never run again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::TimedOut
        )
    }
}

/// Snapshot of a job as seen by callers.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub job_type: String,
    pub description: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub parameters: JobParams,
    pub max_retries: u32,
    pub retry_count: u32,
    /// Number of times the work has been started.
    pub attempts: u32,
    pub last_error: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

impl JobInfo {
    /// Time between the last start and completion, once both are known.
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }
}

/// A job submission.
pub struct JobRequest {
    pub(crate) job_type: String,
    pub(crate) description: String,
    pub(crate) priority: JobPriority,
    pub(crate) params: JobParams,
    pub(crate) work: Arc<dyn JobWork>,
}

impl JobRequest {
    pub fn new(job_type: impl Into<String>, description: impl Into<String>, work: Arc<dyn JobWork>) -> Self {
        Self {
            job_type: job_type.into(),
            description: description.into(),
            priority: JobPriority::Normal,
            params: JobParams::new(),
            work,
        }
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn params(mut self, params: JobParams) -> Self {
        self.params.extend(params);
        self
    }
}

/// A job owned by the scheduler: its public snapshot plus the work to run.
pub(crate) struct Job {
    pub info: JobInfo,
    pub work: Arc<dyn JobWork>,
}

impl Job {
    pub fn new(req: JobRequest, max_retries: u32) -> Self {
        Self {
            info: JobInfo {
                id: Uuid::new_v4(),
                job_type: req.job_type,
                description: req.description,
                priority: req.priority,
                status: JobStatus::Queued,
                created_at: Utc::now(),
                started_at: None,
                completed_at: None,
                parameters: req.params,
                max_retries,
                retry_count: 0,
                attempts: 0,
                last_error: None,
                last_retry_at: None,
            },
            work: req.work,
        }
    }

    pub fn id(&self) -> JobId {
        self.info.id
    }

    pub fn priority(&self) -> JobPriority {
        self.info.priority
    }
}
