// Package scheduler defines what a job runs.

use anyhow::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::job::{JobId, JobInfo, JobParams};

/// JobWork is the body of a job. It may be invoked once per attempt.
#[async_trait]
pub trait JobWork: Send + Sync {
    async fn execute(&self, ctx: JobContext) -> Result<()>;
}

/// Execution context of one attempt.
///
/// The cancellation token fires when the scheduler shuts down or the
/// per-job deadline passes; long-running work should watch it.
#[derive(Clone)]
pub struct JobContext {
    pub id: JobId,
    pub job_type: String,
    pub attempt: u32,
    pub params: Arc<JobParams>,
    cancel: CancellationToken,
}

impl JobContext {
    pub(crate) fn new(info: &JobInfo, cancel: CancellationToken) -> Self {
        Self {
            id: info.id,
            job_type: info.job_type.clone(),
            attempt: info.attempts,
            params: Arc::new(info.parameters.clone()),
            cancel,
        }
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the attempt is cancelled.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

struct FnWork<F>(F);

#[async_trait]
impl<F, Fut> JobWork for FnWork<F>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn execute(&self, ctx: JobContext) -> Result<()> {
        (self.0)(ctx).await
    }
}

/// Adapts an async closure into job work.
pub fn work_fn<F, Fut>(f: F) -> Arc<dyn JobWork>
where
    F: Fn(JobContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(FnWork(f))
}
