// Job scheduler: priority queues, worker loops, timeouts and retries.

mod counters;
pub mod error;
mod history;
pub mod job;
mod maintenance;
mod queue;
pub mod retry;
#[allow(clippy::module_inception)]
mod scheduler;
mod state;
pub mod work;
mod worker;

pub use error::{EnqueueError, JobError, SchedulerError};
pub use job::{JobId, JobInfo, JobParams, JobPriority, JobRequest, JobStatus};
pub use maintenance::METRICS_JOB_TYPE;
pub use retry::RetryPolicy;
pub use scheduler::{JobScheduler, SchedulerStats, ShutdownReport};
pub use state::ServiceStatus;
pub use work::{work_fn, JobContext, JobWork};
