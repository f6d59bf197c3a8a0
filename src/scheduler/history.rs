// Package scheduler keeps job snapshots for lookups by id.

use chrono::Utc;
use dashmap::DashMap;
use std::time::Duration;

use super::job::{JobId, JobInfo};

/// Latest snapshot of every job the scheduler has seen.
#[derive(Default)]
pub(crate) struct History {
    jobs: DashMap<JobId, JobInfo>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, info: &JobInfo) {
        self.jobs.insert(info.id, info.clone());
    }

    pub fn get(&self, id: &JobId) -> Option<JobInfo> {
        self.jobs.get(id).map(|e| e.value().clone())
    }

    pub fn remove(&self, id: &JobId) {
        self.jobs.remove(id);
    }

    /// Applies `f` to a stored snapshot and returns the updated copy.
    pub fn update(&self, id: &JobId, f: impl FnOnce(&mut JobInfo)) -> Option<JobInfo> {
        let mut entry = self.jobs.get_mut(id)?;
        f(entry.value_mut());
        Some(entry.value().clone())
    }

    /// Drops terminal jobs that finished more than `retention` ago.
    pub fn purge_older_than(&self, retention: Duration) -> usize {
        let Ok(retention) = chrono::Duration::from_std(retention) else {
            return 0;
        };
        let cutoff = Utc::now() - retention;
        let mut purged = 0;
        self.jobs.retain(|_, info| {
            let expired = info.status.is_terminal() && info.completed_at.map_or(false, |at| at < cutoff);
            purged += usize::from(expired);
            !expired
        });
        purged
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }
}
