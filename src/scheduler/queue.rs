// Package scheduler provides the bounded per-priority FIFO queues.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::error::EnqueueError;
use super::job::{Job, JobPriority};

/// Three FIFO queues sharing one admission cap.
///
/// Per-tier lengths are mirrored in atomics so loops and statistics can
/// read them without taking a lock.
pub(crate) struct PriorityQueues {
    tiers: [Mutex<VecDeque<Job>>; 3],
    lens: [AtomicUsize; 3],
    total: AtomicUsize,
    capacity: usize,
}

impl PriorityQueues {
    pub fn new(capacity: usize) -> Self {
        Self {
            tiers: Default::default(),
            lens: Default::default(),
            total: AtomicUsize::new(0),
            capacity,
        }
    }

    /// Appends a new job to the tail of its tier.
    /// Fails with `QueueFull` once `capacity` jobs are queued overall.
    pub fn push(&self, job: Job) -> Result<(), (Job, EnqueueError)> {
        let mut cur = self.total.load(Ordering::Acquire);
        loop {
            if cur >= self.capacity {
                return Err((job, EnqueueError::QueueFull { capacity: self.capacity }));
            }
            match self
                .total
                .compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break,
                Err(actual) => cur = actual,
            }
        }
        self.push_back(job);
        Ok(())
    }

    /// Appends a job that was already admitted once. Not subject to the cap.
    pub fn push_retry(&self, job: Job) {
        self.total.fetch_add(1, Ordering::AcqRel);
        self.push_back(job);
    }

    fn push_back(&self, job: Job) {
        let i = job.priority().index();
        let mut tier = self.tiers[i].lock();
        tier.push_back(job);
        self.lens[i].fetch_add(1, Ordering::Release);
    }

    /// Takes the head of a tier.
    pub fn pop(&self, priority: JobPriority) -> Option<Job> {
        let i = priority.index();
        let mut tier = self.tiers[i].lock();
        let job = tier.pop_front()?;
        self.lens[i].fetch_sub(1, Ordering::Release);
        self.total.fetch_sub(1, Ordering::AcqRel);
        Some(job)
    }

    /// Whether any tier above `priority` has queued jobs.
    pub fn has_higher_than(&self, priority: JobPriority) -> bool {
        self.lens[..priority.index()]
            .iter()
            .any(|l| l.load(Ordering::Acquire) > 0)
    }

    pub fn len(&self, priority: JobPriority) -> usize {
        self.lens[priority.index()].load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Empties every tier, highest first.
    pub fn drain(&self) -> Vec<Job> {
        let mut out = Vec::with_capacity(self.total());
        for p in JobPriority::ALL {
            while let Some(job) = self.pop(p) {
                out.push(job);
            }
        }
        out
    }
}
