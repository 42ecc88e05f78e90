//! Cooperative job loop.
//!
//! ```text
//! loop {
//!     for each trigger that is due:
//!         run its job to completion
//!         next run = completion time + interval
//!     wait poll_interval, or stop if shutdown fired
//! }
//! ```
//!
//! Jobs never run concurrently, not even two different ones. Shutdown is
//! only observed between polls, so a running job always completes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

/// A unit of scheduled work. Implementations handle their own errors.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self);
}

/// When a job is due next.
#[derive(Debug, Clone, Copy)]
pub struct Trigger {
    interval: Duration,
    next_due: Instant,
}

impl Trigger {
    /// Due right away, then every `interval`.
    pub fn immediate(interval: Duration) -> Self {
        Self {
            interval,
            next_due: Instant::now(),
        }
    }

    /// First due one `interval` from now.
    pub fn after(interval: Duration) -> Self {
        Self {
            interval,
            next_due: Instant::now() + interval,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        now >= self.next_due
    }

    /// Schedules the next run relative to `finished`.
    pub fn mark_ran(&mut self, finished: Instant) {
        self.next_due = finished + self.interval;
    }
}

pub struct Scheduler {
    entries: Vec<(Trigger, Box<dyn ScheduledJob>)>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            entries: Vec::new(),
            poll_interval,
        }
    }

    /// Registers a job. Jobs that are due at the same poll run in
    /// registration order.
    pub fn add(&mut self, trigger: Trigger, job: Box<dyn ScheduledJob>) {
        self.entries.push((trigger, job));
    }

    /// Runs due jobs until `shutdown` resolves.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(jobs = self.entries.len(), "scheduler started");

        loop {
            for (trigger, job) in self.entries.iter_mut() {
                if trigger.is_due(Instant::now()) {
                    tracing::debug!(job = job.name(), "job due");
                    job.run().await;
                    trigger.mark_ran(Instant::now());
                }
            }

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested; scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
