//! Scheduler event reporting

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::task::TaskId;

/// Events emitted by the scheduler, in the order the transitions happened
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// A task entered the queue
    TaskQueued { id: TaskId, priority: i32 },
    /// A task attempt took a worker slot
    TaskStarted { id: TaskId, attempt: u32 },
    /// An attempt failed and the task was queued again
    TaskRetrying {
        id: TaskId,
        retries: u32,
        error: String,
    },
    /// A task produced a result
    TaskCompleted {
        id: TaskId,
        duration: Duration,
        cached: bool,
    },
    /// A task exhausted its retries
    TaskFailed {
        id: TaskId,
        retries: u32,
        error: String,
    },
    /// A pending task was cancelled
    TaskCancelled { id: TaskId },
    /// A worker slot freed up with nothing queued
    Idle { active: usize },
    /// Queue and worker slots are both empty
    Drained,
}

/// Trait for observing scheduler events
pub trait SchedulerReporter: Send + Sync {
    /// Handle an event
    fn report(&self, event: &SchedulerEvent);
}

impl<F> SchedulerReporter for F
where
    F: Fn(&SchedulerEvent) + Send + Sync,
{
    fn report(&self, event: &SchedulerEvent) {
        self(event)
    }
}

/// Reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl SchedulerReporter for TracingReporter {
    fn report(&self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::TaskQueued { id, priority } => {
                tracing::debug!(task = %id, priority, "task queued");
            }
            SchedulerEvent::TaskStarted { id, attempt } => {
                tracing::debug!(task = %id, attempt, "task started");
            }
            SchedulerEvent::TaskRetrying { id, retries, error } => {
                tracing::warn!("{} failed, retry {}: {}", id, retries, error);
            }
            SchedulerEvent::TaskCompleted {
                id,
                duration,
                cached,
            } => {
                if *cached {
                    tracing::info!("{} completed (cached)", id);
                } else {
                    tracing::info!("{} completed in {:.3}s", id, duration.as_secs_f64());
                }
            }
            SchedulerEvent::TaskFailed { id, retries, error } => {
                tracing::error!("{} failed after {} retries: {}", id, retries, error);
            }
            SchedulerEvent::TaskCancelled { id } => {
                tracing::info!("{} cancelled", id);
            }
            SchedulerEvent::Idle { active } => {
                tracing::debug!(active, "worker slot idle");
            }
            SchedulerEvent::Drained => {
                tracing::info!("task queue drained");
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<SchedulerEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SchedulerReporter for CollectingReporter {
    fn report(&self, event: &SchedulerEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

/// Token returned by a subscription, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of subscribed reporters
///
/// Cloning yields a snapshot sharing the same reporters.
#[derive(Default, Clone)]
pub struct ReporterRegistry {
    next_id: u64,
    reporters: Vec<(SubscriptionId, Arc<dyn SchedulerReporter>)>,
}

impl ReporterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reporter, returning its token
    pub fn subscribe(&mut self, reporter: Arc<dyn SchedulerReporter>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.reporters.push((id, reporter));
        id
    }

    /// Remove a reporter; false if the token is unknown
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.reporters.len();
        self.reporters.retain(|(sub, _)| *sub != id);
        self.reporters.len() != before
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &SchedulerEvent) {
        for (_, reporter) in &self.reporters {
            reporter.report(event);
        }
    }
}

impl std::fmt::Debug for ReporterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReporterRegistry")
            .field("reporters", &self.len())
            .finish()
    }
}
