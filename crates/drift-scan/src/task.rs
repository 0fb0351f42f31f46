//! Task types and id generation

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a scheduled task
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue
    Pending,
    /// Occupying a worker slot
    Running,
    /// Finished with a result
    Completed,
    /// Finished after exhausting its retries
    Failed,
    /// Removed from the queue before it ran
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transitions can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a task attempt did not produce a result
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The processor returned an error or panicked
    #[error("task execution failed: {0}")]
    Execution(String),

    /// The processor did not finish within the task timeout
    #[error("task timed out after {}ms", .timeout.as_millis())]
    TimedOut { timeout: Duration },

    /// The task was cancelled while pending
    #[error("task was cancelled")]
    Cancelled,

    /// The finished task was cleared from the index before its result was read
    #[error("task record was cleared before its result was collected")]
    Cleared,
}

/// One unit of scheduled work
#[derive(Debug, Clone)]
pub struct Task<In, Out> {
    /// Task identifier
    pub id: TaskId,
    /// Input handed to the processor
    pub input: In,
    /// Higher runs first
    pub priority: i32,
    /// Current lifecycle status
    pub status: TaskStatus,
    /// Processor output once completed
    pub result: Option<Out>,
    /// Last error once failed or cancelled
    pub error: Option<TaskError>,
    /// Failed attempts that were retried
    pub retries: u32,
    /// When the task was submitted
    pub created_at: DateTime<Utc>,
    /// When the latest attempt started
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl<In, Out> Task<In, Out> {
    /// Create a pending task
    pub fn new(id: TaskId, input: In, priority: i32) -> Self {
        Self {
            id,
            input,
            priority,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            retries: 0,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Time between the start of the last attempt and completion
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        (completed - started).to_std().ok()
    }
}

/// Source of task identifiers, injected into the scheduler
pub trait IdGenerator: Send + Sync {
    /// Produce the next unique id
    fn next_id(&self) -> TaskId;
}

/// Monotonic counter ids such as `task-1`, `task-2`
#[derive(Debug)]
pub struct SequentialIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialIds {
    /// Counter with the default `task` prefix
    pub fn new() -> Self {
        Self::with_prefix("task")
    }

    /// Counter with a custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }

    /// Restart numbering at 1
    #[cfg(test)]
    pub fn reset(&self) {
        self.next.store(1, Ordering::SeqCst);
    }
}

impl Default for SequentialIds {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> TaskId {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        TaskId(format!("{}-{}", self.prefix, n))
    }
}

/// Random v4 UUID ids
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
    fn next_id(&self) -> TaskId {
        TaskId(uuid::Uuid::new_v4().to_string())
    }
}
