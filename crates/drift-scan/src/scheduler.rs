//! Task scheduler, a bounded worker pool on tokio
//!
//! Tasks wait in a max-priority queue (FIFO among equal priorities) and are
//! started while fewer than `max_workers` are running. Every attempt runs on its
//! own tokio task, raced against the task timeout. Failed attempts are retried
//! immediately up to `max_retries` times.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, TryLockError};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use drift_core::config::{Config, SchedulerConfig};

use crate::cache::{compute_hash, CacheOptions, CacheStats, ResultCache};
use crate::reporter::{ReporterRegistry, SchedulerEvent, SchedulerReporter, SubscriptionId};
use crate::task::{IdGenerator, SequentialIds, Task, TaskId, TaskStatus};

pub use crate::task::TaskError;

/// Boxed future returned by a [`Processor`]
pub type ProcessFuture<Out> = Pin<Box<dyn Future<Output = anyhow::Result<Out>> + Send + 'static>>;

/// The unit of work the scheduler runs for every task
pub trait Processor<In, Out>: Send + Sync {
    /// Process one input
    fn process(&self, input: In) -> ProcessFuture<Out>;
}

impl<In, Out, F, Fut> Processor<In, Out> for F
where
    F: Fn(In) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Out>> + Send + 'static,
{
    fn process(&self, input: In) -> ProcessFuture<Out> {
        Box::pin(self(input))
    }
}

/// Options for the task scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Lower bound on worker slots
    pub min_workers: usize,
    /// Maximum concurrent tasks
    pub max_workers: usize,
    /// Maximum pending tasks
    pub max_queue_size: usize,
    /// Per-attempt time limit; zero disables it
    pub task_timeout: Duration,
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Reuse results for identical inputs
    pub enable_caching: bool,
    /// How long shutdown waits before cancelling pending tasks
    pub shutdown_grace: Duration,
}

impl SchedulerOptions {
    /// Correct invalid combinations instead of rejecting them
    pub fn normalized(mut self) -> Self {
        if self.min_workers == 0 {
            warn!("min_workers of 0 raised to 1");
            self.min_workers = 1;
        }
        if self.max_workers < self.min_workers {
            warn!(
                max_workers = self.max_workers,
                min_workers = self.min_workers,
                "max_workers raised to min_workers"
            );
            self.max_workers = self.min_workers;
        }
        if self.max_queue_size == 0 {
            warn!("max_queue_size of 0 raised to 1");
            self.max_queue_size = 1;
        }
        self
    }
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for SchedulerOptions {
    fn from(config: &SchedulerConfig) -> Self {
        Self {
            min_workers: config.min_workers,
            max_workers: config.max_workers,
            max_queue_size: config.max_queue_size,
            task_timeout: Duration::from_millis(config.task_timeout_ms),
            max_retries: config.max_retries,
            enable_caching: config.enable_caching,
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        }
    }
}

/// Errors returned when submitting work
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// The pending queue is at capacity
    #[error("Task queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Shutdown has begun
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// `set_processor` was never called
    #[error("No processor has been set")]
    NoProcessor,
}

/// Outcome of one task submitted through [`TaskScheduler::process_batch`]
#[derive(Debug, Clone)]
pub struct BatchResult<Out> {
    pub task_id: TaskId,
    pub success: bool,
    pub result: Option<Out>,
    pub error: Option<TaskError>,
    pub retries: u32,
    /// Duration of the final attempt
    pub duration: Option<Duration>,
}

impl<Out: Clone> BatchResult<Out> {
    fn cleared(task_id: TaskId) -> Self {
        Self {
            task_id,
            success: false,
            result: None,
            error: Some(TaskError::Cleared),
            retries: 0,
            duration: None,
        }
    }

    fn from_task<In>(task: &Task<In, Out>) -> Self {
        Self {
            task_id: task.id.clone(),
            success: task.status == TaskStatus::Completed,
            result: task.result.clone(),
            error: task.error.clone(),
            retries: task.retries,
            duration: task.duration(),
        }
    }
}

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerStats {
    /// Tasks currently in the index
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Retries performed since creation
    pub retries: u64,
    /// Submissions answered from the result cache
    pub cache_hits: u64,
    /// Moving average over completed attempts
    pub average_duration: Duration,
    /// Highest number of tasks running at once
    pub peak_running: usize,
    pub queue_len: usize,
    pub max_workers: usize,
    pub paused: bool,
    pub shutting_down: bool,
}

#[derive(Debug)]
struct QueueEntry {
    priority: i32,
    seq: u64,
    id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

struct Record<In, Out> {
    task: Task<In, Out>,
    /// Submission order, kept across retries
    seq: u64,
    cache_key: Option<String>,
}

struct State<In, Out> {
    options: SchedulerOptions,
    queue: BinaryHeap<QueueEntry>,
    records: HashMap<TaskId, Record<In, Out>>,
    active: usize,
    paused: bool,
    shutting_down: bool,
    /// Set once the shutdown grace elapsed; failed attempts are not re-queued
    retries_closed: bool,
    next_seq: u64,
    retries: u64,
    cache_hits: u64,
    completed_runs: u64,
    average_secs: f64,
    peak_running: usize,
    events: VecDeque<SchedulerEvent>,
}

impl<In, Out> State<In, Out> {
    fn new(options: SchedulerOptions) -> Self {
        Self {
            options,
            queue: BinaryHeap::new(),
            records: HashMap::new(),
            active: 0,
            paused: false,
            shutting_down: false,
            retries_closed: false,
            next_seq: 0,
            retries: 0,
            cache_hits: 0,
            completed_runs: 0,
            average_secs: 0.0,
            peak_running: 0,
            events: VecDeque::new(),
        }
    }

    fn mark_cancelled(&mut self, id: &TaskId) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        if record.task.status != TaskStatus::Pending {
            return false;
        }
        record.task.status = TaskStatus::Cancelled;
        record.task.error = Some(TaskError::Cancelled);
        record.task.completed_at = Some(Utc::now());
        self.events
            .push_back(SchedulerEvent::TaskCancelled { id: id.clone() });
        true
    }

    fn record_duration(&mut self, elapsed: Duration) {
        self.completed_runs += 1;
        let n = self.completed_runs as f64;
        self.average_secs += (elapsed.as_secs_f64() - self.average_secs) / n;
    }

    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.active == 0
    }
}

struct Inner<In, Out> {
    state: Mutex<State<In, Out>>,
    processor: RwLock<Option<Arc<dyn Processor<In, Out>>>>,
    cache: Mutex<ResultCache<Out>>,
    ids: Arc<dyn IdGenerator>,
    reporters: Mutex<ReporterRegistry>,
    /// Held by whichever thread is delivering events
    emit_lock: Mutex<()>,
    /// Bumped on every state change; waiters re-check on wake
    changes: watch::Sender<u64>,
}

/// Priority task scheduler with a bounded number of concurrent workers.
///
/// Cloning is cheap; clones share the same queue and workers. Submitting and
/// resuming work spawns tokio tasks, so those calls need a running runtime.
pub struct TaskScheduler<In, Out> {
    inner: Arc<Inner<In, Out>>,
}

impl<In, Out> Clone for TaskScheduler<In, Out> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<In, Out> TaskScheduler<In, Out>
where
    In: Clone + Serialize + Send + Sync + 'static,
    Out: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a scheduler with sequential task ids
    pub fn new(options: SchedulerOptions) -> Self {
        Self::with_id_generator(options, Arc::new(SequentialIds::new()))
    }

    /// Create a scheduler drawing ids from `ids`
    pub fn with_id_generator(options: SchedulerOptions, ids: Arc<dyn IdGenerator>) -> Self {
        Self::build(options, CacheOptions::default(), ids)
    }

    /// Create a scheduler from loaded configuration
    pub fn from_config(config: &Config) -> Self {
        Self::build(
            SchedulerOptions::from(&config.scheduler),
            CacheOptions::from(&config.cache),
            Arc::new(SequentialIds::new()),
        )
    }

    fn build(options: SchedulerOptions, cache: CacheOptions, ids: Arc<dyn IdGenerator>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::new(options.normalized())),
                processor: RwLock::new(None),
                cache: Mutex::new(ResultCache::new(cache)),
                ids,
                reporters: Mutex::new(ReporterRegistry::new()),
                emit_lock: Mutex::new(()),
                changes,
            }),
        }
    }

    /// Replace the options; raising `max_workers` starts queued work at once
    pub fn configure(&self, options: SchedulerOptions) {
        let options = options.normalized();
        debug!(?options, "scheduler reconfigured");
        self.inner.lock_state().options = options;
        self.inner.notify();
        self.inner.dispatch();
    }

    /// Set the processor run for every task
    pub fn set_processor<P>(&self, processor: P)
    where
        P: Processor<In, Out> + 'static,
    {
        let mut slot = self
            .inner
            .processor
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(processor));
    }

    /// Submit one input.
    ///
    /// With caching enabled, an input whose result is already cached comes
    /// back as a completed task and the processor is not called.
    pub fn add_task(&self, input: In, priority: i32) -> Result<Task<In, Out>, SchedulerError> {
        let task = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;

            if state.shutting_down {
                return Err(SchedulerError::ShuttingDown);
            }
            if self.inner.processor().is_none() {
                return Err(SchedulerError::NoProcessor);
            }

            let cache_key = if state.options.enable_caching {
                cache_key(&input)
            } else {
                None
            };
            let cached = cache_key
                .as_deref()
                .and_then(|key| self.inner.lock_cache().get(key));

            if cached.is_none() && state.queue.len() >= state.options.max_queue_size {
                return Err(SchedulerError::QueueFull {
                    capacity: state.options.max_queue_size,
                });
            }

            let id = self.inner.ids.next_id();
            let seq = state.next_seq;
            state.next_seq += 1;

            let mut task = Task::new(id.clone(), input, priority);
            state.events.push_back(SchedulerEvent::TaskQueued {
                id: id.clone(),
                priority,
            });

            match cached {
                Some(value) => {
                    let now = Utc::now();
                    task.status = TaskStatus::Completed;
                    task.result = Some(value);
                    task.started_at = Some(now);
                    task.completed_at = Some(now);
                    state.cache_hits += 1;
                    state.events.push_back(SchedulerEvent::TaskCompleted {
                        id: id.clone(),
                        duration: Duration::ZERO,
                        cached: true,
                    });
                }
                None => state.queue.push(QueueEntry {
                    priority,
                    seq,
                    id: id.clone(),
                }),
            }

            state.records.insert(
                id,
                Record {
                    task: task.clone(),
                    seq,
                    cache_key,
                },
            );
            task
        };

        self.inner.flush_events();
        self.inner.notify();
        self.inner.dispatch();
        Ok(task)
    }

    /// Submit every input at priority 0 and wait until all of them finish.
    ///
    /// Results come back in input order. If a submission is rejected, the
    /// tasks this call already queued are cancelled and the error returned.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub async fn process_batch(
        &self,
        inputs: Vec<In>,
    ) -> Result<Vec<BatchResult<Out>>, SchedulerError> {
        let mut ids = Vec::with_capacity(inputs.len());
        for input in inputs {
            match self.add_task(input, 0) {
                Ok(task) => ids.push(task.id),
                Err(err) => {
                    let cancelled = ids.iter().filter(|id| self.cancel_task(id)).count();
                    warn!(%err, cancelled, "batch submission rejected");
                    return Err(err);
                }
            }
        }

        // Snapshot each task as it finishes so clearing finished records
        // mid-batch cannot drop entries.
        let mut results: Vec<Option<BatchResult<Out>>> = vec![None; ids.len()];
        self.inner
            .wait_until(|state| {
                let mut done = true;
                for (slot, id) in results.iter_mut().zip(&ids) {
                    if slot.is_some() {
                        continue;
                    }
                    match state.records.get(id) {
                        Some(record) if record.task.status.is_terminal() => {
                            *slot = Some(BatchResult::from_task(&record.task));
                        }
                        Some(_) => done = false,
                        None => *slot = Some(BatchResult::cleared(id.clone())),
                    }
                }
                done
            })
            .await;

        Ok(results.into_iter().flatten().collect())
    }

    /// Cancel a pending task; running and finished tasks are left alone
    pub fn cancel_task(&self, id: &TaskId) -> bool {
        let cancelled = {
            let mut state = self.inner.lock_state();
            let cancelled = state.mark_cancelled(id);
            if cancelled {
                state.queue.retain(|entry| &entry.id != id);
                if state.is_drained() {
                    state.events.push_back(SchedulerEvent::Drained);
                }
            }
            cancelled
        };

        if cancelled {
            debug!(task = %id, "task cancelled");
            self.inner.flush_events();
            self.inner.notify();
        }
        cancelled
    }

    /// Cancel every queued task, highest priority first
    pub fn cancel_all_pending(&self) -> usize {
        let count = {
            let mut state = self.inner.lock_state();
            let mut entries = std::mem::take(&mut state.queue).into_sorted_vec();
            entries.reverse();
            let count = entries
                .iter()
                .filter(|entry| state.mark_cancelled(&entry.id))
                .count();
            if count > 0 && state.is_drained() {
                state.events.push_back(SchedulerEvent::Drained);
            }
            count
        };

        if count > 0 {
            info!(count, "pending tasks cancelled");
            self.inner.flush_events();
            self.inner.notify();
        }
        count
    }

    /// Stop starting new tasks; submissions are still accepted
    pub fn pause(&self) {
        self.inner.lock_state().paused = true;
        debug!("scheduler paused");
        self.inner.notify();
    }

    /// Start dispatching again
    pub fn resume(&self) {
        self.inner.lock_state().paused = false;
        debug!("scheduler resumed");
        self.inner.notify();
        self.inner.dispatch();
    }

    /// Wait until nothing is queued or running
    ///
    /// Never resolves while paused with work queued.
    pub async fn drain(&self) {
        self.inner.wait_until(State::is_drained).await;
    }

    /// Stop accepting tasks and wait for running ones.
    ///
    /// Pending tasks still queued after `grace` (the configured shutdown grace
    /// when `None`) are cancelled, and attempts failing after that point are
    /// cancelled instead of retried. Returns once nothing is queued or running.
    /// Calling this again only waits again.
    pub async fn shutdown(&self, grace: Option<Duration>) {
        let grace = {
            let mut state = self.inner.lock_state();
            if !state.shutting_down {
                state.shutting_down = true;
                info!(
                    queued = state.queue.len(),
                    running = state.active,
                    "scheduler shutting down"
                );
            }
            grace.unwrap_or(state.options.shutdown_grace)
        };
        self.inner.notify();

        if tokio::time::timeout(grace, self.drain()).await.is_err() {
            self.inner.lock_state().retries_closed = true;
            let cancelled = self.cancel_all_pending();
            warn!(
                cancelled,
                grace_ms = grace.as_millis() as u64,
                "shutdown grace period elapsed"
            );
        }

        self.inner.wait_until(State::is_drained).await;
        info!("scheduler stopped");
    }

    /// Counters and status totals
    pub fn stats(&self) -> SchedulerStats {
        let state = self.inner.lock_state();
        let mut stats = SchedulerStats {
            total: state.records.len(),
            retries: state.retries,
            cache_hits: state.cache_hits,
            average_duration: Duration::from_secs_f64(state.average_secs),
            peak_running: state.peak_running,
            queue_len: state.queue.len(),
            max_workers: state.options.max_workers,
            paused: state.paused,
            shutting_down: state.shutting_down,
            ..SchedulerStats::default()
        };
        for record in state.records.values() {
            match record.task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    /// Snapshot of a task
    pub fn task(&self, id: &TaskId) -> Option<Task<In, Out>> {
        self.inner
            .lock_state()
            .records
            .get(id)
            .map(|record| record.task.clone())
    }

    /// Drop finished tasks from the index
    pub fn clear_finished(&self) -> usize {
        let mut state = self.inner.lock_state();
        let before = state.records.len();
        state
            .records
            .retain(|_, record| !record.task.status.is_terminal());
        before - state.records.len()
    }

    /// Number of cached results
    pub fn cache_size(&self) -> usize {
        self.inner.lock_cache().len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.lock_cache().stats()
    }

    pub fn clear_cache(&self) {
        self.inner.lock_cache().clear();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock_state().paused
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.lock_state().shutting_down
    }

    /// Tasks waiting for a worker
    pub fn queue_len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// Tasks currently running
    pub fn active_count(&self) -> usize {
        self.inner.lock_state().active
    }

    /// Register an event observer
    pub fn subscribe(&self, reporter: Arc<dyn SchedulerReporter>) -> SubscriptionId {
        self.inner.lock_reporters().subscribe(reporter)
    }

    /// Remove an observer; false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.lock_reporters().unsubscribe(id)
    }
}

impl<In, Out> std::fmt::Debug for TaskScheduler<In, Out> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.lock_state();
        f.debug_struct("TaskScheduler")
            .field("options", &state.options)
            .field("queued", &state.queue.len())
            .field("active", &state.active)
            .field("paused", &state.paused)
            .finish()
    }
}

impl<In, Out> Inner<In, Out> {
    fn lock_state(&self) -> MutexGuard<'_, State<In, Out>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, ResultCache<Out>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_reporters(&self) -> MutexGuard<'_, ReporterRegistry> {
        self.reporters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn processor(&self) -> Option<Arc<dyn Processor<In, Out>>> {
        self.processor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| {
            *generation = generation.wrapping_add(1);
        });
    }

    /// Deliver queued events in order.
    ///
    /// Only one thread delivers at a time; events queued meanwhile are picked
    /// up by the thread already delivering.
    fn flush_events(&self) {
        loop {
            let guard = match self.emit_lock.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => return,
            };

            loop {
                let batch: Vec<SchedulerEvent> = self.lock_state().events.drain(..).collect();
                if batch.is_empty() {
                    break;
                }
                // Deliver from a snapshot so reporters may subscribe or
                // unsubscribe while handling an event.
                let reporters = self.lock_reporters().clone();
                if reporters.is_empty() {
                    continue;
                }
                for event in &batch {
                    reporters.broadcast(event);
                }
            }

            drop(guard);
            if self.lock_state().events.is_empty() {
                return;
            }
        }
    }

    async fn wait_until<F>(&self, mut done: F)
    where
        F: FnMut(&State<In, Out>) -> bool,
    {
        let mut changes = self.changes.subscribe();
        loop {
            let finished = done(&self.lock_state());
            if finished || changes.changed().await.is_err() {
                return;
            }
        }
    }
}

impl<In, Out> Inner<In, Out>
where
    In: Clone + Serialize + Send + Sync + 'static,
    Out: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Start queued tasks while slots are free
    fn dispatch(self: &Arc<Self>) {
        let Some(processor) = self.processor() else {
            return;
        };

        let mut started = Vec::new();
        {
            let mut guard = self.lock_state();
            let state = &mut *guard;

            while !state.paused && state.active < state.options.max_workers {
                let Some(entry) = state.queue.pop() else {
                    break;
                };
                let Some(record) = state.records.get_mut(&entry.id) else {
                    continue;
                };
                if record.task.status != TaskStatus::Pending {
                    continue;
                }

                record.task.status = TaskStatus::Running;
                record.task.started_at = Some(Utc::now());
                let attempt = record.task.retries + 1;
                let input = record.task.input.clone();

                state.active += 1;
                state.peak_running = state.peak_running.max(state.active);
                state.events.push_back(SchedulerEvent::TaskStarted {
                    id: entry.id.clone(),
                    attempt,
                });
                started.push((entry.id, input, state.options.task_timeout));
            }
        }

        if started.is_empty() {
            return;
        }
        self.flush_events();
        self.notify();

        for (id, input, timeout) in started {
            let inner = Arc::clone(self);
            let processor = Arc::clone(&processor);
            tokio::spawn(async move {
                let clock = Instant::now();
                let outcome = run_attempt(processor, input, timeout).await;
                inner.finish(id, outcome, clock.elapsed());
            });
        }
    }

    /// Record the outcome of one attempt, then start more work
    fn finish(self: &Arc<Self>, id: TaskId, outcome: Result<Out, TaskError>, elapsed: Duration) {
        let mut to_cache = None;
        {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            state.active = state.active.saturating_sub(1);

            if let Some(record) = state.records.get_mut(&id) {
                let task = &mut record.task;
                match outcome {
                    Ok(value) => {
                        if state.options.enable_caching {
                            if let Some(key) = &record.cache_key {
                                to_cache = Some((key.clone(), value.clone()));
                            }
                        }
                        task.status = TaskStatus::Completed;
                        task.result = Some(value);
                        task.error = None;
                        task.completed_at = Some(Utc::now());
                        state.events.push_back(SchedulerEvent::TaskCompleted {
                            id: id.clone(),
                            duration: elapsed,
                            cached: false,
                        });
                        state.record_duration(elapsed);
                    }
                    Err(error)
                        if task.retries < state.options.max_retries && state.retries_closed =>
                    {
                        debug!(task = %id, %error, "attempt failed after shutdown grace, not retried");
                        task.status = TaskStatus::Cancelled;
                        task.error = Some(TaskError::Cancelled);
                        task.completed_at = Some(Utc::now());
                        state
                            .events
                            .push_back(SchedulerEvent::TaskCancelled { id: id.clone() });
                    }
                    Err(error) if task.retries < state.options.max_retries => {
                        task.retries += 1;
                        task.status = TaskStatus::Pending;
                        task.error = Some(error.clone());
                        state.retries += 1;
                        state.queue.push(QueueEntry {
                            priority: task.priority,
                            seq: record.seq,
                            id: id.clone(),
                        });
                        state.events.push_back(SchedulerEvent::TaskRetrying {
                            id: id.clone(),
                            retries: task.retries,
                            error: error.to_string(),
                        });
                    }
                    Err(error) => {
                        task.status = TaskStatus::Failed;
                        task.completed_at = Some(Utc::now());
                        state.events.push_back(SchedulerEvent::TaskFailed {
                            id: id.clone(),
                            retries: task.retries,
                            error: error.to_string(),
                        });
                        task.error = Some(error);
                    }
                }
            }

            if state.queue.is_empty() {
                state.events.push_back(SchedulerEvent::Idle {
                    active: state.active,
                });
                if state.active == 0 {
                    state.events.push_back(SchedulerEvent::Drained);
                }
            }
        }

        if let Some((key, value)) = to_cache {
            self.lock_cache().set(key, value);
        }
        self.flush_events();
        self.notify();
        self.dispatch();
    }
}

/// Run one attempt on its own tokio task so panics and timeouts stay contained.
///
/// `process` is called inside that task, so a processor panicking before it
/// returns a future fails the attempt like any other panic.
async fn run_attempt<In, Out>(
    processor: Arc<dyn Processor<In, Out>>,
    input: In,
    timeout: Duration,
) -> Result<Out, TaskError>
where
    In: Send + 'static,
    Out: Send + 'static,
{
    let mut handle = tokio::spawn(async move { processor.process(input).await });
    let joined = if timeout.is_zero() {
        (&mut handle).await
    } else {
        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                handle.abort();
                return Err(TaskError::TimedOut { timeout });
            }
        }
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TaskError::Execution(format!("{err:#}"))),
        Err(err) => Err(TaskError::Execution(format!("processor panicked: {err}"))),
    }
}

/// SHA-256 of the canonical JSON form of `input`
fn cache_key<T: Serialize>(input: &T) -> Option<String> {
    match serde_json::to_value(input) {
        Ok(value) => Some(compute_hash(value.to_string())),
        Err(err) => {
            debug!(%err, "input not serializable, caching skipped");
            None
        }
    }
}
