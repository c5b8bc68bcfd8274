//! Bounded-concurrency task queue.
//!
//! [`TaskQueue`] accepts [`RequestDescriptor`]s, runs them through a
//! [`Generator`] with at most `max_concurrent` in flight, retries retryable
//! failures with exponential backoff, and keeps every task record until the
//! caller clears it.
//!
//! # Scheduling
//!
//! A single dispatcher task owns the FIFO. It wakes on a [`Notify`] whenever
//! something changes (enqueue, completion, resume, config change) and starts
//! pending tasks until the concurrency cap or the per-minute rate limit is
//! reached. Each started task runs on its own tokio task; its outcome is
//! written back under the state lock. A retried task goes to the back of the
//! FIFO once its backoff elapses.
//!
//! # Cancellation
//!
//! Cancelling a processing task aborts its worker. If the worker already
//! produced an outcome, that outcome is discarded: a task's status never
//! leaves a terminal state.
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use huginn::{Orchestrator, RequestDescriptor, TaskKind};
//! # use huginn::queue::{QueueConfig, TaskQueue};
//! # async fn run(orchestrator: Arc<Orchestrator>) -> huginn::Result<()> {
//! let queue = TaskQueue::new(orchestrator, QueueConfig::default())?;
//! queue.start();
//! let ids = queue.enqueue_batch(
//!     ["GCash payment", "Lunch with team"]
//!         .into_iter()
//!         .map(|line| RequestDescriptor::new(line, TaskKind::Categorize)),
//! );
//! queue.wait_idle().await;
//! for id in ids {
//!     println!("{:?}", queue.get_task(id).map(|t| t.status));
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod stats;
mod task;

pub use config::{QueueConfig, RATE_LIMIT_WINDOW};
pub use stats::QueueStats;
pub use task::{Task, TaskError, TaskId, TaskStatus};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::SystemTime;

use futures_util::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use crate::orchestrator::Generator;
use crate::telemetry;
use crate::types::{GenerateResult, RequestDescriptor};
use crate::{HuginnError, Result};

const EVENT_CAPACITY: usize = 1024;

/// Lifecycle notifications. Slow subscribers may miss events
/// (the channel is bounded); task records remain authoritative.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    TaskStarted {
        id: TaskId,
        attempt: u32,
    },
    TaskCompleted {
        id: TaskId,
    },
    TaskFailed {
        id: TaskId,
        error: TaskError,
    },
    /// A retry is scheduled; `attempt` is the dispatch it will be.
    TaskRetrying {
        id: TaskId,
        attempt: u32,
        delay_ms: u64,
    },
    TaskCancelled {
        id: TaskId,
    },
    /// Nothing pending, processing or waiting on a retry.
    QueueEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    /// Accepting tasks; nothing dispatched until [`TaskQueue::start`].
    Created,
    Running,
    /// In-flight tasks finish; nothing new starts.
    Paused,
    /// Shut down. New tasks are recorded as cancelled.
    Stopped,
}

struct State {
    config: QueueConfig,
    run_state: QueueState,
    tasks: BTreeMap<TaskId, Task>,
    pending: VecDeque<TaskId>,
    running: HashMap<TaskId, AbortHandle>,
    retry_timers: HashMap<TaskId, AbortHandle>,
    dispatch_times: VecDeque<Instant>,
    next_id: u64,
}

impl State {
    fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty() && self.retry_timers.is_empty()
    }

    /// Mark `id` cancelled and stop whatever is driving it.
    fn cancel(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        if task.status.is_terminal() {
            return false;
        }
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(SystemTime::now());
        if let Some(handle) = self.running.remove(&id) {
            handle.abort();
        }
        if let Some(handle) = self.retry_timers.remove(&id) {
            handle.abort();
        }
        self.pending.retain(|p| *p != id);
        metrics::counter!(telemetry::QUEUE_TASKS_TOTAL, "status" => "cancelled").increment(1);
        true
    }

    fn remove_with_status(&mut self, status: TaskStatus) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| task.status != status);
        before - self.tasks.len()
    }
}

enum Dispatch {
    Stop,
    Idle,
    RateLimited(Instant),
}

struct Shared {
    generator: Arc<dyn Generator>,
    state: Mutex<State>,
    notify: Notify,
    events: broadcast::Sender<QueueEvent>,
    idle: watch::Sender<bool>,
}

impl Shared {
    fn emit(&self, event: QueueEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    /// Publish the idle flag. Called with the state lock held so flips are
    /// observed in order.
    fn settle(&self, state: &State) {
        let idle = state.is_idle();
        let flipped = self.idle.send_if_modified(|current| {
            if *current == idle {
                return false;
            }
            *current = idle;
            true
        });
        if flipped && idle {
            debug!("queue drained");
            self.emit(QueueEvent::QueueEmpty);
        }
    }

    /// Start as many pending tasks as the limits allow.
    fn dispatch(self: &Arc<Self>) -> Dispatch {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        match state.run_state {
            QueueState::Stopped => return Dispatch::Stop,
            QueueState::Created | QueueState::Paused => return Dispatch::Idle,
            QueueState::Running => {}
        }

        loop {
            if state.running.len() >= state.config.max_concurrent || state.pending.is_empty() {
                return Dispatch::Idle;
            }

            let now = Instant::now();
            while let Some(&oldest) = state.dispatch_times.front()
                && now.duration_since(oldest) >= RATE_LIMIT_WINDOW
            {
                state.dispatch_times.pop_front();
            }
            let limit = state.config.rate_limit_per_minute;
            if let Some(limit) = limit
                && state.dispatch_times.len() >= limit as usize
                && let Some(&oldest) = state.dispatch_times.front()
            {
                debug!(limit, "rate limit reached, holding dispatch");
                return Dispatch::RateLimited(oldest + RATE_LIMIT_WINDOW);
            }

            let Some(id) = state.pending.pop_front() else {
                return Dispatch::Idle;
            };
            let Some(task) = state.tasks.get_mut(&id) else {
                continue;
            };
            if task.status != TaskStatus::Pending {
                continue;
            }

            task.status = TaskStatus::Processing;
            task.attempts += 1;
            task.progress = 10;
            task.started_at.get_or_insert_with(SystemTime::now);
            let attempt = task.attempts;
            let descriptor = task.descriptor.clone();
            // the window only records dispatches made under a limit
            if limit.is_some() {
                state.dispatch_times.push_back(now);
            }

            debug!(task = %id, attempt, "dispatching task");
            let shared = Arc::clone(self);
            let worker = tokio::spawn(async move {
                let outcome = run_generator(shared.generator.as_ref(), &descriptor).await;
                shared.finish(id, outcome);
            });
            state.running.insert(id, worker.abort_handle());
            self.emit(QueueEvent::TaskStarted { id, attempt });
        }
    }

    /// Record a worker's outcome.
    fn finish(self: &Arc<Self>, id: TaskId, outcome: Result<GenerateResult>) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.running.remove(&id);

        let Some(task) = state.tasks.get_mut(&id) else {
            // cleared while running
            self.settle(state);
            return;
        };
        if task.status != TaskStatus::Processing {
            debug!(task = %id, status = %task.status, "discarding outcome of inactive task");
            self.settle(state);
            return;
        }

        match outcome {
            Ok(result) => {
                task.status = TaskStatus::Completed;
                task.progress = 100;
                task.result = Some(result);
                task.error = None;
                task.completed_at = Some(SystemTime::now());
                record_terminal(task);
                debug!(task = %id, attempts = task.attempts, "task completed");
                self.emit(QueueEvent::TaskCompleted { id });
            }
            Err(e) if e.is_retryable() && task.attempts <= state.config.retry_attempts => {
                let delay = state
                    .config
                    .backoff(task.attempts)
                    .max(e.retry_after().unwrap_or_default());
                task.status = TaskStatus::Pending;
                task.progress = 0;
                task.error = Some(TaskError::from(&e));
                let attempt = task.attempts + 1;
                warn!(
                    task = %id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "task failed, retrying"
                );
                metrics::counter!(telemetry::QUEUE_RETRIES_TOTAL).increment(1);

                let shared = Arc::clone(self);
                let timer = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    shared.requeue(id);
                });
                state.retry_timers.insert(id, timer.abort_handle());
                self.emit(QueueEvent::TaskRetrying {
                    id,
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            Err(e) => {
                let error = TaskError::from(&e);
                task.status = TaskStatus::Failed;
                task.error = Some(error.clone());
                task.completed_at = Some(SystemTime::now());
                record_terminal(task);
                warn!(task = %id, attempts = task.attempts, error = %e, "task failed");
                self.emit(QueueEvent::TaskFailed { id, error });
            }
        }

        self.settle(state);
        drop(guard);
        self.notify.notify_one();
    }

    /// Backoff elapsed: put the task back at the end of the FIFO.
    fn requeue(&self, id: TaskId) {
        let mut state = self.state.lock();
        if state.retry_timers.remove(&id).is_none() {
            return;
        }
        if state
            .tasks
            .get(&id)
            .is_some_and(|t| t.status == TaskStatus::Pending)
        {
            state.pending.push_back(id);
        }
        self.settle(&state);
        drop(state);
        self.notify.notify_one();
    }
}

async fn run_generator(
    generator: &dyn Generator,
    descriptor: &RequestDescriptor,
) -> Result<GenerateResult> {
    match AssertUnwindSafe(generator.generate(descriptor))
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(HuginnError::Internal("generator panicked".to_owned())),
    }
}

fn record_terminal(task: &Task) {
    let status = task.status.as_str();
    metrics::counter!(telemetry::QUEUE_TASKS_TOTAL, "status" => status).increment(1);
    if let Some(ms) = task.elapsed_ms() {
        metrics::histogram!(telemetry::QUEUE_TASK_DURATION_SECONDS, "status" => status)
            .record(ms as f64 / 1000.0);
    }
}

async fn run_dispatcher(shared: Arc<Shared>) {
    loop {
        match shared.dispatch() {
            Dispatch::Stop => break,
            Dispatch::Idle => shared.notify.notified().await,
            Dispatch::RateLimited(deadline) => {
                tokio::select! {
                    _ = shared.notify.notified() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
        }
    }
    debug!("dispatcher stopped");
}

/// Bounded-concurrency queue over a [`Generator`].
///
/// All methods except [`start`](Self::start) are usable from any thread;
/// `start` needs a tokio runtime.
pub struct TaskQueue {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Fails with [`HuginnError::Configuration`] on an invalid config.
    pub fn new(generator: Arc<dyn Generator>, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (idle, _) = watch::channel(true);
        Ok(Self {
            shared: Arc::new(Shared {
                generator,
                state: Mutex::new(State {
                    config,
                    run_state: QueueState::Created,
                    tasks: BTreeMap::new(),
                    pending: VecDeque::new(),
                    running: HashMap::new(),
                    retry_timers: HashMap::new(),
                    dispatch_times: VecDeque::new(),
                    next_id: 1,
                }),
                notify: Notify::new(),
                events,
                idle,
            }),
            dispatcher: Mutex::new(None),
        })
    }

    /// Begin dispatching. Resumes a paused queue; no-op once stopped.
    pub fn start(&self) {
        {
            let mut state = self.shared.state.lock();
            match state.run_state {
                QueueState::Stopped => {
                    warn!("start called on a stopped queue");
                    return;
                }
                QueueState::Running => return,
                QueueState::Created | QueueState::Paused => state.run_state = QueueState::Running,
            }
        }
        let mut dispatcher = self.dispatcher.lock();
        if dispatcher.is_none() {
            *dispatcher = Some(tokio::spawn(run_dispatcher(Arc::clone(&self.shared))));
            info!("task queue started");
        }
        self.shared.notify.notify_one();
    }

    /// Stop starting new tasks. In-flight tasks run to completion.
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if state.run_state == QueueState::Running {
            state.run_state = QueueState::Paused;
            debug!("task queue paused");
        }
    }

    pub fn resume(&self) {
        let resumed = {
            let mut state = self.shared.state.lock();
            let paused = state.run_state == QueueState::Paused;
            if paused {
                state.run_state = QueueState::Running;
            }
            paused
        };
        if resumed {
            debug!("task queue resumed");
            self.shared.notify.notify_one();
        }
    }

    pub fn state(&self) -> QueueState {
        self.shared.state.lock().run_state
    }

    /// Add one task at the back of the FIFO.
    pub fn enqueue(&self, descriptor: RequestDescriptor) -> TaskId {
        self.enqueue_batch(std::iter::once(descriptor))
            .pop()
            .unwrap_or(TaskId(0))
    }

    /// Add tasks in iteration order. Ids are returned in the same order.
    pub fn enqueue_batch(
        &self,
        descriptors: impl IntoIterator<Item = RequestDescriptor>,
    ) -> Vec<TaskId> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let stopped = state.run_state == QueueState::Stopped;
        let mut ids = Vec::new();
        for descriptor in descriptors {
            let id = TaskId(state.next_id);
            state.next_id += 1;
            let mut task = Task::new(id, descriptor);
            if stopped {
                task.status = TaskStatus::Cancelled;
                task.completed_at = Some(task.created_at);
            } else {
                state.pending.push_back(id);
            }
            state.tasks.insert(id, task);
            ids.push(id);
        }
        if stopped && !ids.is_empty() {
            warn!(count = ids.len(), "queue is stopped, tasks recorded as cancelled");
        }
        self.shared.settle(state);
        drop(guard);
        self.shared.notify.notify_one();
        ids
    }

    /// Cancel one task. Returns whether its status changed.
    pub fn cancel(&self, id: TaskId) -> bool {
        let cancelled = {
            let mut state = self.shared.state.lock();
            let cancelled = state.cancel(id);
            if cancelled {
                self.shared.emit(QueueEvent::TaskCancelled { id });
                self.shared.settle(&state);
            }
            cancelled
        };
        if cancelled {
            debug!(task = %id, "task cancelled");
            self.shared.notify.notify_one();
        }
        cancelled
    }

    /// Cancel every pending or processing task. Returns how many changed;
    /// a second call returns 0.
    pub fn cancel_all(&self) -> usize {
        let count = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            let live: Vec<TaskId> = state
                .tasks
                .values()
                .filter(|t| !t.status.is_terminal())
                .map(|t| t.id)
                .collect();
            let mut count = 0;
            for id in live {
                if state.cancel(id) {
                    self.shared.emit(QueueEvent::TaskCancelled { id });
                    count += 1;
                }
            }
            self.shared.settle(state);
            count
        };
        if count > 0 {
            debug!(count, "cancelled all live tasks");
            self.shared.notify.notify_one();
        }
        count
    }

    pub fn get_task(&self, id: TaskId) -> Option<Task> {
        self.shared.state.lock().tasks.get(&id).cloned()
    }

    /// Every task, in submission order.
    pub fn get_tasks(&self) -> Vec<Task> {
        self.shared.state.lock().tasks.values().cloned().collect()
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Task> {
        self.shared
            .state
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_tasks(self.shared.state.lock().tasks.values())
    }

    /// Drop completed task records. Returns how many were removed.
    pub fn clear_completed(&self) -> usize {
        self.shared
            .state
            .lock()
            .remove_with_status(TaskStatus::Completed)
    }

    pub fn clear_failed(&self) -> usize {
        self.shared
            .state
            .lock()
            .remove_with_status(TaskStatus::Failed)
    }

    pub fn clear_cancelled(&self) -> usize {
        self.shared
            .state
            .lock()
            .remove_with_status(TaskStatus::Cancelled)
    }

    pub fn config(&self) -> QueueConfig {
        self.shared.state.lock().config.clone()
    }

    /// Replace the limits. Applies to the next dispatch; running tasks are
    /// not interrupted.
    pub fn set_config(&self, config: QueueConfig) -> Result<()> {
        config.validate()?;
        self.shared.state.lock().config = config;
        self.shared.notify.notify_one();
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.shared.events.subscribe()
    }

    /// Events as a stream, silently skipping any the subscriber lagged on.
    pub fn events(&self) -> impl Stream<Item = QueueEvent> + Send + 'static {
        BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok())
    }

    /// Whether nothing is pending, processing or waiting on a retry.
    pub fn is_idle(&self) -> bool {
        self.shared.state.lock().is_idle()
    }

    /// Resolve once the queue is idle. Never resolves while a paused queue
    /// still holds pending tasks.
    pub async fn wait_idle(&self) {
        let mut idle = self.shared.idle.subscribe();
        // the sender lives as long as `self`
        let _ = idle.wait_for(|idle| *idle).await;
    }

    /// Stop the dispatcher and cancel every live task. Returns how many
    /// were cancelled.
    pub fn shutdown(&self) -> usize {
        self.shared.state.lock().run_state = QueueState::Stopped;
        let cancelled = self.cancel_all();
        self.shared.notify.notify_one();
        if let Some(handle) = self.dispatcher.lock().take() {
            handle.abort();
        }
        info!(cancelled, "task queue shut down");
        cancelled
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
        let state = self.shared.state.lock();
        for handle in state.running.values().chain(state.retry_timers.values()) {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("TaskQueue")
            .field("state", &state.run_state)
            .field("tasks", &state.tasks.len())
            .field("pending", &state.pending.len())
            .field("running", &state.running.len())
            .field("config", &state.config)
            .finish()
    }
}
