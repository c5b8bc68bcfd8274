//! Integration tests for [`TaskQueue`] scheduling, retries and cancellation.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_test::{assert_pending, assert_ready};

use huginn::queue::{QueueConfig, QueueEvent, QueueState, TaskQueue};
use huginn::{
    ErrorKind, GenerateResult, Generator, HuginnError, RequestDescriptor, Result, TaskKind,
    TaskStatus,
};

fn ok_result(text: &str) -> GenerateResult {
    GenerateResult {
        text: text.to_owned(),
        provider_id: "mock".into(),
        model_id: "mock-model".into(),
        translation: None,
        context_used: false,
        evaluation: None,
        from_cache: false,
        from_whitelist: false,
        used_fallback: false,
        latency_ms: 1,
        estimated_cost: 0.0,
        usage: None,
        degraded: Vec::new(),
    }
}

fn request(input: &str) -> RequestDescriptor {
    RequestDescriptor::new(input, TaskKind::Score)
}

/// Blocks every call until a permit is released; tracks peak concurrency.
struct Gated {
    gate: Semaphore,
    active: AtomicUsize,
    peak: AtomicUsize,
    entered: AtomicUsize,
}

impl Gated {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            gate: Semaphore::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            entered: AtomicUsize::new(0),
        })
    }

    fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    async fn wait_entered(&self, n: usize) {
        while self.entered.load(Ordering::SeqCst) < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Generator for Gated {
    async fn generate(&self, request: &RequestDescriptor) -> Result<GenerateResult> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| HuginnError::Cancelled)?;
        permit.forget();
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(ok_result(&request.input))
    }
}

/// Replies from a script, one entry per call; `Ok` once the script runs out.
struct Scripted {
    calls: AtomicU32,
    script: Mutex<VecDeque<HuginnError>>,
    order: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(script: impl IntoIterator<Item = HuginnError>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            script: Mutex::new(script.into_iter().collect()),
            order: Mutex::new(Vec::new()),
        })
    }

    fn ok() -> Arc<Self> {
        Self::new(Vec::new())
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for Scripted {
    async fn generate(&self, request: &RequestDescriptor) -> Result<GenerateResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.order.lock().push(request.input.clone());
        match self.script.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(ok_result(&request.input)),
        }
    }
}

fn transient() -> HuginnError {
    HuginnError::Http("connection reset".into())
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn never_exceeds_max_concurrent() {
    let generator = Gated::new();
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new().max_concurrent(2).unlimited_rate(),
    )
    .unwrap();
    let ids = queue.enqueue_batch((0..10).map(|i| request(&format!("item {i}"))));
    queue.start();

    generator.wait_entered(2).await;
    tokio::task::yield_now().await;
    let stats = queue.stats();
    assert_eq!(stats.processing, 2);
    assert_eq!(stats.pending, 8);

    generator.release(10);
    queue.wait_idle().await;

    assert_eq!(generator.peak.load(Ordering::SeqCst), 2);
    let stats = queue.stats();
    assert_eq!(stats.completed, 10);
    assert_eq!(stats.success_rate, 1.0);
    for id in ids {
        assert_eq!(queue.get_task(id).unwrap().status, TaskStatus::Completed);
    }
}

#[tokio::test]
async fn tasks_start_in_submission_order() {
    let generator = Scripted::ok();
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new().max_concurrent(1).unlimited_rate(),
    )
    .unwrap();
    queue.enqueue_batch(["first", "second", "third"].map(request));
    queue.start();
    queue.wait_idle().await;

    assert_eq!(*generator.order.lock(), ["first", "second", "third"]);
    let inputs: Vec<_> = queue
        .get_tasks()
        .into_iter()
        .map(|t| t.descriptor.input)
        .collect();
    assert_eq!(inputs, ["first", "second", "third"]);
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_then_succeeds() {
    let generator = Scripted::new([transient()]);
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new()
            .retry_attempts(2)
            .retry_delay(Duration::from_millis(500))
            .unlimited_rate(),
    )
    .unwrap();
    queue.start();
    let id = queue.enqueue(request("flaky"));
    queue.wait_idle().await;

    let task = queue.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.attempts, 2);
    assert!(task.error.is_none());
    assert_eq!(generator.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn retries_stop_after_configured_attempts() {
    let generator = Scripted::new((0..10).map(|_| transient()));
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new()
            .retry_attempts(3)
            .retry_delay(Duration::from_millis(100))
            .unlimited_rate(),
    )
    .unwrap();
    queue.start();
    let id = queue.enqueue(request("down"));
    queue.wait_idle().await;

    let task = queue.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 4);
    assert_eq!(generator.calls(), 4);
    assert_eq!(task.error.unwrap().kind, ErrorKind::TransientProvider);
}

#[tokio::test(start_paused = true)]
async fn validation_errors_are_not_retried() {
    let generator = Scripted::new([HuginnError::InvalidInput("bad".into())]);
    let queue = TaskQueue::new(generator.clone(), QueueConfig::new().retry_attempts(5)).unwrap();
    queue.start();
    let id = queue.enqueue(request("bad"));
    queue.wait_idle().await;

    let task = queue.get_task(id).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.attempts, 1);
    assert_eq!(task.error.unwrap().kind, ErrorKind::Validation);
    assert_eq!(generator.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_and_honours_retry_after() {
    let generator = Scripted::new([
        transient(),
        HuginnError::RateLimited {
            retry_after: Some(Duration::from_secs(10)),
        },
    ]);
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new()
            .retry_attempts(2)
            .retry_delay(Duration::from_secs(1))
            .unlimited_rate(),
    )
    .unwrap();
    let mut events = queue.subscribe();
    queue.start();
    let id = queue.enqueue(request("slow"));
    queue.wait_idle().await;

    let mut delays = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let QueueEvent::TaskRetrying { attempt, delay_ms, .. } = event {
            delays.push((attempt, delay_ms));
        }
    }
    // 1s backoff, then max(2s backoff, 10s retry-after)
    assert_eq!(delays, [(2, 1_000), (3, 10_000)]);
    assert_eq!(queue.get_task(id).unwrap().status, TaskStatus::Completed);
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn rate_limit_holds_dispatch_for_the_window() {
    let generator = Scripted::ok();
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new().max_concurrent(5).rate_limit_per_minute(2),
    )
    .unwrap();
    let started = tokio::time::Instant::now();
    let ids = queue.enqueue_batch(["a", "b", "c"].map(request));
    queue.start();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(generator.calls(), 2);
    assert_eq!(queue.get_task(ids[2]).unwrap().status, TaskStatus::Pending);

    queue.wait_idle().await;
    assert_eq!(generator.calls(), 3);
    assert!(started.elapsed() >= Duration::from_secs(60));
}

// ============================================================================
// Cancellation and lifecycle
// ============================================================================

#[tokio::test]
async fn cancel_all_is_idempotent() {
    let generator = Gated::new();
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new().max_concurrent(1).unlimited_rate(),
    )
    .unwrap();
    let ids = queue.enqueue_batch(["a", "b", "c"].map(request));
    queue.start();
    generator.wait_entered(1).await;

    assert_eq!(queue.cancel_all(), 3);
    assert_eq!(queue.cancel_all(), 0);
    for id in &ids {
        assert_eq!(queue.get_task(*id).unwrap().status, TaskStatus::Cancelled);
    }
    assert!(queue.is_idle());

    // a late outcome from the aborted worker cannot revive the task
    generator.release(3);
    tokio::task::yield_now().await;
    assert_eq!(queue.stats().cancelled, 3);
    assert_eq!(queue.stats().completed, 0);
}

#[tokio::test]
async fn cancelling_a_finished_task_is_a_no_op() {
    let generator = Scripted::ok();
    let queue = TaskQueue::new(generator, QueueConfig::default()).unwrap();
    queue.start();
    let id = queue.enqueue(request("done"));
    queue.wait_idle().await;

    assert!(!queue.cancel(id));
    assert_eq!(queue.get_task(id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn cancelling_during_backoff_stops_the_retry() {
    let generator = Scripted::new((0..5).map(|_| transient()));
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new()
            .retry_attempts(3)
            .retry_delay(Duration::from_secs(30))
            .unlimited_rate(),
    )
    .unwrap();
    queue.start();
    let id = queue.enqueue(request("down"));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(generator.calls(), 1);
    assert_eq!(queue.get_task(id).unwrap().status, TaskStatus::Pending);
    assert!(!queue.is_idle());

    assert!(queue.cancel(id));
    assert!(queue.is_idle());
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(generator.calls(), 1);
}

#[tokio::test]
async fn paused_queue_holds_pending_work() {
    let generator = Scripted::ok();
    let queue = TaskQueue::new(generator.clone(), QueueConfig::default()).unwrap();
    queue.start();
    queue.pause();
    assert_eq!(queue.state(), QueueState::Paused);

    let id = queue.enqueue(request("held"));
    let mut idle = tokio_test::task::spawn(queue.wait_idle());
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    assert_pending!(idle.poll());
    assert_eq!(generator.calls(), 0);

    queue.resume();
    assert_eq!(queue.state(), QueueState::Running);
    while !queue.is_idle() {
        tokio::task::yield_now().await;
    }
    assert_ready!(idle.poll());
    assert_eq!(queue.get_task(id).unwrap().status, TaskStatus::Completed);
}

#[tokio::test]
async fn shutdown_cancels_and_refuses_new_work() {
    let generator = Gated::new();
    let queue = TaskQueue::new(generator.clone(), QueueConfig::default()).unwrap();
    queue.enqueue_batch(["a", "b"].map(request));
    queue.start();
    generator.wait_entered(2).await;

    assert_eq!(queue.shutdown(), 2);
    assert_eq!(queue.state(), QueueState::Stopped);
    let late = queue.enqueue(request("late"));
    assert_eq!(queue.get_task(late).unwrap().status, TaskStatus::Cancelled);
    queue.start();
    assert_eq!(queue.state(), QueueState::Stopped);
    assert_eq!(queue.stats().cancelled, 3);
}

#[tokio::test]
async fn set_config_rejects_zero_concurrency() {
    let queue = TaskQueue::new(Scripted::ok(), QueueConfig::default()).unwrap();
    let err = queue
        .set_config(QueueConfig::new().max_concurrent(0))
        .unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)));
    assert_eq!(queue.config().max_concurrent, 3);
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

async fn wait_completed(queue: &TaskQueue, n: usize) {
    while queue.stats().completed < n {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn lowering_concurrency_applies_to_later_dispatches_only() {
    let generator = Gated::new();
    let queue = TaskQueue::new(
        generator.clone(),
        QueueConfig::new().max_concurrent(3).unlimited_rate(),
    )
    .unwrap();
    let ids = queue.enqueue_batch((0..5).map(|i| request(&format!("item {i}"))));
    queue.start();
    generator.wait_entered(3).await;

    queue
        .set_config(QueueConfig::new().max_concurrent(1).unlimited_rate())
        .unwrap();
    settle().await;
    // the three in flight keep running
    let stats = queue.stats();
    assert_eq!(stats.processing, 3);
    assert_eq!(stats.cancelled, 0);

    // two finish; still at or above the new cap, so nothing starts
    generator.release(1);
    wait_completed(&queue, 1).await;
    settle().await;
    assert_eq!(generator.entered.load(Ordering::SeqCst), 3);
    generator.release(1);
    wait_completed(&queue, 2).await;
    settle().await;
    assert_eq!(generator.entered.load(Ordering::SeqCst), 3);
    assert_eq!(queue.stats().processing, 1);

    // below the cap again: exactly one more starts
    generator.release(1);
    wait_completed(&queue, 3).await;
    generator.wait_entered(4).await;
    settle().await;
    assert_eq!(generator.entered.load(Ordering::SeqCst), 4);
    assert_eq!(queue.stats().processing, 1);

    generator.release(2);
    queue.wait_idle().await;
    let stats = queue.stats();
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.cancelled, 0);
    for id in ids {
        assert_eq!(queue.get_task(id).unwrap().status, TaskStatus::Completed);
    }
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn lifecycle_events_are_broadcast() {
    let generator = Scripted::new([HuginnError::AuthenticationFailed]);
    let queue = TaskQueue::new(
        generator,
        QueueConfig::new().max_concurrent(1).unlimited_rate(),
    )
    .unwrap();
    let mut events = queue.subscribe();
    let ids = queue.enqueue_batch(["denied", "fine"].map(request));
    queue.start();
    queue.wait_idle().await;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        [
            QueueEvent::TaskStarted {
                id: ids[0],
                attempt: 1
            },
            QueueEvent::TaskFailed {
                id: ids[0],
                error: huginn::queue::TaskError {
                    message: "authentication failed".into(),
                    kind: ErrorKind::Provider,
                },
            },
            QueueEvent::TaskStarted {
                id: ids[1],
                attempt: 1
            },
            QueueEvent::TaskCompleted { id: ids[1] },
            QueueEvent::QueueEmpty,
        ]
    );
}

#[tokio::test]
async fn event_stream_delivers_completion() {
    use tokio_stream::StreamExt;

    let queue = TaskQueue::new(Scripted::ok(), QueueConfig::default()).unwrap();
    let stream = queue.events();
    tokio::pin!(stream);
    let id = queue.enqueue(request("streamed"));
    queue.start();

    let mut completed = None;
    while let Some(event) = stream.next().await {
        match event {
            QueueEvent::TaskCompleted { id } => completed = Some(id),
            QueueEvent::QueueEmpty => break,
            _ => {}
        }
    }
    assert_eq!(completed, Some(id));
}
