//! Priority event queue with a pool of worker loops
//!
//! Four FIFO lanes (critical, high, medium, low) feed `N` workers. Each
//! worker always drains the highest non-empty lane first, dispatches the
//! event to the first capable processor and retries failed attempts with a
//! capped exponential backoff.

use crate::event::history::{EventHistory, RecentEvent};
use crate::event::stats::{ProcessingStats, ProcessorStats, QueueSizes, QueueStats};
use crate::event::{Event, EventProcessor, Priority, DEFAULT_MAX_RETRIES};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("{priority} priority queue is full (capacity {capacity})")]
    Full { priority: Priority, capacity: usize },
}

/// Delay between a failed attempt and its re-enqueue
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay unit, multiplied by `2^retry_count`
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Configuration for the event queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Workers spawned by the binary
    pub worker_count: usize,
    /// Retry budget given to ingested events
    pub max_retries: u32,
    pub history_capacity: usize,
    pub history_ttl: Duration,
    /// Per-lane bound; None means unbounded
    pub lane_capacity: Option<usize>,
    /// Deadline for a single `process` call
    pub dispatch_timeout: Duration,
    /// Sleep when every lane is empty
    pub idle_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            worker_count: 5,
            max_retries: DEFAULT_MAX_RETRIES,
            history_capacity: 1000,
            history_ttl: Duration::from_secs(3600),
            lane_capacity: None,
            dispatch_timeout: Duration::from_secs(300),
            idle_interval: Duration::from_millis(100),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of handing one event to the processors
#[derive(Debug)]
enum DispatchOutcome {
    Processed,
    /// Handled or unexpected failure, retried
    Failed(Option<String>),
    /// Nothing claims the event type, never retried
    NoProcessor,
}

#[derive(Debug, Default)]
struct Lanes {
    critical: Mutex<VecDeque<Event>>,
    high: Mutex<VecDeque<Event>>,
    medium: Mutex<VecDeque<Event>>,
    low: Mutex<VecDeque<Event>>,
}

impl Lanes {
    fn get(&self, priority: Priority) -> &Mutex<VecDeque<Event>> {
        match priority {
            Priority::Critical => &self.critical,
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }
}

#[derive(Default)]
struct WorkerSet {
    token: Option<CancellationToken>,
    handles: Vec<JoinHandle<()>>,
}

struct QueueInner {
    config: QueueConfig,
    lanes: Lanes,
    processors: RwLock<Vec<Arc<dyn EventProcessor>>>,
    stats: RwLock<ProcessingStats>,
    history: Mutex<EventHistory>,
    running: AtomicBool,
    worker_count: AtomicUsize,
    /// Serializes start/stop
    workers: Mutex<WorkerSet>,
}

/// Shared handle to the priority event queue
///
/// Cloning is cheap; every clone drives the same lanes and workers.
#[derive(Clone)]
pub struct EventQueue {
    inner: Arc<QueueInner>,
}

impl EventQueue {
    pub fn new(config: QueueConfig) -> Self {
        let history = EventHistory::new(config.history_capacity, config.history_ttl);
        Self {
            inner: Arc::new(QueueInner {
                config,
                lanes: Lanes::default(),
                processors: RwLock::new(Vec::new()),
                stats: RwLock::new(ProcessingStats::default()),
                history: Mutex::new(history),
                running: AtomicBool::new(false),
                worker_count: AtomicUsize::new(0),
                workers: Mutex::new(WorkerSet::default()),
            }),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.inner.config
    }

    /// Register a processor
    ///
    /// Processors are tried in registration order, so the first one
    /// registered for a type wins.
    pub async fn add_processor(&self, processor: Arc<dyn EventProcessor>) {
        let mut processors = self.inner.processors.write().await;
        let event_type = processor.event_type();
        if processors.iter().any(|p| p.event_type() == event_type) {
            warn!(
                processor_type = %event_type,
                "Processor already registered for this type, the earlier one wins"
            );
        }
        processors.push(processor);

        info!(
            processor_type = %event_type,
            total_processors = processors.len(),
            "Added event processor"
        );
    }

    /// Push an event onto the lane matching its priority
    pub async fn enqueue(&self, event: Event) -> QueueResult<()> {
        self.inner.enqueue(event).await
    }

    /// Fails with `QueueError::Full` when the lane for `priority` is at capacity.
    ///
    /// Lets producers reject work up front; `enqueue` still re-checks.
    pub async fn check_capacity(&self, priority: Priority) -> QueueResult<()> {
        let Some(capacity) = self.inner.config.lane_capacity else {
            return Ok(());
        };
        if self.inner.lanes.get(priority).lock().await.len() >= capacity {
            return Err(QueueError::Full { priority, capacity });
        }
        Ok(())
    }

    /// Spawn `count` worker loops. No-op when already running or when
    /// `count` is zero.
    pub async fn start_workers(&self, count: usize) {
        if count == 0 {
            warn!("Refusing to start zero event workers");
            return;
        }

        let mut workers = self.inner.workers.lock().await;
        if self.inner.running.load(Ordering::SeqCst) {
            debug!("Event workers already running");
            return;
        }

        info!(worker_count = count, "Starting event processing workers");

        let token = CancellationToken::new();
        for i in 0..count {
            let name = format!("worker-{}", i);
            let span = info_span!("event_worker", worker = %name);
            let inner = self.inner.clone();
            let handle = tokio::spawn(inner.run_worker(name, token.clone()).instrument(span));
            workers.handles.push(handle);
        }
        workers.token = Some(token);

        self.inner.worker_count.store(count, Ordering::SeqCst);
        self.inner.running.store(true, Ordering::SeqCst);
    }

    /// Signal every worker and wait for them to exit. No-op when stopped.
    ///
    /// A worker inside a `process` call finishes that call first.
    pub async fn stop_workers(&self) {
        let mut workers = self.inner.workers.lock().await;
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("Event workers already stopped");
            return;
        }

        info!("Stopping event processing workers");

        if let Some(token) = workers.token.take() {
            token.cancel();
        }
        for handle in workers.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Event worker terminated abnormally");
            }
        }

        self.inner.worker_count.store(0, Ordering::SeqCst);
        info!("Event processing workers stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.inner.worker_count.load(Ordering::SeqCst)
    }

    /// Events waiting across all lanes
    pub async fn queue_size(&self) -> usize {
        self.queue_sizes().await.total()
    }

    pub async fn get_stats(&self) -> QueueStats {
        let queue_sizes = self.queue_sizes().await;

        let processor_stats = self
            .inner
            .processors
            .read()
            .await
            .iter()
            .map(|p| {
                (
                    p.event_type().as_str().to_string(),
                    ProcessorStats {
                        processed: p.counters().processed(),
                        failed: p.counters().failed(),
                    },
                )
            })
            .collect();

        let stats = self.inner.stats.read().await.clone();

        QueueStats {
            total_queue_size: queue_sizes.total(),
            queue_sizes,
            worker_count: self.worker_count(),
            running: self.is_running(),
            stats,
            processor_stats,
        }
    }

    /// Up to `limit` history entries, most recently touched first
    pub async fn get_recent_events(&self, limit: usize) -> Vec<RecentEvent> {
        self.inner.history.lock().await.recent(limit)
    }

    async fn queue_sizes(&self) -> QueueSizes {
        let mut sizes = QueueSizes::default();
        for priority in Priority::DISPATCH_ORDER {
            let len = self.inner.lanes.get(priority).lock().await.len();
            sizes.set(priority, len);
        }
        sizes
    }
}

impl QueueInner {
    async fn enqueue(&self, event: Event) -> QueueResult<()> {
        let priority = event.priority;
        let event_type = event.event_type;
        let event_id = event.id.clone();

        let queue_size = {
            let mut lane = self.lanes.get(priority).lock().await;
            if let Some(capacity) = self.config.lane_capacity {
                if lane.len() >= capacity {
                    warn!(
                        event_id = %event_id,
                        priority = %priority,
                        capacity,
                        "Priority queue full, rejecting event"
                    );
                    return Err(QueueError::Full { priority, capacity });
                }
            }
            self.history.lock().await.record_enqueued(&event);
            lane.push_back(event);
            lane.len()
        };

        self.stats.write().await.record_enqueued(event_type.as_str());

        info!(
            event_id = %event_id,
            event_type = %event_type,
            priority = %priority,
            queue_size,
            "Event queued"
        );

        Ok(())
    }

    /// Pop from the highest non-empty lane
    async fn next_event(&self) -> Option<Event> {
        for priority in Priority::DISPATCH_ORDER {
            if let Some(event) = self.lanes.get(priority).lock().await.pop_front() {
                return Some(event);
            }
        }
        None
    }

    async fn run_worker(self: Arc<Self>, name: String, token: CancellationToken) {
        info!(worker = %name, "Event worker started");

        while !token.is_cancelled() {
            let Some(event) = self.next_event().await else {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.config.idle_interval) => {}
                }
                continue;
            };

            self.handle_event(event, &token).await;
        }

        info!(worker = %name, "Event worker stopped");
    }

    async fn handle_event(&self, mut event: Event, token: &CancellationToken) {
        debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            priority = %event.priority,
            retry_count = event.retry_count,
            "Processing event"
        );

        let started = Instant::now();
        let outcome = self.dispatch(&event).await;
        let elapsed = started.elapsed();

        match outcome {
            DispatchOutcome::Processed => {
                event.mark_processed();
                self.finish_attempt(&event, true, elapsed).await;
                info!(
                    event_id = %event.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Event processed successfully"
                );
            }
            DispatchOutcome::NoProcessor => {
                warn!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "No processor found for event, dropping"
                );
                event.mark_failed(Some(format!(
                    "no processor registered for {}",
                    event.event_type
                )));
                self.finish_attempt(&event, false, elapsed).await;
            }
            DispatchOutcome::Failed(reason) => {
                event.mark_failed(reason);
                self.finish_attempt(&event, false, elapsed).await;

                if !event.can_retry() {
                    warn!(
                        event_id = %event.id,
                        retry_count = event.retry_count,
                        error = event.error_message.as_deref().unwrap_or("processor reported failure"),
                        "Event failed permanently after exhausting retries"
                    );
                    return;
                }

                event.retry_count += 1;
                let delay = self.config.retry.delay_for(event.retry_count);
                info!(
                    event_id = %event.id,
                    retry_count = event.retry_count,
                    max_retries = event.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying event"
                );

                tokio::select! {
                    _ = token.cancelled() => {
                        debug!(event_id = %event.id, "Backoff interrupted by shutdown, re-queueing now");
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                let event_id = event.id.clone();
                if let Err(e) = self.enqueue(event).await {
                    error!(event_id = %event_id, error = %e, "Failed to re-enqueue event, dropping");
                }
            }
        }
    }

    async fn dispatch(&self, event: &Event) -> DispatchOutcome {
        let processors = self.processors.read().await.clone();

        let mut selected = None;
        for processor in processors {
            if processor.can_process(event).await {
                selected = Some(processor);
                break;
            }
        }
        let Some(processor) = selected else {
            return DispatchOutcome::NoProcessor;
        };

        // Own task so a panicking processor cannot take the worker down
        let task_processor = processor.clone();
        let task_event = event.clone();
        let handle = tokio::spawn(async move { task_processor.process(&task_event).await });
        let abort = handle.abort_handle();

        let outcome = match tokio::time::timeout(self.config.dispatch_timeout, handle).await {
            Ok(Ok(Ok(true))) => DispatchOutcome::Processed,
            Ok(Ok(Ok(false))) => DispatchOutcome::Failed(None),
            Ok(Ok(Err(e))) => {
                error!(
                    event_id = %event.id,
                    processor_type = %processor.event_type(),
                    error = %e,
                    "Processor error"
                );
                DispatchOutcome::Failed(Some(e.to_string()))
            }
            Ok(Err(e)) => {
                error!(
                    event_id = %event.id,
                    processor_type = %processor.event_type(),
                    error = %e,
                    "Processor task panicked"
                );
                DispatchOutcome::Failed(Some(format!("processor task failed: {}", e)))
            }
            Err(_) => {
                abort.abort();
                warn!(
                    event_id = %event.id,
                    processor_type = %processor.event_type(),
                    timeout_ms = self.config.dispatch_timeout.as_millis() as u64,
                    "Processor timed out"
                );
                DispatchOutcome::Failed(Some(format!(
                    "processing timed out after {}ms",
                    self.config.dispatch_timeout.as_millis()
                )))
            }
        };

        match outcome {
            DispatchOutcome::Processed => processor.counters().record_processed(),
            _ => processor.counters().record_failed(),
        }

        outcome
    }

    async fn finish_attempt(&self, event: &Event, success: bool, elapsed: Duration) {
        self.stats.write().await.record_attempt(success, elapsed);
        self.history
            .lock()
            .await
            .record_outcome(event, success, elapsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, ProcessorCounters, ProcessorError};
    use async_trait::async_trait;
    use std::future::Future;
    use std::sync::atomic::AtomicU32;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Error,
        Panic,
        Hang,
    }

    struct ScriptedProcessor {
        event_type: EventType,
        behavior: Behavior,
        counters: ProcessorCounters,
        calls: AtomicU32,
        seen: std::sync::Mutex<Vec<String>>,
    }

    impl ScriptedProcessor {
        fn new(event_type: EventType, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                event_type,
                behavior,
                counters: ProcessorCounters::new(),
                calls: AtomicU32::new(0),
                seen: std::sync::Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventProcessor for ScriptedProcessor {
        fn event_type(&self) -> EventType {
            self.event_type
        }

        fn counters(&self) -> &ProcessorCounters {
            &self.counters
        }

        async fn process(&self, event: &Event) -> Result<bool, ProcessorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(event.id.clone());
            match self.behavior {
                Behavior::Succeed => Ok(true),
                Behavior::Fail => Ok(false),
                Behavior::Error => Err(ProcessorError::Other("gitlab unavailable".to_string())),
                Behavior::Panic => panic!("processor bug"),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(true)
                }
            }
        }
    }

    fn test_config() -> QueueConfig {
        QueueConfig {
            idle_interval: Duration::from_millis(5),
            dispatch_timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(10),
            },
            ..QueueConfig::default()
        }
    }

    fn pipeline_event(id: &str, priority: Priority) -> Event {
        Event::new(
            id,
            EventType::Pipeline,
            priority,
            7,
            serde_json::json!({"object_attributes": {"status": "failed", "id": 42}}),
        )
    }

    async fn wait_until<F, Fut>(mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        for _ in 0..500 {
            if condition().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not met in time");
    }

    async fn wait_for_attempts(queue: &EventQueue, attempts: u64) {
        wait_until(|| {
            let queue = queue.clone();
            async move {
                let stats = queue.get_stats().await.stats;
                stats.total_processed + stats.total_failed >= attempts
            }
        })
        .await;
    }

    #[test]
    fn should_double_backoff_delay_per_retry() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn should_cap_backoff_delay() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.delay_for(6), Duration::from_secs(60));
        assert_eq!(policy.delay_for(100), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn should_place_events_in_priority_lanes() {
        // Arrange
        let queue = EventQueue::new(test_config());

        // Act
        queue.enqueue(pipeline_event("a", Priority::High)).await.unwrap();
        queue.enqueue(pipeline_event("b", Priority::High)).await.unwrap();
        queue.enqueue(pipeline_event("c", Priority::Low)).await.unwrap();

        // Assert
        let stats = queue.get_stats().await;
        assert_eq!(stats.queue_sizes.high, 2);
        assert_eq!(stats.queue_sizes.low, 1);
        assert_eq!(stats.total_queue_size, 3);
        assert_eq!(stats.stats.events_by_type.get("pipeline"), Some(&3));
        assert!(!stats.running);
        assert_eq!(queue.get_recent_events(10).await.len(), 3);
    }

    #[tokio::test]
    async fn should_process_successful_event_once() {
        // Arrange
        let queue = EventQueue::new(test_config());
        let processor = ScriptedProcessor::new(EventType::Pipeline, Behavior::Succeed);
        queue.add_processor(processor.clone()).await;
        queue.enqueue(pipeline_event("evt-1", Priority::High)).await.unwrap();

        // Act
        queue.start_workers(2).await;
        wait_for_attempts(&queue, 1).await;
        queue.stop_workers().await;

        // Assert
        let stats = queue.get_stats().await;
        assert_eq!(stats.stats.total_processed, 1);
        assert_eq!(stats.stats.total_failed, 0);
        assert_eq!(stats.total_queue_size, 0);
        assert_eq!(stats.processor_stats["pipeline"].processed, 1);

        let recent = queue.get_recent_events(10).await;
        assert_eq!(recent[0].id, "evt-1");
        assert_eq!(recent[0].success, Some(true));
        assert!(recent[0].processed_at.is_some());
        assert!(recent[0].processing_time.is_some());
    }

    #[tokio::test]
    async fn should_retry_failed_event_up_to_max_retries() {
        // Arrange
        let queue = EventQueue::new(test_config());
        let processor = ScriptedProcessor::new(EventType::Pipeline, Behavior::Fail);
        queue.add_processor(processor.clone()).await;
        queue
            .enqueue(pipeline_event("flaky", Priority::Medium).with_max_retries(2))
            .await
            .unwrap();

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 3).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.stop_workers().await;

        // Assert
        assert_eq!(processor.calls(), 3);
        let stats = queue.get_stats().await;
        assert_eq!(stats.stats.total_failed, 3);
        assert_eq!(stats.stats.total_processed, 0);
        assert_eq!(stats.total_queue_size, 0);
        assert_eq!(stats.processor_stats["pipeline"].failed, 3);

        let recent = queue.get_recent_events(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].success, Some(false));
        assert_eq!(recent[0].retry_count, 2);
    }

    #[tokio::test]
    async fn should_never_retry_event_without_processor() {
        // Arrange
        let queue = EventQueue::new(test_config());
        queue
            .add_processor(ScriptedProcessor::new(EventType::Pipeline, Behavior::Succeed))
            .await;
        let orphan = Event::new(
            "orphan",
            EventType::Deployment,
            Priority::Critical,
            1,
            serde_json::json!({}),
        )
        .with_max_retries(5);
        queue.enqueue(orphan).await.unwrap();

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.stop_workers().await;

        // Assert
        let stats = queue.get_stats().await;
        assert_eq!(stats.stats.total_failed, 1);
        assert_eq!(stats.total_queue_size, 0);

        let recent = queue.get_recent_events(1).await;
        assert_eq!(recent[0].success, Some(false));
        assert_eq!(recent[0].retry_count, 0);
        assert!(recent[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("no processor"));
    }

    #[tokio::test]
    async fn should_dispatch_critical_before_high_with_single_worker() {
        // Arrange
        let queue = EventQueue::new(test_config());
        let processor = ScriptedProcessor::new(EventType::Pipeline, Behavior::Succeed);
        queue.add_processor(processor.clone()).await;
        queue.enqueue(pipeline_event("high", Priority::High)).await.unwrap();
        queue
            .enqueue(pipeline_event("critical", Priority::Critical))
            .await
            .unwrap();

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 2).await;
        queue.stop_workers().await;

        // Assert
        assert_eq!(processor.seen(), vec!["critical", "high"]);
    }

    #[tokio::test]
    async fn should_drain_lanes_in_strict_priority_order() {
        // Arrange
        let queue = EventQueue::new(test_config());
        let processor = ScriptedProcessor::new(EventType::Pipeline, Behavior::Succeed);
        queue.add_processor(processor.clone()).await;
        for (id, priority) in [
            ("low", Priority::Low),
            ("medium", Priority::Medium),
            ("high", Priority::High),
            ("critical", Priority::Critical),
            ("low-2", Priority::Low),
        ] {
            queue.enqueue(pipeline_event(id, priority)).await.unwrap();
        }

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 5).await;
        queue.stop_workers().await;

        // Assert
        assert_eq!(
            processor.seen(),
            vec!["critical", "high", "medium", "low", "low-2"]
        );
    }

    #[tokio::test]
    async fn should_ignore_repeated_start_and_stop() {
        // Arrange
        let queue = EventQueue::new(test_config());

        // Act
        queue.start_workers(3).await;
        queue.start_workers(3).await;

        // Assert
        assert_eq!(queue.worker_count(), 3);
        assert!(queue.is_running());

        queue.stop_workers().await;
        queue.stop_workers().await;
        assert_eq!(queue.worker_count(), 0);
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn should_stay_stopped_when_started_with_zero_workers() {
        // Arrange
        let queue = EventQueue::new(test_config());

        // Act
        queue.start_workers(0).await;

        // Assert
        assert!(!queue.is_running());
        assert_eq!(queue.worker_count(), 0);
        assert!(!queue.get_stats().await.running);

        queue.start_workers(1).await;
        assert!(queue.is_running());
        queue.stop_workers().await;
    }

    #[tokio::test]
    async fn should_requeue_event_when_stop_interrupts_backoff() {
        // Arrange
        let config = QueueConfig {
            retry: RetryPolicy {
                base_delay: Duration::from_secs(10),
                max_delay: Duration::from_secs(60),
            },
            ..test_config()
        };
        let queue = EventQueue::new(config);
        let processor = ScriptedProcessor::new(EventType::Pipeline, Behavior::Fail);
        queue.add_processor(processor.clone()).await;
        queue
            .enqueue(pipeline_event("backing-off", Priority::High).with_max_retries(1))
            .await
            .unwrap();
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 1).await;

        // Act
        let started = Instant::now();
        queue.stop_workers().await;

        // Assert
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(processor.calls(), 1);
        assert_eq!(queue.queue_size().await, 1);
        let stats = queue.get_stats().await;
        assert_eq!(stats.queue_sizes.high, 1);
        assert_eq!(stats.stats.total_failed, 1);

        let recent = queue.get_recent_events(10).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "backing-off");
        assert_eq!(recent[0].retry_count, 1);
    }

    #[tokio::test]
    async fn should_drop_retry_when_its_lane_is_full() {
        // Arrange
        let config = QueueConfig {
            lane_capacity: Some(1),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(200),
                max_delay: Duration::from_secs(1),
            },
            ..test_config()
        };
        let queue = EventQueue::new(config);
        let failing = ScriptedProcessor::new(EventType::Pipeline, Behavior::Fail);
        let succeeding = ScriptedProcessor::new(EventType::Push, Behavior::Succeed);
        queue.add_processor(failing.clone()).await;
        queue.add_processor(succeeding.clone()).await;
        queue
            .enqueue(pipeline_event("retried", Priority::High).with_max_retries(3))
            .await
            .unwrap();
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 1).await;

        // Act: occupy the lane while the single worker sleeps in backoff
        let filler = Event::new(
            "filler",
            EventType::Push,
            Priority::High,
            7,
            serde_json::json!({}),
        );
        queue.enqueue(filler).await.unwrap();
        wait_for_attempts(&queue, 2).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        queue.stop_workers().await;

        // Assert
        assert_eq!(failing.calls(), 1);
        assert_eq!(succeeding.calls(), 1);
        let stats = queue.get_stats().await;
        assert_eq!(stats.stats.total_failed, 1);
        assert_eq!(stats.stats.total_processed, 1);
        assert_eq!(stats.total_queue_size, 0);
        assert_eq!(stats.stats.events_by_type.get("pipeline"), Some(&1));

        let recent = queue.get_recent_events(10).await;
        let retried = recent.iter().find(|e| e.id == "retried").unwrap();
        assert_eq!(retried.success, Some(false));
    }

    #[tokio::test]
    async fn should_restart_after_stop() {
        // Arrange
        let queue = EventQueue::new(test_config());
        let processor = ScriptedProcessor::new(EventType::Pipeline, Behavior::Succeed);
        queue.add_processor(processor.clone()).await;
        queue.start_workers(1).await;
        queue.stop_workers().await;

        // Act
        queue.enqueue(pipeline_event("late", Priority::Low)).await.unwrap();
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 1).await;
        queue.stop_workers().await;

        // Assert
        assert_eq!(processor.calls(), 1);
    }

    #[tokio::test]
    async fn should_record_processor_error_message() {
        // Arrange
        let queue = EventQueue::new(test_config());
        queue
            .add_processor(ScriptedProcessor::new(EventType::Pipeline, Behavior::Error))
            .await;
        queue
            .enqueue(pipeline_event("err", Priority::High).with_max_retries(0))
            .await
            .unwrap();

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 1).await;
        queue.stop_workers().await;

        // Assert
        let recent = queue.get_recent_events(1).await;
        assert_eq!(recent[0].success, Some(false));
        assert_eq!(recent[0].error_message.as_deref(), Some("gitlab unavailable"));
    }

    #[tokio::test]
    async fn should_keep_worker_alive_after_processor_panic() {
        // Arrange
        let queue = EventQueue::new(test_config());
        queue
            .add_processor(ScriptedProcessor::new(EventType::Pipeline, Behavior::Panic))
            .await;
        let healthy = ScriptedProcessor::new(EventType::Push, Behavior::Succeed);
        queue.add_processor(healthy.clone()).await;
        queue
            .enqueue(pipeline_event("boom", Priority::Critical).with_max_retries(0))
            .await
            .unwrap();
        queue
            .enqueue(Event::new(
                "after",
                EventType::Push,
                Priority::Low,
                1,
                serde_json::json!({}),
            ))
            .await
            .unwrap();

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 2).await;
        queue.stop_workers().await;

        // Assert
        let stats = queue.get_stats().await;
        assert_eq!(stats.stats.total_failed, 1);
        assert_eq!(stats.stats.total_processed, 1);
        assert_eq!(healthy.calls(), 1);
    }

    #[tokio::test]
    async fn should_fail_attempt_when_processor_times_out() {
        // Arrange
        let config = QueueConfig {
            dispatch_timeout: Duration::from_millis(20),
            ..test_config()
        };
        let queue = EventQueue::new(config);
        queue
            .add_processor(ScriptedProcessor::new(EventType::Pipeline, Behavior::Hang))
            .await;
        queue
            .enqueue(pipeline_event("slow", Priority::High).with_max_retries(0))
            .await
            .unwrap();

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 1).await;
        queue.stop_workers().await;

        // Assert
        let recent = queue.get_recent_events(1).await;
        assert_eq!(recent[0].success, Some(false));
        assert!(recent[0]
            .error_message
            .as_deref()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn should_reject_when_lane_is_full() {
        // Arrange
        let config = QueueConfig {
            lane_capacity: Some(1),
            ..test_config()
        };
        let queue = EventQueue::new(config);
        queue.enqueue(pipeline_event("first", Priority::High)).await.unwrap();

        // Act
        let same_lane = queue.enqueue(pipeline_event("second", Priority::High)).await;
        let other_lane = queue.enqueue(pipeline_event("third", Priority::Low)).await;

        // Assert
        assert!(matches!(
            same_lane,
            Err(QueueError::Full {
                priority: Priority::High,
                capacity: 1
            })
        ));
        assert!(other_lane.is_ok());
        assert_eq!(queue.queue_size().await, 2);
        assert!(queue.check_capacity(Priority::High).await.is_err());
        assert!(queue.check_capacity(Priority::Critical).await.is_ok());
    }

    #[tokio::test]
    async fn should_use_first_registered_processor_for_a_type() {
        // Arrange
        let queue = EventQueue::new(test_config());
        let first = ScriptedProcessor::new(EventType::Pipeline, Behavior::Succeed);
        let second = ScriptedProcessor::new(EventType::Pipeline, Behavior::Succeed);
        queue.add_processor(first.clone()).await;
        queue.add_processor(second.clone()).await;
        queue.enqueue(pipeline_event("one", Priority::Low)).await.unwrap();

        // Act
        queue.start_workers(1).await;
        wait_for_attempts(&queue, 1).await;
        queue.stop_workers().await;

        // Assert
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }
}
