//! Single-flight request queue with exponential back-off.
//!
//! The OKX API tolerates no concurrent requests from one account, so every
//! upstream call goes through a [`RequestQueue`]. Entries start strictly in
//! the order `enqueue` was called and the next entry never starts until the
//! previous one (retries included) has finished.
//!
//! Retries happen only for HTTP 429 and 5xx. The delay starts at
//! `initial_delay`, doubles after each failed attempt and is capped at
//! `initial_delay * 2^max_retries`. After the budget is spent the last error
//! is handed back untouched.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::config::RequestConfig;
use crate::okx::error::OkxError;

/// Immutable retry configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self { max_retries, initial_delay }
    }

    pub fn from_config(config: &RequestConfig) -> Self {
        Self::new(config.max_retries, Duration::from_millis(config.retry_delay_ms))
    }

    /// Upper bound for any single back-off sleep: `initial_delay * 2^max_retries`
    pub fn max_delay(&self) -> Duration {
        let factor = 2u32.checked_pow(self.max_retries).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }

    pub fn next_delay(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(5000))
    }
}

#[derive(Debug, Default)]
struct QueueStats {
    completed: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
    abandoned: AtomicU64,
}

/// Point-in-time view of the queue counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStatsSnapshot {
    pub pending: usize,
    pub draining: bool,
    pub completed: u64,
    pub failed: u64,
    pub retries: u64,
    pub abandoned: u64,
}

type Job = Box<dyn FnOnce(Arc<QueueInner>) -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Job>,
    draining: bool,
}

struct QueueInner {
    policy: RetryPolicy,
    state: Mutex<QueueState>,
    stats: QueueStats,
}

/// Handle to a FIFO single-flight queue. Clones share the same queue.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("policy", &self.inner.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RequestQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                policy,
                state: Mutex::new(QueueState::default()),
                stats: QueueStats::default(),
            }),
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Append `task` and return a ticket resolving to its final outcome.
    ///
    /// The entry is queued before this returns, so submission order is the
    /// order of `enqueue` calls. `task` is invoked once per attempt. Dropping
    /// the ticket before the entry starts skips it; once started it runs to
    /// completion. Must be called from within a Tokio runtime.
    pub fn enqueue<T, F, Fut>(&self, task: F) -> QueueTicket<T>
    where
        T: Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, OkxError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move |inner: Arc<QueueInner>| {
            async move {
                if tx.is_closed() {
                    inner.stats.abandoned.fetch_add(1, Ordering::Relaxed);
                    debug!("Skipping queued request, caller went away");
                    return;
                }
                let outcome = inner.execute(task).await;
                // Caller may have dropped the ticket mid-flight
                let _ = tx.send(outcome);
            }
            .boxed()
        });

        let start_drain = {
            let mut state = self.inner.state.lock();
            state.entries.push_back(job);
            !std::mem::replace(&mut state.draining, true)
        };
        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }

        QueueTicket { rx }
    }

    pub fn stats(&self) -> QueueStatsSnapshot {
        let (pending, draining) = {
            let state = self.inner.state.lock();
            (state.entries.len(), state.draining)
        };
        let stats = &self.inner.stats;
        QueueStatsSnapshot {
            pending,
            draining,
            completed: stats.completed.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            retries: stats.retries.load(Ordering::Relaxed),
            abandoned: stats.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl QueueInner {
    async fn execute<T, F, Fut>(&self, mut task: F) -> Result<T, OkxError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, OkxError>>,
    {
        let mut attempt: u32 = 0;
        let mut delay = self.policy.initial_delay;

        loop {
            match task().await {
                Ok(value) => {
                    self.stats.completed.fetch_add(1, Ordering::Relaxed);
                    return Ok(value);
                }
                Err(err) => {
                    attempt += 1;
                    if !err.is_retryable() || attempt > self.policy.max_retries {
                        self.stats.failed.fetch_add(1, Ordering::Relaxed);
                        return Err(err);
                    }

                    warn!(
                        "Upstream attempt {} failed ({}), retrying in {:?}",
                        attempt, err, delay
                    );
                    self.stats.retries.fetch_add(1, Ordering::Relaxed);
                    tokio::time::sleep(delay).await;
                    delay = self.policy.next_delay(delay);
                }
            }
        }
    }
}

/// Pops and runs entries one at a time until the queue is empty.
async fn drain(inner: Arc<QueueInner>) {
    loop {
        let job = {
            let mut state = inner.state.lock();
            match state.entries.pop_front() {
                Some(job) => job,
                None => {
                    state.draining = false;
                    return;
                }
            }
        };

        let run = job(Arc::clone(&inner));
        if AssertUnwindSafe(run).catch_unwind().await.is_err() {
            inner.stats.failed.fetch_add(1, Ordering::Relaxed);
            error!("Queued request panicked; continuing with the next entry");
        }
    }
}

/// Pending outcome of an enqueued task.
#[must_use = "dropping the ticket before its turn withdraws the request"]
pub struct QueueTicket<T> {
    rx: oneshot::Receiver<Result<T, OkxError>>,
}

impl<T> Future for QueueTicket<T> {
    type Output = Result<T, OkxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(OkxError::QueueDropped)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use tokio::sync::Notify;
    use tokio::time::Instant;

    fn status_error(status: u16) -> OkxError {
        OkxError::HttpStatus { status, reason: "test".to_string() }
    }

    fn queue(max_retries: u32, delay_ms: u64) -> RequestQueue {
        RequestQueue::new(RetryPolicy::new(max_retries, Duration::from_millis(delay_ms)))
    }

    #[tokio::test]
    async fn test_success_resolves_value() {
        let queue = queue(3, 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let value = queue
            .enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(serde_json::json!({ "price": 1 })) }
            })
            .await
            .unwrap();

        assert_eq!(value, serde_json::json!({ "price": 1 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().retries, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_tasks_never_overlap() {
        let queue = queue(0, 1);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let overlapped = Arc::new(AtomicBool::new(false));

        let tickets: Vec<_> = (0..20)
            .map(|i| {
                let in_flight = in_flight.clone();
                let overlapped = overlapped.clone();
                queue.enqueue(move || {
                    let in_flight = in_flight.clone();
                    let overlapped = overlapped.clone();
                    async move {
                        if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlapped.store(true, Ordering::SeqCst);
                        }
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    }
                })
            })
            .collect();

        let results = futures::future::join_all(tickets).await;

        assert!(!overlapped.load(Ordering::SeqCst));
        let values: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_start_order_follows_submission() {
        let queue = queue(0, 1);
        let started = Arc::new(Mutex::new(Vec::new()));

        let tickets: Vec<_> = (0..10)
            .map(|i| {
                let started = started.clone();
                queue.enqueue(move || {
                    started.lock().push(i);
                    async move { Ok(()) }
                })
            })
            .collect();

        // Await in reverse: polling order must not affect start order
        for ticket in tickets.into_iter().rev() {
            ticket.await.unwrap();
        }

        assert_eq!(*started.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let queue = queue(5, 100);
        let attempts = Arc::new(Mutex::new(Vec::new()));

        let log = attempts.clone();
        let value = queue
            .enqueue(move || {
                let mut log = log.lock();
                log.push(Instant::now());
                let n = log.len();
                async move {
                    if n <= 2 { Err(status_error(500)) } else { Ok("done") }
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        let attempts = attempts.lock();
        assert_eq!(attempts.len(), 3);
        let first_gap = attempts[1] - attempts[0];
        let second_gap = attempts[2] - attempts[1];
        assert!(first_gap >= Duration::from_millis(100));
        assert!(second_gap >= first_gap);
        assert!(second_gap >= Duration::from_millis(200));
        assert_eq!(queue.stats().retries, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_once() {
        let queue = queue(5, 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let err = queue
            .enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(status_error(400)) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_returns_last_error() {
        let queue = queue(2, 50);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let err = queue
            .enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(status_error(429)) }
            })
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(429));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_block_later_entries() {
        let queue = queue(2, 100);
        let order = Arc::new(Mutex::new(Vec::new()));

        let first_calls = Arc::new(AtomicUsize::new(0));
        let log = order.clone();
        let counter = first_calls.clone();
        let first = queue.enqueue(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            log.lock().push(format!("first-{}", n));
            async move { if n == 0 { Err(status_error(503)) } else { Ok(()) } }
        });

        let log = order.clone();
        let second = queue.enqueue(move || {
            log.lock().push("second".to_string());
            async { Ok(()) }
        });

        second.await.unwrap();
        first.await.unwrap();

        assert_eq!(*order.lock(), vec!["first-0", "first-1", "second"]);
    }

    #[test]
    fn test_backoff_never_exceeds_cap() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        assert_eq!(policy.max_delay(), Duration::from_millis(2000));

        let mut delay = policy.initial_delay;
        for _ in 0..10 {
            delay = policy.next_delay(delay);
            assert!(delay <= policy.max_delay());
        }
        assert_eq!(delay, policy.max_delay());
    }

    #[test]
    fn test_zero_retries_caps_at_initial_delay() {
        let policy = RetryPolicy::new(0, Duration::from_millis(40));
        assert_eq!(policy.max_delay(), Duration::from_millis(40));
        assert_eq!(policy.next_delay(Duration::from_millis(40)), Duration::from_millis(40));
    }

    #[test]
    fn test_huge_retry_budget_saturates() {
        let policy = RetryPolicy::new(64, Duration::from_secs(1));
        assert!(policy.max_delay() >= Duration::from_secs(u32::MAX as u64));
    }

    #[tokio::test]
    async fn test_independent_queues_do_not_block() {
        let a = queue(0, 1);
        let b = queue(0, 1);
        let gate = Arc::new(Notify::new());

        let wait = gate.clone();
        let blocked = a.enqueue(move || {
            let wait = wait.clone();
            async move {
                wait.notified().await;
                Ok(())
            }
        });

        let free = tokio::time::timeout(
            Duration::from_secs(5),
            b.enqueue(|| async { Ok("b") }),
        )
        .await
        .expect("queue B must not wait for queue A");
        assert_eq!(free.unwrap(), "b");

        gate.notify_one();
        blocked.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_ticket_is_skipped() {
        let queue = queue(0, 1);
        let gate = Arc::new(Notify::new());
        let ran = Arc::new(AtomicBool::new(false));

        let wait = gate.clone();
        let blocker = queue.enqueue(move || {
            let wait = wait.clone();
            async move {
                wait.notified().await;
                Ok(())
            }
        });

        let flag = ran.clone();
        let abandoned = queue.enqueue(move || {
            flag.store(true, Ordering::SeqCst);
            async { Ok(()) }
        });
        drop(abandoned);

        gate.notify_one();
        blocker.await.unwrap();
        queue.enqueue(|| async { Ok(()) }).await.unwrap();

        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(queue.stats().abandoned, 1);
    }

    #[tokio::test]
    async fn test_panicking_task_does_not_wedge_queue() {
        let queue = queue(0, 1);

        let panicked = queue.enqueue(|| async {
            if true {
                panic!("task blew up");
            }
            Ok(())
        });
        let after = queue.enqueue(|| async { Ok(7) });

        assert!(matches!(panicked.await, Err(OkxError::QueueDropped)));
        assert_eq!(after.await.unwrap(), 7);

        let stats = queue.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticket_dropped_during_retry_runs_to_completion() {
        let queue = queue(3, 100);
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let counter = calls.clone();
        let log = order.clone();
        let first = queue.enqueue(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            log.lock().push(format!("first-{}", n));
            async move { if n < 2 { Err(status_error(503)) } else { Ok(()) } }
        });

        let log = order.clone();
        let second = queue.enqueue(move || {
            log.lock().push("second".to_string());
            async { Ok(()) }
        });

        // Let the first attempt fail and enter its back-off sleep
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        drop(first);

        second.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock(), vec!["first-0", "first-1", "first-2", "second"]);
        let stats = queue.stats();
        assert_eq!(stats.abandoned, 0);
        assert_eq!(stats.retries, 2);
        assert_eq!(stats.completed, 2);
    }

    #[tokio::test]
    async fn test_queue_returns_to_idle() {
        let queue = queue(0, 1);
        queue.enqueue(|| async { Ok(()) }).await.unwrap();

        // The drain loop clears the flag right after the last entry
        for _ in 0..100 {
            if !queue.stats().draining {
                break;
            }
            tokio::task::yield_now().await;
        }
        let stats = queue.stats();
        assert!(!stats.draining);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.completed, 1);

        queue.enqueue(|| async { Ok(()) }).await.unwrap();
        assert_eq!(queue.stats().completed, 2);
    }
}
