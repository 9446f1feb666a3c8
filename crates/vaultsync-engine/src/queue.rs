//! Transfer queue
//!
//! Bounded-concurrency FIFO executor for uploads and downloads. At most
//! `concurrency` tasks run at once; the rest wait in arrival order. A
//! failed task is retried with exponential backoff (1s, 2s, 4s for the
//! defaults) and re-enters at the *head* of the queue after its delay, so
//! a retry keeps its place ahead of newer work. Errors the transport has
//! already classified as non-retryable (auth, validation, lost races)
//! fail the task immediately.
//!
//! Tasks are factories (`Fn() -> Future`) rather than futures, so a retry
//! re-runs the work from scratch.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{oneshot, Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use vaultsync_core::constants::{MAX_CONCURRENT_TRANSFERS, MAX_RETRIES, RETRY_BACKOFF_MS};
use vaultsync_core::ports::ApiError;

type TaskFactory = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type FailSink = Arc<dyn Fn(anyhow::Error) + Send + Sync>;

/// A queued unit of work plus its retry bookkeeping
struct QueuedTask {
    run: TaskFactory,
    fail: FailSink,
    retries: u32,
}

struct Inner {
    queue: Mutex<VecDeque<QueuedTask>>,
    notify: Notify,
    semaphore: Arc<Semaphore>,
    active: AtomicUsize,
    cancel: CancellationToken,
}

/// Bounded FIFO executor for asynchronous transfer tasks
pub struct TransferQueue {
    inner: Arc<Inner>,
}

/// Future handle for a task's eventual outcome
pub struct TransferHandle<T> {
    rx: oneshot::Receiver<anyhow::Result<T>>,
}

impl<T> TransferHandle<T> {
    /// Wait for the task to finish (including any retries).
    pub async fn join(self) -> anyhow::Result<T> {
        self.rx
            .await
            .map_err(|_| anyhow::anyhow!("transfer queue shut down before the task completed"))?
    }
}

impl TransferQueue {
    /// Create a queue running at most `concurrency` tasks at once.
    ///
    /// # Panics
    /// Panics if `concurrency` is zero.
    #[must_use]
    pub fn new(concurrency: usize) -> Self {
        assert!(concurrency > 0, "transfer queue needs at least one slot");

        let inner = Arc::new(Inner {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            active: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        });

        let dispatcher = Arc::clone(&inner);
        tokio::spawn(dispatch_loop(dispatcher));

        Self { inner }
    }

    /// Create a queue with the default fan-out
    #[must_use]
    pub fn with_default_concurrency() -> Self {
        Self::new(MAX_CONCURRENT_TRANSFERS)
    }

    /// Enqueue a task factory; returns a handle for its eventual outcome.
    ///
    /// The factory is invoked once per attempt. The resulting future's
    /// success value is delivered through the handle; after the retry
    /// budget is exhausted the handle yields the last error.
    pub fn enqueue<T, F, Fut>(&self, factory: F) -> TransferHandle<T>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(Mutex::new(Some(tx)));

        let tx_ok = Arc::clone(&tx);
        let run: TaskFactory = Arc::new(move || {
            let fut = factory();
            let tx = Arc::clone(&tx_ok);
            Box::pin(async move {
                let value = fut.await?;
                if let Some(sender) = tx.lock().expect("sender lock poisoned").take() {
                    let _ = sender.send(Ok(value));
                }
                Ok(())
            })
        });

        let fail: FailSink = Arc::new(move |err| {
            if let Some(sender) = tx.lock().expect("sender lock poisoned").take() {
                let _ = sender.send(Err(err));
            }
        });

        self.inner
            .queue
            .lock()
            .expect("queue lock poisoned")
            .push_back(QueuedTask {
                run,
                fail,
                retries: 0,
            });
        self.inner.notify.notify_one();

        TransferHandle { rx }
    }

    /// Tasks currently executing
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.load(Ordering::SeqCst)
    }

    /// Tasks waiting in the queue (excludes tasks sleeping out a backoff)
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.queue.lock().expect("queue lock poisoned").len()
    }
}

impl Drop for TransferQueue {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

/// Single dispatcher: acquire a slot, pop the head, run it detached.
async fn dispatch_loop(inner: Arc<Inner>) {
    loop {
        let permit = tokio::select! {
            permit = Arc::clone(&inner.semaphore).acquire_owned() => {
                match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                }
            }
            () = inner.cancel.cancelled() => return,
        };

        let task = loop {
            if let Some(task) = inner.queue.lock().expect("queue lock poisoned").pop_front() {
                break task;
            }
            tokio::select! {
                () = inner.notify.notified() => {}
                () = inner.cancel.cancelled() => return,
            }
        };

        let worker = Arc::clone(&inner);
        worker.active.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            let result = (task.run)().await;
            worker.active.fetch_sub(1, Ordering::SeqCst);
            drop(permit);
            if let Err(err) = result {
                handle_failure(worker, task, err);
            }
        });
    }
}

fn handle_failure(inner: Arc<Inner>, mut task: QueuedTask, err: anyhow::Error) {
    let retryable = err
        .downcast_ref::<ApiError>()
        .map_or(true, ApiError::is_retryable);

    if retryable && task.retries < MAX_RETRIES {
        task.retries += 1;
        let delay = Duration::from_millis(RETRY_BACKOFF_MS * 2u64.pow(task.retries - 1));
        warn!(
            attempt = task.retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transfer failed, scheduling retry"
        );
        tokio::spawn(async move {
            tokio::select! {
                () = tokio::time::sleep(delay) => {
                    inner
                        .queue
                        .lock()
                        .expect("queue lock poisoned")
                        .push_front(task);
                    inner.notify.notify_one();
                }
                () = inner.cancel.cancelled() => {}
            }
        });
    } else {
        debug!(retries = task.retries, error = %err, "Transfer failed permanently");
        (task.fail)(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_single_task_completes() {
        let queue = TransferQueue::new(2);
        let handle = queue.enqueue(|| async { Ok(41 + 1) });
        assert_eq!(handle.join().await.unwrap(), 42);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_never_exceeds_limit() {
        let queue = TransferQueue::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(queue.enqueue(move || {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            }));
        }
        for handle in handles {
            handle.join().await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_fifo_order_at_concurrency_one() {
        let queue = TransferQueue::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let order = Arc::clone(&order);
            handles.push(queue.enqueue(move || {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(i);
                    Ok(())
                }
            }));
        }
        for handle in handles {
            handle.join().await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_is_exponential() {
        let queue = TransferQueue::new(1);
        let attempts = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let task_attempts = Arc::clone(&attempts);
        let handle = queue.enqueue(move || {
            let attempts = Arc::clone(&task_attempts);
            async move {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    anyhow::bail!("transient hiccup");
                }
                Ok(n)
            }
        });

        assert_eq!(handle.join().await.unwrap(), 3);
        // Two retries: 1000ms + 2000ms of virtual backoff
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_yields_last_error() {
        let queue = TransferQueue::new(1);
        let attempts = Arc::new(AtomicU32::new(0));

        let task_attempts = Arc::clone(&attempts);
        let handle = queue.enqueue(move || {
            let attempts = Arc::clone(&task_attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("still broken"))
            }
        });

        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("still broken"));
        // Initial run plus MAX_RETRIES retries
        assert_eq!(attempts.load(Ordering::SeqCst), 1 + MAX_RETRIES);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let queue = TransferQueue::new(1);
        let attempts = Arc::new(AtomicU32::new(0));

        let task_attempts = Arc::clone(&attempts);
        let handle = queue.enqueue(move || {
            let attempts = Arc::clone(&task_attempts);
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ApiError::Auth("token rejected".into()).into())
            }
        });

        assert!(handle.join().await.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retried_task_reenters_at_head() {
        let queue = TransferQueue::new(1);
        let order = Arc::new(Mutex::new(Vec::new()));
        let failed_once = Arc::new(AtomicU32::new(0));

        // First task fails once, then succeeds on retry.
        let o = Arc::clone(&order);
        let f = Arc::clone(&failed_once);
        let first = queue.enqueue(move || {
            let order = Arc::clone(&o);
            let failed_once = Arc::clone(&f);
            async move {
                if failed_once.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("first attempt fails");
                }
                order.lock().unwrap().push("retried");
                Ok(())
            }
        });

        // A slow blocker keeps the lane busy through the backoff window, so
        // the retry and the latecomer are both queued when it frees up.
        let blocker = queue.enqueue(|| async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok(())
        });

        let o = Arc::clone(&order);
        let last = queue.enqueue(move || {
            let order = Arc::clone(&o);
            async move {
                order.lock().unwrap().push("latecomer");
                Ok(())
            }
        });

        first.join().await.unwrap();
        blocker.join().await.unwrap();
        last.join().await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["retried", "latecomer"]);
    }

    #[tokio::test]
    async fn test_counts_settle_to_zero() {
        let queue = TransferQueue::new(2);
        let handle = queue.enqueue(|| async { Ok(()) });
        handle.join().await.unwrap();

        tokio::task::yield_now().await;
        assert_eq!(queue.active_count(), 0);
        assert_eq!(queue.pending_count(), 0);
    }
}
