use crate::error::CreditError;
use futures::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Runs one task per future with at most `max_concurrent` running at once
///
/// Every future gets its own tokio task; a semaphore permit gates when it
/// starts. Futures still waiting for a permit when the token is cancelled
/// are never polled.
pub struct ParallelProcessor {
    max_concurrent: usize,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl ParallelProcessor {
    /// Creates a new parallel processor with the specified concurrency limit
    pub fn new(max_concurrent: usize, cancel: CancellationToken) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            max_concurrent,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            cancel,
        }
    }

    /// The concurrency limit
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Runs every future and returns their outputs in input order
    ///
    /// Returns only once all spawned tasks have finished. A task that was
    /// cancelled before starting yields `CreditError::Cancelled`; a task that
    /// panicked yields `CreditError::Task`.
    pub async fn process<F, T>(&self, tasks: Vec<F>) -> Vec<Result<T, CreditError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let semaphore = Arc::clone(&self.semaphore);
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let permit = tokio::select! {
                        biased;
                        () = cancel.cancelled() => None,
                        permit = semaphore.acquire_owned() => permit.ok(),
                    };
                    let Some(_permit) = permit else {
                        debug!("task cancelled before it started");
                        return Err(CreditError::Cancelled);
                    };
                    Ok(task.await)
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(CreditError::Task(e.to_string()))))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_parallel_processing_keeps_order() {
        let processor = ParallelProcessor::new(3, CancellationToken::new());

        let make_task = |duration: u64, value: i32| async move {
            sleep(Duration::from_millis(duration)).await;
            value
        };

        let tasks = vec![
            Box::pin(make_task(100, 1)),
            Box::pin(make_task(50, 2)),
            Box::pin(make_task(200, 3)),
            Box::pin(make_task(75, 4)),
            Box::pin(make_task(150, 5)),
        ];

        let results: Vec<i32> = processor
            .process(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(results, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrency_is_bounded() {
        let processor = ParallelProcessor::new(2, CancellationToken::new());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        let results = processor.process(tasks).await;
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(Result::is_ok));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_cancelled_tasks_never_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let processor = ParallelProcessor::new(2, cancel);
        let started = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..3)
            .map(|_| {
                let started = Arc::clone(&started);
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                }
            })
            .collect();

        let results = processor.process(tasks).await;
        assert!(results.iter().all(|r| matches!(r, Err(CreditError::Cancelled))));
        assert_eq!(started.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let processor = ParallelProcessor::new(1, CancellationToken::new());
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = i32> + Send>>> = vec![
            Box::pin(async { 1 }),
            Box::pin(async { Option::<i32>::None.expect("boom") }),
        ];

        let results = processor.process(tasks).await;
        assert!(matches!(results[0], Ok(1)));
        assert!(matches!(results[1], Err(CreditError::Task(_))));
    }
}
