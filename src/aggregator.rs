//! Bounded fan-out of per-item status fetches.
//!
//! [`StatusAggregator::aggregate`] runs one fetch per item on the tokio
//! runtime, never more than `concurrency` at a time, each one gated by the
//! shared [`RateLimit`]. Results land in a slot addressed by the item's input
//! position, so the returned vector is aligned with the input no matter which
//! fetch finishes first.
//!
//! The first fetch error cancels a child of the caller's token: queued items
//! are never started, running ones are dropped at their next suspension point,
//! and the error is returned alone. Cancelling the caller's token yields
//! [`AggregateError::Cancelled`].

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::rate_limit::RateLimit;

pub const DEFAULT_CONCURRENCY: usize = 20;

/// A caller-supplied identifier and its position in the input sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem<T> {
    pub position: usize,
    pub id: T,
}

#[derive(Debug, Error)]
pub enum AggregateError<E> {
    /// The caller's token was cancelled before every item resolved.
    #[error("aggregation cancelled")]
    Cancelled,

    /// The first item to fail, verbatim.
    #[error("{source}")]
    Failed {
        position: usize,
        #[source]
        source: E,
    },
}

enum Exit<R, E> {
    Done(usize, R),
    Failed(usize, E),
    Skipped,
}

pub struct StatusAggregator<L> {
    limiter: Arc<L>,
    concurrency: usize,
}

impl<L: RateLimit + 'static> StatusAggregator<L> {
    pub fn new(limiter: Arc<L>) -> Self {
        Self {
            limiter,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Caps in-flight fetches; zero is treated as one.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Fetches every item and returns the results in input order.
    ///
    /// `fetch` receives the aggregation's token and should observe it at its
    /// own suspension points; it is also dropped outright on cancellation.
    /// `Ok(None)`-style absence markers are ordinary results here.
    pub async fn aggregate<T, R, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        items: Vec<T>,
        fetch: F,
    ) -> Result<Vec<R>, AggregateError<E>>
    where
        T: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
        F: Fn(WorkItem<T>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let total = items.len();
        let token = cancel.child_token();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let fetch = Arc::new(fetch);
        let mut tasks = JoinSet::new();

        debug!(total, concurrency = self.concurrency, "aggregating");

        for (position, id) in items.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let token = token.clone();
            let limiter = Arc::clone(&self.limiter);
            let fetch = Arc::clone(&fetch);
            tasks.spawn(async move {
                let _permit = permit;
                if limiter.acquire(&token).await.is_err() {
                    return Exit::Skipped;
                }

                let item = WorkItem { position, id };
                let result = tokio::select! {
                    biased;
                    _ = token.cancelled() => return Exit::Skipped,
                    result = fetch(item, token.clone()) => result,
                };

                match result {
                    Ok(value) => Exit::Done(position, value),
                    // Errors raised after cancellation are fallout, not causes.
                    Err(_) if token.is_cancelled() => Exit::Skipped,
                    Err(err) => {
                        token.cancel();
                        Exit::Failed(position, err)
                    }
                }
            });
        }

        let mut slots: Vec<Option<R>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut failure: Option<(usize, E)> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Exit::Done(position, value)) => slots[position] = Some(value),
                Ok(Exit::Failed(position, err)) => {
                    if failure.is_none() {
                        debug!(position, "item failed, cancelling remaining work");
                        failure = Some((position, err));
                    }
                }
                Ok(Exit::Skipped) => {}
                Err(join_err) if join_err.is_panic() => {
                    std::panic::resume_unwind(join_err.into_panic())
                }
                Err(_) => {}
            }
        }

        if let Some((position, source)) = failure {
            return Err(AggregateError::Failed { position, source });
        }

        slots
            .into_iter()
            .collect::<Option<Vec<R>>>()
            .ok_or(AggregateError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rand::Rng;

    use crate::error::Cancelled;
    use crate::rate_limit::TokenBucket;

    struct Unlimited;

    impl RateLimit for Unlimited {
        async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
            if cancel.is_cancelled() {
                Err(Cancelled)
            } else {
                Ok(())
            }
        }
    }

    fn unlimited() -> StatusAggregator<Unlimited> {
        StatusAggregator::new(Arc::new(Unlimited))
    }

    #[tokio::test(start_paused = true)]
    async fn preserves_input_order_under_random_delays() {
        let items: Vec<usize> = (0..500).collect();
        let delays: Arc<Vec<u64>> = Arc::new(
            (0..500)
                .map(|_| rand::thread_rng().gen_range(0..200))
                .collect(),
        );

        let results = unlimited()
            .aggregate(&CancellationToken::new(), items, move |item, _| {
                let delays = Arc::clone(&delays);
                async move {
                    tokio::time::sleep(Duration::from_millis(delays[item.position])).await;
                    Ok::<_, String>(format!("ws-{}", item.id))
                }
            })
            .await
            .unwrap();

        assert_eq!(results.len(), 500);
        for (i, value) in results.iter().enumerate() {
            assert_eq!(value, &format!("ws-{i}"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = unlimited()
            .with_concurrency(7)
            .aggregate(&CancellationToken::new(), (0..100).collect(), {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                move |item: WorkItem<u32>, _: CancellationToken| {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, String>(item.id)
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(results, (0..100).collect::<Vec<u32>>());
        assert_eq!(peak.load(Ordering::SeqCst), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn first_failure_discards_everything_and_stops_new_work() {
        let calls = Arc::new(AtomicUsize::new(0));

        let err = unlimited()
            .with_concurrency(4)
            .aggregate(&CancellationToken::new(), (0..200).collect(), {
                let calls = Arc::clone(&calls);
                move |item: WorkItem<usize>, _: CancellationToken| {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if item.id == 5 {
                            return Err(format!("workspace {} exploded", item.id));
                        }
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(item.id)
                    }
                }
            })
            .await
            .unwrap_err();

        match err {
            AggregateError::Failed { position, source } => {
                assert_eq!(position, 5);
                assert_eq!(source, "workspace 5 exploded");
            }
            AggregateError::Cancelled => panic!("expected the item failure"),
        }
        // Items 0..=5 start before the failure; nothing queued behind them runs.
        assert!(calls.load(Ordering::SeqCst) < 10, "{}", calls.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_fetches_observe_cancellation() {
        let completed = Arc::new(AtomicUsize::new(0));

        let err = unlimited()
            .aggregate(&CancellationToken::new(), (0..10).collect(), {
                let completed = Arc::clone(&completed);
                move |item: WorkItem<usize>, _: CancellationToken| {
                    let completed = Arc::clone(&completed);
                    async move {
                        if item.id == 0 {
                            tokio::time::sleep(Duration::from_millis(1)).await;
                            return Err("boom");
                        }
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        completed.fetch_add(1, Ordering::SeqCst);
                        Ok(item.id)
                    }
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AggregateError::Failed { position: 0, .. }));
        assert_eq!(completed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn absence_is_not_failure() {
        let results = unlimited()
            .aggregate(&CancellationToken::new(), (0..6).collect(), |item: WorkItem<u32>, _| async move {
                if item.id % 2 == 0 {
                    Ok::<_, String>(None)
                } else {
                    Ok(Some(item.id * 10))
                }
            })
            .await
            .unwrap();

        assert_eq!(results, vec![None, Some(10), None, Some(30), None, Some(50)]);
    }

    #[tokio::test(start_paused = true)]
    async fn caller_cancellation_is_reported_as_cancelled() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let err = unlimited()
            .with_concurrency(2)
            .aggregate(&cancel, (0..50).collect(), |item: WorkItem<u32>, _| async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                Ok::<_, String>(item.id)
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AggregateError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn internal_failure_leaves_caller_token_alone() {
        let cancel = CancellationToken::new();

        let _ = unlimited()
            .aggregate(&cancel, vec![1], |_: WorkItem<u32>, _| async { Err::<u32, _>("nope") })
            .await;

        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let results = unlimited()
            .aggregate(&CancellationToken::new(), Vec::<u32>::new(), |item, _| async move {
                Ok::<_, String>(item.id)
            })
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_go_through_the_shared_limiter() {
        let limiter = Arc::new(TokenBucket::new(10, 1));
        let start = tokio::time::Instant::now();

        let results = StatusAggregator::new(limiter)
            .aggregate(&CancellationToken::new(), (0..6).collect(), |item: WorkItem<u32>, _| async move {
                Ok::<_, String>(item.id)
            })
            .await
            .unwrap();

        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
        // One from the burst, five more at 100ms each.
        assert!(start.elapsed() >= Duration::from_millis(490));
    }
}
