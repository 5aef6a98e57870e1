//! Bounded-concurrency fan-out with a join barrier.
//!
//! Dispatches one task per input, lets at most `limit` of them run at once
//! (a counting semaphore), and waits for every dispatched task before
//! returning. Results come back in input order regardless of completion
//! order.
//!
//! Tasks live in a [`JoinSet`], so dropping the future returned by
//! [`FanOut::run`] aborts everything still in flight. An optional deadline
//! aborts stragglers the same way and reports them as `None`.
//!
//! ```rust
//! use staysearch_runtime::fan_out::FanOut;
//!
//! # async fn example() {
//! let doubled = FanOut::new(4).run(vec![1, 2, 3], |n| async move { n * 2 }).await;
//! assert_eq!(doubled, vec![Some(2), Some(4), Some(6)]);
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Fan-out configuration.
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    limit: usize,
    deadline: Option<Duration>,
}

impl FanOut {
    /// Fan-out running at most `limit` tasks at once (minimum 1).
    #[must_use]
    pub const fn new(limit: usize) -> Self {
        Self {
            limit: if limit == 0 { 1 } else { limit },
            deadline: None,
        }
    }

    /// Abort tasks still running after `deadline`.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Maximum simultaneous tasks.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Run `task` for every input and collect results in input order.
    ///
    /// A slot is `None` when its task missed the deadline or panicked.
    pub async fn run<I, F, Fut, T>(&self, inputs: Vec<I>, task: F) -> Vec<Option<T>>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let mut set = JoinSet::new();
        let mut results: Vec<Option<T>> = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.into_iter().enumerate() {
            results.push(None);
            let semaphore = Arc::clone(&semaphore);
            let work = task(input);
            set.spawn(async move {
                // The semaphore is never closed, so acquisition only waits.
                let _permit = semaphore.acquire_owned().await;
                (index, work.await)
            });
        }

        let join_all = async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((index, value)) => {
                        if let Some(slot) = results.get_mut(index) {
                            *slot = Some(value);
                        }
                    }
                    Err(e) if e.is_panic() => {
                        tracing::error!(error = %e, "Fan-out task panicked");
                    }
                    Err(_) => {}
                }
            }
        };

        match self.deadline {
            Some(deadline) => {
                if tokio::time::timeout(deadline, join_all).await.is_err() {
                    tracing::warn!(
                        deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                        unfinished = set.len(),
                        "Fan-out deadline elapsed, aborting remaining tasks"
                    );
                    set.abort_all();
                }
            }
            None => join_all.await,
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn results_follow_input_order() {
        let out = FanOut::new(3)
            .run(vec![30_u64, 10, 20], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await;

        assert_eq!(out, vec![Some(30), Some(10), Some(20)]);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_limit() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let out = FanOut::new(3)
            .run((0..12).collect(), |_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .await;

        assert_eq!(out.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn deadline_leaves_stragglers_empty() {
        let out = FanOut::new(4)
            .with_deadline(Some(Duration::from_millis(50)))
            .run(vec![5_u64, 500], |ms| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                ms
            })
            .await;

        assert_eq!(out, vec![Some(5), None]);
    }

    #[tokio::test]
    async fn dropping_the_run_aborts_tasks() {
        let finished = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&finished);

        let fan_out = FanOut::new(2);
        let run = fan_out.run(vec![(); 4], move |()| {
            let f = Arc::clone(&f);
            async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                f.fetch_add(1, Ordering::SeqCst);
            }
        });

        let _ = tokio::time::timeout(Duration::from_millis(20), run).await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_limit_is_clamped() {
        assert_eq!(FanOut::new(0).limit(), 1);
    }

    proptest::proptest! {
        #[test]
        fn order_is_input_order(delays in proptest::collection::vec(0_u64..5, 1..24), limit in 1_usize..6) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let inputs: Vec<(usize, u64)> = delays.iter().copied().enumerate().collect();

            let out = rt.block_on(FanOut::new(limit).run(inputs, |(n, ms)| async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                n
            }));

            let expected: Vec<Option<usize>> = (0..delays.len()).map(Some).collect();
            proptest::prop_assert_eq!(out, expected);
        }
    }
}
